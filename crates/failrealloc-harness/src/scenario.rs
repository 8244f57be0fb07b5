//! Append scenarios and the checker's transcript format.
//!
//! Scenario A (normal): `"hello" + "world"` must give `"helloworld"`.
//! Scenario B (out of memory): `"a" + "b"` is expected to hit an injected
//! failure and return null.

use std::ffi::CStr;

use failrealloc_subjects::{Heap, Subject};
use serde::{Deserialize, Serialize};

pub const NORMAL_BASE: &CStr = c"hello";
pub const NORMAL_ADD: &CStr = c"world";
pub const NORMAL_EXPECTED: &CStr = c"helloworld";
pub const OOM_BASE: &CStr = c"a";
pub const OOM_ADD: &CStr = c"b";

pub const NORMAL_BANNER: &str = "Testing append_str under normal conditions...";
pub const NORMAL_PASSED: &str = "✓ Normal test passed";
pub const NORMAL_NULL: &str = "ERROR: append_str returned NULL on normal input";
pub const NORMAL_MISMATCH: &str = "ERROR: Expected 'helloworld'";
pub const OOM_BANNER: &str = "Testing append_str with OOM simulation (if LD_PRELOAD is set)...";
pub const OOM_PASSED: &str = "✓ OOM test passed";
pub const OOM_INACTIVE: &str = "INFO: OOM simulation not active or realloc succeeded";
pub const COMPLETED: &str = "All tests completed.";
pub const SHIM_CALLS_PREFIX: &str = "shim: realloc calls observed: ";
pub const SHIM_FAIL_AFTER_PREFIX: &str = "shim: fail-after ordinal: ";

/// Which scenarios a checker run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Scenario A then scenario B, as two consecutive growth calls.
    Full,
    /// Scenario B only; its growth call is the first in the process.
    OomOnly,
}

impl Mode {
    #[must_use]
    pub const fn runs_normal(self) -> bool {
        matches!(self, Self::Full)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalOutcome {
    Passed,
    ReturnedNull,
    Mismatch { got: String },
}

impl NormalOutcome {
    #[must_use]
    pub fn passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OomOutcome {
    /// The subject surfaced the allocation failure as null.
    ReturnedNull,
    /// No failure reached the subject.
    Succeeded { got: String },
}

/// Scenario A. Allocates nothing beyond what the subject itself does unless
/// the result is wrong.
pub fn check_normal<H: Heap>(subject: Subject, heap: &H) -> NormalOutcome {
    match subject.append_owned(heap, NORMAL_BASE, NORMAL_ADD) {
        None => NormalOutcome::ReturnedNull,
        Some(out) if out.as_c_str() == NORMAL_EXPECTED => NormalOutcome::Passed,
        Some(out) => NormalOutcome::Mismatch {
            got: out.as_c_str().to_string_lossy().into_owned(),
        },
    }
}

/// Scenario B.
pub fn check_oom<H: Heap>(subject: Subject, heap: &H) -> OomOutcome {
    match subject.append_owned(heap, OOM_BASE, OOM_ADD) {
        None => OomOutcome::ReturnedNull,
        Some(out) => OomOutcome::Succeeded {
            got: out.as_c_str().to_string_lossy().into_owned(),
        },
    }
}

/// What a checker run printed, reduced to the facts the supervisor needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub normal_passed: bool,
    pub normal_failed: bool,
    pub oom_injected: bool,
    pub oom_inactive: bool,
    pub completed: bool,
    pub shim_calls: Option<u64>,
    pub shim_fail_after: Option<u64>,
}

impl Transcript {
    #[must_use]
    pub fn parse(stdout: &str) -> Self {
        let mut t = Self::default();
        for line in stdout.lines().map(str::trim) {
            if line.starts_with(NORMAL_PASSED) {
                t.normal_passed = true;
            } else if line.starts_with(NORMAL_NULL) || line.starts_with(NORMAL_MISMATCH) {
                t.normal_failed = true;
            } else if line.starts_with(OOM_PASSED) {
                t.oom_injected = true;
            } else if line.starts_with(OOM_INACTIVE) {
                t.oom_inactive = true;
            } else if line == COMPLETED {
                t.completed = true;
            } else if let Some(rest) = line.strip_prefix(SHIM_CALLS_PREFIX) {
                t.shim_calls = rest.parse().ok();
            } else if let Some(rest) = line.strip_prefix(SHIM_FAIL_AFTER_PREFIX) {
                t.shim_fail_after = rest.parse().ok();
            }
        }
        t
    }
}
