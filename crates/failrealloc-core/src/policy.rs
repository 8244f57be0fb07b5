//! Fault policy configuration.
//!
//! The ordinal of the `realloc` call to fail is read from the
//! `FAIL_REALLOC_AFTER` environment variable:
//! - absent: [`DEFAULT_FAIL_AFTER`] (the second call in the process).
//! - present: parsed like C `atoi` (leading whitespace, optional sign, longest
//!   digit prefix). Input with no digits, or a negative value, resolves to `0`.
//! - `0`: never inject a failure.
//!
//! `FAIL_REALLOC_TRACE` enables a one-line stderr diagnostic per injected
//! failure. It accepts `1`, `true`, `yes` or `on` (case-insensitive).

use crate::gate::Verdict;

/// Environment variable naming the 1-based ordinal of the call to fail.
pub const FAIL_AFTER_ENV: &str = "FAIL_REALLOC_AFTER";

/// Environment variable enabling injected-failure diagnostics.
pub const TRACE_ENV: &str = "FAIL_REALLOC_TRACE";

/// Ordinal used when [`FAIL_AFTER_ENV`] is not set.
pub const DEFAULT_FAIL_AFTER: u64 = 2;

/// Resolved, immutable fault policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FaultPolicy {
    fail_after: u64,
    trace: bool,
}

impl Default for FaultPolicy {
    fn default() -> Self {
        Self::fail_at(DEFAULT_FAIL_AFTER)
    }
}

impl FaultPolicy {
    /// Policy that fails exactly the `ordinal`-th call (`0` disables injection).
    #[must_use]
    pub const fn fail_at(ordinal: u64) -> Self {
        Self {
            fail_after: ordinal,
            trace: false,
        }
    }

    /// Policy that never injects a failure.
    #[must_use]
    pub const fn disabled() -> Self {
        Self::fail_at(0)
    }

    /// Same policy with diagnostics switched on or off.
    #[must_use]
    pub const fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Build a policy from raw environment values.
    ///
    /// Kept byte-oriented so the shim can feed it `getenv` results without
    /// allocating.
    #[must_use]
    pub fn from_env_values(fail_after: Option<&[u8]>, trace: Option<&[u8]>) -> Self {
        let ordinal = fail_after.map_or(DEFAULT_FAIL_AFTER, parse_ordinal);
        Self::fail_at(ordinal).with_trace(trace.is_some_and(parse_flag))
    }

    /// Read the policy from the current process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let fail_after = std::env::var_os(FAIL_AFTER_ENV);
        let trace = std::env::var_os(TRACE_ENV);
        Self::from_env_values(
            fail_after.as_deref().map(|v| v.as_encoded_bytes()),
            trace.as_deref().map(|v| v.as_encoded_bytes()),
        )
    }

    /// The configured ordinal; `0` when injection is disabled.
    #[must_use]
    pub const fn fail_after(self) -> u64 {
        self.fail_after
    }

    /// Whether some call can still be failed by this policy.
    #[must_use]
    pub const fn is_armed(self) -> bool {
        self.fail_after != 0
    }

    /// Whether injected failures should be reported on stderr.
    #[must_use]
    pub const fn trace_enabled(self) -> bool {
        self.trace
    }

    /// Decide the fate of the call that received `ordinal`.
    #[must_use]
    pub const fn verdict(self, ordinal: u64) -> Verdict {
        if self.fail_after != 0 && ordinal == self.fail_after {
            Verdict::InjectFailure
        } else {
            Verdict::Forward
        }
    }
}

/// Parse an ordinal with C `atoi` leniency.
///
/// Negative values and input without a digit prefix give `0`. Values past
/// `u64::MAX` saturate, which is never reached by a real counter.
#[must_use]
pub fn parse_ordinal(raw: &[u8]) -> u64 {
    let mut i = 0;
    let len = raw.len();

    while i < len && is_c_space(raw[i]) {
        i += 1;
    }

    let mut negative = false;
    if i < len && (raw[i] == b'-' || raw[i] == b'+') {
        negative = raw[i] == b'-';
        i += 1;
    }

    let mut acc: u64 = 0;
    let mut any_digits = false;
    while i < len && raw[i].is_ascii_digit() {
        any_digits = true;
        acc = acc
            .saturating_mul(10)
            .saturating_add(u64::from(raw[i] - b'0'));
        i += 1;
    }

    if !any_digits || negative { 0 } else { acc }
}

/// C `isspace` in the "C" locale, which also covers vertical tab.
const fn is_c_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\x0b' | b'\x0c' | b'\r')
}

/// Parse a loose boolean switch.
#[must_use]
pub fn parse_flag(raw: &[u8]) -> bool {
    let trimmed = raw.trim_ascii();
    ["1", "true", "yes", "on"]
        .iter()
        .any(|accepted| trimmed.eq_ignore_ascii_case(accepted.as_bytes()))
}
