//! In-process run of the append scenarios through an injected allocator.
//!
//! Same ordinal semantics as the preloaded shim, but only the subject's own
//! `realloc` calls are counted, and leaks are measured directly instead of by
//! an external tool.

use serde::{Deserialize, Serialize};

use failrealloc_core::FaultPolicy;
use failrealloc_subjects::{FaultInjectingHeap, LibcHeap, Subject, TrackingHeap};

use crate::scenario::{self, Mode, NormalOutcome, OomOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeamReport {
    pub subject: Subject,
    pub mode: Mode,
    pub fail_after: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normal: Option<NormalOutcome>,
    /// Scenario B is skipped when scenario A already failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oom: Option<OomOutcome>,
    pub realloc_calls: u64,
    pub leaked_blocks: usize,
    pub leaked_bytes: usize,
}

impl SeamReport {
    /// Results that came back null.
    #[must_use]
    pub fn failures(&self) -> usize {
        usize::from(matches!(self.normal, Some(NormalOutcome::ReturnedNull)))
            + usize::from(matches!(self.oom, Some(OomOutcome::ReturnedNull)))
    }

    /// Blocks a correct subject would leave behind: none for `fixed`, one
    /// per failed growth for `buggy`.
    #[must_use]
    pub fn expected_leaks(&self) -> usize {
        match self.subject {
            Subject::Fixed => 0,
            Subject::Buggy => self.failures(),
        }
    }

    #[must_use]
    pub fn leak_free(&self) -> bool {
        self.leaked_blocks == 0
    }

    /// Leak count matches the subject's known behaviour.
    #[must_use]
    pub fn matches_subject(&self) -> bool {
        self.leaked_blocks == self.expected_leaks()
    }
}

/// Run `mode`'s scenarios for `subject` against a fresh injecting heap.
///
/// Leaked blocks are counted, then reclaimed before returning.
#[must_use]
pub fn run_seam(subject: Subject, policy: FaultPolicy, mode: Mode) -> SeamReport {
    let heap = TrackingHeap::new(FaultInjectingHeap::new(LibcHeap, policy));

    let normal = mode
        .runs_normal()
        .then(|| scenario::check_normal(subject, &heap));
    let oom = match &normal {
        Some(outcome) if !outcome.passed() => None,
        _ => Some(scenario::check_oom(subject, &heap)),
    };

    let report = SeamReport {
        subject,
        mode,
        fail_after: policy.fail_after(),
        normal,
        oom,
        realloc_calls: heap.inner().gate().calls(),
        leaked_blocks: heap.outstanding(),
        leaked_bytes: heap.leaked_bytes(),
    };
    heap.release_outstanding();
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_fails_oom_scenario_in_full_mode() {
        for subject in Subject::ALL {
            let report = run_seam(subject, FaultPolicy::default(), Mode::Full);
            assert_eq!(report.normal, Some(NormalOutcome::Passed));
            assert_eq!(report.oom, Some(OomOutcome::ReturnedNull));
            assert_eq!(report.realloc_calls, 2);
            assert!(report.matches_subject(), "{report:?}");
        }
    }

    #[test]
    fn buggy_leaks_base_copy_fixed_does_not() {
        let fixed = run_seam(Subject::Fixed, FaultPolicy::fail_at(1), Mode::OomOnly);
        assert!(fixed.leak_free());

        let buggy = run_seam(Subject::Buggy, FaultPolicy::fail_at(1), Mode::OomOnly);
        assert_eq!(buggy.leaked_blocks, 1);
        assert_eq!(buggy.leaked_bytes, 2);
        assert!(buggy.matches_subject());
    }

    #[test]
    fn first_call_failure_stops_full_mode_after_scenario_a() {
        let report = run_seam(Subject::Fixed, FaultPolicy::fail_at(1), Mode::Full);
        assert_eq!(report.normal, Some(NormalOutcome::ReturnedNull));
        assert_eq!(report.oom, None);
        assert_eq!(report.realloc_calls, 1);
        assert!(report.leak_free());

        let report = run_seam(Subject::Buggy, FaultPolicy::fail_at(1), Mode::Full);
        assert_eq!(report.leaked_bytes, "hello".len() + 1);
    }

    #[test]
    fn disabled_policy_never_fails() {
        let report = run_seam(Subject::Buggy, FaultPolicy::disabled(), Mode::Full);
        assert_eq!(report.failures(), 0);
        assert_eq!(
            report.oom,
            Some(OomOutcome::Succeeded {
                got: "ab".to_string()
            })
        );
        assert!(report.leak_free());
    }
}
