//! Concurrent ordinal assignment check.
//!
//! Many threads admit calls through one [`FaultGate`]; every call must get a
//! distinct ordinal, the ordinals must cover `1..=total` with no gaps, and at
//! most one call (the configured one) may be failed.

use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

use failrealloc_core::{FaultGate, FaultPolicy};

use crate::error::HarnessError;

#[derive(Debug, Clone, Serialize)]
pub struct StressReport {
    pub threads: usize,
    pub calls_per_thread: usize,
    pub total_calls: u64,
    pub fail_after: u64,
    pub unique_ordinals: bool,
    pub dense_ordinals: bool,
    /// Ordinals that received an injected failure.
    pub injected: Vec<u64>,
    pub elapsed_ms: u64,
}

impl StressReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        let expected: &[u64] = if (1..=self.total_calls).contains(&self.fail_after) {
            std::slice::from_ref(&self.fail_after)
        } else {
            &[]
        };
        self.unique_ordinals && self.dense_ordinals && self.injected == expected
    }
}

pub fn run_stress(
    policy: FaultPolicy,
    threads: usize,
    calls_per_thread: usize,
) -> Result<StressReport, HarnessError> {
    if threads == 0 || calls_per_thread == 0 {
        return Err(HarnessError::InvalidArgument(
            "stress needs at least one thread and one call".to_string(),
        ));
    }

    let gate = FaultGate::new(policy);
    let seen = Mutex::new(Vec::with_capacity(threads * calls_per_thread));
    let injected = Mutex::new(Vec::new());
    let start = Instant::now();

    std::thread::scope(|s| {
        for _ in 0..threads {
            s.spawn(|| {
                let mut local = Vec::with_capacity(calls_per_thread);
                for _ in 0..calls_per_thread {
                    let admission = gate.admit();
                    if admission.injects_failure() {
                        injected.lock().push(admission.ordinal);
                    }
                    local.push(admission.ordinal);
                }
                seen.lock().extend(local);
            });
        }
    });

    let elapsed_ms = start.elapsed().as_millis() as u64;
    let mut seen = seen.into_inner();
    seen.sort_unstable();
    let total = seen.len();
    seen.dedup();
    let unique_ordinals = seen.len() == total;
    let dense_ordinals = seen.iter().copied().eq(1..=total as u64);

    let mut injected = injected.into_inner();
    injected.sort_unstable();

    Ok(StressReport {
        threads,
        calls_per_thread,
        total_calls: gate.calls(),
        fail_after: policy.fail_after(),
        unique_ordinals,
        dense_ordinals,
        injected,
        elapsed_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_one_injection_under_contention() {
        let report = run_stress(FaultPolicy::fail_at(1234), 8, 500).unwrap();
        assert_eq!(report.total_calls, 4000);
        assert!(report.unique_ordinals);
        assert!(report.dense_ordinals);
        assert_eq!(report.injected, vec![1234]);
        assert!(report.passed());
    }

    #[test]
    fn ordinal_beyond_total_is_never_reached() {
        let report = run_stress(FaultPolicy::fail_at(10_000), 4, 10).unwrap();
        assert!(report.injected.is_empty());
        assert!(report.passed());
    }

    #[test]
    fn disabled_policy_injects_nothing() {
        let report = run_stress(FaultPolicy::disabled(), 2, 50).unwrap();
        assert!(report.injected.is_empty());
        assert!(report.passed());
    }

    #[test]
    fn zero_threads_is_rejected() {
        assert!(matches!(
            run_stress(FaultPolicy::default(), 0, 10),
            Err(HarnessError::InvalidArgument(_))
        ));
    }
}
