//! Per-call injection decision.

use crate::counter::InvocationCounter;
use crate::policy::FaultPolicy;

/// What to do with an intercepted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// Hand the call to the real primitive unchanged.
    Forward,
    /// Return null without touching the caller's allocation.
    InjectFailure,
}

/// Ordinal assigned to a call together with its verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub ordinal: u64,
    pub verdict: Verdict,
}

impl Admission {
    #[must_use]
    pub const fn injects_failure(self) -> bool {
        matches!(self.verdict, Verdict::InjectFailure)
    }
}

/// A policy bound to its own counter.
///
/// Used where the policy is known up front (the in-process allocator seam,
/// benches, the stress command). The preloaded shim resolves its policy lazily
/// and combines [`InvocationCounter`] and [`FaultPolicy`] itself.
#[derive(Debug, Default)]
pub struct FaultGate {
    policy: FaultPolicy,
    counter: InvocationCounter,
}

impl FaultGate {
    #[must_use]
    pub const fn new(policy: FaultPolicy) -> Self {
        Self {
            policy,
            counter: InvocationCounter::new(),
        }
    }

    /// Count one call and decide its verdict.
    #[inline]
    pub fn admit(&self) -> Admission {
        let ordinal = self.counter.next();
        Admission {
            ordinal,
            verdict: self.policy.verdict(ordinal),
        }
    }

    #[must_use]
    pub const fn policy(&self) -> FaultPolicy {
        self.policy
    }

    #[must_use]
    pub fn calls(&self) -> u64 {
        self.counter.observed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_call_fails_by_default() {
        let gate = FaultGate::default();
        let verdicts: Vec<Verdict> = (0..4).map(|_| gate.admit().verdict).collect();
        assert_eq!(
            verdicts,
            vec![
                Verdict::Forward,
                Verdict::InjectFailure,
                Verdict::Forward,
                Verdict::Forward
            ]
        );
        assert_eq!(gate.calls(), 4);
    }

    #[test]
    fn identical_configuration_gives_identical_sequence() {
        let run = |ordinal| {
            let gate = FaultGate::new(FaultPolicy::fail_at(ordinal));
            (0..16).map(|_| gate.admit()).collect::<Vec<_>>()
        };
        assert_eq!(run(5), run(5));
        assert_eq!(run(0), run(0));
    }

    #[test]
    fn exactly_one_failure_under_contention() {
        let gate = std::sync::Arc::new(FaultGate::new(FaultPolicy::fail_at(777)));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gate = std::sync::Arc::clone(&gate);
                std::thread::spawn(move || {
                    (0..500)
                        .map(|_| gate.admit())
                        .filter(|a| a.injects_failure())
                        .map(|a| a.ordinal)
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let failures: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(failures, vec![777]);
    }
}
