//! Process-wide invocation counter.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic 1-based call counter.
///
/// Each call to [`InvocationCounter::next`] is a single fetch-and-add, so
/// concurrent callers always receive distinct, gap-free ordinals.
#[derive(Debug, Default)]
pub struct InvocationCounter {
    calls: AtomicU64,
}

impl InvocationCounter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            calls: AtomicU64::new(0),
        }
    }

    /// Claim the next ordinal. The first call in the process gets `1`.
    #[inline]
    pub fn next(&self) -> u64 {
        self.calls.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Number of ordinals handed out so far.
    #[must_use]
    pub fn observed(&self) -> u64 {
        self.calls.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn ordinals_start_at_one() {
        let counter = InvocationCounter::new();
        assert_eq!(counter.observed(), 0);
        assert_eq!(counter.next(), 1);
        assert_eq!(counter.next(), 2);
        assert_eq!(counter.observed(), 2);
    }

    #[test]
    fn concurrent_ordinals_are_unique_and_dense() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 2_000;

        let counter = Arc::new(InvocationCounter::new());
        let seen = Arc::new(parking_lot::Mutex::new(Vec::with_capacity(
            THREADS * PER_THREAD,
        )));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let counter = Arc::clone(&counter);
                let seen = Arc::clone(&seen);
                std::thread::spawn(move || {
                    let local: Vec<u64> = (0..PER_THREAD).map(|_| counter.next()).collect();
                    seen.lock().extend(local);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut seen = seen.lock().clone();
        seen.sort_unstable();
        let expected: Vec<u64> = (1..=(THREADS * PER_THREAD) as u64).collect();
        assert_eq!(seen, expected);
        assert_eq!(counter.observed(), (THREADS * PER_THREAD) as u64);
    }
}
