//! Process-wide shim state.
//!
//! One bundle holds everything the interposed `realloc` needs: the invocation
//! counter, the resolved fault policy and the real `realloc`. Resolution runs
//! once through an atomic state machine (UNINIT -> RESOLVING -> READY) instead
//! of `OnceLock`, whose futex wait would deadlock if the loader re-entered
//! `realloc` on the resolving thread.

use std::cell::Cell;
use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, AtomicUsize, Ordering};

use failrealloc_core::{FaultPolicy, InvocationCounter, Verdict};

use crate::symbols::{self, ReallocFn};
use crate::{env, trace};

const STATE_UNINIT: u8 = 0;
const STATE_RESOLVING: u8 = 1;
const STATE_READY: u8 = 2;

/// Real primitive and policy, as resolved on first use.
#[derive(Clone, Copy)]
pub(crate) struct Resolved {
    pub(crate) real: ReallocFn,
    pub(crate) policy: FaultPolicy,
}

/// Platform seams used by [`ShimState::intercept`].
pub(crate) struct Hooks {
    /// Resolve the next `realloc` and the fault policy.
    pub(crate) lookup: fn() -> Resolved,
    /// Allocator for calls made while this thread is inside `lookup`.
    pub(crate) bootstrap: ReallocFn,
    /// Invoked for each injected failure when tracing is enabled.
    pub(crate) report: fn(u64, usize),
}

fn resolve_from_process() -> Resolved {
    Resolved {
        real: symbols::next_realloc(),
        policy: env::policy_from_process_env(),
    }
}

/// Hooks bound to the running process: `dlsym(RTLD_NEXT)`, `getenv`,
/// `__libc_realloc` and stderr diagnostics.
pub(crate) static PROCESS_HOOKS: Hooks = Hooks {
    lookup: resolve_from_process,
    bootstrap: symbols::bootstrap_realloc,
    report: trace::report_injection,
};

thread_local! {
    static RESOLVING_ON_THIS_THREAD: Cell<bool> = const { Cell::new(false) };
}

struct ResolutionGuard;

impl ResolutionGuard {
    fn enter() -> Self {
        RESOLVING_ON_THIS_THREAD.with(|flag| flag.set(true));
        Self
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLVING_ON_THIS_THREAD.with(|flag| flag.set(false));
    }
}

#[inline]
fn resolving_on_this_thread() -> bool {
    RESOLVING_ON_THIS_THREAD.with(Cell::get)
}

pub(crate) struct ShimState {
    state: AtomicU8,
    real: AtomicUsize,
    fail_after: AtomicU64,
    trace: AtomicBool,
    counter: InvocationCounter,
}

impl ShimState {
    pub(crate) const fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_UNINIT),
            real: AtomicUsize::new(0),
            fail_after: AtomicU64::new(0),
            trace: AtomicBool::new(false),
            counter: InvocationCounter::new(),
        }
    }

    /// Published resolution, if any.
    pub(crate) fn peek(&self) -> Option<Resolved> {
        if self.state.load(Ordering::Acquire) != STATE_READY {
            return None;
        }
        let real = self.real.load(Ordering::Relaxed);
        // SAFETY: READY is only stored after `real` holds a valid ReallocFn.
        let real = unsafe { std::mem::transmute::<usize, ReallocFn>(real) };
        let policy = FaultPolicy::fail_at(self.fail_after.load(Ordering::Relaxed))
            .with_trace(self.trace.load(Ordering::Relaxed));
        Some(Resolved { real, policy })
    }

    fn lookup_guarded(hooks: &Hooks) -> Resolved {
        let _guard = ResolutionGuard::enter();
        (hooks.lookup)()
    }

    /// Resolve once and cache.
    ///
    /// A thread that loses the publication race while the winner is still
    /// resolving performs its own lookup. Lookups are deterministic, so the
    /// redundant result is identical to the published one.
    pub(crate) fn resolve(&self, hooks: &Hooks) -> Resolved {
        if let Some(resolved) = self.peek() {
            return resolved;
        }

        if self
            .state
            .compare_exchange(
                STATE_UNINIT,
                STATE_RESOLVING,
                Ordering::SeqCst,
                Ordering::Relaxed,
            )
            .is_err()
        {
            return self
                .peek()
                .unwrap_or_else(|| Self::lookup_guarded(hooks));
        }

        let resolved = Self::lookup_guarded(hooks);
        self.real.store(resolved.real as usize, Ordering::Relaxed);
        self.fail_after
            .store(resolved.policy.fail_after(), Ordering::Relaxed);
        self.trace
            .store(resolved.policy.trace_enabled(), Ordering::Relaxed);
        self.state.store(STATE_READY, Ordering::Release);
        resolved
    }

    /// Number of counted calls so far.
    pub(crate) fn calls(&self) -> u64 {
        self.counter.observed()
    }

    /// The interposed `realloc`.
    ///
    /// Calls arriving on a thread that is inside `hooks.lookup` go straight to
    /// `hooks.bootstrap` and are not counted.
    pub(crate) unsafe fn intercept(
        &self,
        hooks: &Hooks,
        ptr: *mut c_void,
        size: usize,
    ) -> *mut c_void {
        if resolving_on_this_thread() {
            // SAFETY: realloc(3) contract forwarded verbatim.
            return unsafe { (hooks.bootstrap)(ptr, size) };
        }

        let resolved = self.resolve(hooks);
        let ordinal = self.counter.next();
        match resolved.policy.verdict(ordinal) {
            Verdict::InjectFailure => {
                if resolved.policy.trace_enabled() {
                    (hooks.report)(ordinal, size);
                }
                std::ptr::null_mut()
            }
            // SAFETY: realloc(3) contract forwarded verbatim.
            Verdict::Forward => unsafe { (resolved.real)(ptr, size) },
        }
    }
}
