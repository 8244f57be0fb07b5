//! Exported symbols: the interposed `realloc` plus introspection entry points.

use std::ffi::c_void;

use crate::state::{PROCESS_HOOKS, ShimState};

static SHIM: ShimState = ShimState::new();

/// POSIX `realloc`, with one deterministic injected failure.
///
/// Forwards `(ptr, size)` unchanged to the next `realloc` in load order except
/// on the call whose 1-based ordinal equals `FAIL_REALLOC_AFTER`, which returns
/// null and leaves `ptr` owned by the caller.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
    // SAFETY: caller upholds the realloc(3) contract; forwarded verbatim.
    unsafe { SHIM.intercept(&PROCESS_HOOKS, ptr, size) }
}

/// Number of `realloc` calls counted so far in this process.
#[unsafe(no_mangle)]
pub extern "C" fn __failrealloc_call_count() -> u64 {
    SHIM.calls()
}

/// Resolved fail-after ordinal (`0` when injection is disabled).
///
/// Resolves the policy if no `realloc` has been intercepted yet.
#[unsafe(no_mangle)]
pub extern "C" fn __failrealloc_fail_after() -> u64 {
    SHIM.resolve(&PROCESS_HOOKS).policy.fail_after()
}
