//! Fault policy read straight from the C environment.
//!
//! `getenv` hands back a pointer into `environ` without allocating, which keeps
//! policy resolution from re-entering the allocator.

use std::ffi::{CStr, c_char};

use failrealloc_core::FaultPolicy;

const FAIL_AFTER_ENV_C: &CStr = c"FAIL_REALLOC_AFTER";
const TRACE_ENV_C: &CStr = c"FAIL_REALLOC_TRACE";

fn getenv_bytes(name: &CStr) -> Option<&'static [u8]> {
    // SAFETY: `name` is NUL-terminated; getenv returns null or a pointer into
    // the process environment block.
    let raw: *const c_char = unsafe { libc::getenv(name.as_ptr()) };
    if raw.is_null() {
        return None;
    }
    // SAFETY: non-null getenv results are NUL-terminated C strings. The
    // environment is not mutated once the shim has resolved.
    Some(unsafe { CStr::from_ptr(raw) }.to_bytes())
}

/// Resolve the policy from `FAIL_REALLOC_AFTER` / `FAIL_REALLOC_TRACE`.
pub(crate) fn policy_from_process_env() -> FaultPolicy {
    FaultPolicy::from_env_values(getenv_bytes(FAIL_AFTER_ENV_C), getenv_bytes(TRACE_ENV_C))
}

#[cfg(test)]
mod tests {
    use super::*;
    use failrealloc_core::{FAIL_AFTER_ENV, TRACE_ENV};

    #[test]
    fn c_names_match_core_names() {
        assert_eq!(FAIL_AFTER_ENV_C.to_bytes(), FAIL_AFTER_ENV.as_bytes());
        assert_eq!(TRACE_ENV_C.to_bytes(), TRACE_ENV.as_bytes());
    }

    #[test]
    fn unset_variable_reads_as_none() {
        assert!(getenv_bytes(c"FAILREALLOC_SURELY_UNSET_VARIABLE").is_none());
    }

    #[test]
    fn reads_present_variable() {
        // PATH is present in every test environment.
        assert!(getenv_bytes(c"PATH").is_some_and(|v| !v.is_empty()));
    }
}
