// Exported symbols take raw pointers straight from C callers and mirror the
// libc contract, so per-function safety docs would only restate realloc(3).
#![allow(clippy::missing_safety_doc)]
//! # failrealloc-abi
//!
//! `LD_PRELOAD`-able shared object that interposes `realloc` for a whole
//! process and fails one chosen call.
//!
//! ```text
//! caller -> realloc (this crate) -> ShimState::intercept -> next realloc | null
//! ```
//!
//! The first intercepted call resolves the next `realloc` in symbol order and
//! the fault policy (`FAIL_REALLOC_AFTER`, `FAIL_REALLOC_TRACE`). Every call is
//! then counted; the call whose ordinal equals the policy returns null without
//! touching the caller's allocation.
//!
//! ```sh
//! FAIL_REALLOC_AFTER=1 LD_PRELOAD=target/release/libfailrealloc_abi.so ./append-check fixed --oom-only
//! ```

mod env;
mod state;
mod symbols;
mod trace;

// The exported `realloc` would replace the allocator of the unit-test binary
// itself, so it only exists in non-test builds.
#[cfg(not(test))]
pub mod realloc_abi;
