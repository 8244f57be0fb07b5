//! # failrealloc-core
//!
//! Safe building blocks shared by the `realloc` interposition shim and the
//! in-process allocator seam:
//!
//! - [`policy`]: resolves the fail-after ordinal from `FAIL_REALLOC_AFTER`.
//! - [`counter`]: the process-wide invocation counter.
//! - [`gate`]: combines both into a per-call [`Verdict`].
//! - [`decimal`]: allocation-free integer rendering for diagnostics written
//!   from inside the allocator.
//!
//! No `unsafe` code is permitted at the crate level.

#![deny(unsafe_code)]

pub mod counter;
pub mod decimal;
pub mod gate;
pub mod policy;

pub use counter::InvocationCounter;
pub use gate::{Admission, FaultGate, Verdict};
pub use policy::{DEFAULT_FAIL_AFTER, FAIL_AFTER_ENV, FaultPolicy, TRACE_ENV};
