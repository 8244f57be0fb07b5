//! # failrealloc-subjects
//!
//! Code under test for the `realloc` fault-injection shim.
//!
//! - [`append`]: two `append_str` implementations. One overwrites its only
//!   buffer pointer with the unchecked `realloc` result; the other grows
//!   through a temporary and frees the original on failure.
//! - [`heap`]: the allocator seam. [`heap::LibcHeap`] goes through the process
//!   `malloc`/`realloc`/`free` symbols, so a preloaded shim sees every call.
//!   [`heap::FaultInjectingHeap`] and [`heap::TrackingHeap`] reproduce the
//!   shim and a leak detector in-process.

pub mod append;
pub mod heap;

pub use append::{HeapCString, Subject, UnknownSubject};
pub use heap::{FaultInjectingHeap, Heap, LibcHeap, Resize, TrackingHeap};
