//! Allocator seam.
//!
//! Process-wide interposition needs the shim preloaded ahead of libc. Where
//! that is not available (unit tests, the harness `seam` command) the subjects
//! take their allocator as a parameter instead, and these wrappers stand in
//! for the shim and for an external leak detector.

use std::collections::HashMap;
use std::ffi::c_void;

use failrealloc_core::{FaultGate, FaultPolicy};
use parking_lot::Mutex;

/// The three C allocation primitives the subjects use.
///
/// # Safety
///
/// Implementations must honour the C contracts: `realloc` returns null and
/// leaves `ptr` allocated on failure, and `free` accepts null.
pub unsafe trait Heap {
    unsafe fn malloc(&self, size: usize) -> *mut c_void;
    unsafe fn realloc(&self, ptr: *mut c_void, size: usize) -> *mut c_void;
    unsafe fn free(&self, ptr: *mut c_void);

    /// `realloc` that also says what became of `ptr` when the result is null.
    ///
    /// The default follows glibc: `realloc(p, 0)` frees `p` and returns null.
    /// Wrappers that fail calls without reaching the allocator override this.
    unsafe fn resize(&self, ptr: *mut c_void, size: usize) -> Resize {
        let q = unsafe { self.realloc(ptr, size) };
        if !q.is_null() {
            Resize::Moved(q)
        } else if size == 0 && !ptr.is_null() {
            Resize::Released
        } else {
            Resize::Failed
        }
    }
}

/// Outcome of [`Heap::resize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resize {
    /// `ptr` now lives at this address (possibly unchanged).
    Moved(*mut c_void),
    /// Null returned; `ptr` is still allocated and owned by the caller.
    Failed,
    /// Null returned because a zero-size request freed `ptr`.
    Released,
}

impl Resize {
    /// The pointer `realloc` would have returned.
    #[must_use]
    pub fn as_ptr(self) -> *mut c_void {
        match self {
            Self::Moved(q) => q,
            Self::Failed | Self::Released => std::ptr::null_mut(),
        }
    }
}

unsafe impl<H: Heap + ?Sized> Heap for &H {
    unsafe fn malloc(&self, size: usize) -> *mut c_void {
        unsafe { (**self).malloc(size) }
    }

    unsafe fn realloc(&self, ptr: *mut c_void, size: usize) -> *mut c_void {
        unsafe { (**self).realloc(ptr, size) }
    }

    unsafe fn free(&self, ptr: *mut c_void) {
        unsafe { (**self).free(ptr) }
    }

    unsafe fn resize(&self, ptr: *mut c_void, size: usize) -> Resize {
        unsafe { (**self).resize(ptr, size) }
    }
}

/// The process allocator, called through its exported symbols.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibcHeap;

unsafe impl Heap for LibcHeap {
    #[inline]
    unsafe fn malloc(&self, size: usize) -> *mut c_void {
        unsafe { libc::malloc(size) }
    }

    #[inline]
    unsafe fn realloc(&self, ptr: *mut c_void, size: usize) -> *mut c_void {
        unsafe { libc::realloc(ptr, size) }
    }

    #[inline]
    unsafe fn free(&self, ptr: *mut c_void) {
        unsafe { libc::free(ptr) }
    }
}

/// In-process equivalent of the preloaded shim: counts `realloc` calls on its
/// own [`FaultGate`] and fails the configured one.
#[derive(Debug)]
pub struct FaultInjectingHeap<H> {
    inner: H,
    gate: FaultGate,
}

impl<H: Heap> FaultInjectingHeap<H> {
    pub fn new(inner: H, policy: FaultPolicy) -> Self {
        Self {
            inner,
            gate: FaultGate::new(policy),
        }
    }

    pub fn gate(&self) -> &FaultGate {
        &self.gate
    }
}

unsafe impl<H: Heap> Heap for FaultInjectingHeap<H> {
    unsafe fn malloc(&self, size: usize) -> *mut c_void {
        unsafe { self.inner.malloc(size) }
    }

    unsafe fn realloc(&self, ptr: *mut c_void, size: usize) -> *mut c_void {
        unsafe { self.resize(ptr, size) }.as_ptr()
    }

    unsafe fn free(&self, ptr: *mut c_void) {
        unsafe { self.inner.free(ptr) }
    }

    unsafe fn resize(&self, ptr: *mut c_void, size: usize) -> Resize {
        if self.gate.admit().injects_failure() {
            // The inner allocator never sees the call, even for size 0.
            return Resize::Failed;
        }
        unsafe { self.inner.resize(ptr, size) }
    }
}

/// Leak ledger: remembers every live block handed out by the inner heap.
///
/// Blocks whose last pointer was dropped by the caller stay in the ledger, so
/// a pointer-loss bug shows up as an outstanding allocation and can still be
/// reclaimed with [`TrackingHeap::release_outstanding`].
#[derive(Debug)]
pub struct TrackingHeap<H> {
    inner: H,
    live: Mutex<HashMap<usize, usize>>,
}

impl<H: Heap> TrackingHeap<H> {
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            live: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }

    /// Number of blocks not yet freed.
    pub fn outstanding(&self) -> usize {
        self.live.lock().len()
    }

    /// Total requested size of the blocks not yet freed.
    pub fn leaked_bytes(&self) -> usize {
        self.live.lock().values().sum()
    }

    /// Live blocks as `(address, size)`, sorted by address.
    pub fn live_blocks(&self) -> Vec<(usize, usize)> {
        let mut blocks: Vec<_> = self.live.lock().iter().map(|(&a, &s)| (a, s)).collect();
        blocks.sort_unstable();
        blocks
    }

    /// Free every outstanding block and return how many there were.
    pub fn release_outstanding(&self) -> usize {
        let drained: Vec<usize> = self.live.lock().drain().map(|(addr, _)| addr).collect();
        for &addr in &drained {
            // SAFETY: every ledger entry came from `inner` and was not freed.
            unsafe { self.inner.free(addr as *mut c_void) };
        }
        drained.len()
    }
}

unsafe impl<H: Heap> Heap for TrackingHeap<H> {
    unsafe fn malloc(&self, size: usize) -> *mut c_void {
        let p = unsafe { self.inner.malloc(size) };
        if !p.is_null() {
            self.live.lock().insert(p as usize, size);
        }
        p
    }

    unsafe fn realloc(&self, ptr: *mut c_void, size: usize) -> *mut c_void {
        unsafe { self.resize(ptr, size) }.as_ptr()
    }

    unsafe fn free(&self, ptr: *mut c_void) {
        if !ptr.is_null() {
            self.live.lock().remove(&(ptr as usize));
        }
        unsafe { self.inner.free(ptr) }
    }

    unsafe fn resize(&self, ptr: *mut c_void, size: usize) -> Resize {
        let outcome = unsafe { self.inner.resize(ptr, size) };
        let mut live = self.live.lock();
        match outcome {
            Resize::Moved(q) => {
                if !ptr.is_null() {
                    live.remove(&(ptr as usize));
                }
                live.insert(q as usize, size);
            }
            Resize::Released => {
                live.remove(&(ptr as usize));
            }
            Resize::Failed => {}
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracking_follows_moves_and_frees() {
        let heap = TrackingHeap::new(LibcHeap);
        unsafe {
            let p = heap.malloc(8);
            assert_eq!(heap.outstanding(), 1);
            assert_eq!(heap.leaked_bytes(), 8);

            let q = heap.realloc(p, 4096);
            assert!(!q.is_null());
            assert_eq!(heap.outstanding(), 1);
            assert_eq!(heap.leaked_bytes(), 4096);

            heap.free(q);
        }
        assert_eq!(heap.outstanding(), 0);
        assert_eq!(heap.leaked_bytes(), 0);
    }

    #[test]
    fn failed_realloc_keeps_block_live() {
        let heap = TrackingHeap::new(FaultInjectingHeap::new(LibcHeap, FaultPolicy::fail_at(1)));
        unsafe {
            let p = heap.malloc(2);
            let q = heap.realloc(p, 3);
            assert!(q.is_null());
            assert_eq!(heap.live_blocks(), vec![(p as usize, 2)]);
            heap.free(p);
        }
        assert_eq!(heap.outstanding(), 0);
    }

    #[test]
    fn zero_size_realloc_releases_block() {
        let heap = TrackingHeap::new(LibcHeap);
        unsafe {
            let p = heap.malloc(8);
            match heap.resize(p, 0) {
                // glibc frees on a zero-size request; other libcs may hand
                // back a minimal block instead.
                Resize::Released => {}
                Resize::Moved(q) => heap.free(q),
                Resize::Failed => panic!("zero-size realloc failed without injection"),
            }
        }
        assert_eq!(heap.outstanding(), 0);
    }

    #[test]
    fn injected_zero_size_realloc_keeps_block_live() {
        let heap = TrackingHeap::new(FaultInjectingHeap::new(LibcHeap, FaultPolicy::fail_at(1)));
        unsafe {
            let p = heap.malloc(8);
            assert!(heap.realloc(p, 0).is_null());
            // The failed call never freed `p`, so it still counts as live.
            assert_eq!(heap.live_blocks(), vec![(p as usize, 8)]);
            heap.free(p);
        }
        assert_eq!(heap.outstanding(), 0);
    }

    #[test]
    fn injector_counts_only_realloc() {
        let heap = FaultInjectingHeap::new(LibcHeap, FaultPolicy::fail_at(2));
        unsafe {
            let p = heap.malloc(4);
            let p = heap.realloc(p, 8);
            assert!(!p.is_null());
            assert!(heap.realloc(p, 16).is_null());
            let p = heap.realloc(p, 16);
            assert!(!p.is_null());
            heap.free(p);
        }
        assert_eq!(heap.gate().calls(), 3);
    }

    #[test]
    fn release_outstanding_reclaims_lost_blocks() {
        let heap = TrackingHeap::new(LibcHeap);
        unsafe {
            let _lost = heap.malloc(16);
            let _also_lost = heap.malloc(32);
        }
        assert_eq!(heap.release_outstanding(), 2);
        assert_eq!(heap.outstanding(), 0);
    }
}
