//! Resolution of the real `realloc`.

use std::ffi::c_void;

/// Signature of `realloc(3)`.
pub(crate) type ReallocFn = unsafe extern "C" fn(*mut c_void, usize) -> *mut c_void;

unsafe extern "C" {
    // glibc's internal entry point. Never interposed, so it is safe to call
    // while the shim is still resolving its own dependencies.
    #[link_name = "__libc_realloc"]
    fn native_libc_realloc_sym(ptr: *mut c_void, size: usize) -> *mut c_void;
}

/// Direct call into glibc's allocator, bypassing symbol interposition.
pub(crate) unsafe extern "C" fn bootstrap_realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
    // SAFETY: same contract as realloc(3); forwarded verbatim.
    unsafe { native_libc_realloc_sym(ptr, size) }
}

/// The next `realloc` after this object in load order.
///
/// Falls back to [`bootstrap_realloc`] when the loader knows no later
/// definition.
pub(crate) fn next_realloc() -> ReallocFn {
    // SAFETY: RTLD_NEXT lookup of a NUL-terminated symbol name.
    let sym = unsafe { libc::dlsym(libc::RTLD_NEXT, c"realloc".as_ptr()) };
    if sym.is_null() {
        return bootstrap_realloc;
    }
    // SAFETY: the symbol named `realloc` has the realloc(3) signature.
    unsafe { std::mem::transmute::<*mut c_void, ReallocFn>(sym) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_realloc_grows_and_preserves_contents() {
        let real = next_realloc();
        unsafe {
            let p = libc::malloc(4) as *mut u8;
            assert!(!p.is_null());
            std::ptr::copy_nonoverlapping(b"abc\0".as_ptr(), p, 4);
            let q = real(p.cast(), 64) as *mut u8;
            assert!(!q.is_null());
            assert_eq!(std::slice::from_raw_parts(q, 4), b"abc\0");
            libc::free(q.cast());
        }
    }

    #[test]
    fn bootstrap_realloc_behaves_like_malloc_for_null() {
        unsafe {
            let p = bootstrap_realloc(std::ptr::null_mut(), 32);
            assert!(!p.is_null());
            libc::free(p);
        }
    }
}
