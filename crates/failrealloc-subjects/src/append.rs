//! `append_str`: allocate `base`, then grow the buffer to hold `add`.
//!
//! Both variants return a NUL-terminated heap string owned by the caller
//! (release it with the same [`Heap`]'s `free`), or null when an allocation
//! fails.

use std::ffi::{CStr, c_char};
use std::fmt;
use std::ptr::NonNull;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::heap::Heap;

/// Pointer-loss variant: `buf = realloc(buf, ..)` without a temporary.
///
/// When the growth call fails the only reference to the `base` copy is
/// overwritten with null, so that block leaks.
pub fn append_str_buggy<H: Heap>(heap: &H, base: &CStr, add: &CStr) -> *mut c_char {
    let base = base.to_bytes_with_nul();
    let add = add.to_bytes_with_nul();
    let a = base.len() - 1;

    // SAFETY: sizes cover the copied bytes; pointers come from `heap`.
    unsafe {
        let mut buf = heap.malloc(a + 1) as *mut u8;
        if buf.is_null() {
            return std::ptr::null_mut();
        }
        std::ptr::copy_nonoverlapping(base.as_ptr(), buf, a + 1);

        buf = heap.realloc(buf.cast(), a + add.len()) as *mut u8;
        if buf.is_null() {
            return std::ptr::null_mut();
        }

        std::ptr::copy_nonoverlapping(add.as_ptr(), buf.add(a), add.len());
        buf.cast()
    }
}

/// Temporary-pointer variant: the growth result is checked before it replaces
/// `buf`, and the original block is freed on failure.
pub fn append_str_fixed<H: Heap>(heap: &H, base: &CStr, add: &CStr) -> *mut c_char {
    let base = base.to_bytes_with_nul();
    let add = add.to_bytes_with_nul();
    let a = base.len() - 1;

    // SAFETY: sizes cover the copied bytes; pointers come from `heap`.
    unsafe {
        let buf = heap.malloc(a + 1) as *mut u8;
        if buf.is_null() {
            return std::ptr::null_mut();
        }
        std::ptr::copy_nonoverlapping(base.as_ptr(), buf, a + 1);

        let tmp = heap.realloc(buf.cast(), a + add.len()) as *mut u8;
        if tmp.is_null() {
            heap.free(buf.cast());
            return std::ptr::null_mut();
        }
        let buf = tmp;

        std::ptr::copy_nonoverlapping(add.as_ptr(), buf.add(a), add.len());
        buf.cast()
    }
}

/// Which `append_str` implementation to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    Fixed,
    Buggy,
}

impl Subject {
    pub const ALL: [Subject; 2] = [Subject::Fixed, Subject::Buggy];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Buggy => "buggy",
        }
    }

    /// Run this implementation against `heap`.
    pub fn append<H: Heap>(self, heap: &H, base: &CStr, add: &CStr) -> *mut c_char {
        match self {
            Self::Fixed => append_str_fixed(heap, base, add),
            Self::Buggy => append_str_buggy(heap, base, add),
        }
    }

    /// Like [`Subject::append`], with the result owned and freed on drop.
    /// `None` means the subject returned null.
    pub fn append_owned<'h, H: Heap>(
        self,
        heap: &'h H,
        base: &CStr,
        add: &CStr,
    ) -> Option<HeapCString<'h, H>> {
        NonNull::new(self.append(heap, base, add)).map(|ptr| HeapCString { heap, ptr })
    }
}

/// A subject's result string, freed through its heap on drop.
pub struct HeapCString<'h, H: Heap> {
    heap: &'h H,
    ptr: NonNull<c_char>,
}

impl<H: Heap> HeapCString<'_, H> {
    #[must_use]
    pub fn as_c_str(&self) -> &CStr {
        // SAFETY: subjects only return NUL-terminated strings they built.
        unsafe { CStr::from_ptr(self.ptr.as_ptr()) }
    }

    /// Give up ownership; the caller must free the pointer with the same heap.
    #[must_use]
    pub fn into_raw(self) -> *mut c_char {
        let ptr = self.ptr.as_ptr();
        std::mem::forget(self);
        ptr
    }
}

impl<H: Heap> Drop for HeapCString<'_, H> {
    fn drop(&mut self) {
        // SAFETY: the pointer came from `heap` and is freed exactly once.
        unsafe { self.heap.free(self.ptr.as_ptr().cast()) }
    }
}

impl<H: Heap> fmt::Debug for HeapCString<'_, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HeapCString").field(&self.as_c_str()).finish()
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown subject '{0}' (expected 'fixed' or 'buggy')")]
pub struct UnknownSubject(pub String);

impl FromStr for Subject {
    type Err = UnknownSubject;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" | "safe" | "tmp" => Ok(Self::Fixed),
            "buggy" | "unsafe" | "direct" => Ok(Self::Buggy),
            _ => Err(UnknownSubject(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::LibcHeap;

    fn owned(heap: &LibcHeap, p: *mut c_char) -> Option<Vec<u8>> {
        if p.is_null() {
            return None;
        }
        // SAFETY: subjects return NUL-terminated strings from `heap`.
        unsafe {
            let bytes = CStr::from_ptr(p).to_bytes().to_vec();
            heap.free(p.cast());
            Some(bytes)
        }
    }

    #[test]
    fn both_subjects_concatenate() {
        for subject in Subject::ALL {
            let out = subject.append(&LibcHeap, c"hello", c"world");
            assert_eq!(owned(&LibcHeap, out).as_deref(), Some(&b"helloworld"[..]));
        }
    }

    #[test]
    fn empty_operands() {
        for subject in Subject::ALL {
            let out = subject.append(&LibcHeap, c"", c"");
            assert_eq!(owned(&LibcHeap, out).as_deref(), Some(&b""[..]));
            let out = subject.append(&LibcHeap, c"", c"xy");
            assert_eq!(owned(&LibcHeap, out).as_deref(), Some(&b"xy"[..]));
        }
    }

    #[test]
    fn owned_result_frees_on_drop() {
        let heap = crate::heap::TrackingHeap::new(LibcHeap);
        {
            let out = Subject::Fixed
                .append_owned(&heap, c"ab", c"cd")
                .expect("no injected failure");
            assert_eq!(out.as_c_str(), c"abcd");
            assert_eq!(heap.outstanding(), 1);
        }
        assert_eq!(heap.outstanding(), 0);
    }

    #[test]
    fn subject_names_parse() {
        assert_eq!("fixed".parse::<Subject>(), Ok(Subject::Fixed));
        assert_eq!("BUGGY".parse::<Subject>(), Ok(Subject::Buggy));
        assert!("other".parse::<Subject>().is_err());
        for subject in Subject::ALL {
            assert_eq!(subject.to_string().parse::<Subject>(), Ok(subject));
        }
    }
}
