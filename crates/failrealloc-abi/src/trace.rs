//! Injected-failure diagnostics.
//!
//! Written with a single `write(2)` from a stack buffer: the shim runs inside
//! the allocator and must not allocate while reporting.

use failrealloc_core::decimal::{U64_DECIMAL_MAX, render_u64};

const PREFIX: &[u8] = b"failrealloc: injected realloc failure at call #";
const SIZE_LABEL: &[u8] = b" (size ";
const SUFFIX: &[u8] = b")\n";

pub(crate) const LINE_CAPACITY: usize =
    PREFIX.len() + SIZE_LABEL.len() + SUFFIX.len() + 2 * U64_DECIMAL_MAX;

fn push(buf: &mut [u8; LINE_CAPACITY], len: &mut usize, bytes: &[u8]) {
    buf[*len..*len + bytes.len()].copy_from_slice(bytes);
    *len += bytes.len();
}

/// Compose the diagnostic line for an injected failure.
pub(crate) fn compose_line(ordinal: u64, size: usize, buf: &mut [u8; LINE_CAPACITY]) -> usize {
    let mut digits = [0u8; U64_DECIMAL_MAX];
    let mut len = 0;
    push(buf, &mut len, PREFIX);
    push(buf, &mut len, render_u64(ordinal, &mut digits));
    push(buf, &mut len, SIZE_LABEL);
    push(buf, &mut len, render_u64(size as u64, &mut digits));
    push(buf, &mut len, SUFFIX);
    len
}

/// Report an injected failure on stderr. Short writes are not retried.
pub(crate) fn report_injection(ordinal: u64, size: usize) {
    let mut buf = [0u8; LINE_CAPACITY];
    let len = compose_line(ordinal, size, &mut buf);
    // SAFETY: `buf[..len]` is initialized; fd 2 may be closed, in which case
    // write fails harmlessly.
    let _ = unsafe { libc::write(libc::STDERR_FILENO, buf.as_ptr().cast(), len) };
}
