//! Allocation-free decimal rendering.
//!
//! Diagnostics emitted from inside `realloc` cannot go through `format!`, which
//! may itself reallocate.

/// Longest decimal rendering of a `u64`.
pub const U64_DECIMAL_MAX: usize = 20;

/// Render `value` into the tail of `buf` and return the written digits.
#[must_use]
pub fn render_u64(value: u64, buf: &mut [u8; U64_DECIMAL_MAX]) -> &[u8] {
    let mut pos = U64_DECIMAL_MAX;
    let mut rest = value;
    loop {
        pos -= 1;
        buf[pos] = b'0' + (rest % 10) as u8;
        rest /= 10;
        if rest == 0 {
            break;
        }
    }
    &buf[pos..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_edge_values() {
        let mut buf = [0u8; U64_DECIMAL_MAX];
        assert_eq!(render_u64(0, &mut buf), b"0");
        assert_eq!(render_u64(7, &mut buf), b"7");
        assert_eq!(render_u64(1234567890, &mut buf), b"1234567890");
        assert_eq!(
            render_u64(u64::MAX, &mut buf),
            u64::MAX.to_string().as_bytes()
        );
    }
}
