//! Fixed-width digit helpers
//!
//! Position 0 is always the most-significant digit of a zero-padded number.

/// Widest display whose every value fits in a `u64`
pub const MAX_DIGITS: usize = 19;

/// Smallest value that does NOT fit in `width` digits (`10^width`)
pub fn capacity(width: usize) -> u64 {
    10u64.pow(width.min(MAX_DIGITS) as u32)
}

/// Does `value` fit in `width` zero-padded digits?
pub fn fits(value: u64, width: usize) -> bool {
    width > 0 && width <= MAX_DIGITS && value < capacity(width)
}

/// Split `value` into `width` digits, most-significant first
///
/// Values wider than `width` keep only their low `width` digits; callers
/// validate with [`fits`] first.
pub fn split(value: u64, width: usize) -> Vec<u8> {
    let mut out = vec![0u8; width];
    let mut rest = value;
    for slot in out.iter_mut().rev() {
        *slot = (rest % 10) as u8;
        rest /= 10;
    }
    out
}

/// Compose digits (most-significant first) back into a number
pub fn compose(digits: impl IntoIterator<Item = u8>) -> u64 {
    digits
        .into_iter()
        .fold(0u64, |acc, d| acc.wrapping_mul(10).wrapping_add(d as u64))
}

/// Zero-padded display string
pub fn pad(value: u64, width: usize) -> String {
    format!("{:0width$}", value, width = width)
}

/// Least-significant digit of the padded display
pub fn last_digit(value: u64) -> u8 {
    (value % 10) as u8
}
