//! Cheap content fingerprint used to disambiguate backup file names.
//!
//! Not cryptographic. Backup names also carry the day and the reason.

/// Number of hex characters kept in a fingerprint.
pub const FINGERPRINT_LEN: usize = 7;

/// 32-bit rolling hash over UTF-16 code units: `h = h * 31 + unit`, wrapping.
pub fn rolling_hash(text: &str) -> i32 {
    text.encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

/// Absolute value of [`rolling_hash`] as lowercase hex, truncated to
/// [`FINGERPRINT_LEN`] characters.
pub fn fingerprint(text: &str) -> String {
    let magnitude = i64::from(rolling_hash(text)).unsigned_abs();
    let mut hex = format!("{:x}", magnitude);
    hex.truncate(FINGERPRINT_LEN);
    hex
}
