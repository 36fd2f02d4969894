//! Verification code generation.
//!
//! Each entry carries a short uppercase alphanumeric code the customer reads
//! back to staff at the counter. It is a human matching aid, not a security
//! secret; uniqueness is only required among simultaneously active entries of
//! the same queue, and the store enforces that by re-issuing on collision.

use rand::seq::IndexedRandom;

/// Characters a code may contain. `0`, `O`, `1`, and `I` are excluded so a
/// code shouted across a noisy room survives transcription.
pub const CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Shortest allowed code length.
pub const MIN_CODE_LEN: usize = 4;

/// Longest allowed code length.
pub const MAX_CODE_LEN: usize = 6;

/// Generate a random verification code of `len` characters.
///
/// `len` is clamped to the `[MIN_CODE_LEN, MAX_CODE_LEN]` range.
pub fn issue_code(len: usize) -> String {
    let len = len.clamp(MIN_CODE_LEN, MAX_CODE_LEN);
    let mut rng = rand::rng();
    (0..len)
        .map(|_| *CODE_ALPHABET.choose(&mut rng).expect("alphabet is non-empty") as char)
        .collect()
}

/// Normalise a code for case-insensitive comparison.
pub fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Whether two codes match, ignoring case and surrounding whitespace.
pub fn codes_match(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}
