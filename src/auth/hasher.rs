//! Credential hasher: double-salt byte shift followed by SHA-512.
//!
//! This transform is a faithful port of the scheme every stored digest was
//! produced with; it must stay bit-for-bit identical or all existing
//! credentials become unverifiable. Do not "fix" its quirks:
//!
//! - the per-byte shift recomputes from scratch for every pair of salt
//!   bytes, so only the value from the *last* salt-byte pair survives;
//! - salt lengths enter the formula as UTF-16 code-unit counts while the
//!   salt bytes themselves are UTF-8;
//! - the shifted value is folded into byte range by repeated subtraction of
//!   255 (which never yields 0 for inputs above 255) and floored at 0;
//! - an empty salt leaves the shifted value at 0 for every input byte.
//!
//! The shifted bytes are hashed with SHA-512 and the digest base64-encoded.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha512};

/// Deterministic salted digest of a plaintext credential.
#[must_use]
pub fn credential_digest(plaintext: &str, salt1: &str, salt2: &str) -> String {
    let shifted = shift_bytes(plaintext, salt1, salt2);
    let mut hasher = Sha512::new();
    hasher.update(&shifted);
    STANDARD.encode(hasher.finalize())
}

fn shift_bytes(plaintext: &str, salt1: &str, salt2: &str) -> Vec<u8> {
    let mut data = plaintext.as_bytes().to_vec();
    let data_len = data.len() as i64;
    let salt1_chars = salt1.encode_utf16().count() as i64;
    let salt2_chars = salt2.encode_utf16().count() as i64;
    // Only the last inner-loop iteration of the original shift survives, so
    // the whole double loop collapses to the final salt-byte pair.
    let last1 = salt1.as_bytes().last().copied();
    let last2 = salt2.as_bytes().last().copied();

    for byte in &mut data {
        let shifted = match (last1, last2) {
            (Some(s1), Some(s2)) => {
                salt1_chars + i64::from(*byte) * (i64::from(s1) + salt2_chars) * i64::from(s2)
                    + data_len
            }
            // An empty salt means the shift never ran.
            _ => 0,
        };
        *byte = fold_to_byte(shifted);
    }
    data
}

/// Repeated subtraction of 255, floored at 0. Note the fold maps multiples
/// of 255 above the byte range to 255, never 0.
fn fold_to_byte(value: i64) -> u8 {
    if value < 0 {
        return 0;
    }
    if value <= 255 {
        return value as u8;
    }
    ((value - 1) % 255 + 1) as u8
}
