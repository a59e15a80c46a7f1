//! Small helpers shared by the auth flows.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Random alphanumeric text for salts, activation keys, and recovery codes.
pub(crate) fn random_text(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_text_has_requested_length_and_charset() {
        let text = random_text(16);
        assert_eq!(text.len(), 16);
        assert!(text.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn random_text_varies() {
        // Collision odds over 62^16 are negligible.
        assert_ne!(random_text(16), random_text(16));
    }
}
