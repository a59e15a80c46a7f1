//! Short-lived signed tickets for the secret-question flow.
//!
//! The first step of the flow passes captcha and throttle checks; the ticket
//! carries that proof to the answer step without server-side state. Format:
//! `base64url(username):expiry_unix:base64url(mac)` where the MAC covers
//! `base64url(username):expiry_unix`. Expiry is exclusive, so a zero TTL
//! ticket is already expired.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

fn mac_for(key: &[u8], payload: &str) -> Vec<u8> {
    // HMAC accepts keys of any length, so construction cannot fail.
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(payload.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

pub(crate) fn issue(key: &[u8], username: &str, ttl_seconds: u64) -> String {
    let expiry = now_unix().saturating_add(ttl_seconds);
    let payload = format!("{}:{expiry}", URL_SAFE_NO_PAD.encode(username));
    let mac = URL_SAFE_NO_PAD.encode(mac_for(key, &payload));
    format!("{payload}:{mac}")
}

/// Check the signature and expiry, returning the embedded username.
pub(crate) fn verify(key: &[u8], ticket: &str) -> Option<String> {
    let mut parts = ticket.splitn(3, ':');
    let username_b64 = parts.next()?;
    let expiry_text = parts.next()?;
    let mac_b64 = parts.next()?;

    let payload = format!("{username_b64}:{expiry_text}");
    let mac = URL_SAFE_NO_PAD.decode(mac_b64).ok()?;
    let mut verifier = HmacSha256::new_from_slice(key).ok()?;
    verifier.update(payload.as_bytes());
    verifier.verify_slice(&mac).ok()?;

    let expiry: u64 = expiry_text.parse().ok()?;
    if now_unix() >= expiry {
        return None;
    }

    let username = URL_SAFE_NO_PAD.decode(username_b64).ok()?;
    String::from_utf8(username).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"ticket-test-key";

    #[test]
    fn round_trips_username() {
        let ticket = issue(KEY, "alice", 600);
        assert_eq!(verify(KEY, &ticket), Some("alice".to_string()));
    }

    #[test]
    fn username_with_separator_characters_survives() {
        let ticket = issue(KEY, "we:ird.name", 600);
        assert_eq!(verify(KEY, &ticket), Some("we:ird.name".to_string()));
    }

    #[test]
    fn zero_ttl_is_already_expired() {
        let ticket = issue(KEY, "alice", 0);
        assert_eq!(verify(KEY, &ticket), None);
    }

    #[test]
    fn tampered_payload_rejected() {
        let ticket = issue(KEY, "alice", 600);
        let forged = ticket.replacen(
            &URL_SAFE_NO_PAD.encode("alice"),
            &URL_SAFE_NO_PAD.encode("mallory"),
            1,
        );
        assert_eq!(verify(KEY, &forged), None);
    }

    #[test]
    fn wrong_key_rejected() {
        let ticket = issue(KEY, "alice", 600);
        assert_eq!(verify(b"some-other-key", &ticket), None);
    }

    #[test]
    fn malformed_tickets_rejected() {
        assert_eq!(verify(KEY, ""), None);
        assert_eq!(verify(KEY, "only-one-part"), None);
        assert_eq!(verify(KEY, "a:b:c"), None);
        assert_eq!(verify(KEY, ":::::"), None);
    }
}
