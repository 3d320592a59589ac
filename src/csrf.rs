use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use subtle::ConstantTimeEq;

/// Generates a cryptographically random `state` value for the redirect handshake.
///
/// Returns a 22-character URL-safe string (16 random bytes → base64url).
#[must_use]
pub fn generate_state() -> String {
    let random_bytes: [u8; 16] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Constant-time comparison of a returned `state` against the stored one.
#[must_use]
pub fn state_matches(stored: &str, received: &str) -> bool {
    stored.as_bytes().ct_eq(received.as_bytes()).into()
}

/// Shortened form of a token that is safe to put in logs.
pub(crate) fn redact(token: &str) -> String {
    let prefix: String = token.chars().take(4).collect();
    format!("{prefix}…")
}
