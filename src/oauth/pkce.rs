//! PKCE (§4.8): `S256` only. `verifier` is 43-128 char URL-safe random;
//! `challenge` is `base64url(SHA-256(verifier))`.

use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// 32 random bytes, base64url-encoded without padding, yields a 43-char
/// verifier — within the 43-128 range required by RFC 7636.
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

pub fn challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifier_is_in_range() {
        let v = generate_verifier();
        assert!(v.len() >= 43 && v.len() <= 128);
    }

    #[test]
    fn challenge_is_deterministic() {
        let v = generate_verifier();
        assert_eq!(challenge(&v), challenge(&v));
    }
}
