//! Opaque refresh-token secrets

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Raw secret length in bytes before encoding
pub const REFRESH_SECRET_BYTES: usize = 32;

/// 32 bytes from the OS RNG, URL-safe base64 without padding
pub fn generate_refresh_secret() -> String {
    let mut bytes = [0u8; REFRESH_SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Lowercase hex SHA-256 of the raw secret.
///
/// Deterministic, so the digest doubles as the lookup key. The secret carries
/// 256 bits of entropy, which makes a slow salted hash unnecessary here.
pub fn hash_refresh_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_shape() {
        let secret = generate_refresh_secret();
        // 32 bytes -> 43 chars unpadded
        assert_eq!(secret.len(), 43);
        assert!(secret
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_eq!(URL_SAFE_NO_PAD.decode(&secret).unwrap().len(), 32);
    }

    #[test]
    fn test_secrets_are_unique() {
        assert_ne!(generate_refresh_secret(), generate_refresh_secret());
    }

    #[test]
    fn test_hash_is_deterministic_hex() {
        let h1 = hash_refresh_token("abc");
        let h2 = hash_refresh_token("abc");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_eq!(
            h1,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(h1, hash_refresh_token("abd"));
    }
}
