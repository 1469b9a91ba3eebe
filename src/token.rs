//! Opaque token generation and hashing.
//!
//! A token's plaintext is handed to the user once (response body or email) and
//! then dropped; stores only ever see the SHA-256 digest. The search space is
//! 256 bits, so a fast hash is enough for the persisted form.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, TimeDelta, Utc};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Number of random bytes behind every token.
pub const TOKEN_BYTES: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("failed to read from the random source")]
    RandomSource(#[from] rand::Error),
    #[error("token ttl out of range: {0:?}")]
    Ttl(Duration),
}

#[derive(Debug)]
pub struct Token {
    plaintext: SecretString,
    hash: Vec<u8>,
    expiry: DateTime<Utc>,
}

impl Token {
    /// Draw a fresh token that expires `ttl` from now.
    ///
    /// # Errors
    /// Returns an error if the OS random source fails or `ttl` overflows a timestamp.
    pub fn generate(ttl: Duration) -> Result<Self, TokenError> {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.try_fill_bytes(&mut bytes)?;

        let ttl_delta = TimeDelta::from_std(ttl).map_err(|_| TokenError::Ttl(ttl))?;
        let expiry = Utc::now()
            .checked_add_signed(ttl_delta)
            .ok_or(TokenError::Ttl(ttl))?;

        let plaintext = Base64UrlUnpadded::encode_string(&bytes);
        let hash = hash_of(&plaintext);

        Ok(Self {
            plaintext: SecretString::from(plaintext),
            hash,
            expiry,
        })
    }

    #[must_use]
    pub fn plaintext(&self) -> &SecretString {
        &self.plaintext
    }

    #[must_use]
    pub fn hash(&self) -> &[u8] {
        &self.hash
    }

    #[must_use]
    pub fn expiry(&self) -> DateTime<Utc> {
        self.expiry
    }

    /// Consume the token, keeping only what may leave the process.
    #[must_use]
    pub fn into_plaintext(self) -> SecretString {
        self.plaintext
    }
}

/// Derive the lookup hash for a caller-supplied plaintext.
#[must_use]
pub fn hash_of(plaintext: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hasher.finalize().to_vec()
}

/// Hash helper for secrets already wrapped in `SecretString`.
#[must_use]
pub fn hash_secret(plaintext: &SecretString) -> Vec<u8> {
    hash_of(plaintext.expose_secret())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_hash_matches_hash_of_plaintext() {
        for ttl in [
            Duration::from_secs(0),
            Duration::from_secs(1),
            Duration::from_secs(60 * 60 * 36),
            Duration::from_secs(60 * 60 * 24 * 365),
        ] {
            let token = Token::generate(ttl).unwrap();
            assert_eq!(hash_of(token.plaintext().expose_secret()), token.hash());
            assert_eq!(hash_secret(token.plaintext()), token.hash());
        }
    }

    #[test]
    fn plaintext_is_url_safe_and_fixed_length() {
        let token = Token::generate(Duration::from_secs(60)).unwrap();
        let plaintext = token.plaintext().expose_secret();
        // 32 bytes -> 43 base64url chars without padding
        assert_eq!(plaintext.len(), 43);
        assert!(plaintext
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn tokens_are_unique() {
        let a = Token::generate(Duration::from_secs(60)).unwrap();
        let b = Token::generate(Duration::from_secs(60)).unwrap();
        assert_ne!(a.plaintext().expose_secret(), b.plaintext().expose_secret());
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn expiry_is_now_plus_ttl() {
        let before = Utc::now();
        let token = Token::generate(Duration::from_secs(3600)).unwrap();
        let after = Utc::now();
        assert!(token.expiry() >= before + TimeDelta::seconds(3600));
        assert!(token.expiry() <= after + TimeDelta::seconds(3600));
    }

    #[test]
    fn absurd_ttl_is_an_error() {
        let result = Token::generate(Duration::from_secs(u64::MAX));
        assert!(matches!(result, Err(TokenError::Ttl(_))));
    }

    #[test]
    fn debug_output_redacts_plaintext() {
        let token = Token::generate(Duration::from_secs(60)).unwrap();
        let debug = format!("{token:?}");
        assert!(!debug.contains(token.plaintext().expose_secret()));
    }

    #[test]
    fn hash_of_is_sha256() {
        let hash = hash_of("abc");
        assert_eq!(hash.len(), 32);
        assert_eq!(
            hash[..4],
            [0xba, 0x78, 0x16, 0xbf],
            "sha256(\"abc\") starts with ba7816bf"
        );
    }
}
