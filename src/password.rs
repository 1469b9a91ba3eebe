//! Argon2id password hashing.
//!
//! Hashing is CPU bound, so both operations hop onto the blocking pool and carry
//! the caller's span along.

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use secrecy::{ExposeSecret, SecretString};
use std::sync::OnceLock;
use tracing::Span;

/// Shortest accepted password, in bytes.
pub const MIN_PASSWORD_BYTES: usize = 8;
/// Longest accepted password, in bytes.
pub const MAX_PASSWORD_BYTES: usize = 72;

static DUMMY_HASH: OnceLock<String> = OnceLock::new();

fn hasher() -> Result<Argon2<'static>> {
    let params = Params::new(15000, 2, 1, None).map_err(|e| anyhow!("invalid argon2 params: {e}"))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

fn hash_blocking(password: &[u8]) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    hasher()?
        .hash_password(password, &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("failed to hash password: {e}"))
}

fn verify_blocking(expected: &str, candidate: &[u8]) -> Result<bool> {
    let expected =
        PasswordHash::new(expected).map_err(|e| anyhow!("stored password hash is malformed: {e}"))?;
    match hasher()?.verify_password(candidate, &expected) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow!("failed to verify password: {e}")),
    }
}

fn dummy_hash() -> Result<&'static str> {
    if let Some(hash) = DUMMY_HASH.get() {
        return Ok(hash);
    }
    let hash = hash_blocking(b"custodian-timing-equalizer")?;
    Ok(DUMMY_HASH.get_or_init(|| hash))
}

/// Compute the hash [`verify_dummy`] checks against, so the first unknown-email
/// login costs the same as every later one.
///
/// # Errors
/// Returns an error if hashing fails or the blocking task panics.
pub async fn warm_up() -> Result<()> {
    tokio::task::spawn_blocking(|| dummy_hash().map(|_| ()))
        .await
        .context("password warm-up task failed")?
}

/// Hash a plaintext password into a PHC string.
///
/// # Errors
/// Returns an error if hashing fails or the blocking task panics.
#[tracing::instrument(name = "password.hash", skip_all)]
pub async fn hash(password: SecretString) -> Result<String> {
    let span = Span::current();
    tokio::task::spawn_blocking(move || {
        span.in_scope(|| hash_blocking(password.expose_secret().as_bytes()))
    })
    .await
    .context("password hashing task failed")?
}

/// Check `candidate` against a stored PHC string. A mismatch is `Ok(false)`.
///
/// # Errors
/// Returns an error if the stored hash cannot be parsed or the blocking task panics.
#[tracing::instrument(name = "password.verify", skip_all)]
pub async fn verify(expected: String, candidate: SecretString) -> Result<bool> {
    let span = Span::current();
    tokio::task::spawn_blocking(move || {
        span.in_scope(|| verify_blocking(&expected, candidate.expose_secret().as_bytes()))
    })
    .await
    .context("password verification task failed")?
}

/// Burn the same work as [`verify`] for a login whose email matched nothing.
///
/// # Errors
/// Returns an error if the dummy hash cannot be produced.
#[tracing::instrument(name = "password.verify", skip_all)]
pub async fn verify_dummy(candidate: SecretString) -> Result<()> {
    let span = Span::current();
    tokio::task::spawn_blocking(move || {
        span.in_scope(|| {
            let expected = dummy_hash()?;
            verify_blocking(expected, candidate.expose_secret().as_bytes()).map(|_| ())
        })
    })
    .await
    .context("password verification task failed")?
}
