//! # Custodian
//!
//! Account management backend: registration, credential authentication, email
//! verification, password reset and email change behind a JSON HTTP API.
//!
//! ## Architecture
//!
//! - **`token`**: opaque random secrets, their SHA-256 lookup hash and expiry.
//! - **`store`**: verification tokens, authentication tokens and versioned users,
//!   backed by `PostgreSQL` or an in-memory map with identical semantics.
//! - **`ratelimit`**: per-client `governor` limiters with an idle sweep.
//! - **`accounts`**: the flows composing the stores, plus background mail dispatch.
//! - **`api`**: axum router, middleware, request metrics, error envelopes and graceful drain.
//! - **`cli`**: argument parsing, telemetry setup and the server action.
//!
//! Plaintext tokens are returned to the caller (or mailed) exactly once; only their
//! hash is ever persisted.

pub mod accounts;
pub mod api;
pub mod cli;
pub mod mailer;
pub mod model;
pub mod password;
pub mod ratelimit;
pub mod store;
pub mod tasks;
pub mod token;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_commit_hash_is_never_empty() {
        assert!(!GIT_COMMIT_HASH.is_empty());
    }
}
