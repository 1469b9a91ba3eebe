//! Persistence contracts for tokens and users.
//!
//! Every backend must honor the same error taxonomy: `NotFound` and `Expired` are
//! distinct for diagnostics, `DuplicateEmail` and `EditConflict` are distinct so
//! callers can message them differently, and anything else is `Unexpected`.

use crate::{
    model::{Scope, User},
    password,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("token expired")]
    Expired,
    #[error("duplicate email")]
    DuplicateEmail,
    #[error("edit conflict")]
    EditConflict,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("store operation exceeded its deadline")]
    Timeout,
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

/// Scoped, email keyed, single-use verification tokens.
#[async_trait]
pub trait VerificationTokenStore: Send + Sync {
    /// Whether an unexpired token is outstanding for `(scope, email)`.
    async fn exists(&self, scope: Scope, email: &str) -> Result<bool, StoreError>;

    async fn create(
        &self,
        hash: &[u8],
        expiry: DateTime<Utc>,
        scope: Scope,
        email: &str,
    ) -> Result<(), StoreError>;

    /// Match on all of hash, scope and email. `Expired` iff now is past the expiry.
    async fn verify(&self, hash: &[u8], scope: Scope, email: &str) -> Result<(), StoreError>;

    /// Drop every token for `email`, whatever its scope.
    async fn purge(&self, email: &str) -> Result<(), StoreError>;
}

/// Bearer tokens keyed by user.
#[async_trait]
pub trait AuthenticationTokenStore: Send + Sync {
    async fn create(
        &self,
        hash: &[u8],
        expiry: DateTime<Utc>,
        user_id: Uuid,
    ) -> Result<(), StoreError>;

    async fn get_user(&self, hash: &[u8]) -> Result<User, StoreError>;

    async fn purge(&self, user_id: Uuid) -> Result<(), StoreError>;
}

/// Versioned user records. The repository is the only writer of `version`.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError>;

    async fn get_by_id(&self, id: Uuid) -> Result<User, StoreError>;

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError>;

    async fn exists_by_email(&self, email: &str) -> Result<bool, StoreError>;

    /// Compare-and-swap on `version`. A stale version is `EditConflict`; a current
    /// version whose email collides with another user is `DuplicateEmail`.
    async fn update(&self, user: &User) -> Result<User, StoreError>;

    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;

    /// Look up by email and check the password. Unknown email and wrong password
    /// both come back as `InvalidCredentials` after the same amount of hashing.
    async fn get_by_credentials(
        &self,
        email: &str,
        password: SecretString,
    ) -> Result<User, StoreError> {
        match self.get_by_email(email).await {
            Ok(user) => {
                if password::verify(user.password_hash.clone(), password).await? {
                    Ok(user)
                } else {
                    Err(StoreError::InvalidCredentials)
                }
            }
            Err(StoreError::NotFound) => {
                password::verify_dummy(password).await?;
                Err(StoreError::InvalidCredentials)
            }
            Err(e) => Err(e),
        }
    }
}

/// Connection pool counters, reported on the debug route.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolStats {
    pub max_connections: u32,
    /// Open connections, idle or in use.
    pub size: u32,
    pub idle: usize,
}

/// The three stores the account flows depend on.
#[derive(Clone)]
pub struct Store {
    pub users: Arc<dyn UserRepository>,
    pub verification_tokens: Arc<dyn VerificationTokenStore>,
    pub authentication_tokens: Arc<dyn AuthenticationTokenStore>,
    pool: Option<PgPool>,
}

impl Store {
    #[must_use]
    pub fn postgres(store: PostgresStore) -> Self {
        let pool = store.pool().clone();
        let store = Arc::new(store);
        Self {
            users: store.clone(),
            verification_tokens: store.clone(),
            authentication_tokens: store,
            pool: Some(pool),
        }
    }

    #[must_use]
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::default());
        Self {
            users: store.clone(),
            verification_tokens: store.clone(),
            authentication_tokens: store,
            pool: None,
        }
    }

    /// `None` unless backed by a connection pool.
    #[must_use]
    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.pool.as_ref().map(|pool| PoolStats {
            max_connections: pool.options().get_max_connections(),
            size: pool.size(),
            idle: pool.num_idle(),
        })
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("pooled", &self.pool.is_some())
            .finish_non_exhaustive()
    }
}
