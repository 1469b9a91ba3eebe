//! Account flows: registration, login, password reset, email change and deletion.
//!
//! Each flow is an explicit sequence over the stores. Domain failures are mapped
//! to [`AccountError`] here, at the orchestration boundary; anything the flow did
//! not expect becomes `Infrastructure` and is logged by the HTTP layer.
//!
//! Mail is never awaited by a flow: it is handed to [`BackgroundTasks`] and the
//! flow returns straight away.

use crate::{
    mailer::{Mailer, Template},
    model::Scope,
    store::{Store, StoreError},
    tasks::BackgroundTasks,
    token::TokenError,
};
use std::{sync::Arc, time::Duration};

mod session;
mod users;
pub mod validate;
mod verification;


pub use users::ProfileUpdate;
pub use validate::FieldErrors;

/// Returned for every verification request, whether or not a mail goes out.
pub const VERIFICATION_SENT: &str = "A verification email has been sent. Please check your inbox.";
/// Returned for every password reset request, whether or not a mail goes out.
pub const PASSWORD_RESET_SENT: &str = "If that email address is in our database, a token to reset your password will be sent to that address.";

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("failed validation")]
    Validation(FieldErrors),
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("password reset token expired")]
    ExpiredResetToken,
    #[error("missing verification token")]
    MissingToken,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid or expired authentication token")]
    InvalidAuthenticationToken,
    #[error("duplicate email")]
    DuplicateEmail,
    #[error("edit conflict")]
    EditConflict,
    #[error(transparent)]
    Infrastructure(#[from] anyhow::Error),
}

impl From<StoreError> for AccountError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => Self::DuplicateEmail,
            StoreError::EditConflict => Self::EditConflict,
            StoreError::InvalidCredentials => Self::InvalidCredentials,
            StoreError::Unexpected(err) => Self::Infrastructure(err),
            // a flow that expects these matches on them itself
            other @ (StoreError::NotFound | StoreError::Expired | StoreError::Timeout) => {
                Self::Infrastructure(anyhow::Error::new(other))
            }
        }
    }
}

impl From<TokenError> for AccountError {
    fn from(err: TokenError) -> Self {
        Self::Infrastructure(anyhow::Error::new(err).context("failed to generate token"))
    }
}

impl From<Scope> for Template {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Registration => Self::Registration,
            Scope::EmailChange => Self::EmailChange,
            Scope::PasswordReset => Self::PasswordReset,
            Scope::AccountDeletion => Self::AccountDeletion,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct AccountsConfig {
    verification_token_ttl: Duration,
    authentication_token_ttl: Duration,
}

impl AccountsConfig {
    pub const DEFAULT_VERIFICATION_TOKEN_TTL: Duration = Duration::from_secs(36 * 60 * 60);
    pub const DEFAULT_AUTHENTICATION_TOKEN_TTL: Duration = Duration::from_secs(36 * 60 * 60);

    #[must_use]
    pub fn new() -> Self {
        Self {
            verification_token_ttl: Self::DEFAULT_VERIFICATION_TOKEN_TTL,
            authentication_token_ttl: Self::DEFAULT_AUTHENTICATION_TOKEN_TTL,
        }
    }

    #[must_use]
    pub fn with_verification_token_ttl(mut self, ttl: Duration) -> Self {
        self.verification_token_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_authentication_token_ttl(mut self, ttl: Duration) -> Self {
        self.authentication_token_ttl = ttl;
        self
    }

    #[must_use]
    pub fn verification_token_ttl(&self) -> Duration {
        self.verification_token_ttl
    }

    #[must_use]
    pub fn authentication_token_ttl(&self) -> Duration {
        self.authentication_token_ttl
    }
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Accounts {
    store: Store,
    mailer: Arc<dyn Mailer>,
    tasks: BackgroundTasks,
    config: AccountsConfig,
}

impl Accounts {
    #[must_use]
    pub fn new(
        store: Store,
        mailer: Arc<dyn Mailer>,
        tasks: BackgroundTasks,
        config: AccountsConfig,
    ) -> Self {
        Self {
            store,
            mailer,
            tasks,
            config,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    #[must_use]
    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    #[must_use]
    pub fn config(&self) -> &AccountsConfig {
        &self.config
    }
}
