//! Persisted records and the request principal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Purpose a verification token was issued for. A token only verifies within its own scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    Registration,
    EmailChange,
    PasswordReset,
    AccountDeletion,
}

impl Scope {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::EmailChange => "email-change",
            Self::PasswordReset => "password-reset",
            Self::AccountDeletion => "account-deletion",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "registration" => Ok(Self::Registration),
            "email-change" => Ok(Self::EmailChange),
            "password-reset" => Ok(Self::PasswordReset),
            "account-deletion" => Ok(Self::AccountDeletion),
            other => Err(format!("unknown token scope: {other}")),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub email: String,
    pub password_hash: String,
}

// password_hash stays out of logs
impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("created_at", &self.created_at)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub struct VerificationToken {
    pub hash: Vec<u8>,
    pub expiry: DateTime<Utc>,
    pub scope: Scope,
    pub email: String,
}

#[derive(Clone, Debug)]
pub struct AuthenticationToken {
    pub hash: Vec<u8>,
    pub expiry: DateTime<Utc>,
    pub user_id: Uuid,
}

/// Who is making a request.
///
/// `Anonymous` is its own variant rather than a `User` with empty fields, so a real
/// account can never be mistaken for "nobody".
#[derive(Clone, Debug)]
pub enum Principal {
    Anonymous,
    User(User),
}

impl Principal {
    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    #[must_use]
    pub const fn user(&self) -> Option<&User> {
        match self {
            Self::Anonymous => None,
            Self::User(user) => Some(user),
        }
    }
}
