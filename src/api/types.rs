//! Request and response bodies.

use crate::{model::User, store::PoolStats};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(ToSchema, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(ToSchema, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Registration and password reset completion share this shape.
#[derive(ToSchema, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenPasswordRequest {
    pub email: String,
    pub password: String,
    pub token: String,
}

#[derive(ToSchema, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    /// Required when `email` is present, verified for the new address.
    pub token: Option<String>,
}

#[derive(ToSchema, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteAccountRequest {
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Public view of an account. Never carries the password hash or version.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            created_at: user.created_at,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserResponse {
    pub user: UserView,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self { user: user.into() }
    }
}

#[derive(ToSchema, Serialize, Deserialize)]
pub struct AuthenticationTokenView {
    pub token: String,
    pub expiry: DateTime<Utc>,
}

#[derive(ToSchema, Serialize, Deserialize)]
pub struct AuthenticationTokenResponse {
    pub authentication_token: AuthenticationTokenView,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SystemInfo {
    pub environment: String,
    pub version: String,
    pub build: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    pub status: String,
    pub system_info: SystemInfo,
}

#[derive(ToSchema, Serialize)]
pub struct ErrorResponse {
    /// A message, or a field to message map for validation failures.
    #[schema(value_type = Object)]
    pub error: serde_json::Value,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTotals {
    pub total_requests_received: u64,
    pub total_responses_sent: u64,
    /// Summed handling time in microseconds.
    pub total_processing_time_us: u64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct DatabaseStats {
    pub max_open_connections: u32,
    pub open_connections: u32,
    pub idle: usize,
    pub in_use: usize,
}

impl From<PoolStats> for DatabaseStats {
    fn from(stats: PoolStats) -> Self {
        let open = usize::try_from(stats.size).unwrap_or(usize::MAX);
        Self {
            max_open_connections: stats.max_connections,
            open_connections: stats.size,
            idle: stats.idle,
            in_use: open.saturating_sub(stats.idle),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct DebugVars {
    pub version: String,
    pub build: String,
    pub requests: RequestTotals,
    /// Absent for the in-memory store.
    pub database: Option<DatabaseStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_stats_derive_in_use() {
        let stats = DatabaseStats::from(PoolStats {
            max_connections: 5,
            size: 3,
            idle: 1,
        });
        assert_eq!(stats.open_connections, 3);
        assert_eq!(stats.in_use, 2);

        // the pool counters are read separately and may briefly disagree
        let stats = DatabaseStats::from(PoolStats {
            max_connections: 5,
            size: 1,
            idle: 2,
        });
        assert_eq!(stats.in_use, 0);
    }
}
