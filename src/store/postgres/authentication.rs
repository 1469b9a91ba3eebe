use super::PostgresStore;
use crate::{
    model::User,
    store::{AuthenticationTokenStore, StoreError},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

#[async_trait]
impl AuthenticationTokenStore for PostgresStore {
    async fn create(
        &self,
        hash: &[u8],
        expiry: DateTime<Utc>,
        user_id: Uuid,
    ) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO authentication_tokens (hash, expiry, user_id)
            VALUES ($1, $2, $3)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        self.run(
            sqlx::query(query)
                .bind(hash)
                .bind(expiry)
                .bind(user_id)
                .execute(self.pool())
                .instrument(span),
            "failed to insert authentication token",
        )
        .await
        .map(|_| ())
    }

    async fn get_user(&self, hash: &[u8]) -> Result<User, StoreError> {
        let query = r"
            SELECT users.id, users.version, users.created_at, users.email, users.password_hash,
                   authentication_tokens.expiry
            FROM users
            INNER JOIN authentication_tokens ON users.id = authentication_tokens.user_id
            WHERE authentication_tokens.hash = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = self
            .run(
                sqlx::query(query)
                    .bind(hash)
                    .fetch_optional(self.pool())
                    .instrument(span),
                "failed to resolve authentication token",
            )
            .await?
            .ok_or(StoreError::NotFound)?;

        let expiry: DateTime<Utc> = row.get("expiry");
        if Utc::now() > expiry {
            debug!(%expiry, "authentication token expired");
            return Err(StoreError::Expired);
        }

        Ok(User {
            id: row.get("id"),
            version: row.get("version"),
            created_at: row.get("created_at"),
            email: row.get("email"),
            password_hash: row.get("password_hash"),
        })
    }

    async fn purge(&self, user_id: Uuid) -> Result<(), StoreError> {
        let query = "DELETE FROM authentication_tokens WHERE user_id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        self.run(
            sqlx::query(query)
                .bind(user_id)
                .execute(self.pool())
                .instrument(span),
            "failed to purge authentication tokens",
        )
        .await
        .map(|_| ())
    }
}
