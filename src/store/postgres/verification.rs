use super::PostgresStore;
use crate::{
    model::Scope,
    store::{StoreError, VerificationTokenStore},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::{debug, info_span, Instrument};

#[async_trait]
impl VerificationTokenStore for PostgresStore {
    async fn exists(&self, scope: Scope, email: &str) -> Result<bool, StoreError> {
        let query = r"
            SELECT EXISTS (
                SELECT 1 FROM verification_tokens
                WHERE scope = $1 AND email = $2 AND expiry >= NOW()
            )
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        self.run(
            sqlx::query_scalar::<_, bool>(query)
                .bind(scope.as_str())
                .bind(email)
                .fetch_one(self.pool())
                .instrument(span),
            "failed to check for outstanding verification token",
        )
        .await
    }

    async fn create(
        &self,
        hash: &[u8],
        expiry: DateTime<Utc>,
        scope: Scope,
        email: &str,
    ) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO verification_tokens (hash, expiry, scope, email)
            VALUES ($1, $2, $3, $4)
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
                .bind(scope.as_str())
                .bind(email)
                .execute(self.pool())
                .instrument(span),
            "failed to insert verification token",
        )
        .await
        .map(|_| ())
    }

    async fn verify(&self, hash: &[u8], scope: Scope, email: &str) -> Result<(), StoreError> {
        let query = r"
            SELECT expiry FROM verification_tokens
            WHERE hash = $1 AND scope = $2 AND email = $3
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
                    .bind(scope.as_str())
                    .bind(email)
                    .fetch_optional(self.pool())
                    .instrument(span),
                "failed to verify token",
            )
            .await?
            .ok_or(StoreError::NotFound)?;

        let expiry: DateTime<Utc> = row.get("expiry");
        if Utc::now() > expiry {
            debug!(%expiry, scope = %scope, "verification token expired");
            return Err(StoreError::Expired);
        }

        Ok(())
    }

    async fn purge(&self, email: &str) -> Result<(), StoreError> {
        let query = "DELETE FROM verification_tokens WHERE email = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        self.run(
            sqlx::query(query)
                .bind(email)
                .execute(self.pool())
                .instrument(span),
            "failed to purge verification tokens",
        )
        .await
        .map(|_| ())
    }
}
