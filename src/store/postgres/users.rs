use super::{is_unique_violation, unexpected, PostgresStore};
use crate::{
    model::User,
    store::{StoreError, UserRepository},
};
use async_trait::async_trait;
use sqlx::{postgres::PgRow, Row};
use tracing::{info_span, Instrument};
use uuid::Uuid;

fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        version: row.get("version"),
        created_at: row.get("created_at"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
    }
}

#[async_trait]
impl UserRepository for PostgresStore {
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        let query = r"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            RETURNING id, version, created_at
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = self
            .deadline(
                sqlx::query(query)
                    .bind(email)
                    .bind(password_hash)
                    .fetch_one(self.pool())
                    .instrument(span),
            )
            .await?;

        match row {
            Ok(row) => Ok(User {
                id: row.get("id"),
                version: row.get("version"),
                created_at: row.get("created_at"),
                email: email.to_string(),
                password_hash: password_hash.to_string(),
            }),
            Err(err) if is_unique_violation(&err) => Err(StoreError::DuplicateEmail),
            Err(err) => Err(unexpected(err, "failed to insert user")),
        }
    }

    async fn get_by_id(&self, id: Uuid) -> Result<User, StoreError> {
        let query = "SELECT id, version, created_at, email, password_hash FROM users WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = self
            .run(
                sqlx::query(query)
                    .bind(id)
                    .fetch_optional(self.pool())
                    .instrument(span),
                "failed to load user by id",
            )
            .await?;

        row.as_ref().map(user_from_row).ok_or(StoreError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        let query =
            "SELECT id, version, created_at, email, password_hash FROM users WHERE email = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = self
            .run(
                sqlx::query(query)
                    .bind(email)
                    .fetch_optional(self.pool())
                    .instrument(span),
                "failed to load user by email",
            )
            .await?;

        row.as_ref().map(user_from_row).ok_or(StoreError::NotFound)
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, StoreError> {
        let query = "SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        self.run(
            sqlx::query_scalar::<_, bool>(query)
                .bind(email)
                .fetch_one(self.pool())
                .instrument(span),
            "failed to check user email",
        )
        .await
    }

    async fn update(&self, user: &User) -> Result<User, StoreError> {
        let query = r"
            UPDATE users
            SET email = $1, password_hash = $2, version = version + 1
            WHERE id = $3 AND version = $4
            RETURNING version
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = self
            .deadline(
                sqlx::query(query)
                    .bind(&user.email)
                    .bind(&user.password_hash)
                    .bind(user.id)
                    .bind(user.version)
                    .fetch_optional(self.pool())
                    .instrument(span),
            )
            .await?;

        match row {
            Ok(Some(row)) => {
                let mut updated = user.clone();
                updated.version = row.get("version");
                Ok(updated)
            }
            // no row: the version moved on (or the user is gone)
            Ok(None) => Err(StoreError::EditConflict),
            Err(err) if is_unique_violation(&err) => Err(StoreError::DuplicateEmail),
            Err(err) => Err(unexpected(err, "failed to update user")),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let query = "DELETE FROM users WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = self
            .run(
                sqlx::query(query)
                    .bind(id)
                    .execute(self.pool())
                    .instrument(span),
                "failed to delete user",
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let query = "SELECT 1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        self.run(
            sqlx::query(query).execute(self.pool()).instrument(span),
            "database ping failed",
        )
        .await
        .map(|_| ())
    }
}
