//! `PostgreSQL` backend. Schema lives in `sql/schema.sql`.
//!
//! Every statement runs inside a `db.query` span and under the configured
//! deadline; a query that outlives it is dropped, which cancels it.

use super::StoreError;
use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{future::Future, time::Duration};

mod authentication;
mod users;
mod verification;

/// Default bound for a single statement.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: PgPool,
    query_timeout: Duration,
}

impl PostgresStore {
    #[must_use]
    pub fn new(pool: PgPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    /// Open a small pool against `dsn`.
    ///
    /// # Errors
    /// Returns an error if the database is unreachable within `query_timeout`.
    pub async fn connect(dsn: &str, query_timeout: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .acquire_timeout(query_timeout)
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;

        Ok(Self::new(pool, query_timeout))
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Await `query` within the statement deadline, leaving driver errors to the caller.
    async fn deadline<T>(
        &self,
        query: impl Future<Output = Result<T, sqlx::Error>>,
    ) -> Result<Result<T, sqlx::Error>, StoreError> {
        tokio::time::timeout(self.query_timeout, query)
            .await
            .map_err(|_| StoreError::Timeout)
    }

    /// Await `query` within the statement deadline; driver errors become `Unexpected`.
    async fn run<T>(
        &self,
        query: impl Future<Output = Result<T, sqlx::Error>>,
        context: &'static str,
    ) -> Result<T, StoreError> {
        self.deadline(query)
            .await?
            .map_err(|err| unexpected(err, context))
    }
}

fn unexpected(err: sqlx::Error, context: &'static str) -> StoreError {
    StoreError::Unexpected(anyhow::Error::new(err).context(context))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct FakeDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for FakeDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "fake database error")
        }
    }

    impl StdError for FakeDbError {}

    impl DatabaseError for FakeDbError {
        fn message(&self) -> &'static str {
            "fake database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    #[test]
    fn unique_violation_is_detected_by_sqlstate() {
        let err = sqlx::Error::Database(Box::new(FakeDbError {
            code: Some("23505"),
        }));
        assert!(is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(FakeDbError {
            code: Some("23503"),
        }));
        assert!(!is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(FakeDbError { code: None }));
        assert!(!is_unique_violation(&err));

        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn unexpected_keeps_context() {
        let err = unexpected(sqlx::Error::RowNotFound, "failed to load user");
        let StoreError::Unexpected(inner) = err else {
            panic!("expected unexpected error");
        };
        assert_eq!(inner.to_string(), "failed to load user");
        assert!(inner.downcast_ref::<sqlx::Error>().is_some());
    }

    #[tokio::test]
    async fn slow_queries_hit_the_deadline() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://custodian@localhost:5432/custodian")
            .unwrap();
        let store = PostgresStore::new(pool, Duration::from_millis(10));

        let result = store
            .run(
                async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok::<_, sqlx::Error>(())
                },
                "never finishes",
            )
            .await;
        assert!(matches!(result, Err(StoreError::Timeout)));
    }
}
