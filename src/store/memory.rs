//! In-process store used for local development (`memory://`) and tests.
//!
//! Mirrors the Postgres backend's observable behavior, including constraint
//! evaluation order on update: the version predicate filters first, then the
//! email uniqueness constraint applies.

use super::{AuthenticationTokenStore, StoreError, UserRepository, VerificationTokenStore};
use crate::model::{AuthenticationToken, Scope, User, VerificationToken};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    verification_tokens: Vec<VerificationToken>,
    authentication_tokens: Vec<AuthenticationToken>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unexpected(anyhow!("memory store lock poisoned")))
    }
}

impl Tables {
    fn email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        self.users
            .values()
            .any(|user| user.email == email && Some(user.id) != except)
    }
}

#[async_trait]
impl VerificationTokenStore for MemoryStore {
    async fn exists(&self, scope: Scope, email: &str) -> Result<bool, StoreError> {
        let now = Utc::now();
        let tables = self.lock()?;
        Ok(tables
            .verification_tokens
            .iter()
            .any(|token| token.scope == scope && token.email == email && token.expiry >= now))
    }

    async fn create(
        &self,
        hash: &[u8],
        expiry: DateTime<Utc>,
        scope: Scope,
        email: &str,
    ) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if tables.verification_tokens.iter().any(|token| token.hash == hash) {
            return Err(StoreError::Unexpected(anyhow!(
                "verification token hash already present"
            )));
        }
        tables.verification_tokens.push(VerificationToken {
            hash: hash.to_vec(),
            expiry,
            scope,
            email: email.to_string(),
        });
        Ok(())
    }

    async fn verify(&self, hash: &[u8], scope: Scope, email: &str) -> Result<(), StoreError> {
        let tables = self.lock()?;
        let token = tables
            .verification_tokens
            .iter()
            .find(|token| token.hash == hash && token.scope == scope && token.email == email)
            .ok_or(StoreError::NotFound)?;

        if Utc::now() > token.expiry {
            return Err(StoreError::Expired);
        }
        Ok(())
    }

    async fn purge(&self, email: &str) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        tables
            .verification_tokens
            .retain(|token| token.email != email);
        Ok(())
    }
}

#[async_trait]
impl AuthenticationTokenStore for MemoryStore {
    async fn create(
        &self,
        hash: &[u8],
        expiry: DateTime<Utc>,
        user_id: Uuid,
    ) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if !tables.users.contains_key(&user_id) {
            return Err(StoreError::Unexpected(anyhow!(
                "authentication token references unknown user"
            )));
        }
        tables.authentication_tokens.push(AuthenticationToken {
            hash: hash.to_vec(),
            expiry,
            user_id,
        });
        Ok(())
    }

    async fn get_user(&self, hash: &[u8]) -> Result<User, StoreError> {
        let tables = self.lock()?;
        let (token, user) = tables
            .authentication_tokens
            .iter()
            .find(|token| token.hash == hash)
            .and_then(|token| tables.users.get(&token.user_id).map(|user| (token, user)))
            .ok_or(StoreError::NotFound)?;

        if Utc::now() > token.expiry {
            return Err(StoreError::Expired);
        }
        Ok(user.clone())
    }

    async fn purge(&self, user_id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        tables
            .authentication_tokens
            .retain(|token| token.user_id != user_id);
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        let mut tables = self.lock()?;
        if tables.email_taken(email, None) {
            return Err(StoreError::DuplicateEmail);
        }
        let user = User {
            id: Uuid::new_v4(),
            version: 1,
            created_at: Utc::now(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<User, StoreError> {
        self.lock()?.users.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.lock()?
            .users
            .values()
            .find(|user| user.email == email)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.email_taken(email, None))
    }

    async fn update(&self, user: &User) -> Result<User, StoreError> {
        let mut tables = self.lock()?;

        let current_version = tables.users.get(&user.id).map(|stored| stored.version);
        if current_version != Some(user.version) {
            return Err(StoreError::EditConflict);
        }
        if tables.email_taken(&user.email, Some(user.id)) {
            return Err(StoreError::DuplicateEmail);
        }

        let mut updated = user.clone();
        updated.version += 1;
        tables.users.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if tables.users.remove(&id).is_none() {
            return Err(StoreError::NotFound);
        }
        tables
            .authentication_tokens
            .retain(|token| token.user_id != id);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Token;
    use chrono::TimeDelta;
    use secrecy::SecretString;
    use std::{sync::Arc, time::Duration};

    const TTL: Duration = Duration::from_secs(60 * 60);

    async fn seeded_user(store: &MemoryStore, email: &str) -> User {
        UserRepository::create(store, email, "hash").await.unwrap()
    }

    #[tokio::test]
    async fn verify_requires_full_tuple_match() {
        let store = MemoryStore::default();
        let token = Token::generate(TTL).unwrap();
        VerificationTokenStore::create(
            &store,
            token.hash(),
            token.expiry(),
            Scope::Registration,
            "a@x.com",
        )
        .await
        .unwrap();

        store
            .verify(token.hash(), Scope::Registration, "a@x.com")
            .await
            .unwrap();

        let other = Token::generate(TTL).unwrap();
        assert!(matches!(
            store.verify(other.hash(), Scope::Registration, "a@x.com").await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.verify(token.hash(), Scope::PasswordReset, "a@x.com").await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.verify(token.hash(), Scope::Registration, "b@x.com").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn verify_reports_expired_only_when_matched() {
        let store = MemoryStore::default();
        let token = Token::generate(TTL).unwrap();
        let past = Utc::now() - TimeDelta::seconds(1);
        VerificationTokenStore::create(&store, token.hash(), past, Scope::EmailChange, "a@x.com")
            .await
            .unwrap();

        assert!(matches!(
            store.verify(token.hash(), Scope::EmailChange, "a@x.com").await,
            Err(StoreError::Expired)
        ));
        assert!(matches!(
            store.verify(token.hash(), Scope::Registration, "a@x.com").await,
            Err(StoreError::NotFound)
        ));
        // expired tokens do not count as outstanding
        assert!(!store.exists(Scope::EmailChange, "a@x.com").await.unwrap());
    }

    #[tokio::test]
    async fn purge_removes_every_scope_for_email() {
        let store = MemoryStore::default();
        for scope in [Scope::Registration, Scope::PasswordReset, Scope::EmailChange] {
            let token = Token::generate(TTL).unwrap();
            VerificationTokenStore::create(&store, token.hash(), token.expiry(), scope, "a@x.com")
                .await
                .unwrap();
        }
        let keep = Token::generate(TTL).unwrap();
        VerificationTokenStore::create(
            &store,
            keep.hash(),
            keep.expiry(),
            Scope::Registration,
            "b@x.com",
        )
        .await
        .unwrap();

        VerificationTokenStore::purge(&store, "a@x.com").await.unwrap();

        for scope in [Scope::Registration, Scope::PasswordReset, Scope::EmailChange] {
            assert!(!store.exists(scope, "a@x.com").await.unwrap());
        }
        assert!(store.exists(Scope::Registration, "b@x.com").await.unwrap());
    }

    #[tokio::test]
    async fn authentication_token_resolves_user_until_expiry() {
        let store = MemoryStore::default();
        let user = seeded_user(&store, "a@x.com").await;

        let live = Token::generate(TTL).unwrap();
        AuthenticationTokenStore::create(&store, live.hash(), live.expiry(), user.id)
            .await
            .unwrap();
        let stale = Token::generate(TTL).unwrap();
        AuthenticationTokenStore::create(
            &store,
            stale.hash(),
            Utc::now() - TimeDelta::seconds(5),
            user.id,
        )
        .await
        .unwrap();

        assert_eq!(store.get_user(live.hash()).await.unwrap().id, user.id);
        assert!(matches!(
            store.get_user(stale.hash()).await,
            Err(StoreError::Expired)
        ));
        assert!(matches!(
            store.get_user(b"unknown").await,
            Err(StoreError::NotFound)
        ));

        AuthenticationTokenStore::purge(&store, user.id).await.unwrap();
        assert!(matches!(
            store.get_user(live.hash()).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn create_rejects_duplicate_email() {
        let store = MemoryStore::default();
        let user = seeded_user(&store, "a@x.com").await;
        assert_eq!(user.version, 1);
        assert!(matches!(
            UserRepository::create(&store, "a@x.com", "other").await,
            Err(StoreError::DuplicateEmail)
        ));
        assert!(store.exists_by_email("a@x.com").await.unwrap());
        assert!(!store.exists_by_email("b@x.com").await.unwrap());
    }

    #[tokio::test]
    async fn update_increments_version_once() {
        let store = MemoryStore::default();
        let mut user = seeded_user(&store, "a@x.com").await;
        user.email = "c@x.com".to_string();
        user.password_hash = "new-hash".to_string();

        let updated = store.update(&user).await.unwrap();
        assert_eq!(updated.version, 2);
        let stored = store.get_by_id(user.id).await.unwrap();
        assert_eq!(stored.email, "c@x.com");
        assert_eq!(stored.password_hash, "new-hash");
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn concurrent_updates_from_same_version_one_wins() {
        let store = Arc::new(MemoryStore::default());
        let user = seeded_user(&store, "a@x.com").await;

        let mut handles = Vec::new();
        for n in 0..8 {
            let store = store.clone();
            let mut copy = user.clone();
            copy.password_hash = format!("hash-{n}");
            handles.push(tokio::spawn(async move { store.update(&copy).await }));
        }

        let mut won = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(updated) => {
                    assert_eq!(updated.version, 2);
                    won += 1;
                }
                Err(StoreError::EditConflict) => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(won, 1);
        assert_eq!(conflicts, 7);
        assert_eq!(store.get_by_id(user.id).await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn update_ordering_version_before_uniqueness() {
        let store = MemoryStore::default();
        seeded_user(&store, "taken@x.com").await;
        let user = seeded_user(&store, "a@x.com").await;

        // current version, colliding email
        let mut colliding = user.clone();
        colliding.email = "taken@x.com".to_string();
        assert!(matches!(
            store.update(&colliding).await,
            Err(StoreError::DuplicateEmail)
        ));

        // bump the version behind the caller's back
        let mut other = user.clone();
        other.password_hash = "rotated".to_string();
        store.update(&other).await.unwrap();

        // stale version wins over the collision
        assert!(matches!(
            store.update(&colliding).await,
            Err(StoreError::EditConflict)
        ));
    }

    #[tokio::test]
    async fn delete_reports_missing_rows() {
        let store = MemoryStore::default();
        let user = seeded_user(&store, "a@x.com").await;
        let token = Token::generate(TTL).unwrap();
        AuthenticationTokenStore::create(&store, token.hash(), token.expiry(), user.id)
            .await
            .unwrap();

        store.delete(user.id).await.unwrap();
        assert!(matches!(
            store.delete(user.id).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.get_user(token.hash()).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn credentials_collapse_unknown_email_and_wrong_password() {
        let store = MemoryStore::default();
        let hash = crate::password::hash(SecretString::from("right-password"))
            .await
            .unwrap();
        let user = UserRepository::create(&store, "a@x.com", &hash).await.unwrap();

        let found = store
            .get_by_credentials("a@x.com", SecretString::from("right-password"))
            .await
            .unwrap();
        assert_eq!(found.id, user.id);

        assert!(matches!(
            store
                .get_by_credentials("a@x.com", SecretString::from("wrong-password"))
                .await,
            Err(StoreError::InvalidCredentials)
        ));
        assert!(matches!(
            store
                .get_by_credentials("nobody@x.com", SecretString::from("right-password"))
                .await,
            Err(StoreError::InvalidCredentials)
        ));
    }
}
