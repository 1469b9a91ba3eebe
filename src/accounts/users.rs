use super::{validate, AccountError, Accounts, FieldErrors};
use crate::{model::Scope, model::User, password, store::StoreError};
use secrecy::SecretString;
use tracing::{info, instrument};

/// Fields a signed-in user may change. All optional; an email change needs a
/// token verified for the new address.
#[derive(Clone, Debug, Default)]
pub struct ProfileUpdate {
    pub email: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
}

impl Accounts {
    /// Consume a registration token and create the account.
    ///
    /// # Errors
    /// Returns `InvalidToken` if the token does not verify for `email`, and
    /// `DuplicateEmail` if the account appeared in the meantime.
    #[instrument(skip(self, password, token))]
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        token: &str,
    ) -> Result<User, AccountError> {
        let email = validate::normalize_email(email);
        let mut errors = FieldErrors::new();
        validate::email(&mut errors, &email);
        validate::password(&mut errors, password);
        validate::token(&mut errors, token);
        errors.finish()?;

        self.consume(Scope::Registration, token, &email).await?;

        let password_hash = password::hash(SecretString::from(password)).await?;
        let user = self.store.users.create(&email, &password_hash).await?;

        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Consume a password reset token, set the new password and revoke every
    /// bearer token of the account.
    ///
    /// # Errors
    /// Returns `ExpiredResetToken` for an expired token, `InvalidToken` for any
    /// other mismatch and `EditConflict` if the account changed concurrently.
    #[instrument(skip(self, password, token))]
    pub async fn reset_password(
        &self,
        email: &str,
        password: &str,
        token: &str,
    ) -> Result<(), AccountError> {
        let email = validate::normalize_email(email);
        let mut errors = FieldErrors::new();
        validate::email(&mut errors, &email);
        validate::password(&mut errors, password);
        validate::token(&mut errors, token);
        errors.finish()?;

        self.consume(Scope::PasswordReset, token, &email).await?;

        let mut user = match self.store.users.get_by_email(&email).await {
            Ok(user) => user,
            // account deleted after the token went out
            Err(StoreError::NotFound) => return Err(AccountError::InvalidToken),
            Err(err) => return Err(err.into()),
        };
        user.password_hash = password::hash(SecretString::from(password)).await?;

        let user = self.store.users.update(&user).await?;
        self.store.authentication_tokens.purge(user.id).await?;

        info!(user_id = %user.id, "password reset");
        Ok(())
    }

    /// Apply an email and/or password change as a single versioned update.
    ///
    /// # Errors
    /// Returns `MissingToken` for an email change without a token, `InvalidToken`
    /// if the token does not verify for the new email, `DuplicateEmail` or
    /// `EditConflict` from the repository.
    #[instrument(skip(self, user, update), fields(user_id = %user.id))]
    pub async fn update_profile(
        &self,
        user: &User,
        update: ProfileUpdate,
    ) -> Result<User, AccountError> {
        let new_email = update.email.as_deref().map(validate::normalize_email);

        let mut errors = FieldErrors::new();
        if let Some(email) = &new_email {
            validate::email(&mut errors, email);
        }
        if let Some(password) = &update.password {
            validate::password(&mut errors, password);
        }
        errors.finish()?;

        if new_email.is_none() && update.password.is_none() {
            return Ok(user.clone());
        }

        let mut changed = user.clone();

        if let Some(email) = new_email {
            let token = update
                .token
                .as_deref()
                .filter(|token| !token.trim().is_empty())
                .ok_or(AccountError::MissingToken)?;
            self.consume(Scope::EmailChange, token, &email).await?;
            changed.email = email;
        }

        let password_changed = if let Some(password) = update.password {
            changed.password_hash = password::hash(SecretString::from(password)).await?;
            true
        } else {
            false
        };

        let updated = self.store.users.update(&changed).await?;

        if password_changed {
            self.store.authentication_tokens.purge(updated.id).await?;
        }

        info!(version = updated.version, "profile updated");
        Ok(updated)
    }

    /// Consume an account deletion token and remove the account with its sessions.
    ///
    /// # Errors
    /// Returns `InvalidToken` if the token does not verify for the user's email.
    #[instrument(skip(self, user, token), fields(user_id = %user.id))]
    pub async fn delete_account(&self, user: &User, token: &str) -> Result<(), AccountError> {
        let mut errors = FieldErrors::new();
        validate::token(&mut errors, token);
        errors.finish()?;

        self.consume(Scope::AccountDeletion, token, &user.email)
            .await?;

        match self.store.users.delete(user.id).await {
            // a concurrent delete got there first, same end state
            Ok(()) | Err(StoreError::NotFound) => {}
            Err(err) => return Err(err.into()),
        }
        self.store.authentication_tokens.purge(user.id).await?;

        info!("account deleted");
        Ok(())
    }
}
