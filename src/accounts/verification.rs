use super::{validate, AccountError, Accounts, FieldErrors, PASSWORD_RESET_SENT, VERIFICATION_SENT};
use crate::{
    mailer::{Template, TemplateData},
    model::{Scope, User},
    store::StoreError,
    token::{self, Token},
};
use std::sync::Arc;
use tracing::{debug, instrument};

impl Accounts {
    /// Issue a verification token for `scope` and mail it to `email`.
    ///
    /// The response never reveals whether an account exists or a token was
    /// already outstanding: every accepted request gets the same message.
    ///
    /// # Errors
    /// Returns `Validation` for a malformed email, `Infrastructure` on store or
    /// random source failure.
    #[instrument(skip(self))]
    pub async fn request_verification(
        &self,
        scope: Scope,
        email: &str,
    ) -> Result<&'static str, AccountError> {
        let email = validate::normalize_email(email);
        let mut errors = FieldErrors::new();
        validate::email(&mut errors, &email);
        errors.finish()?;

        let message = match scope {
            Scope::PasswordReset => PASSWORD_RESET_SENT,
            _ => VERIFICATION_SENT,
        };

        let account_exists = self.store.users.exists_by_email(&email).await?;
        let wants_account = matches!(scope, Scope::PasswordReset | Scope::AccountDeletion);
        if account_exists != wants_account {
            debug!("verification request suppressed by account state");
            return Ok(message);
        }

        self.issue(scope, &email).await?;
        Ok(message)
    }

    /// Issue an account deletion token for the signed-in user.
    ///
    /// # Errors
    /// Returns `Infrastructure` on store or random source failure.
    pub async fn request_account_deletion(&self, user: &User) -> Result<&'static str, AccountError> {
        self.request_verification(Scope::AccountDeletion, &user.email)
            .await
    }

    /// Create and mail a token unless one is already outstanding for `(scope, email)`.
    async fn issue(&self, scope: Scope, email: &str) -> Result<(), AccountError> {
        if self.store.verification_tokens.exists(scope, email).await? {
            debug!("verification token already outstanding");
            return Ok(());
        }

        let token = Token::generate(self.config.verification_token_ttl())?;
        self.store
            .verification_tokens
            .create(token.hash(), token.expiry(), scope, email)
            .await?;

        let mailer = Arc::clone(&self.mailer);
        let recipient = email.to_string();
        let data = TemplateData {
            expiry: token.expiry(),
            token: token.into_plaintext(),
        };
        self.tasks.spawn("mail", async move {
            mailer.send(&recipient, Template::from(scope), &data).await
        });

        Ok(())
    }

    /// Check a caller-supplied token against `(scope, email)` and, on success,
    /// purge every outstanding token for that email.
    pub(super) async fn consume(
        &self,
        scope: Scope,
        plaintext: &str,
        email: &str,
    ) -> Result<(), AccountError> {
        let hash = token::hash_of(plaintext.trim());

        match self.store.verification_tokens.verify(&hash, scope, email).await {
            Ok(()) => {}
            Err(StoreError::NotFound) => return Err(AccountError::InvalidToken),
            Err(StoreError::Expired) if scope == Scope::PasswordReset => {
                return Err(AccountError::ExpiredResetToken)
            }
            Err(StoreError::Expired) => return Err(AccountError::InvalidToken),
            Err(err) => return Err(err.into()),
        }

        self.store.verification_tokens.purge(email).await?;
        Ok(())
    }
}
