use super::{validate, AccountError, Accounts, FieldErrors};
use crate::{
    model::User,
    store::StoreError,
    token::{self, Token},
};
use secrecy::SecretString;
use tracing::{debug, info, instrument};

impl Accounts {
    /// Check credentials and mint a bearer token. The returned token is the only
    /// time its plaintext exists outside the caller.
    ///
    /// # Errors
    /// Returns `InvalidCredentials` for an unknown email or a wrong password alike.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<Token, AccountError> {
        let email = validate::normalize_email(email);
        let mut errors = FieldErrors::new();
        validate::email(&mut errors, &email);
        validate::password(&mut errors, password);
        errors.finish()?;

        let user = self
            .store
            .users
            .get_by_credentials(&email, SecretString::from(password))
            .await?;

        let token = Token::generate(self.config.authentication_token_ttl())?;
        self.store
            .authentication_tokens
            .create(token.hash(), token.expiry(), user.id)
            .await?;

        info!(user_id = %user.id, "authentication token issued");
        Ok(token)
    }

    /// Resolve a bearer token to its user.
    ///
    /// # Errors
    /// Returns `InvalidAuthenticationToken` for unknown and expired tokens alike.
    pub async fn authenticate(&self, bearer: &str) -> Result<User, AccountError> {
        let hash = token::hash_of(bearer);
        match self.store.authentication_tokens.get_user(&hash).await {
            Ok(user) => Ok(user),
            Err(err @ (StoreError::NotFound | StoreError::Expired)) => {
                debug!("bearer token rejected: {err}");
                Err(AccountError::InvalidAuthenticationToken)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Revoke every bearer token of `user`.
    ///
    /// # Errors
    /// Returns `Infrastructure` on store failure.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn logout_everywhere(&self, user: &User) -> Result<(), AccountError> {
        self.store.authentication_tokens.purge(user.id).await?;
        info!("all authentication tokens revoked");
        Ok(())
    }
}
