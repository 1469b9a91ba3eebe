use super::json_body;
use crate::{
    accounts::Accounts,
    api::{
        error::ApiError,
        middleware::CurrentUser,
        types::{
            AuthenticationTokenResponse, AuthenticationTokenView, EmailRequest, ErrorResponse,
            LoginRequest, MessageResponse,
        },
    },
    model::Scope,
};
use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    Json,
};
use secrecy::ExposeSecret;
use std::sync::Arc;

#[utoipa::path(
    post,
    path= "/v1/tokens/verification/registration",
    request_body = EmailRequest,
    responses (
        (status = 200, description = "Accepted; the same message whether or not a mail was sent", body = MessageResponse),
        (status = 422, description = "Malformed email", body = ErrorResponse),
    ),
    tag= "tokens"
)]
pub async fn request_registration_token(
    Extension(accounts): Extension<Arc<Accounts>>,
    payload: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let request = json_body(payload)?;
    let message = accounts
        .request_verification(Scope::Registration, &request.email)
        .await?;
    Ok(Json(MessageResponse::new(message)))
}

#[utoipa::path(
    post,
    path= "/v1/tokens/verification/password-reset",
    request_body = EmailRequest,
    responses (
        (status = 200, description = "Accepted; the same message whether or not the account exists", body = MessageResponse),
        (status = 422, description = "Malformed email", body = ErrorResponse),
    ),
    tag= "tokens"
)]
pub async fn request_password_reset_token(
    Extension(accounts): Extension<Arc<Accounts>>,
    payload: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let request = json_body(payload)?;
    let message = accounts
        .request_verification(Scope::PasswordReset, &request.email)
        .await?;
    Ok(Json(MessageResponse::new(message)))
}

#[utoipa::path(
    post,
    path= "/v1/tokens/verification/email-change",
    request_body = EmailRequest,
    responses (
        (status = 200, description = "Accepted; a token is mailed to the new address if it is free", body = MessageResponse),
        (status = 401, description = "Not signed in", body = ErrorResponse),
        (status = 422, description = "Malformed email", body = ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag= "tokens"
)]
pub async fn request_email_change_token(
    Extension(accounts): Extension<Arc<Accounts>>,
    CurrentUser(_user): CurrentUser,
    payload: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let request = json_body(payload)?;
    let message = accounts
        .request_verification(Scope::EmailChange, &request.email)
        .await?;
    Ok(Json(MessageResponse::new(message)))
}

#[utoipa::path(
    post,
    path= "/v1/tokens/verification/account-deletion",
    responses (
        (status = 200, description = "A deletion token is mailed to the account address", body = MessageResponse),
        (status = 401, description = "Not signed in", body = ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag= "tokens"
)]
pub async fn request_account_deletion_token(
    Extension(accounts): Extension<Arc<Accounts>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<MessageResponse>, ApiError> {
    let message = accounts.request_account_deletion(&user).await?;
    Ok(Json(MessageResponse::new(message)))
}

#[utoipa::path(
    post,
    path= "/v1/tokens/authentication",
    request_body = LoginRequest,
    responses (
        (status = 201, description = "Bearer token issued", body = AuthenticationTokenResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 422, description = "Malformed input", body = ErrorResponse),
    ),
    tag= "tokens"
)]
pub async fn create_authentication_token(
    Extension(accounts): Extension<Arc<Accounts>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthenticationTokenResponse>), ApiError> {
    let request = json_body(payload)?;
    let token = accounts.login(&request.email, &request.password).await?;

    let expiry = token.expiry();
    let response = AuthenticationTokenResponse {
        authentication_token: AuthenticationTokenView {
            token: token.into_plaintext().expose_secret().to_string(),
            expiry,
        },
    };
    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    delete,
    path= "/v1/tokens/authentication",
    responses (
        (status = 200, description = "Every bearer token of the account revoked", body = MessageResponse),
        (status = 401, description = "Not signed in", body = ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag= "tokens"
)]
pub async fn delete_authentication_tokens(
    Extension(accounts): Extension<Arc<Accounts>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<MessageResponse>, ApiError> {
    accounts.logout_everywhere(&user).await?;
    Ok(Json(MessageResponse::new("signed out of every session")))
}
