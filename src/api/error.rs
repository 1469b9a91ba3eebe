//! HTTP rendering of failures.

use crate::accounts::{AccountError, FieldErrors};
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

pub const SERVER_ERROR: &str =
    "the server encountered a problem and could not process your request";

#[derive(Debug)]
pub enum ApiError {
    Account(AccountError),
    BadRequest(String),
    AuthenticationRequired,
    NotFound,
    RateLimited,
    Internal,
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        Self::Account(err)
    }
}

fn envelope(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn bearer_challenge(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    response
}

fn failed_validation(errors: &FieldErrors) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "error": errors })),
    )
        .into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(message) => envelope(StatusCode::BAD_REQUEST, &message),
            Self::AuthenticationRequired => bearer_challenge(envelope(
                StatusCode::UNAUTHORIZED,
                "you must be authenticated to access this resource",
            )),
            Self::NotFound => envelope(
                StatusCode::NOT_FOUND,
                "the requested resource could not be found",
            ),
            Self::RateLimited => envelope(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded"),
            Self::Internal => envelope(StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR),
            Self::Account(err) => match err {
                AccountError::Validation(errors) => failed_validation(&errors),
                AccountError::InvalidToken => {
                    envelope(StatusCode::UNAUTHORIZED, "invalid or expired token")
                }
                AccountError::ExpiredResetToken => envelope(
                    StatusCode::UNAUTHORIZED,
                    "expired token, please request a new password reset",
                ),
                AccountError::MissingToken => {
                    envelope(StatusCode::UNAUTHORIZED, "missing verification token")
                }
                AccountError::InvalidCredentials => envelope(
                    StatusCode::UNAUTHORIZED,
                    "invalid authentication credentials",
                ),
                AccountError::InvalidAuthenticationToken => bearer_challenge(envelope(
                    StatusCode::UNAUTHORIZED,
                    "invalid or missing authentication token",
                )),
                AccountError::DuplicateEmail => envelope(
                    StatusCode::CONFLICT,
                    "a user with this email address already exists",
                ),
                AccountError::EditConflict => envelope(
                    StatusCode::CONFLICT,
                    "unable to update the record due to an edit conflict, please try again",
                ),
                AccountError::Infrastructure(err) => {
                    error!("request failed: {err:#}");
                    envelope(StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR)
                }
            },
        }
    }
}
