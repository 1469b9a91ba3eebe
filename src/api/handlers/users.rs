use super::json_body;
use crate::{
    accounts::{Accounts, ProfileUpdate},
    api::{
        error::ApiError,
        middleware::CurrentUser,
        types::{
            DeleteAccountRequest, ErrorResponse, MessageResponse, TokenPasswordRequest,
            UpdateProfileRequest, UserResponse,
        },
    },
};
use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

#[utoipa::path(
    post,
    path= "/v1/users",
    request_body = TokenPasswordRequest,
    responses (
        (status = 201, description = "Account created", body = UserResponse),
        (status = 401, description = "Invalid or expired registration token", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
        (status = 422, description = "Malformed input", body = ErrorResponse),
    ),
    tag= "users"
)]
pub async fn register_user(
    Extension(accounts): Extension<Arc<Accounts>>,
    payload: Result<Json<TokenPasswordRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let request = json_body(payload)?;
    let user = accounts
        .register(&request.email, &request.password, &request.token)
        .await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

#[utoipa::path(
    put,
    path= "/v1/users/password",
    request_body = TokenPasswordRequest,
    responses (
        (status = 200, description = "Password replaced and every session revoked", body = MessageResponse),
        (status = 401, description = "Invalid or expired reset token", body = ErrorResponse),
        (status = 409, description = "Account changed concurrently", body = ErrorResponse),
        (status = 422, description = "Malformed input", body = ErrorResponse),
    ),
    tag= "users"
)]
pub async fn reset_password(
    Extension(accounts): Extension<Arc<Accounts>>,
    payload: Result<Json<TokenPasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let request = json_body(payload)?;
    accounts
        .reset_password(&request.email, &request.password, &request.token)
        .await?;
    Ok(Json(MessageResponse::new(
        "your password was successfully reset",
    )))
}

#[utoipa::path(
    get,
    path= "/v1/users/me",
    responses (
        (status = 200, description = "The signed-in account", body = UserResponse),
        (status = 401, description = "Not signed in", body = ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag= "users"
)]
pub async fn show_current_user(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(UserResponse::from(&user))
}

#[utoipa::path(
    put,
    path= "/v1/users/me",
    request_body = UpdateProfileRequest,
    responses (
        (status = 200, description = "Account updated", body = UserResponse),
        (status = 401, description = "Not signed in, or missing or invalid email change token", body = ErrorResponse),
        (status = 409, description = "Email taken or account changed concurrently", body = ErrorResponse),
        (status = 422, description = "Malformed input", body = ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag= "users"
)]
pub async fn update_current_user(
    Extension(accounts): Extension<Arc<Accounts>>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, ApiError> {
    let request = json_body(payload)?;
    let update = ProfileUpdate {
        email: request.email,
        password: request.password,
        token: request.token,
    };
    let user = accounts.update_profile(&user, update).await?;
    Ok(Json(UserResponse::from(&user)))
}

#[utoipa::path(
    delete,
    path= "/v1/users/me",
    request_body = DeleteAccountRequest,
    responses (
        (status = 200, description = "Account deleted", body = MessageResponse),
        (status = 401, description = "Not signed in, or invalid deletion token", body = ErrorResponse),
        (status = 422, description = "Missing token", body = ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag= "users"
)]
pub async fn delete_current_user(
    Extension(accounts): Extension<Arc<Accounts>>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<DeleteAccountRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let request = json_body(payload)?;
    accounts.delete_account(&user, &request.token).await?;
    Ok(Json(MessageResponse::new("your account has been deleted")))
}
