pub mod debug;
pub mod health;
pub mod tokens;
pub mod users;

use super::error::ApiError;
use axum::{extract::rejection::JsonRejection, Json};

/// Unwrap a JSON body, turning any rejection into a 400 with the parser's message.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
