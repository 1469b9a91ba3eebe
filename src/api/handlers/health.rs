use crate::{
    accounts::Accounts,
    api::{
        types::{Health, SystemInfo},
        ApiConfig,
    },
    GIT_COMMIT_HASH,
};
use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use tracing::{debug, error};

#[utoipa::path(
    get,
    path= "/health",
    responses (
        (status = 200, description = "Service and store are available", body = Health),
        (status = 503, description = "Store is unreachable", body = Health)
    ),
    tag= "health"
)]
// axum handler for health
pub async fn health(
    Extension(accounts): Extension<Arc<Accounts>>,
    Extension(config): Extension<Arc<ApiConfig>>,
) -> impl IntoResponse {
    let (status, availability) = match accounts.store().users.ping().await {
        Ok(()) => (StatusCode::OK, "available"),
        Err(err) => {
            error!("Failed to ping store: {err}");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    };

    let health = Health {
        status: availability.to_string(),
        system_info: SystemInfo {
            environment: config.environment.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            build: GIT_COMMIT_HASH.to_string(),
        },
    };

    let short_hash = health.system_info.build.get(0..7).unwrap_or_default();

    let mut headers = HeaderMap::new();
    match format!(
        "{}:{}:{}",
        env!("CARGO_PKG_NAME"),
        health.system_info.version,
        short_hash
    )
    .parse::<HeaderValue>()
    {
        Ok(x_app) => {
            debug!("X-App header: {:?}", x_app);
            headers.insert("X-App", x_app);
        }
        Err(err) => error!("Failed to parse X-App header: {}", err),
    }

    (status, headers, Json(health))
}
