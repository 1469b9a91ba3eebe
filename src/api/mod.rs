//! HTTP surface: routing, middleware stack and the serve/shutdown sequence.

use crate::{accounts::Accounts, ratelimit::RateLimiter, tasks::BackgroundTasks};
use anyhow::{anyhow, bail, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{self, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request, StatusCode,
    },
    middleware::{from_fn_with_state, map_response},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Extension, Json, Router,
};
use std::{any::Any, future::Future, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::oneshot};
use tower::{Layer, ServiceBuilder};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    normalize_path::NormalizePathLayer,
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;
use url::Url;

pub mod error;
pub(crate) mod handlers;
pub mod metrics;
pub mod middleware;
pub mod openapi;
pub mod types;

use error::ApiError;
use handlers::{debug, health, tokens, users};
use metrics::HttpMetrics;
use middleware::Limiting;

pub use openapi::openapi;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Reported by the health check.
    pub environment: String,
    pub cors_trusted_origins: Vec<String>,
    pub request_timeout: Duration,
    pub limiter_trust_proxy: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            cors_trusted_origins: Vec::new(),
            request_timeout: Duration::from_secs(2),
            limiter_trust_proxy: false,
        }
    }
}

/// Build the application router with every middleware layer applied. A trailing
/// slash is trimmed before routing, so `/v1/users/me/` reaches `/v1/users/me`.
///
/// # Errors
/// Returns an error if a trusted CORS origin is not a valid URL.
pub fn router(
    accounts: Arc<Accounts>,
    limiter: Arc<dyn RateLimiter>,
    config: ApiConfig,
) -> Result<Router> {
    let origins = config
        .cors_trusted_origins
        .iter()
        .map(|origin| trusted_origin(origin))
        .collect::<Result<Vec<_>>>()?;

    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_origin(AllowOrigin::list(origins));

    let limiting = Limiting {
        limiter,
        trust_proxy: config.limiter_trust_proxy,
    };
    let request_timeout = config.request_timeout;
    let http_metrics = Arc::new(HttpMetrics::new());

    let app = Router::new()
        .route("/health", get(health::health))
        .route(
            "/v1/tokens/verification/registration",
            post(tokens::request_registration_token),
        )
        .route(
            "/v1/tokens/verification/password-reset",
            post(tokens::request_password_reset_token),
        )
        .route(
            "/v1/tokens/verification/email-change",
            post(tokens::request_email_change_token),
        )
        .route(
            "/v1/tokens/verification/account-deletion",
            post(tokens::request_account_deletion_token),
        )
        .route(
            "/v1/tokens/authentication",
            post(tokens::create_authentication_token).delete(tokens::delete_authentication_tokens),
        )
        .route("/v1/users", post(users::register_user))
        .route("/v1/users/password", put(users::reset_password))
        .route(
            "/v1/users/me",
            get(users::show_current_user)
                .put(users::update_current_user)
                .delete(users::delete_current_user),
        )
        .route("/debug/vars", get(debug::vars))
        .fallback(handlers::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(from_fn_with_state(Arc::clone(&http_metrics), metrics::track))
                .layer(CatchPanicLayer::custom(handle_panic))
                .layer(map_response(envelope_bare_statuses))
                .layer(TimeoutLayer::new(request_timeout))
                .layer(cors)
                .layer(from_fn_with_state(limiting, middleware::rate_limit))
                .layer(from_fn_with_state(
                    Arc::clone(&accounts),
                    middleware::authenticate,
                ))
                .layer(Extension(accounts))
                .layer(Extension(http_metrics))
                .layer(Extension(Arc::new(config))),
        );

    // Router::layer runs after routing, so normalization has to wrap the whole app
    Ok(Router::new().fallback_service(NormalizePathLayer::trim_trailing_slash().layer(app)))
}

/// Serve `app` until `signal` resolves, then drain in-flight requests and
/// background tasks, each within `shutdown_timeout`.
///
/// # Errors
/// Returns an error if the server fails, or if either drain phase overruns.
pub async fn serve<F>(
    listener: TcpListener,
    app: Router,
    tasks: BackgroundTasks,
    shutdown_timeout: Duration,
    signal: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (stopping_tx, stopping_rx) = oneshot::channel();

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        signal.await;
        info!("Shutdown signal received, draining in-flight requests");
        let _ = stopping_tx.send(());
    });

    let mut server = tokio::spawn(async move { server.await });

    tokio::select! {
        result = &mut server => {
            // stopped without a signal
            result.context("server task failed")??;
            return Ok(());
        }
        Ok(()) = stopping_rx => {}
    }

    match tokio::time::timeout(shutdown_timeout, &mut server).await {
        Ok(result) => result.context("server task failed")??,
        Err(_) => {
            server.abort();
            bail!("in-flight requests did not drain within {shutdown_timeout:?}");
        }
    }

    info!(
        outstanding = tasks.outstanding(),
        "Waiting for background tasks"
    );
    if tokio::time::timeout(shutdown_timeout, tasks.wait())
        .await
        .is_err()
    {
        bail!(
            "{} background task(s) still running after {shutdown_timeout:?}",
            tasks.outstanding()
        );
    }

    info!("Gracefully shutdown");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => {},
        () = terminate => {},
    }
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    error!(panic = detail, "handler panicked");

    let mut response = ApiError::Internal.into_response();
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}

/// The timeout layer answers with a bare 408 and the router with a bare 405;
/// give both the JSON envelope, keeping headers such as `Allow`.
async fn envelope_bare_statuses(response: Response) -> Response {
    let message = match response.status() {
        StatusCode::REQUEST_TIMEOUT => "request timed out",
        StatusCode::METHOD_NOT_ALLOWED => "method not allowed",
        _ => return response,
    };

    let (mut parts, _) = response.into_parts();
    let (envelope, body) = Json(serde_json::json!({ "error": message }))
        .into_response()
        .into_parts();
    parts.headers.remove(CONTENT_LENGTH);
    parts.headers.extend(envelope.headers);
    Response::from_parts(parts, body)
}

fn trusted_origin(origin: &str) -> Result<HeaderValue> {
    let parsed =
        Url::parse(origin).with_context(|| format!("Invalid trusted origin: {origin}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Trusted origin must include a valid host: {origin}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build trusted origin header")
}
