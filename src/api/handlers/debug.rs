use crate::{
    accounts::Accounts,
    api::{metrics::HttpMetrics, types::DebugVars},
    GIT_COMMIT_HASH,
};
use axum::{extract::Extension, response::Json};
use std::sync::Arc;

#[utoipa::path(
    get,
    path= "/debug/vars",
    responses (
        (status = 200, description = "Request totals and connection pool counters", body = DebugVars)
    ),
    tag= "debug"
)]
pub async fn vars(
    Extension(accounts): Extension<Arc<Accounts>>,
    Extension(metrics): Extension<Arc<HttpMetrics>>,
) -> Json<DebugVars> {
    Json(DebugVars {
        version: env!("CARGO_PKG_VERSION").to_string(),
        build: GIT_COMMIT_HASH.to_string(),
        requests: metrics.totals(),
        database: accounts.store().pool_stats().map(Into::into),
    })
}
