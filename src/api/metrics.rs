//! Request accounting.
//!
//! Every request is recorded twice: on the global OpenTelemetry meter, which is a
//! noop unless an OTLP endpoint is configured, and in process totals served by
//! `GET /debug/vars`.

use super::types::RequestTotals;
use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
    KeyValue,
};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

pub struct HttpMetrics {
    received: AtomicU64,
    sent: AtomicU64,
    processing_us: AtomicU64,
    requests: Counter<u64>,
    duration: Histogram<f64>,
}

impl HttpMetrics {
    #[must_use]
    pub fn new() -> Self {
        let meter = global::meter(env!("CARGO_PKG_NAME"));
        Self {
            received: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            processing_us: AtomicU64::new(0),
            requests: meter
                .u64_counter("http.server.requests")
                .with_description("Responses sent, by method, route and status")
                .build(),
            duration: meter
                .f64_histogram("http.server.duration")
                .with_description("Time spent producing a response")
                .with_unit("ms")
                .build(),
        }
    }

    fn received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    fn sent(&self, attributes: &[KeyValue], elapsed: Duration) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        self.processing_us.fetch_add(
            u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
        self.requests.add(1, attributes);
        self.duration.record(elapsed.as_secs_f64() * 1000.0, attributes);
    }

    #[must_use]
    pub fn totals(&self) -> RequestTotals {
        RequestTotals {
            total_requests_received: self.received.load(Ordering::Relaxed),
            total_responses_sent: self.sent.load(Ordering::Relaxed),
            total_processing_time_us: self.processing_us.load(Ordering::Relaxed),
        }
    }
}

impl Default for HttpMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HttpMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMetrics")
            .field("totals", &self.totals())
            .finish_non_exhaustive()
    }
}

/// Count the request on the way in and the response on the way out.
pub async fn track(
    State(metrics): State<Arc<HttpMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    metrics.received();

    let method = request.method().to_string();
    // unmatched paths share one label so scanners cannot grow the series count
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_string(), |path| path.as_str().to_string());

    let response = next.run(request).await;

    metrics.sent(
        &[
            KeyValue::new("http.request.method", method),
            KeyValue::new("http.route", route),
            KeyValue::new(
                "http.response.status_code",
                i64::from(response.status().as_u16()),
            ),
        ],
        started.elapsed(),
    );
    response
}
