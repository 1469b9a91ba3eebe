//! Per-client token bucket rate limiting.
//!
//! Every client key gets its own `governor` limiter, created lazily and full on
//! first sight. A sweeper task evicts clients that have been idle past the
//! retention window, so an evicted key comes back exactly like a brand new one.
//!
//! The client map sits behind one mutex. `allow` and `sweep` both run under it,
//! so a limiter is never dropped while a concurrent `allow` is consulting it.
//! Limiters read time through [`TokioClock`], which keeps them in step with
//! `tokio::time` and lets tests drive refills with a paused clock.

use axum::http::HeaderMap;
use governor::{
    clock::Clock,
    middleware::NoOpMiddleware,
    nanos::Nanos,
    state::{InMemoryState, NotKeyed},
    Quota,
};
use std::{
    collections::HashMap,
    num::NonZeroU32,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::{task::JoinHandle, time::Instant};
use tracing::debug;

/// How long a client may sit unused before the sweeper drops it.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(3 * 60);
/// How often the sweeper runs.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// Slowest refill accepted, one token per day.
const MAX_REPLENISH_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

/// Admission control consulted before any request reaches the account flows.
pub trait RateLimiter: Send + Sync {
    fn check(&self, key: &str) -> RateLimitDecision;
}

/// Limiter used when rate limiting is disabled.
#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check(&self, _key: &str) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LimiterConfig {
    rps: f64,
    burst: u32,
    retention: Duration,
}

impl LimiterConfig {
    #[must_use]
    pub fn new(rps: f64, burst: u32) -> Self {
        Self {
            rps,
            burst,
            retention: DEFAULT_RETENTION,
        }
    }

    #[must_use]
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Clamp nonsensical values: a zero burst would reject everything forever.
    #[must_use]
    pub fn normalize(self) -> Self {
        let rps = if self.rps.is_finite() && self.rps > 0.0 {
            self.rps
        } else {
            1.0
        };
        Self {
            rps,
            burst: self.burst.max(1),
            retention: self.retention,
        }
    }

    #[must_use]
    pub fn rps(&self) -> f64 {
        self.rps
    }

    #[must_use]
    pub fn burst(&self) -> u32 {
        self.burst
    }

    #[must_use]
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// One token every `1 / rps` seconds, up to `burst` stored.
    fn quota(&self) -> Quota {
        let period = Duration::try_from_secs_f64(1.0 / self.rps)
            .map_or(MAX_REPLENISH_PERIOD, |period| period.min(MAX_REPLENISH_PERIOD));
        Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MAX))
            .allow_burst(NonZeroU32::new(self.burst).unwrap_or(NonZeroU32::MIN))
    }
}

/// `governor` clock reading `tokio::time`, as nanoseconds since the limiter was built.
#[derive(Clone, Debug)]
pub struct TokioClock {
    epoch: Instant,
}

impl TokioClock {
    fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    type Instant = Nanos;

    fn now(&self) -> Nanos {
        Nanos::from(Instant::now().saturating_duration_since(self.epoch))
    }
}

type ClientLimiter =
    governor::RateLimiter<NotKeyed, InMemoryState, TokioClock, NoOpMiddleware<Nanos>>;

struct Client {
    limiter: ClientLimiter,
    last_seen: Instant,
}

pub struct TokenBucketLimiter {
    config: LimiterConfig,
    quota: Quota,
    clock: TokioClock,
    clients: Mutex<HashMap<String, Client>>,
}

impl std::fmt::Debug for TokenBucketLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucketLimiter")
            .field("config", &self.config)
            .field("quota", &self.quota)
            .finish_non_exhaustive()
    }
}

impl TokenBucketLimiter {
    #[must_use]
    pub fn new(config: LimiterConfig) -> Self {
        let config = config.normalize();
        Self {
            quota: config.quota(),
            config,
            clock: TokioClock::new(),
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn clients(&self) -> MutexGuard<'_, HashMap<String, Client>> {
        // a panic mid-check leaves at most one stale timestamp behind, keep serving
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consume one token for `key` if one is available.
    pub fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut clients = self.clients();

        let client = clients.entry(key.to_string()).or_insert_with(|| Client {
            limiter: governor::RateLimiter::direct_with_clock(self.quota, &self.clock),
            last_seen: now,
        });
        client.last_seen = now;
        client.limiter.check().is_ok()
    }

    /// Drop clients idle longer than the retention window. Returns how many went.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let retention = self.config.retention;
        let mut clients = self.clients();
        let before = clients.len();
        clients.retain(|_, client| now.saturating_duration_since(client.last_seen) <= retention);
        before - clients.len()
    }

    /// Number of tracked clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run [`sweep`](Self::sweep) every `every` until the handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // the first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let evicted = limiter.sweep();
                if evicted > 0 {
                    debug!(evicted, remaining = limiter.len(), "rate limiter sweep");
                }
            }
        })
    }
}

impl RateLimiter for TokenBucketLimiter {
    fn check(&self, key: &str) -> RateLimitDecision {
        if self.allow(key) {
            RateLimitDecision::Allowed
        } else {
            RateLimitDecision::Limited
        }
    }
}

/// Client address as reported by a reverse proxy, first hop wins.
#[must_use]
pub fn forwarded_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn limiter(rps: f64, burst: u32) -> TokenBucketLimiter {
        TokenBucketLimiter::new(LimiterConfig::new(rps, burst))
    }

    #[test]
    fn noop_rate_limiter_allows() {
        let limiter = NoopRateLimiter;
        for _ in 0..100 {
            assert_eq!(limiter.check("1.2.3.4"), RateLimitDecision::Allowed);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_then_reject_then_refill() {
        let limiter = limiter(2.0, 4);

        for _ in 0..4 {
            assert!(limiter.allow("10.0.0.1"));
        }
        assert!(!limiter.allow("10.0.0.1"));

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(limiter.allow("10.0.0.1"));
        assert!(!limiter.allow("10.0.0.1"));
    }

    #[tokio::test(start_paused = true)]
    async fn refill_is_capped_at_burst() {
        let limiter = limiter(10.0, 3);
        for _ in 0..3 {
            assert!(limiter.allow("k"));
        }

        tokio::time::advance(Duration::from_secs(60)).await;
        let admitted = (0..20).filter(|_| limiter.allow("k")).count();
        // a minute at 10 rps would be 600 tokens, idling banks one burst at most
        assert!((3..=4).contains(&admitted), "admitted {admitted}");
        assert!(!limiter.allow("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let limiter = limiter(1.0, 1);
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
        assert!(limiter.allow("b"));
        assert_eq!(limiter.check("a"), RateLimitDecision::Limited);
        assert_eq!(limiter.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_keys_are_evicted_and_come_back_fresh() {
        let limiter = limiter(0.01, 2);
        assert!(limiter.allow("idle"));
        assert!(limiter.allow("idle"));
        assert!(!limiter.allow("idle"));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(limiter.allow("busy"));
        assert_eq!(limiter.sweep(), 0);

        tokio::time::advance(DEFAULT_RETENTION).await;
        assert!(limiter.allow("busy"));
        // "idle" was last seen 4 minutes ago
        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.len(), 1);

        // a fresh limiter: full burst, exactly like a never-seen key
        assert!(limiter.allow("idle"));
        assert!(limiter.allow("idle"));
        assert!(!limiter.allow("idle"));
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_task_evicts_in_background() {
        let limiter = Arc::new(limiter(1.0, 1));
        assert!(limiter.allow("gone-soon"));

        let sweeper = limiter.spawn_sweeper(DEFAULT_SWEEP_INTERVAL);
        tokio::time::sleep(DEFAULT_RETENTION + DEFAULT_SWEEP_INTERVAL * 2).await;

        assert!(limiter.is_empty());
        sweeper.abort();
    }

    #[tokio::test]
    async fn concurrent_callers_never_exceed_burst() {
        let limiter = Arc::new(limiter(0.001, 50));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                (0..20).filter(|_| limiter.allow("shared")).count()
            }));
        }
        let mut admitted = 0;
        for handle in handles {
            admitted += handle.await.unwrap();
        }
        assert_eq!(admitted, 50);
    }

    #[test]
    fn config_normalize_clamps() {
        let config = LimiterConfig::new(-3.0, 0).normalize();
        assert!((config.rps() - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.burst(), 1);

        let config = LimiterConfig::new(f64::NAN, 5).normalize();
        assert!((config.rps() - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.burst(), 5);
        assert_eq!(config.retention(), DEFAULT_RETENTION);
    }

    #[test]
    fn quota_follows_rps_and_burst() {
        let quota = LimiterConfig::new(2.0, 4).normalize().quota();
        assert_eq!(quota.replenish_interval(), Duration::from_millis(500));
        assert_eq!(quota.burst_size().get(), 4);

        let quota = LimiterConfig::new(0.5, 1).normalize().quota();
        assert_eq!(quota.replenish_interval(), Duration::from_secs(2));

        // absurdly slow rates are capped instead of overflowing
        let quota = LimiterConfig::new(1e-12, 1).normalize().quota();
        assert_eq!(quota.replenish_interval(), MAX_REPLENISH_PERIOD);
    }

    #[test]
    fn forwarded_client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 5.6.7.8"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(forwarded_client_ip(&headers), Some("1.2.3.4".to_string()));
    }

    #[test]
    fn forwarded_client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static(" 9.9.9.9 "));
        assert_eq!(forwarded_client_ip(&headers), Some("9.9.9.9".to_string()));
    }

    #[test]
    fn forwarded_client_ip_none_when_missing() {
        assert_eq!(forwarded_client_ip(&HeaderMap::new()), None);
    }
}
