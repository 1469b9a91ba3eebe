use crate::{
    accounts::{Accounts, AccountsConfig},
    api::{self, ApiConfig},
    cli::commands::{http, limiter, smtp},
    mailer::{LogMailer, Mailer, SmtpConfig, SmtpMailer},
    password,
    ratelimit::{
        LimiterConfig, NoopRateLimiter, RateLimiter, TokenBucketLimiter, DEFAULT_SWEEP_INTERVAL,
    },
    store::{PostgresStore, Store},
    tasks::BackgroundTasks,
};
use anyhow::Result;
use std::sync::Arc;
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::{info, warn};
use url::Url;

const MEMORY_DSN: &str = "memory://";

#[derive(Debug)]
pub struct Args {
    pub http: http::Options,
    pub limiter: limiter::Options,
    pub smtp: smtp::Options,
    pub accounts: AccountsConfig,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the store is unreachable, the listener cannot bind, or
/// shutdown overruns its deadline.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let store = if args.http.dsn.starts_with(MEMORY_DSN) {
        warn!("Using the in-memory store, nothing will be persisted");
        Store::memory()
    } else {
        Store::postgres(PostgresStore::connect(&args.http.dsn, args.http.db_timeout).await?)
    };

    password::warm_up().await?;

    let mailer = mailer(&args.smtp)?;
    let tasks = BackgroundTasks::new(args.smtp.mail_timeout);
    let accounts = Arc::new(Accounts::new(store, mailer, tasks.clone(), args.accounts));

    let (limiter, sweeper) = limiter(&args.limiter);

    let app = api::router(
        accounts,
        limiter,
        ApiConfig {
            environment: args.http.environment.clone(),
            cors_trusted_origins: args.http.cors_trusted_origins.clone(),
            request_timeout: args.http.request_timeout,
            limiter_trust_proxy: args.limiter.trust_proxy,
        },
    )?;

    let listener = TcpListener::bind(format!("::0:{}", args.http.port)).await?;

    info!("Listening on [::]:{}", args.http.port);

    let result = api::serve(
        listener,
        app,
        tasks,
        args.http.shutdown_timeout,
        api::shutdown_signal(),
    )
    .await;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    result
}

fn mailer(options: &smtp::Options) -> Result<Arc<dyn Mailer>> {
    let Some(host) = &options.host else {
        info!("No SMTP host configured, outgoing mail is logged only");
        return Ok(Arc::new(LogMailer));
    };

    let config = SmtpConfig {
        host: host.clone(),
        port: options.port,
        username: options.username.clone(),
        password: options.password.clone(),
        sender: options.sender.clone(),
        starttls: options.starttls,
        timeout: options.mail_timeout,
    };
    Ok(Arc::new(SmtpMailer::new(&config)?))
}

fn limiter(options: &limiter::Options) -> (Arc<dyn RateLimiter>, Option<JoinHandle<()>>) {
    if !options.enabled {
        info!("Rate limiting disabled");
        return (Arc::new(NoopRateLimiter), None);
    }

    let limiter = Arc::new(TokenBucketLimiter::new(LimiterConfig::new(
        options.rps,
        options.burst,
    )));
    let sweeper = limiter.spawn_sweeper(DEFAULT_SWEEP_INTERVAL);
    (limiter, Some(sweeper))
}

fn log_startup_args(args: &Args) {
    info!("{}", startup_summary(args));
}

fn startup_summary(args: &Args) -> String {
    let entries = [
        ("listen", format!("tcp:{}", args.http.port)),
        ("dsn", redact_dsn(&args.http.dsn)),
        ("environment", args.http.environment.clone()),
        (
            "cors_trusted_origins",
            args.http.cors_trusted_origins.join(" "),
        ),
        (
            "limiter",
            if args.limiter.enabled {
                format!("{} rps, burst {}", args.limiter.rps, args.limiter.burst)
            } else {
                "disabled".to_string()
            },
        ),
        (
            "smtp_host",
            args.smtp
                .host
                .clone()
                .unwrap_or_else(|| "none (log only)".to_string()),
        ),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "custodian {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in &entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        message.push_str(&format!("\n  {key}:{padding} {value}"));
    }
    message
}

fn redact_dsn(dsn: &str) -> String {
    if dsn.starts_with(MEMORY_DSN) {
        return dsn.to_string();
    }
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            // never log a password that could not be replaced
            if parsed.password().is_some() && parsed.set_password(Some("REDACTED")).is_err() {
                return "invalid-dsn".to_string();
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_dsn_hides_password() {
        assert_eq!(
            redact_dsn("postgres://user:secret@db:5432/custodian"),
            "postgres://user:REDACTED@db:5432/custodian"
        );
        assert_eq!(
            redact_dsn("postgres://db:5432/custodian"),
            "postgres://db:5432/custodian"
        );
        assert_eq!(redact_dsn("memory://"), "memory://");
        assert_eq!(redact_dsn("not a dsn"), "invalid-dsn");
    }

    #[test]
    fn startup_summary_aligns_and_redacts() {
        let args = Args {
            http: http::Options {
                port: 8080,
                dsn: "postgres://user:secret@db:5432/custodian".to_string(),
                environment: "production".to_string(),
                cors_trusted_origins: vec!["https://app.example.com".to_string()],
                request_timeout: std::time::Duration::from_secs(2),
                db_timeout: std::time::Duration::from_secs(2),
                shutdown_timeout: std::time::Duration::from_secs(5),
            },
            limiter: limiter::Options {
                enabled: true,
                rps: 2.0,
                burst: 4,
                trust_proxy: false,
            },
            smtp: smtp::Options {
                host: None,
                port: 25,
                username: None,
                password: None,
                sender: "custodian <no-reply@custodian.local>".to_string(),
                starttls: false,
                mail_timeout: std::time::Duration::from_secs(1),
            },
            accounts: AccountsConfig::default(),
        };

        let summary = startup_summary(&args);
        assert!(summary.contains("Startup configuration:"));
        assert!(summary.contains("\n  listen:               tcp:8080"));
        assert!(summary.contains("\n  cors_trusted_origins: https://app.example.com"));
        assert!(summary.contains("\n  limiter:              2 rps, burst 4"));
        assert!(summary.contains("\n  smtp_host:            none (log only)"));
        assert!(summary.contains("user:REDACTED@db"));
        assert!(!summary.contains("secret"));
    }

    #[test]
    fn short_commit_truncates() {
        assert_eq!(short_commit("0123456789abcdef"), "0123456");
        assert_eq!(short_commit("abc"), "abc");
    }

    #[test]
    fn log_mailer_without_smtp_host() {
        let options = smtp::Options {
            host: None,
            port: 25,
            username: None,
            password: None,
            sender: "custodian <no-reply@custodian.local>".to_string(),
            starttls: false,
            mail_timeout: std::time::Duration::from_secs(1),
        };
        assert!(mailer(&options).is_ok());
    }

    #[tokio::test]
    async fn disabled_limiter_has_no_sweeper() {
        let (limiter, sweeper) = limiter(&limiter::Options {
            enabled: false,
            rps: 2.0,
            burst: 4,
            trust_proxy: false,
        });
        assert!(sweeper.is_none());
        for _ in 0..50 {
            assert_eq!(
                limiter.check("198.51.100.1"),
                crate::ratelimit::RateLimitDecision::Allowed
            );
        }
    }

    #[tokio::test]
    async fn enabled_limiter_spawns_sweeper() {
        let (limiter, sweeper) = limiter(&limiter::Options {
            enabled: true,
            rps: 1.0,
            burst: 1,
            trust_proxy: false,
        });
        let sweeper = sweeper.unwrap();
        assert_eq!(
            limiter.check("198.51.100.1"),
            crate::ratelimit::RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check("198.51.100.1"),
            crate::ratelimit::RateLimitDecision::Limited
        );
        sweeper.abort();
    }
}
