use clap::{Arg, ArgMatches, Command};

pub const ARG_LIMITER_ENABLED: &str = "limiter-enabled";
pub const ARG_LIMITER_RPS: &str = "limiter-rps";
pub const ARG_LIMITER_BURST: &str = "limiter-burst";
pub const ARG_LIMITER_TRUST_PROXY: &str = "limiter-trust-proxy";

#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub enabled: bool,
    pub rps: f64,
    pub burst: u32,
    pub trust_proxy: bool,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            enabled: matches
                .get_one::<bool>(ARG_LIMITER_ENABLED)
                .copied()
                .unwrap_or(true),
            rps: matches.get_one::<f64>(ARG_LIMITER_RPS).copied().unwrap_or(2.0),
            burst: matches.get_one::<u32>(ARG_LIMITER_BURST).copied().unwrap_or(4),
            trust_proxy: matches
                .get_one::<bool>(ARG_LIMITER_TRUST_PROXY)
                .copied()
                .unwrap_or(false),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_LIMITER_ENABLED)
                .long(ARG_LIMITER_ENABLED)
                .help("Enable per-client rate limiting")
                .default_value("true")
                .env("CUSTODIAN_LIMITER_ENABLED")
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new(ARG_LIMITER_RPS)
                .long(ARG_LIMITER_RPS)
                .help("Sustained requests per second per client")
                .default_value("2")
                .env("CUSTODIAN_LIMITER_RPS")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new(ARG_LIMITER_BURST)
                .long(ARG_LIMITER_BURST)
                .help("Requests a client may burst above the sustained rate")
                .default_value("4")
                .env("CUSTODIAN_LIMITER_BURST")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_LIMITER_TRUST_PROXY)
                .long(ARG_LIMITER_TRUST_PROXY)
                .help("Key clients on X-Forwarded-For / X-Real-IP instead of the peer address")
                .default_value("false")
                .env("CUSTODIAN_LIMITER_TRUST_PROXY")
                .value_parser(clap::value_parser!(bool)),
        )
}
