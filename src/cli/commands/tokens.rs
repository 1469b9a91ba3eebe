use crate::accounts::AccountsConfig;
use clap::{Arg, ArgMatches, Command};
use std::time::Duration;

pub const ARG_VERIFICATION_TOKEN_TTL: &str = "verification-token-ttl-seconds";
pub const ARG_AUTHENTICATION_TOKEN_TTL: &str = "authentication-token-ttl-seconds";

#[must_use]
pub fn parse(matches: &ArgMatches) -> AccountsConfig {
    let mut config = AccountsConfig::new();
    if let Some(&seconds) = matches.get_one::<u64>(ARG_VERIFICATION_TOKEN_TTL) {
        config = config.with_verification_token_ttl(Duration::from_secs(seconds));
    }
    if let Some(&seconds) = matches.get_one::<u64>(ARG_AUTHENTICATION_TOKEN_TTL) {
        config = config.with_authentication_token_ttl(Duration::from_secs(seconds));
    }
    config
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_VERIFICATION_TOKEN_TTL)
                .long(ARG_VERIFICATION_TOKEN_TTL)
                .help("Lifetime of mailed verification tokens")
                .default_value("129600")
                .env("CUSTODIAN_VERIFICATION_TOKEN_TTL_SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_AUTHENTICATION_TOKEN_TTL)
                .long(ARG_AUTHENTICATION_TOKEN_TTL)
                .help("Lifetime of bearer tokens issued at login")
                .default_value("129600")
                .env("CUSTODIAN_AUTHENTICATION_TOKEN_TTL_SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
