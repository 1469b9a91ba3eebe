use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use std::time::Duration;

pub const ARG_SMTP_HOST: &str = "smtp-host";
pub const ARG_SMTP_PORT: &str = "smtp-port";
pub const ARG_SMTP_USERNAME: &str = "smtp-username";
pub const ARG_SMTP_PASSWORD: &str = "smtp-password";
pub const ARG_SMTP_SENDER: &str = "smtp-sender";
pub const ARG_SMTP_STARTTLS: &str = "smtp-starttls";
pub const ARG_MAIL_TIMEOUT: &str = "mail-timeout-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    /// `None` means mail is logged instead of sent.
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub sender: String,
    pub starttls: bool,
    pub mail_timeout: Duration,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        // env vars set to "" come through as empty strings
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        Self {
            host: get_non_empty(ARG_SMTP_HOST),
            port: matches.get_one::<u16>(ARG_SMTP_PORT).copied().unwrap_or(25),
            username: get_non_empty(ARG_SMTP_USERNAME),
            password: get_non_empty(ARG_SMTP_PASSWORD).map(SecretString::from),
            sender: get_non_empty(ARG_SMTP_SENDER)
                .unwrap_or_else(|| "custodian <no-reply@custodian.local>".to_string()),
            starttls: matches
                .get_one::<bool>(ARG_SMTP_STARTTLS)
                .copied()
                .unwrap_or(false),
            mail_timeout: Duration::from_secs(
                matches.get_one::<u64>(ARG_MAIL_TIMEOUT).copied().unwrap_or(10),
            ),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SMTP_HOST)
                .long(ARG_SMTP_HOST)
                .help("SMTP relay host; without it mail is only logged")
                .env("CUSTODIAN_SMTP_HOST"),
        )
        .arg(
            Arg::new(ARG_SMTP_PORT)
                .long(ARG_SMTP_PORT)
                .help("SMTP relay port")
                .default_value("25")
                .env("CUSTODIAN_SMTP_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_SMTP_USERNAME)
                .long(ARG_SMTP_USERNAME)
                .help("SMTP username")
                .env("CUSTODIAN_SMTP_USERNAME"),
        )
        .arg(
            Arg::new(ARG_SMTP_PASSWORD)
                .long(ARG_SMTP_PASSWORD)
                .help("SMTP password")
                .env("CUSTODIAN_SMTP_PASSWORD")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_SMTP_SENDER)
                .long(ARG_SMTP_SENDER)
                .help("From address for outgoing mail")
                .default_value("custodian <no-reply@custodian.local>")
                .env("CUSTODIAN_SMTP_SENDER"),
        )
        .arg(
            Arg::new(ARG_SMTP_STARTTLS)
                .long(ARG_SMTP_STARTTLS)
                .help("Require STARTTLS when talking to the relay")
                .default_value("false")
                .env("CUSTODIAN_SMTP_STARTTLS")
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new(ARG_MAIL_TIMEOUT)
                .long(ARG_MAIL_TIMEOUT)
                .help("Deadline for delivering a single mail")
                .default_value("10")
                .env("CUSTODIAN_MAIL_TIMEOUT_SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
