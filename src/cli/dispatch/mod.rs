use crate::cli::{
    actions::{server::Args, Action},
    commands::{http, limiter, smtp, tokens},
};
use anyhow::Result;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    Ok(Action::Server(Args {
        http: http::Options::parse(matches)?,
        limiter: limiter::Options::parse(matches),
        smtp: smtp::Options::parse(matches),
        accounts: tokens::parse(matches),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;

    #[test]
    fn handler_builds_server_action() {
        temp_env::with_vars([("CUSTODIAN_SMTP_HOST", None::<&str>)], || {
            let matches = commands::new().get_matches_from(vec![
                "custodian",
                "--dsn",
                "memory://",
                "--port",
                "8181",
            ]);
            let Action::Server(args) = handler(&matches).unwrap();
            assert_eq!(args.http.port, 8181);
            assert_eq!(args.http.dsn, "memory://");
            assert!(args.smtp.host.is_none());
        });
    }
}
