//! Outbound mail.
//!
//! Sending only ever happens from background tasks; a failure is logged there
//! and never reaches the request that asked for the mail.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::info;

/// Which message to render.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Template {
    Registration,
    EmailChange,
    PasswordReset,
    AccountDeletion,
}

impl Template {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::EmailChange => "email-change",
            Self::PasswordReset => "password-reset",
            Self::AccountDeletion => "account-deletion",
        }
    }

    #[must_use]
    pub const fn subject(self) -> &'static str {
        match self {
            Self::Registration => "Confirm your email address",
            Self::EmailChange => "Confirm your new email address",
            Self::PasswordReset => "Reset your password",
            Self::AccountDeletion => "Confirm account deletion",
        }
    }

    /// Plain-text body carrying the token.
    #[must_use]
    pub fn render(self, data: &TemplateData) -> String {
        let action = match self {
            Self::Registration => "finish creating your account",
            Self::EmailChange => "confirm this as your new email address",
            Self::PasswordReset => "choose a new password",
            Self::AccountDeletion => "permanently delete your account",
        };
        format!(
            "Hello,\n\n\
             Use the following token to {action}:\n\n\
             {token}\n\n\
             The token expires at {expiry}. If you did not ask for this, ignore this message.\n",
            token = data.token.expose_secret(),
            expiry = data.expiry.format("%Y-%m-%d %H:%M UTC"),
        )
    }
}

#[derive(Debug)]
pub struct TemplateData {
    pub token: SecretString,
    pub expiry: DateTime<Utc>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, recipient: &str, template: Template, data: &TemplateData) -> Result<()>;
}

/// Used when no SMTP relay is configured. Records that a mail would have gone out;
/// the body is never logged since it carries a live token.
#[derive(Clone, Debug)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, recipient: &str, template: Template, _data: &TemplateData) -> Result<()> {
        info!(
            to_email = %recipient,
            template = template.name(),
            "mail delivery skipped, no SMTP relay configured"
        );
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub sender: String,
    pub starttls: bool,
    pub timeout: Duration,
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
}

impl SmtpMailer {
    /// Build the relay transport. No connection is opened until the first send.
    ///
    /// # Errors
    /// Returns an error if the sender address or relay host is invalid.
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let sender: Mailbox = config
            .sender
            .parse()
            .with_context(|| format!("invalid SMTP sender address: {}", config.sender))?;

        let mut builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .with_context(|| format!("invalid SMTP relay: {}", config.host))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };
        builder = builder.port(config.port).timeout(Some(config.timeout));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                password.expose_secret().to_string(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            sender,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, recipient: &str, template: Template, data: &TemplateData) -> Result<()> {
        let to: Mailbox = recipient
            .parse()
            .with_context(|| format!("invalid recipient address: {recipient}"))?;

        let message = Message::builder()
            .from(self.sender.clone())
            .to(to)
            .subject(template.subject())
            .header(ContentType::TEXT_PLAIN)
            .body(template.render(data))
            .context("failed to build mail message")?;

        self.transport
            .send(message)
            .await
            .with_context(|| format!("failed to deliver {} mail", template.name()))?;

        info!(to_email = %recipient, template = template.name(), "mail delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> TemplateData {
        TemplateData {
            token: SecretString::from("tok_abc123"),
            expiry: DateTime::parse_from_rfc3339("2030-01-02T03:04:05Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    #[test]
    fn render_includes_token_and_expiry() {
        let body = Template::PasswordReset.render(&data());
        assert!(body.contains("tok_abc123"));
        assert!(body.contains("2030-01-02 03:04 UTC"));
        assert!(body.contains("choose a new password"));
    }

    #[test]
    fn templates_have_distinct_subjects() {
        let subjects = [
            Template::Registration.subject(),
            Template::EmailChange.subject(),
            Template::PasswordReset.subject(),
            Template::AccountDeletion.subject(),
        ];
        for (i, a) in subjects.iter().enumerate() {
            for b in &subjects[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        LogMailer
            .send("a@x.com", Template::Registration, &data())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn smtp_mailer_rejects_bad_sender() {
        let config = SmtpConfig {
            host: "localhost".to_string(),
            port: 1025,
            username: None,
            password: None,
            sender: "not an address".to_string(),
            starttls: false,
            timeout: Duration::from_secs(1),
        };
        assert!(SmtpMailer::new(&config).is_err());
    }

    #[tokio::test]
    async fn smtp_mailer_builds_without_connecting() {
        let config = SmtpConfig {
            host: "localhost".to_string(),
            port: 1025,
            username: Some("user".to_string()),
            password: Some(SecretString::from("pass")),
            sender: "Custodian <no-reply@custodian.local>".to_string(),
            starttls: false,
            timeout: Duration::from_secs(1),
        };
        assert!(SmtpMailer::new(&config).is_ok());
    }
}
