//! Input checks shared by the account flows.

use super::AccountError;
use crate::password::{MAX_PASSWORD_BYTES, MIN_PASSWORD_BYTES};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

const MAX_EMAIL_BYTES: usize = 254;

/// Field name to first problem found with it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<&'static str, String>);

impl FieldErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` for `field` unless it already has one.
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_insert_with(|| message.into());
    }

    pub fn check(&mut self, ok: bool, field: &'static str, message: &str) {
        if !ok {
            self.add(field, message);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// # Errors
    /// Returns `AccountError::Validation` if any field failed.
    pub fn finish(self) -> Result<(), AccountError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AccountError::Validation(self))
        }
    }
}

/// Normalize an email for lookup and uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

pub fn email(errors: &mut FieldErrors, email: &str) {
    errors.check(!email.is_empty(), "email", "must be provided");
    errors.check(
        email.len() <= MAX_EMAIL_BYTES,
        "email",
        "must not be more than 254 bytes long",
    );
    errors.check(valid_email(email), "email", "must be a valid email address");
}

pub fn password(errors: &mut FieldErrors, password: &str) {
    errors.check(!password.is_empty(), "password", "must be provided");
    errors.check(
        password.len() >= MIN_PASSWORD_BYTES,
        "password",
        "must be at least 8 bytes long",
    );
    errors.check(
        password.len() <= MAX_PASSWORD_BYTES,
        "password",
        "must not be more than 72 bytes long",
    );
}

pub fn token(errors: &mut FieldErrors, token: &str) {
    errors.check(!token.trim().is_empty(), "token", "must be provided");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
        assert!(!valid_email("spaces in@x.com"));
    }

    #[test]
    fn empty_email_reports_required_first() {
        let mut errors = FieldErrors::new();
        email(&mut errors, "");
        assert_eq!(errors.get("email"), Some("must be provided"));
    }

    #[test]
    fn overlong_email_is_rejected() {
        let mut errors = FieldErrors::new();
        let long = format!("{}@x.com", "a".repeat(260));
        email(&mut errors, &long);
        assert_eq!(
            errors.get("email"),
            Some("must not be more than 254 bytes long")
        );
    }

    #[test]
    fn password_length_bounds() {
        let mut errors = FieldErrors::new();
        password(&mut errors, "short");
        assert_eq!(errors.get("password"), Some("must be at least 8 bytes long"));

        let mut errors = FieldErrors::new();
        password(&mut errors, &"x".repeat(73));
        assert_eq!(
            errors.get("password"),
            Some("must not be more than 72 bytes long")
        );

        let mut errors = FieldErrors::new();
        password(&mut errors, &"x".repeat(72));
        password(&mut errors, &"x".repeat(8));
        assert!(errors.is_empty());
    }

    #[test]
    fn errors_collect_per_field() {
        let mut errors = FieldErrors::new();
        email(&mut errors, "nope");
        password(&mut errors, "");
        token(&mut errors, "  ");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json["email"], "must be a valid email address");
        assert_eq!(json["password"], "must be provided");
        assert_eq!(json["token"], "must be provided");
        assert!(matches!(errors.finish(), Err(AccountError::Validation(_))));
    }

    #[test]
    fn finish_ok_when_clean() {
        let mut errors = FieldErrors::new();
        email(&mut errors, "a@x.com");
        password(&mut errors, "long-enough");
        token(&mut errors, "abc");
        assert!(errors.finish().is_ok());
    }
}
