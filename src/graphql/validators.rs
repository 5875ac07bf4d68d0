//! Field-level input validation for GraphQL arguments.
//!
//! Each validator produces a message naming the field, e.g.
//! `email must be a valid email address`.

use std::sync::LazyLock;

use async_graphql::{CustomValidator, InputValueError};
use regex::Regex;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
});

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub struct EmailAddress;

impl CustomValidator<String> for EmailAddress {
    fn check(&self, value: &String) -> Result<(), InputValueError<String>> {
        if is_valid_email(value) {
            Ok(())
        } else {
            Err(InputValueError::custom("email must be a valid email address"))
        }
    }
}

/// A lower bound in characters and an upper bound in bytes.
///
/// The upper bound is bcrypt's input limit, which is counted in bytes.
pub struct PasswordLength {
    pub min_chars: usize,
    pub max_bytes: usize,
}

impl CustomValidator<String> for PasswordLength {
    fn check(&self, value: &String) -> Result<(), InputValueError<String>> {
        if value.chars().count() < self.min_chars {
            return Err(InputValueError::custom(format!(
                "password must be at least {} characters in length",
                self.min_chars
            )));
        }
        if value.len() > self.max_bytes {
            return Err(InputValueError::custom(format!(
                "password must be at most {} bytes in length",
                self.max_bytes
            )));
        }

        Ok(())
    }
}

/// Rejects empty or whitespace-only strings.
pub struct NotBlank(pub &'static str);

impl CustomValidator<String> for NotBlank {
    fn check(&self, value: &String) -> Result<(), InputValueError<String>> {
        if value.trim().is_empty() {
            Err(InputValueError::custom(format!("{} is a required field", self.0)))
        } else {
            Ok(())
        }
    }
}
