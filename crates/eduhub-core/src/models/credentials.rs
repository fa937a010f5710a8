use std::fmt;

use super::validation::ValidationErrors;

/// Minimum secret length accepted at sign-up and login.
const MIN_SECRET_LENGTH: usize = 6;

/// Maximum length for the account identifier.
/// Identifiers are email addresses or phone numbers; 254 covers any valid email.
const MAX_IDENTIFIER_LENGTH: usize = 254;

/// Maximum secret length.
/// 128 chars accommodates password managers and passphrases.
const MAX_SECRET_LENGTH: usize = 128;

/// Identifier and secret presented to the backend. Never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub identifier: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into().trim().to_string(),
            secret: secret.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.identifier.is_empty() {
            errors.push("identifier", "Please enter your email or phone number.");
        } else if self.identifier.chars().count() > MAX_IDENTIFIER_LENGTH
            || self.identifier.chars().any(char::is_control)
        {
            errors.push("identifier", "Please enter a valid email or phone number.");
        }

        let secret_len = self.secret.chars().count();
        if secret_len < MIN_SECRET_LENGTH {
            errors.push("secret", "Password must be at least 6 characters.");
        } else if secret_len > MAX_SECRET_LENGTH {
            errors.push("secret", "Password must be at most 128 characters.");
        }

        errors.into_result()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .finish()
    }
}
