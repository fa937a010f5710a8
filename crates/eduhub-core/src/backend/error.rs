use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Invalid credentials: {0}")]
    Credential(String),

    #[error("Rejected by backend: {0}")]
    Validation(String),

    #[error("Identifier is already registered")]
    Conflict,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl BackendError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            400 | 422 => BackendError::Validation(truncated),
            401 | 403 => BackendError::Credential(truncated),
            404 => BackendError::NotFound(truncated),
            409 => BackendError::Conflict,
            429 => BackendError::Unavailable("rate limited".to_string()),
            500..=599 => BackendError::Unavailable(truncated),
            _ => BackendError::Unavailable(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Only transport-level failures may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Unavailable(_))
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            BackendError::Unavailable(format!("Invalid response: {}", e))
        } else {
            BackendError::Unavailable(e.to_string())
        }
    }
}
