use thiserror::Error;

use crate::backend::{AccountId, BackendError};
use crate::models::ValidationErrors;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The account exists but its profile write failed; retry the profile
    /// write rather than the whole sign-up.
    #[error("Account {account_id} created but profile was not saved: {reason}")]
    PartialSignup { account_id: AccountId, reason: String },

    #[error("Another sign-in operation is already in progress")]
    OperationInProgress,

    #[error("Persisted session is corrupt: {0}")]
    CorruptPersistedState(String),

    #[error("Already signed in")]
    AlreadyAuthenticated,

    #[error("Not signed in")]
    NotAuthenticated,

    /// The session was logged out or replaced while the backend call ran;
    /// its result was discarded.
    #[error("Session changed while the request was in flight")]
    Superseded,
}

impl SessionError {
    /// Only transport failures are worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::BackendUnavailable(_))
    }

    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Validation(errors) => errors.to_string(),
            SessionError::InvalidCredentials(_) => {
                "Invalid email, phone or password. Check your details or sign up.".to_string()
            }
            SessionError::BackendUnavailable(_) => {
                "Unable to reach EduHub. Check your internet connection and try again.".to_string()
            }
            SessionError::PartialSignup { .. } => {
                "Your account was created but your profile could not be saved. Retry saving your profile."
                    .to_string()
            }
            SessionError::OperationInProgress => {
                "Please wait for the current sign-in to finish.".to_string()
            }
            SessionError::CorruptPersistedState(_) => {
                "Your saved session could not be read and has been cleared.".to_string()
            }
            SessionError::AlreadyAuthenticated => {
                "You are already signed in. Log out first.".to_string()
            }
            SessionError::NotAuthenticated => "You need to sign in first.".to_string(),
            SessionError::Superseded => {
                "The request was cancelled because the session changed.".to_string()
            }
        }
    }
}

impl From<ValidationErrors> for SessionError {
    fn from(errors: ValidationErrors) -> Self {
        SessionError::Validation(errors)
    }
}

impl From<BackendError> for SessionError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Credential(msg) | BackendError::NotFound(msg) => {
                SessionError::InvalidCredentials(msg)
            }
            BackendError::Validation(msg) => {
                SessionError::Validation(ValidationErrors::single("profile", msg))
            }
            BackendError::Conflict => SessionError::Validation(ValidationErrors::single(
                "identifier",
                "An account with this email or phone number already exists.",
            )),
            BackendError::Unavailable(msg) => SessionError::BackendUnavailable(msg),
        }
    }
}
