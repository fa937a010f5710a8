//! Backend collaborator: credential verification and profile storage.
//!
//! The session core only sees the `Backend` trait. Two adapters ship here:
//! - `HttpBackend`: REST client for the hosted EduHub service
//! - `MemoryBackend`: in-process accounts for offline use and tests

pub mod error;
pub mod http;
pub mod memory;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::UserProfile;

pub use error::BackendError;
pub use http::HttpBackend;
pub use memory::MemoryBackend;

/// Opaque backend account identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        AccountId(s.to_string())
    }
}

/// Result of a successful credential check.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedAccount {
    pub account_id: AccountId,
    /// `None` when the account exists but its profile was never written.
    pub profile: Option<UserProfile>,
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn verify_credentials(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<VerifiedAccount, BackendError>;

    /// Register a new account. `seed` is the profile the account is being
    /// created for; the profile itself is stored by `write_profile`.
    async fn create_account(
        &self,
        identifier: &str,
        secret: &str,
        seed: &UserProfile,
    ) -> Result<AccountId, BackendError>;

    async fn write_profile(
        &self,
        account_id: &AccountId,
        profile: &UserProfile,
    ) -> Result<(), BackendError>;

    async fn read_profile(&self, account_id: &AccountId) -> Result<UserProfile, BackendError>;

    /// Best effort; callers log failures and carry on.
    async fn invalidate_session(&self, account_id: &AccountId) -> Result<(), BackendError>;
}
