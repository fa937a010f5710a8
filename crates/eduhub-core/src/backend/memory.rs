//! In-process backend.
//!
//! Accounts live in memory for the lifetime of the process, with secrets
//! stored as argon2 hashes. Used by the CLI's local mode and by tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use rand::rngs::OsRng;
use rand::Rng;
use tracing::debug;

use super::{AccountId, Backend, BackendError, VerifiedAccount};
use crate::models::UserProfile;

struct Account {
    id: AccountId,
    secret_hash: String,
    profile: Option<UserProfile>,
}

#[derive(Default)]
struct Accounts {
    by_identifier: HashMap<String, Account>,
    active_sessions: HashSet<AccountId>,
}

impl Accounts {
    fn by_id_mut(&mut self, account_id: &AccountId) -> Option<&mut Account> {
        self.by_identifier.values_mut().find(|a| &a.id == account_id)
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    accounts: Mutex<Accounts>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn accounts(&self) -> MutexGuard<'_, Accounts> {
        self.accounts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether an account currently holds a live session.
    pub fn has_active_session(&self, account_id: &AccountId) -> bool {
        self.accounts().active_sessions.contains(account_id)
    }

    pub fn active_session_count(&self) -> usize {
        self.accounts().active_sessions.len()
    }

    pub fn account_count(&self) -> usize {
        self.accounts().by_identifier.len()
    }

    fn hash_secret(secret: &str) -> Result<String, BackendError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| BackendError::Unavailable(format!("Failed to hash secret: {}", e)))
    }

    fn secret_matches(secret: &str, stored: &str) -> bool {
        match PasswordHash::new(stored) {
            Ok(parsed) => Argon2::default()
                .verify_password(secret.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    fn new_account_id() -> AccountId {
        AccountId(format!("acct-{:016x}", rand::thread_rng().gen::<u64>()))
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn verify_credentials(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<VerifiedAccount, BackendError> {
        let mut accounts = self.accounts();

        let (account_id, profile) = match accounts.by_identifier.get(identifier) {
            Some(account) if Self::secret_matches(secret, &account.secret_hash) => {
                (account.id.clone(), account.profile.clone())
            }
            // Unknown identifier and wrong secret are indistinguishable to callers.
            _ => {
                return Err(BackendError::Credential(
                    "Invalid identifier or password".to_string(),
                ))
            }
        };

        accounts.active_sessions.insert(account_id.clone());
        Ok(VerifiedAccount { account_id, profile })
    }

    async fn create_account(
        &self,
        identifier: &str,
        secret: &str,
        seed: &UserProfile,
    ) -> Result<AccountId, BackendError> {
        let secret_hash = Self::hash_secret(secret)?;
        let mut accounts = self.accounts();

        if accounts.by_identifier.contains_key(identifier) {
            return Err(BackendError::Conflict);
        }

        let id = Self::new_account_id();
        debug!(account_id = %id, role = seed.role().as_str(), "Created local account");

        accounts.by_identifier.insert(
            identifier.to_string(),
            Account {
                id: id.clone(),
                secret_hash,
                profile: None,
            },
        );
        accounts.active_sessions.insert(id.clone());
        Ok(id)
    }

    async fn write_profile(
        &self,
        account_id: &AccountId,
        profile: &UserProfile,
    ) -> Result<(), BackendError> {
        profile
            .validate()
            .map_err(|e| BackendError::Validation(e.to_string()))?;

        let mut accounts = self.accounts();
        let account = accounts
            .by_id_mut(account_id)
            .ok_or_else(|| BackendError::NotFound(account_id.to_string()))?;
        account.profile = Some(profile.clone());
        Ok(())
    }

    async fn read_profile(&self, account_id: &AccountId) -> Result<UserProfile, BackendError> {
        let mut accounts = self.accounts();
        accounts
            .by_id_mut(account_id)
            .and_then(|a| a.profile.clone())
            .ok_or_else(|| BackendError::NotFound(account_id.to_string()))
    }

    async fn invalidate_session(&self, account_id: &AccountId) -> Result<(), BackendError> {
        self.accounts().active_sessions.remove(account_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SchoolProfile;

    fn school() -> UserProfile {
        UserProfile::School(SchoolProfile {
            name: "North High".to_string(),
            phone: "555-111-2222".to_string(),
            location: "Oslo".to_string(),
            ceo_name: "Ingrid".to_string(),
        })
    }

    #[tokio::test]
    async fn test_signup_then_verify() {
        let backend = MemoryBackend::new();
        let id = backend.create_account("north@example.com", "s3cret!", &school()).await.unwrap();
        backend.write_profile(&id, &school()).await.unwrap();

        let verified = backend.verify_credentials("north@example.com", "s3cret!").await.unwrap();
        assert_eq!(verified.account_id, id);
        assert_eq!(verified.profile, Some(school()));
        assert!(backend.has_active_session(&id));
    }

    #[tokio::test]
    async fn test_wrong_secret_and_unknown_identifier_look_the_same() {
        let backend = MemoryBackend::new();
        backend.create_account("north@example.com", "s3cret!", &school()).await.unwrap();

        let wrong = backend.verify_credentials("north@example.com", "nope!!").await.unwrap_err();
        let unknown = backend.verify_credentials("south@example.com", "s3cret!").await.unwrap_err();
        assert_eq!(wrong, unknown);
        assert!(matches!(wrong, BackendError::Credential(_)));
    }

    #[tokio::test]
    async fn test_duplicate_identifier_conflicts() {
        let backend = MemoryBackend::new();
        backend.create_account("north@example.com", "s3cret!", &school()).await.unwrap();
        let err = backend
            .create_account("north@example.com", "other!!", &school())
            .await
            .unwrap_err();
        assert_eq!(err, BackendError::Conflict);
        assert_eq!(backend.account_count(), 1);
    }

    #[tokio::test]
    async fn test_account_without_profile() {
        let backend = MemoryBackend::new();
        let id = backend.create_account("north@example.com", "s3cret!", &school()).await.unwrap();

        let verified = backend.verify_credentials("north@example.com", "s3cret!").await.unwrap();
        assert!(verified.profile.is_none());
        assert!(matches!(backend.read_profile(&id).await, Err(BackendError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_invalid_profile_rejected() {
        let backend = MemoryBackend::new();
        let id = backend.create_account("north@example.com", "s3cret!", &school()).await.unwrap();
        let mut bad = school();
        if let UserProfile::School(ref mut p) = bad {
            p.ceo_name.clear();
        }
        let err = backend.write_profile(&id, &bad).await.unwrap_err();
        assert!(matches!(err, BackendError::Validation(_)));
    }

    #[tokio::test]
    async fn test_invalidate_session() {
        let backend = MemoryBackend::new();
        let id = backend.create_account("north@example.com", "s3cret!", &school()).await.unwrap();
        assert!(backend.has_active_session(&id));
        backend.invalidate_session(&id).await.unwrap();
        assert!(!backend.has_active_session(&id));
        // Idempotent
        backend.invalidate_session(&id).await.unwrap();
    }
}
