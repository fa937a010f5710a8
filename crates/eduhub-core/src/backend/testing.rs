//! Fault-injecting backend for session manager tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{AccountId, Backend, BackendError, MemoryBackend, VerifiedAccount};
use crate::models::UserProfile;

#[derive(Default)]
pub(crate) struct ScriptedBackend {
    pub inner: MemoryBackend,
    pub unavailable: AtomicBool,
    pub fail_profile_writes: AtomicBool,
    pub fail_profile_reads: AtomicBool,
    pub fail_invalidate: AtomicBool,
    pub verify_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub read_calls: AtomicUsize,
    pub invalidate_calls: AtomicUsize,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every credential check, account creation and profile read until
    /// the returned `Notify` fires.
    pub fn hold(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(notify.clone());
        notify
    }

    async fn wait_gate(&self) {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }

    fn check_available(&self) -> Result<(), BackendError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(BackendError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    pub async fn register(&self, identifier: &str, secret: &str, profile: &UserProfile) -> AccountId {
        let id = self.inner.create_account(identifier, secret, profile).await.unwrap();
        self.inner.write_profile(&id, profile).await.unwrap();
        self.inner.invalidate_session(&id).await.unwrap();
        id
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn verify_credentials(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<VerifiedAccount, BackendError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.wait_gate().await;
        self.check_available()?;
        self.inner.verify_credentials(identifier, secret).await
    }

    async fn create_account(
        &self,
        identifier: &str,
        secret: &str,
        seed: &UserProfile,
    ) -> Result<AccountId, BackendError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.wait_gate().await;
        self.check_available()?;
        self.inner.create_account(identifier, secret, seed).await
    }

    async fn write_profile(
        &self,
        account_id: &AccountId,
        profile: &UserProfile,
    ) -> Result<(), BackendError> {
        if self.fail_profile_writes.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("profile store timed out".to_string()));
        }
        self.inner.write_profile(account_id, profile).await
    }

    async fn read_profile(&self, account_id: &AccountId) -> Result<UserProfile, BackendError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        self.wait_gate().await;
        self.check_available()?;
        if self.fail_profile_reads.load(Ordering::SeqCst) {
            return Err(BackendError::NotFound(account_id.to_string()));
        }
        self.inner.read_profile(account_id).await
    }

    async fn invalidate_session(&self, account_id: &AccountId) -> Result<(), BackendError> {
        self.invalidate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_invalidate.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("connection reset".to_string()));
        }
        self.inner.invalidate_session(account_id).await
    }
}
