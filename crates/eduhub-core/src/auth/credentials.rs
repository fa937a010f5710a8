//! OS keychain access for the "remember me" secret and backend session
//! tokens.
//!
//! The session snapshot never carries either; they only live here.

use anyhow::{Context, Result};
use keyring::Entry;

use crate::storage::KeyValueStore;

const SERVICE_NAME: &str = "eduhub";

pub struct CredentialStore;

impl CredentialStore {
    /// Store the secret for an identifier in the OS keychain
    pub fn store(identifier: &str, secret: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, identifier)
            .context("Failed to create keyring entry")?;
        entry
            .set_password(secret)
            .context("Failed to store secret in keychain")?;
        Ok(())
    }

    /// Load the stored secret, `None` if nothing was saved for this identifier
    pub fn load(identifier: &str) -> Result<Option<String>> {
        let entry = Entry::new(SERVICE_NAME, identifier)
            .context("Failed to create keyring entry")?;
        match entry.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve secret from keychain"),
        }
    }

    /// Delete the stored secret; deleting a missing entry is not an error
    pub fn delete(identifier: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, identifier)
            .context("Failed to create keyring entry")?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete secret from keychain"),
        }
    }
}

/// Keychain-backed store, used by `HttpBackend` to keep bearer tokens
/// across restarts.
impl KeyValueStore for CredentialStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Self::load(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        Self::store(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        Self::delete(key)
    }
}
