//! Secure Credential Storage using OS Keychain

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SecureStore,
};
use core_async::task;
use keyring::Entry;
use tracing::debug;

/// Keychain service the desktop app stores provider API keys under.
pub const DEFAULT_SERVICE_NAME: &str = "clip-flow";

/// Keyring-based secure storage
///
/// Uses platform-specific secure storage:
/// - macOS: Keychain
/// - Windows: Credential Manager
/// - Linux: Secret Service (libsecret)
///
/// Keyring calls block, so they run on the blocking pool.
pub struct KeyringSecureStore {
    service_name: String,
}

impl KeyringSecureStore {
    pub fn new() -> Self {
        Self::with_service_name(DEFAULT_SERVICE_NAME)
    }

    pub fn with_service_name(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    fn map_keyring_error(e: keyring::Error) -> BridgeError {
        BridgeError::OperationFailed(format!("Keyring error: {}", e))
    }

    async fn with_entry<T, F>(&self, key: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Entry) -> std::result::Result<T, keyring::Error> + Send + 'static,
    {
        let service = self.service_name.clone();
        let key = key.to_string();
        task::spawn_blocking(move || {
            let entry = Entry::new(&service, &key).map_err(Self::map_keyring_error)?;
            op(entry).map_err(Self::map_keyring_error)
        })
        .await
        .map_err(|e| BridgeError::OperationFailed(format!("Keyring task failed: {}", e)))?
    }
}

impl Default for KeyringSecureStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecureStore for KeyringSecureStore {
    async fn set_secret(&self, key: &str, value: &str) -> Result<()> {
        let value = value.to_string();
        self.with_entry(key, move |entry| entry.set_password(&value))
            .await?;

        debug!(key = key, "Stored secret in keyring");
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<String>> {
        let secret = self
            .with_entry(key, |entry| match entry.get_password() {
                Ok(value) => Ok(Some(value)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(e),
            })
            .await?;

        debug!(key = key, found = secret.is_some(), "Looked up secret in keyring");
        Ok(secret)
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        self.with_entry(key, |entry| match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e),
        })
        .await?;

        debug!(key = key, "Deleted secret from keyring");
        Ok(())
    }
}
