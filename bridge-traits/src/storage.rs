//! Storage Abstractions
//!
//! Durable key-value settings and secure credential storage. The core keeps
//! two entries in the settings store (the selected root directory and the
//! per-file status map) and only checks the secure store for the presence of
//! provider API keys.

use async_trait::async_trait;

use crate::error::Result;

/// Secure credential storage trait
///
/// Abstracts the OS credential vault:
/// - macOS: Keychain
/// - Windows: Credential Manager
/// - Linux: Secret Service / libsecret
///
/// # Security Requirements
///
/// Implementations MUST:
/// - Use platform-provided secure storage
/// - Never log or expose secret values
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SecureStore;
///
/// async fn has_openai_key(store: &dyn SecureStore) -> Result<bool> {
///     store.has_secret("openai_api_key").await
/// }
/// ```
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Store a secret value, replacing any previous value.
    async fn set_secret(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a secret value
    ///
    /// # Returns
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get_secret(&self, key: &str) -> Result<Option<String>>;

    /// Delete a secret. Deleting a missing key is not an error.
    async fn delete_secret(&self, key: &str) -> Result<()>;

    /// Check if a non-empty secret exists without handing it out
    async fn has_secret(&self, key: &str) -> Result<bool> {
        Ok(self
            .get_secret(key)
            .await?
            .is_some_and(|value| !value.trim().is_empty()))
    }
}

/// Key-value settings storage trait
///
/// Values are plain strings; structured values are stored as JSON by the
/// caller.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn remember_root(store: &dyn SettingsStore, root: &str) -> Result<()> {
///     store.set_string("clipflow.root_path", root).await
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a setting exists
    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.get_string(key).await?.is_some())
    }

    /// List all setting keys
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Clear all settings
    async fn clear_all(&self) -> Result<()>;
}
