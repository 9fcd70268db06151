//! Storage abstractions for `homeguard`.
//!
//! Two independent key-value interfaces live here and know nothing about the
//! restore protocol that sits on top of them:
//!
//! - [`ExpiringStore`]: transient values with a per-entry TTL (restore key,
//!   backups, success flag).
//! - [`ConfigStore`]: durable site configuration (`home`, `siteurl`,
//!   `admin_email`, ...).
//!
//! Implementations provided:
//!
//! - [`MemoryExpiringStore`] and [`MemoryConfigStore`]: in-memory
//! - [`RedbConfigStore`]: durable configuration backed by redb (feature `redb-backend`)

mod error;
mod memory;
#[cfg(feature = "redb-backend")]
mod redb_backend;

use std::time::Duration;

pub use error::StorageError;
pub use memory::{MemoryConfigStore, MemoryExpiringStore};
#[cfg(feature = "redb-backend")]
pub use redb_backend::RedbConfigStore;

/// A key-value store whose entries expire after a per-entry TTL.
///
/// Eviction is the store's responsibility. Callers never sweep; an expired
/// entry must simply read back as absent.
#[async_trait::async_trait]
pub trait ExpiringStore: Send + Sync + 'static {
    /// Store `value` under `key`, replacing any existing entry, expiring
    /// after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the underlying store fails.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StorageError>;

    /// Retrieve a live value. Returns `Ok(None)` for missing or expired keys.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying store fails.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Delete a key. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Delete`] if the underlying store fails.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Durable named configuration values.
///
/// Change notification is not part of this trait; it is layered on top by
/// the caller so that observers are scoped to whoever holds the wrapper.
#[async_trait::async_trait]
pub trait ConfigStore: Send + Sync + 'static {
    /// Read a configuration value. Returns `Ok(None)` if it was never set.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying store fails.
    async fn get(&self, name: &str) -> Result<Option<String>, StorageError>;

    /// Write a configuration value, overwriting any existing one.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the underlying store fails.
    async fn set(&self, name: &str, value: &str) -> Result<(), StorageError>;
}
