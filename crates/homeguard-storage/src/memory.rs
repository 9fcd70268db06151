//! In-memory stores.
//!
//! Both stores keep their data in a `BTreeMap` behind a `RwLock` and are not
//! persistent. Clones share state, so one instance can be handed to many
//! request-scoped consumers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::{ConfigStore, ExpiringStore, StorageError};

#[derive(Debug, Clone)]
struct ExpiringEntry {
    value: String,
    expires_at: Instant,
}

impl ExpiringEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// An in-memory [`ExpiringStore`].
///
/// Expiry is evaluated against `tokio::time::Instant`, so tests running with
/// a paused clock can advance time to expire entries. Expired entries are
/// dropped lazily when they are next touched.
///
/// # Examples
///
/// ```
/// # use std::time::Duration;
/// # use homeguard_storage::{ExpiringStore, MemoryExpiringStore};
/// # #[tokio::main]
/// # async fn main() {
/// let store = MemoryExpiringStore::new();
/// store.set("old_home", "http://old.example", Duration::from_secs(1800)).await.unwrap();
/// let val = store.get("old_home").await.unwrap();
/// assert_eq!(val.as_deref(), Some("http://old.example"));
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryExpiringStore {
    data: Arc<RwLock<BTreeMap<String, ExpiringEntry>>>,
}

impl MemoryExpiringStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining lifetime of a live entry, or `None` if it is missing or
    /// expired.
    pub async fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let data = self.data.read().await;
        data.get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.expires_at.saturating_duration_since(now))
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let data = self.data.read().await;
        data.values().filter(|entry| entry.is_live(now)).count()
    }

    /// Whether the store holds no live entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait::async_trait]
impl ExpiringStore for MemoryExpiringStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StorageError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| StorageError::Write {
                key: key.to_owned(),
                reason: format!("ttl of {}s overflows the clock", ttl.as_secs()),
            })?;
        let mut data = self.data.write().await;
        data.insert(
            key.to_owned(),
            ExpiringEntry {
                value: value.to_owned(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let now = Instant::now();
        {
            let data = self.data.read().await;
            match data.get(key) {
                None => return Ok(None),
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        // Expired: evict under the write lock, re-checking in case a writer
        // replaced it in between.
        let mut data = self.data.write().await;
        if data.get(key).is_some_and(|entry| !entry.is_live(now)) {
            data.remove(key);
        }
        Ok(data
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut data = self.data.write().await;
        data.remove(key);
        Ok(())
    }
}

/// An in-memory [`ConfigStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
    data: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryConfigStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with the given values.
    #[must_use]
    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let data = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }
}

#[async_trait::async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self, name: &str) -> Result<Option<String>, StorageError> {
        let data = self.data.read().await;
        Ok(data.get(name).cloned())
    }

    async fn set(&self, name: &str, value: &str) -> Result<(), StorageError> {
        let mut data = self.data.write().await;
        data.insert(name.to_owned(), value.to_owned());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const HALF_HOUR: Duration = Duration::from_secs(1800);

    #[tokio::test]
    async fn get_nonexistent_returns_none() {
        let store = MemoryExpiringStore::new();
        assert_eq!(store.get("does_not_exist").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_overwrites_existing() {
        let store = MemoryExpiringStore::new();
        store.set("key", "v1", HALF_HOUR).await.unwrap();
        store.set("key", "v2", HALF_HOUR).await.unwrap();
        assert_eq!(store.get("key").await.unwrap().as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn delete_nonexistent_is_noop() {
        let store = MemoryExpiringStore::new();
        store.delete("nope").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_after_ttl() {
        let store = MemoryExpiringStore::new();
        store
            .set("siteurl_restore_success", "1", Duration::from_secs(300))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(
            store.get("siteurl_restore_success").await.unwrap().as_deref(),
            Some("1")
        );

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get("siteurl_restore_success").await.unwrap(), None);
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_remaining_counts_down() {
        let store = MemoryExpiringStore::new();
        store.set("old_home", "http://old.example", HALF_HOUR).await.unwrap();
        assert_eq!(store.ttl_remaining("old_home").await, Some(HALF_HOUR));

        tokio::time::advance(Duration::from_secs(600)).await;
        assert_eq!(
            store.ttl_remaining("old_home").await,
            Some(Duration::from_secs(1200))
        );
        assert_eq!(store.ttl_remaining("missing").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_after_delete_restarts_ttl() {
        let store = MemoryExpiringStore::new();
        store.set("old_home", "a", HALF_HOUR).await.unwrap();
        tokio::time::advance(Duration::from_secs(1000)).await;

        store.delete("old_home").await.unwrap();
        store.set("old_home", "b", HALF_HOUR).await.unwrap();
        assert_eq!(store.ttl_remaining("old_home").await, Some(HALF_HOUR));
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let store = MemoryExpiringStore::new();
        let clone = store.clone();
        store.set("key", "val", HALF_HOUR).await.unwrap();
        assert_eq!(clone.get("key").await.unwrap().as_deref(), Some("val"));
    }

    #[tokio::test]
    async fn config_store_roundtrip() {
        let store = MemoryConfigStore::with_values([("home", "http://old.example")]);
        assert_eq!(
            store.get("home").await.unwrap().as_deref(),
            Some("http://old.example")
        );
        assert_eq!(store.get("siteurl").await.unwrap(), None);

        store.set("home", "http://new.example").await.unwrap();
        assert_eq!(
            store.get("home").await.unwrap().as_deref(),
            Some("http://new.example")
        );
    }
}
