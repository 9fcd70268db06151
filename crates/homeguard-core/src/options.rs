//! Configuration access with change notification.
//!
//! [`Options`] wraps a shared [`ConfigStore`] for the duration of one request
//! and owns that request's observer list. A write that changes a value
//! notifies every live observer with `(name, old, new)` synchronously,
//! before [`Options::update`] returns.
//!
//! Observers are held weakly. The restore protocol both observes and writes
//! through the same `Options`, and a strong reference in each direction
//! would never be freed.

use std::sync::{Arc, Weak};

use homeguard_storage::{ConfigStore, StorageError};
use tokio::sync::RwLock;
use tracing::debug;

/// Receives configuration change notifications.
#[async_trait::async_trait]
pub trait OptionObserver: Send + Sync {
    /// Called after `name` changed from `old_value` to `new_value`.
    ///
    /// A value that did not exist before is reported as `""`.
    async fn option_updated(&self, name: &str, old_value: &str, new_value: &str);
}

/// Request-scoped view of the configuration store that fires change
/// notifications.
pub struct Options {
    store: Arc<dyn ConfigStore>,
    observers: RwLock<Vec<Weak<dyn OptionObserver>>>,
}

impl Options {
    /// Wrap a configuration store. No observers are registered yet.
    #[must_use]
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Register an observer. It is notified for as long as the caller keeps
    /// it alive.
    pub async fn subscribe<T: OptionObserver + 'static>(&self, observer: &Arc<T>) {
        let weak: Weak<dyn OptionObserver> = Arc::downgrade(observer) as Weak<T>;
        let mut observers = self.observers.write().await;
        observers.retain(|o| o.strong_count() > 0);
        observers.push(weak);
    }

    /// Read a configuration value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the underlying store fails.
    pub async fn get(&self, name: &str) -> Result<Option<String>, StorageError> {
        self.store.get(name).await
    }

    /// Write a configuration value and notify observers.
    ///
    /// Returns `Ok(false)` without writing or notifying when the value is
    /// already `value`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the read of the old value or the write
    /// fails. Observers are not notified on failure.
    pub async fn update(&self, name: &str, value: &str) -> Result<bool, StorageError> {
        let old_value = self.store.get(name).await?.unwrap_or_default();
        if old_value == value {
            debug!(option = name, "option unchanged, skipping write");
            return Ok(false);
        }

        self.store.set(name, value).await?;

        // Snapshot live observers so none are called with the lock held; an
        // observer may itself read or write options.
        let live: Vec<Arc<dyn OptionObserver>> = {
            let observers = self.observers.read().await;
            observers.iter().filter_map(Weak::upgrade).collect()
        };
        for observer in live {
            observer.option_updated(name, &old_value, value).await;
        }

        Ok(true)
    }

    /// Number of observers still alive.
    pub async fn observer_count(&self) -> usize {
        self.observers
            .read()
            .await
            .iter()
            .filter(|o| o.strong_count() > 0)
            .count()
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options").finish_non_exhaustive()
    }
}
