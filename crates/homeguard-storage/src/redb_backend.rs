//! Durable configuration store backed by redb.
//!
//! Feature-gated behind `redb-backend`. Blocking redb calls are offloaded to
//! the Tokio blocking thread pool; every write is its own transaction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{Database, TableDefinition};

use crate::{ConfigStore, StorageError};

/// The single table holding configuration values by name.
const OPTIONS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("options");

/// A [`ConfigStore`] persisted to a redb database file.
///
/// # Examples
///
/// ```no_run
/// # use homeguard_storage::RedbConfigStore;
/// let store = RedbConfigStore::open("/var/lib/homeguard/options.redb").unwrap();
/// ```
#[derive(Clone)]
pub struct RedbConfigStore {
    db: Arc<Database>,
    path: PathBuf,
}

impl std::fmt::Debug for RedbConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbConfigStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RedbConfigStore {
    /// Open or create a redb database at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if redb fails to open or create the
    /// database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let db = Database::create(path).map_err(|e| StorageError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        // Opening the table in a write txn creates it if missing.
        let txn = db.begin_write().map_err(|e| StorageError::Transaction {
            reason: e.to_string(),
        })?;
        {
            let _table = txn
                .open_table(OPTIONS_TABLE)
                .map_err(|e| StorageError::MissingTable {
                    name: format!("options: {e}"),
                })?;
        }
        txn.commit().map_err(|e| StorageError::Transaction {
            reason: e.to_string(),
        })?;

        Ok(Self {
            db: Arc::new(db),
            path: path.to_path_buf(),
        })
    }

    /// Return the filesystem path of this database.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl ConfigStore for RedbConfigStore {
    async fn get(&self, name: &str) -> Result<Option<String>, StorageError> {
        let db = Arc::clone(&self.db);
        let name = name.to_owned();
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_read().map_err(|e| StorageError::Transaction {
                reason: e.to_string(),
            })?;
            let table = txn
                .open_table(OPTIONS_TABLE)
                .map_err(|e| StorageError::MissingTable {
                    name: format!("options: {e}"),
                })?;
            let value = table
                .get(name.as_str())
                .map_err(|e| StorageError::Read {
                    key: name.clone(),
                    reason: e.to_string(),
                })?
                .map(|v| v.value().to_owned());
            Ok(value)
        })
        .await
        .map_err(|e| StorageError::Read {
            key: String::new(),
            reason: format!("blocking task panicked: {e}"),
        })?
    }

    async fn set(&self, name: &str, value: &str) -> Result<(), StorageError> {
        let db = Arc::clone(&self.db);
        let name = name.to_owned();
        let value = value.to_owned();
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_write().map_err(|e| StorageError::Transaction {
                reason: e.to_string(),
            })?;
            {
                let mut table =
                    txn.open_table(OPTIONS_TABLE)
                        .map_err(|e| StorageError::MissingTable {
                            name: format!("options: {e}"),
                        })?;
                table
                    .insert(name.as_str(), value.as_str())
                    .map_err(|e| StorageError::Write {
                        key: name.clone(),
                        reason: e.to_string(),
                    })?;
            }
            txn.commit().map_err(|e| StorageError::Transaction {
                reason: e.to_string(),
            })?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Write {
            key: String::new(),
            reason: format!("blocking task panicked: {e}"),
        })?
    }
}
