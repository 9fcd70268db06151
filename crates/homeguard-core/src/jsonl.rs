//! Append-only JSON-lines file writer shared by the file event sink and the
//! mail spool notifier.
//!
//! The file is opened lazily on the first append and kept open. A
//! `tokio::sync::Mutex` serializes writers; the critical section is one
//! `write_all` plus a flush.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::JsonLinesError;

pub(crate) struct JsonLinesFile {
    path: PathBuf,
    writer: Mutex<Option<File>>,
}

impl JsonLinesFile {
    pub(crate) fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: Mutex::new(None),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&self) -> Result<File, JsonLinesError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| JsonLinesError::Open {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })
    }

    /// Serialize `record` and append it as one line.
    pub(crate) async fn append<T: Serialize + ?Sized>(
        &self,
        record: &T,
    ) -> Result<(), JsonLinesError> {
        let mut line =
            serde_json::to_vec(record).map_err(|e| JsonLinesError::Serialization {
                reason: e.to_string(),
            })?;
        line.push(b'\n');

        let mut guard = self.writer.lock().await;
        let file = match guard.take() {
            Some(file) => guard.insert(file),
            None => guard.insert(self.open().await?),
        };

        file.write_all(&line)
            .await
            .map_err(|e| JsonLinesError::Write {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;
        file.flush().await.map_err(|e| JsonLinesError::Write {
            path: self.path.display().to_string(),
            reason: format!("flush failed: {e}"),
        })?;

        Ok(())
    }
}

impl std::fmt::Debug for JsonLinesFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesFile")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
