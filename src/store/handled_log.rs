//! Append-only log of handled message keys, one per line.

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::StoreError;
use crate::pipeline::types::DedupKey;

/// Persisted record of messages handled in earlier runs.
///
/// The pipeline only reads it; the caller appends after a run.
#[async_trait]
pub trait HandledLog: Send + Sync {
    /// Load every recorded key. Keys are opaque strings.
    async fn load(&self) -> Result<HashSet<String>, StoreError>;

    /// Append keys to the record.
    async fn append(&self, keys: &[DedupKey]) -> Result<(), StoreError>;
}

/// `HandledLog` backed by a newline-delimited text file.
pub struct FileHandledLog {
    path: PathBuf,
}

impl FileHandledLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl HandledLog for FileHandledLog {
    async fn load(&self) -> Result<HashSet<String>, StoreError> {
        if !self.path.exists() {
            return Ok(HashSet::new());
        }
        let contents = fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        Ok(contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }

    async fn append(&self, keys: &[DedupKey]) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let mut entry = String::new();
        for key in keys {
            entry.push_str(key.as_str());
            entry.push('\n');
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        file.write_all(entry.as_bytes())
            .await
            .map_err(|e| self.io_error(e))?;
        file.flush().await.map_err(|e| self.io_error(e))?;
        Ok(())
    }
}
