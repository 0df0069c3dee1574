//! Text sources polled by the scanner.
//!
//! A source hands out the full visible text of a transcript on each tick.
//! It is read-only from the scanner's point of view.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Something that can produce a text snapshot
#[async_trait::async_trait]
pub trait TextSource: Send + Sync {
    /// Current full text
    async fn snapshot(&self) -> Result<String, SourceError>;

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

/// Transcript kept in a file that is re-read on every tick
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl TextSource for FileSource {
    async fn snapshot(&self) -> Result<String, SourceError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| SourceError::Read {
                path: self.path.clone(),
                source,
            })?;
        // A transcript saved mid-write may end in a partial UTF-8 sequence.
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// In-memory text shared with whoever renders it
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    text: Arc<RwLock<String>>,
}

impl MemorySource {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Arc::new(RwLock::new(text.into())),
        }
    }

    /// Replace the whole text
    pub async fn set(&self, text: impl Into<String>) {
        *self.text.write().await = text.into();
    }

    /// Append to the text, as a chat page does while a reply streams in
    pub async fn append(&self, more: &str) {
        self.text.write().await.push_str(more);
    }
}

#[async_trait::async_trait]
impl TextSource for MemorySource {
    async fn snapshot(&self) -> Result<String, SourceError> {
        Ok(self.text.read().await.clone())
    }

    fn describe(&self) -> String {
        "in-memory text".to_string()
    }
}
