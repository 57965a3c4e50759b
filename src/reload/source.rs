//! Where topology definitions come from.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Raw definition bytes plus the source's own change marker.
#[derive(Debug, Clone)]
pub struct SourcePayload {
    pub content: Bytes,
    /// Modification time when the source has one.
    pub modified: Option<SystemTime>,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("definition source {location} unavailable: {source}")]
    Unavailable {
        location: String,
        #[source]
        source: io::Error,
    },
}

/// A place the watcher can read the current topology definition from.
#[async_trait]
pub trait DefinitionSource: Send + Sync {
    /// Human readable location for logs.
    fn location(&self) -> String;

    async fn fetch(&self) -> Result<SourcePayload, SourceError>;
}

/// Definition stored in a file on disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DefinitionSource for FileSource {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch(&self) -> Result<SourcePayload, SourceError> {
        let unavailable = |source| SourceError::Unavailable {
            location: self.location(),
            source,
        };

        let metadata = tokio::fs::metadata(&self.path).await.map_err(unavailable)?;
        let content = tokio::fs::read(&self.path).await.map_err(unavailable)?;

        Ok(SourcePayload {
            content: Bytes::from(content),
            modified: metadata.modified().ok(),
        })
    }
}

/// In-memory definition, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemorySource {
    state: Mutex<Option<Bytes>>,
}

impl MemorySource {
    pub fn new(content: impl Into<Bytes>) -> Self {
        Self {
            state: Mutex::new(Some(content.into())),
        }
    }

    /// Replace the stored definition.
    pub fn set(&self, content: impl Into<Bytes>) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = Some(content.into());
    }

    /// Make subsequent fetches fail until `set` is called again.
    pub fn set_unavailable(&self) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

#[async_trait]
impl DefinitionSource for MemorySource {
    fn location(&self) -> String {
        "memory".to_string()
    }

    async fn fetch(&self) -> Result<SourcePayload, SourceError> {
        let content = self.state.lock().unwrap_or_else(|e| e.into_inner()).clone();
        match content {
            Some(content) => Ok(SourcePayload {
                content,
                modified: None,
            }),
            None => Err(SourceError::Unavailable {
                location: self.location(),
                source: io::Error::new(io::ErrorKind::NotFound, "no definition stored"),
            }),
        }
    }
}
