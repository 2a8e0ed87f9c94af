// src/ingest.rs - Reading user-selected documents into memory
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("IO error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Document '{name}' is {size} bytes, the limit is {limit}")]
    TooLarge { name: String, size: u64, limit: u64 },
}

/// Something the user picked that can be read as document text.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Name shown to the user and used as the upload file name.
    fn name(&self) -> &str;

    /// Size in bytes, when it can be known without reading the content.
    async fn size_hint(&self) -> Option<u64> {
        None
    }

    async fn read_to_string(&self) -> Result<String, IngestError>;
}

/// A document on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileDocument {
    path: PathBuf,
    name: String,
}

impl FileDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> IngestError {
        IngestError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl DocumentSource for FileDocument {
    fn name(&self) -> &str {
        &self.name
    }

    async fn size_hint(&self) -> Option<u64> {
        fs::metadata(&self.path).await.ok().map(|m| m.len())
    }

    async fn read_to_string(&self) -> Result<String, IngestError> {
        tracing::info!("Reading document: {}", self.path.display());
        fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.io_error(e))
    }
}

/// Document text already in memory, e.g. pasted by the user.
#[derive(Debug, Clone)]
pub struct InlineDocument {
    pub name: String,
    pub text: String,
}

impl InlineDocument {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

#[async_trait]
impl DocumentSource for InlineDocument {
    fn name(&self) -> &str {
        &self.name
    }

    async fn size_hint(&self) -> Option<u64> {
        Some(self.text.len() as u64)
    }

    async fn read_to_string(&self) -> Result<String, IngestError> {
        Ok(self.text.clone())
    }
}

/// Read the whole document, refusing anything over `limit` bytes.
pub async fn read_document<D: DocumentSource + ?Sized>(
    source: &D,
    limit: u64,
) -> Result<String, IngestError> {
    let too_large = |size: u64| IngestError::TooLarge {
        name: source.name().to_string(),
        size,
        limit,
    };

    if let Some(size) = source.size_hint().await {
        if size > limit {
            return Err(too_large(size));
        }
    }
    let text = source.read_to_string().await?;
    let size = text.len() as u64;
    if size > limit {
        return Err(too_large(size));
    }
    tracing::debug!("Read document '{}' ({} bytes)", source.name(), size);
    Ok(text)
}
