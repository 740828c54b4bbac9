//! Uniform contract over the two storage backends.
//!
//! A backend is picked when the service is built and never changes
//! afterwards. Callers only see [`StorageBackend`] and the
//! [`FileStorage`] operations.

use async_trait::async_trait;
use bytes::Bytes;
use data_model::{FileId, FileMetadata, StorageKind};
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

pub mod indexed;
pub mod inline;

pub use indexed::IndexedStorage;
pub use inline::InlineStorage;

/// Content flowing in or out of a backend, one chunk at a time.
pub type ContentStream<'a> = BoxStream<'a, anyhow::Result<Bytes>>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("file {id} not found")]
    NotFound { id: FileId },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage rejected the write. error: {}", source)]
    StorageWriteFailure { source: anyhow::Error },

    /// Never returned from a delete; logged while the index row is removed
    /// anyway.
    #[error(
        "content of file {} could not be deleted, object {} is orphaned. error: {}",
        id,
        object,
        source
    )]
    PartialDeleteFailure {
        id: FileId,
        object: String,
        source: anyhow::Error,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal storage error: {}", source)]
    Internal { source: anyhow::Error },
}

impl StorageError {
    pub fn write_failure(source: anyhow::Error) -> Self {
        Self::StorageWriteFailure { source }
    }

    pub fn internal(source: anyhow::Error) -> Self {
        Self::Internal { source }
    }
}

pub(crate) fn check_cancelled(cancel: &CancellationToken) -> Result<(), StorageError> {
    if cancel.is_cancelled() {
        return Err(StorageError::Cancelled);
    }
    Ok(())
}

#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Consumes `content` fully and persists it. The returned size is the
    /// number of bytes actually stored.
    ///
    /// An invalid filename or content type is rejected with `InvalidInput`
    /// before `content` is read.
    async fn upload(
        &self,
        content: ContentStream<'_>,
        filename: &str,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<FileMetadata, StorageError>;

    async fn download(
        &self,
        id: &FileId,
        cancel: &CancellationToken,
    ) -> Result<(FileMetadata, ContentStream<'static>), StorageError>;

    async fn get_metadata(
        &self,
        id: &FileId,
        cancel: &CancellationToken,
    ) -> Result<FileMetadata, StorageError>;

    async fn delete(&self, id: &FileId, cancel: &CancellationToken) -> Result<(), StorageError>;

    /// Newest first, ties broken by id. `take` must be positive and is
    /// capped by the backend.
    async fn list(
        &self,
        skip: usize,
        take: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<FileMetadata>, StorageError>;
}

pub enum StorageBackend {
    Inline(InlineStorage),
    Indexed(IndexedStorage),
}

impl StorageBackend {
    pub fn kind(&self) -> StorageKind {
        match self {
            StorageBackend::Inline(_) => StorageKind::Database,
            StorageBackend::Indexed(_) => StorageKind::Object,
        }
    }
}

#[async_trait]
impl FileStorage for StorageBackend {
    async fn upload(
        &self,
        content: ContentStream<'_>,
        filename: &str,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<FileMetadata, StorageError> {
        match self {
            StorageBackend::Inline(s) => s.upload(content, filename, content_type, cancel).await,
            StorageBackend::Indexed(s) => s.upload(content, filename, content_type, cancel).await,
        }
    }

    async fn download(
        &self,
        id: &FileId,
        cancel: &CancellationToken,
    ) -> Result<(FileMetadata, ContentStream<'static>), StorageError> {
        match self {
            StorageBackend::Inline(s) => s.download(id, cancel).await,
            StorageBackend::Indexed(s) => s.download(id, cancel).await,
        }
    }

    async fn get_metadata(
        &self,
        id: &FileId,
        cancel: &CancellationToken,
    ) -> Result<FileMetadata, StorageError> {
        match self {
            StorageBackend::Inline(s) => s.get_metadata(id, cancel).await,
            StorageBackend::Indexed(s) => s.get_metadata(id, cancel).await,
        }
    }

    async fn delete(&self, id: &FileId, cancel: &CancellationToken) -> Result<(), StorageError> {
        match self {
            StorageBackend::Inline(s) => s.delete(id, cancel).await,
            StorageBackend::Indexed(s) => s.delete(id, cancel).await,
        }
    }

    async fn list(
        &self,
        skip: usize,
        take: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<FileMetadata>, StorageError> {
        match self {
            StorageBackend::Inline(s) => s.list(skip, take, cancel).await,
            StorageBackend::Indexed(s) => s.list(skip, take, cancel).await,
        }
    }
}

/// Shared validation of the caller supplied fields of an upload.
pub(crate) fn validate_upload_fields(filename: &str, content_type: &str) -> Result<(), StorageError> {
    data_model::validate_filename(filename)
        .and_then(|_| data_model::validate_content_type(content_type))
        .map_err(|e| StorageError::InvalidInput(e.to_string()))
}

/// Shared validation of a list window.
pub(crate) fn list_window(take: usize, limit: usize) -> Result<usize, StorageError> {
    if take == 0 {
        return Err(StorageError::InvalidInput(
            "take must be greater than 0".to_string(),
        ));
    }
    Ok(take.min(limit))
}
