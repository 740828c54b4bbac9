use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use blob_store::BlobStorage;
use data_model::{BlobRef, FileId, FileMetadata, IndexedFileRecord};
use metrics::{storage_stats, Timer};
use object_store::path::Path;
use state_store::{
    requests::{RequestPayload, StateMachineUpdateRequest, WriteOutcome},
    state_machine::FileStoreColumns,
    StateStore,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    check_cancelled,
    list_window,
    validate_upload_fields,
    ContentStream,
    FileStorage,
    StorageError,
};

/// Stores content as objects in the blob store and keeps a metadata index
/// row per file in the state store.
///
/// An index row is only written once its object is durably stored, so a
/// row without an object only shows up after an external deletion.
pub struct IndexedStorage {
    state: Arc<StateStore>,
    blob_storage: Arc<BlobStorage>,
    container: String,
    list_take_limit: usize,
    metrics: storage_stats::Metrics,
}

impl IndexedStorage {
    pub fn new(
        state: Arc<StateStore>,
        blob_storage: Arc<BlobStorage>,
        container: &str,
        list_take_limit: usize,
    ) -> Self {
        Self {
            state,
            blob_storage,
            container: container.to_string(),
            list_take_limit,
            metrics: storage_stats::Metrics::new("indexed"),
        }
    }

    fn location(&self, blob: &BlobRef) -> Path {
        self.blob_storage
            .object_path(&blob.container, &blob.object_name)
    }

    fn lookup(&self, id: &FileId) -> Result<IndexedFileRecord, StorageError> {
        self.state
            .reader()
            .get_indexed_file(id)
            .map_err(StorageError::internal)?
            .ok_or(StorageError::NotFound { id: *id })
    }

    /// Removes an object that never got an index row.
    async fn discard_orphan(&self, location: &Path) {
        if let Err(e) = self.blob_storage.delete(location).await {
            warn!(
                location = %location,
                "failed to remove object of an aborted upload: {:?}",
                e
            );
        }
    }

    /// Writes `content` under `location` and returns the size reported by the
    /// store for the committed object.
    async fn store_object(
        &self,
        location: &Path,
        content: ContentStream<'_>,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<u64, StorageError> {
        self.blob_storage
            .ensure_container(&self.container)
            .await
            .map_err(StorageError::write_failure)?;
        if let Err(e) = self
            .blob_storage
            .put(location, content_type, content, cancel)
            .await
        {
            if cancel.is_cancelled() {
                return Err(StorageError::Cancelled);
            }
            return Err(StorageError::write_failure(e));
        }
        match self.blob_storage.size(location).await {
            Ok(Some(size)) => Ok(size),
            Ok(None) => Err(StorageError::write_failure(anyhow!(
                "object {} missing right after it was written",
                location
            ))),
            Err(e) => {
                self.discard_orphan(location).await;
                Err(StorageError::write_failure(e))
            }
        }
    }
}

#[async_trait]
impl FileStorage for IndexedStorage {
    async fn upload(
        &self,
        content: ContentStream<'_>,
        filename: &str,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<FileMetadata, StorageError> {
        let _timer =
            Timer::start_with_labels(&self.metrics.operations, self.metrics.labels("upload"));
        validate_upload_fields(filename, content_type)?;
        check_cancelled(cancel)?;

        let blob = BlobRef::generate(&self.container, filename);
        let location = self.location(&blob);
        let file_size = self
            .store_object(&location, content, content_type, cancel)
            .await?;

        if cancel.is_cancelled() {
            self.discard_orphan(&location).await;
            return Err(StorageError::Cancelled);
        }
        if file_size == 0 {
            self.discard_orphan(&location).await;
            return Err(StorageError::InvalidInput("file is empty".to_string()));
        }

        let record = IndexedFileRecord {
            metadata: FileMetadata {
                id: FileId::new(),
                filename: filename.to_string(),
                content_type: content_type.to_string(),
                file_size,
                uploaded_at: self.state.next_upload_time(),
            },
            blob,
        };
        let metadata = record.metadata.clone();
        if let Err(e) = self
            .state
            .write(StateMachineUpdateRequest {
                payload: RequestPayload::CreateIndexedFile(record),
            })
            .await
        {
            self.discard_orphan(&location).await;
            return Err(StorageError::write_failure(e));
        }

        self.metrics.record_upload(file_size);
        info!(
            file_id = %metadata.id,
            location = %location,
            file_size,
            "stored indexed file"
        );
        Ok(metadata)
    }

    async fn download(
        &self,
        id: &FileId,
        cancel: &CancellationToken,
    ) -> Result<(FileMetadata, ContentStream<'static>), StorageError> {
        let _timer =
            Timer::start_with_labels(&self.metrics.operations, self.metrics.labels("download"));
        check_cancelled(cancel)?;
        let record = self.lookup(id)?;
        let location = self.location(&record.blob);

        let missing = || {
            warn!(
                file_id = %id,
                blob = %record.blob,
                "index row references a missing object"
            );
            StorageError::NotFound { id: *id }
        };
        if self
            .blob_storage
            .size(&location)
            .await
            .map_err(StorageError::internal)?
            .is_none()
        {
            return Err(missing());
        }
        check_cancelled(cancel)?;
        let content = self
            .blob_storage
            .get(&location)
            .await
            .map_err(StorageError::internal)?
            .ok_or_else(missing)?;

        self.metrics.record_download(record.metadata.file_size);
        debug!(file_id = %id, location = %location, "streaming indexed file");
        Ok((record.metadata, content))
    }

    async fn get_metadata(
        &self,
        id: &FileId,
        cancel: &CancellationToken,
    ) -> Result<FileMetadata, StorageError> {
        check_cancelled(cancel)?;
        Ok(self.lookup(id)?.metadata)
    }

    async fn delete(&self, id: &FileId, cancel: &CancellationToken) -> Result<(), StorageError> {
        let _timer =
            Timer::start_with_labels(&self.metrics.operations, self.metrics.labels("delete"));
        check_cancelled(cancel)?;
        let record = self.lookup(id)?;
        let location = self.location(&record.blob);

        if let Err(source) = self.blob_storage.delete(&location).await {
            let partial = StorageError::PartialDeleteFailure {
                id: *id,
                object: record.blob.to_string(),
                source,
            };
            warn!("{}", partial);
            self.metrics.record_partial_delete();
        }

        let outcome = self
            .state
            .write(StateMachineUpdateRequest {
                payload: RequestPayload::DeleteIndexedFile(*id),
            })
            .await
            .map_err(StorageError::internal)?;
        match outcome {
            WriteOutcome::Applied => {
                debug!(file_id = %id, "deleted indexed file");
                Ok(())
            }
            // A concurrent delete removed the row first.
            WriteOutcome::Missing => Err(StorageError::NotFound { id: *id }),
        }
    }

    async fn list(
        &self,
        skip: usize,
        take: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<FileMetadata>, StorageError> {
        let take = list_window(take, self.list_take_limit)?;
        check_cancelled(cancel)?;
        self.state
            .reader()
            .list_files(FileStoreColumns::IndexedFilesByTime, skip, take)
            .map_err(StorageError::internal)
    }
}
