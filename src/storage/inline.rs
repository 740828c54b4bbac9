use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use data_model::{FileId, FileMetadata, InlineFileRecord};
use futures::{stream, StreamExt};
use metrics::{storage_stats, Timer};
use state_store::{
    requests::{RequestPayload, StateMachineUpdateRequest, WriteOutcome},
    state_machine::FileStoreColumns,
    StateStore,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{
    check_cancelled,
    list_window,
    validate_upload_fields,
    ContentStream,
    FileStorage,
    StorageError,
};

/// Keeps content and metadata together in one state store row.
pub struct InlineStorage {
    state: Arc<StateStore>,
    list_take_limit: usize,
    metrics: storage_stats::Metrics,
}

impl InlineStorage {
    pub fn new(state: Arc<StateStore>, list_take_limit: usize) -> Self {
        Self {
            state,
            list_take_limit,
            metrics: storage_stats::Metrics::new("inline"),
        }
    }

    fn lookup(&self, id: &FileId) -> Result<InlineFileRecord, StorageError> {
        self.state
            .reader()
            .get_inline_file(id)
            .map_err(StorageError::internal)?
            .ok_or(StorageError::NotFound { id: *id })
    }
}

/// Reads the whole stream into memory, giving up as soon as `cancel` fires.
async fn buffer_content(
    mut content: ContentStream<'_>,
    cancel: &CancellationToken,
) -> Result<Bytes, StorageError> {
    let mut buf = BytesMut::new();
    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StorageError::Cancelled),
            chunk = content.next() => chunk,
        };
        match chunk {
            Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
            Some(Err(e)) => {
                return Err(StorageError::write_failure(
                    e.context("failed to read upload content"),
                ))
            }
            None => break,
        }
    }
    Ok(buf.freeze())
}

#[async_trait]
impl FileStorage for InlineStorage {
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
        let content = buffer_content(content, cancel).await?;
        check_cancelled(cancel)?;
        if content.is_empty() {
            return Err(StorageError::InvalidInput("file is empty".to_string()));
        }

        let record = InlineFileRecord::new(
            FileId::new(),
            filename.to_string(),
            content_type.to_string(),
            content,
            self.state.next_upload_time(),
        );
        let metadata = record.metadata.clone();
        self.state
            .write(StateMachineUpdateRequest {
                payload: RequestPayload::CreateInlineFile(record),
            })
            .await
            .map_err(StorageError::write_failure)?;

        self.metrics.record_upload(metadata.file_size);
        info!(
            file_id = %metadata.id,
            file_size = metadata.file_size,
            "stored inline file"
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
        let InlineFileRecord { metadata, content } = self.lookup(id)?;
        self.metrics.record_download(metadata.file_size);
        let content: ContentStream<'static> = stream::once(async move { Ok(content) }).boxed();
        Ok((metadata, content))
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
        let outcome = self
            .state
            .write(StateMachineUpdateRequest {
                payload: RequestPayload::DeleteInlineFile(*id),
            })
            .await
            .map_err(StorageError::internal)?;
        match outcome {
            WriteOutcome::Applied => {
                debug!(file_id = %id, "deleted inline file");
                Ok(())
            }
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
            .list_files(FileStoreColumns::InlineFilesByTime, skip, take)
            .map_err(StorageError::internal)
    }
}
