use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{anyhow, Result};
use filestore_utils::MonotonicClock;
use metrics::{StateStoreMetrics, Timer};
use opentelemetry::KeyValue;
use requests::{RequestPayload, StateMachineUpdateRequest, WriteOutcome};
use rocksdb::{ColumnFamilyDescriptor, Options, TransactionDB, TransactionDBOptions};
use state_machine::FileStoreColumns;
use strum::IntoEnumIterator;
use tracing::{debug, info, span};

pub mod requests;
pub mod scanner;
pub mod serializer;
pub mod state_machine;
pub mod test_state_store;

pub struct StateStore {
    pub db: Arc<TransactionDB>,
    pub metrics: Arc<StateStoreMetrics>,
    upload_clock: MonotonicClock,
}

impl StateStore {
    pub async fn new(path: PathBuf) -> Result<Arc<Self>> {
        fs::create_dir_all(path.clone())
            .map_err(|e| anyhow!("failed to create state store dir: {}", e))?;

        let sm_column_families = FileStoreColumns::iter()
            .map(|cf| ColumnFamilyDescriptor::new(cf.to_string(), Options::default()));
        let mut db_opts = Options::default();
        db_opts.create_missing_column_families(true);
        db_opts.create_if_missing(true);
        let db = Arc::new(
            TransactionDB::open_cf_descriptors(
                &db_opts,
                &TransactionDBOptions::default(),
                path,
                sm_column_families,
            )
            .map_err(|e| anyhow!("failed to open db: {}", e))?,
        );
        let state_store_metrics = Arc::new(StateStoreMetrics::new());

        // Upload times handed out after a restart must not sort behind rows
        // that are already persisted.
        let reader = scanner::StateReader::new(db.clone(), state_store_metrics.clone());
        let newest_inline = reader.newest_upload_time(FileStoreColumns::InlineFilesByTime)?;
        let newest_indexed = reader.newest_upload_time(FileStoreColumns::IndexedFilesByTime)?;
        let floor = newest_inline.max(newest_indexed).unwrap_or_default();

        let s = Arc::new(Self {
            db,
            metrics: state_store_metrics,
            upload_clock: MonotonicClock::new(floor),
        });
        info!("initialized state store, newest upload time: {}", floor);
        Ok(s)
    }

    /// Timestamp for a new upload in epoch microseconds. Never smaller than
    /// one handed out before, including before a restart.
    pub fn next_upload_time(&self) -> u64 {
        self.upload_clock.now()
    }

    #[tracing::instrument(
        skip(self, request),
        fields(
            request_type = request.payload.to_string(),
        )
    )]
    pub async fn write(&self, request: StateMachineUpdateRequest) -> Result<WriteOutcome> {
        let timer_kv = vec![KeyValue::new("request", request.payload.to_string())];
        debug!("writing state machine update request");
        let _timer = Timer::start_with_labels(&self.metrics.state_write, timer_kv);
        let txn = self.db.transaction();
        let outcome = match &request.payload {
            RequestPayload::CreateInlineFile(record) => {
                let _enter = span!(
                    tracing::Level::DEBUG,
                    "create_inline_file",
                    file_id = %record.metadata.id,
                    file_size = record.metadata.file_size,
                )
                .entered();
                state_machine::create_inline_file(&self.db, &txn, record)?;
                WriteOutcome::Applied
            }
            RequestPayload::DeleteInlineFile(id) => {
                state_machine::delete_inline_file(&self.db, &txn, id)?
            }
            RequestPayload::CreateIndexedFile(record) => {
                let _enter = span!(
                    tracing::Level::DEBUG,
                    "create_indexed_file",
                    file_id = %record.metadata.id,
                    blob = %record.blob,
                )
                .entered();
                state_machine::create_indexed_file(&self.db, &txn, record)?;
                WriteOutcome::Applied
            }
            RequestPayload::DeleteIndexedFile(id) => {
                state_machine::delete_indexed_file(&self.db, &txn, id)?
            }
        };
        txn.commit()?;
        Ok(outcome)
    }

    pub fn reader(&self) -> scanner::StateReader {
        scanner::StateReader::new(self.db.clone(), self.metrics.clone())
    }
}

#[cfg(test)]
mod tests {
    use data_model::{
        test_objects::tests::{mock_indexed_record, mock_inline_record},
        FileId,
    };

    use super::*;
    use crate::test_state_store::TestStateStore;

    fn create_inline(record: &data_model::InlineFileRecord) -> StateMachineUpdateRequest {
        StateMachineUpdateRequest {
            payload: RequestPayload::CreateInlineFile(record.clone()),
        }
    }

    #[tokio::test]
    async fn test_inline_file_roundtrip() -> Result<()> {
        let store = TestStateStore::new().await?;
        let record = mock_inline_record("notes.txt", b"\x00\x01binary\xff", 10);
        let outcome = store.state.write(create_inline(&record)).await?;
        assert_eq!(outcome, WriteOutcome::Applied);

        let stored = store
            .state
            .reader()
            .get_inline_file(&record.metadata.id)?
            .ok_or_else(|| anyhow!("record not found"))?;
        assert_eq!(stored.metadata, record.metadata);
        assert_eq!(stored.content, record.content);
        Ok(())
    }

    #[tokio::test]
    async fn test_listing_is_newest_first_and_paginates() -> Result<()> {
        let store = TestStateStore::new().await?;
        let mut ids = Vec::new();
        for ts in 1..=5u64 {
            let record = mock_inline_record(&format!("f{ts}.bin"), b"x", ts * 100);
            ids.push(record.metadata.id);
            store.state.write(create_inline(&record)).await?;
        }
        ids.reverse();

        let reader = store.state.reader();
        let all = reader.list_files(FileStoreColumns::InlineFilesByTime, 0, 100)?;
        assert_eq!(all.iter().map(|m| m.id).collect::<Vec<_>>(), ids);

        let page = reader.list_files(FileStoreColumns::InlineFilesByTime, 1, 2)?;
        assert_eq!(page.iter().map(|m| m.id).collect::<Vec<_>>(), ids[1..3]);

        assert!(reader
            .list_files(FileStoreColumns::InlineFilesByTime, 5, 10)?
            .is_empty());
        assert!(reader
            .list_files(FileStoreColumns::InlineFilesByTime, 0, 0)?
            .is_empty());
        assert!(reader
            .list_files(FileStoreColumns::InlineFiles, 0, 10)
            .is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_removes_row_and_listing_entry() -> Result<()> {
        let store = TestStateStore::new().await?;
        let record = mock_indexed_record("photo.png", 42, 7);
        let id = record.metadata.id;
        store
            .state
            .write(StateMachineUpdateRequest {
                payload: RequestPayload::CreateIndexedFile(record),
            })
            .await?;

        let delete = || StateMachineUpdateRequest {
            payload: RequestPayload::DeleteIndexedFile(id),
        };
        assert_eq!(store.state.write(delete()).await?, WriteOutcome::Applied);
        assert_eq!(store.state.write(delete()).await?, WriteOutcome::Missing);

        let reader = store.state.reader();
        assert!(reader.get_indexed_file(&id)?.is_none());
        assert!(reader
            .list_files(FileStoreColumns::IndexedFilesByTime, 0, 10)?
            .is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_backends_do_not_share_rows() -> Result<()> {
        let store = TestStateStore::new().await?;
        let record = mock_inline_record("a.txt", b"abc", 1);
        let id = record.metadata.id;
        store.state.write(create_inline(&record)).await?;

        let reader = store.state.reader();
        assert!(reader.get_indexed_file(&id)?.is_none());
        assert!(reader
            .list_files(FileStoreColumns::IndexedFilesByTime, 0, 10)?
            .is_empty());
        let outcome = store
            .state
            .write(StateMachineUpdateRequest {
                payload: RequestPayload::DeleteIndexedFile(id),
            })
            .await?;
        assert_eq!(outcome, WriteOutcome::Missing);
        assert!(reader.get_inline_file(&id)?.is_some());
        assert!(reader.get_inline_file(&FileId::new())?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_upload_clock_is_seeded_from_persisted_rows() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("state");
        let far_future = filestore_utils::get_epoch_time_in_micros() + 3_600_000_000;
        {
            let store = StateStore::new(path.clone()).await?;
            let record = mock_inline_record("later.txt", b"z", far_future);
            store.write(create_inline(&record)).await?;
        }

        let reopened = StateStore::new(path).await?;
        assert!(reopened.next_upload_time() >= far_future);
        Ok(())
    }
}
