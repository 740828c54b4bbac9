use std::sync::Arc;

use anyhow::{anyhow, Result};
use data_model::{uploaded_at_from_listing_key, FileId, FileMetadata, IndexedFileRecord, InlineFileRecord};
use metrics::{StateStoreMetrics, Timer};
use opentelemetry::KeyValue;
use rocksdb::{IteratorMode, ReadOptions, TransactionDB};

use super::state_machine::{decode_listing_entry, FileStoreColumns};
use crate::serializer::{CborEncoder, JsonEncode, JsonEncoder};

pub struct StateReader {
    db: Arc<TransactionDB>,
    metrics: Arc<StateStoreMetrics>,
}

impl StateReader {
    pub fn new(db: Arc<TransactionDB>, metrics: Arc<StateStoreMetrics>) -> Self {
        Self { db, metrics }
    }

    fn get_row(&self, column: FileStoreColumns, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let kvs = vec![KeyValue::new("column", column.to_string())];
        let _timer = Timer::start_with_labels(&self.metrics.state_read, kvs);
        let cf = column.cf_db(&self.db)?;
        Ok(self.db.get_cf(cf, key)?)
    }

    pub fn get_inline_file(&self, id: &FileId) -> Result<Option<InlineFileRecord>> {
        let Some(row) = self.get_row(FileStoreColumns::InlineFiles, id.as_bytes())? else {
            return Ok(None);
        };
        let record: InlineFileRecord = CborEncoder::decode(&row)?;
        record.validate()?;
        Ok(Some(record))
    }

    pub fn get_indexed_file(&self, id: &FileId) -> Result<Option<IndexedFileRecord>> {
        self.get_row(FileStoreColumns::IndexedFiles, id.as_bytes())?
            .map(|row| JsonEncoder::decode(&row))
            .transpose()
    }

    /// Returns up to `take` entries of a listing index after skipping the
    /// first `skip`, newest first.
    pub fn list_files(
        &self,
        column: FileStoreColumns,
        skip: usize,
        take: usize,
    ) -> Result<Vec<FileMetadata>> {
        if !matches!(
            column,
            FileStoreColumns::InlineFilesByTime | FileStoreColumns::IndexedFilesByTime
        ) {
            return Err(anyhow!("{} is not a listing index", column));
        }
        let kvs = vec![KeyValue::new("column", column.to_string())];
        let _timer = Timer::start_with_labels(&self.metrics.state_read, kvs);
        let cf = column.cf_db(&self.db)?;
        let mut read_options = ReadOptions::default();
        read_options.set_readahead_size(4_194_304);
        let iter = self.db.iterator_cf_opt(cf, read_options, IteratorMode::Start);

        let mut items = Vec::with_capacity(take.min(1024));
        for kv in iter.skip(skip).take(take) {
            let (_, value) = kv?;
            items.push(decode_listing_entry(&value)?);
        }
        Ok(items)
    }

    /// Upload time of the newest entry in a listing index.
    pub fn newest_upload_time(&self, column: FileStoreColumns) -> Result<Option<u64>> {
        let cf = column.cf_db(&self.db)?;
        let mut iter = self.db.iterator_cf(cf, IteratorMode::Start);
        match iter.next() {
            Some(kv) => {
                let (key, _) = kv?;
                Ok(Some(uploaded_at_from_listing_key(&key)?))
            }
            None => Ok(None),
        }
    }
}
