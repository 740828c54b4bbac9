use anyhow::{anyhow, Result};
use data_model::{FileId, FileMetadata, IndexedFileRecord, InlineFileRecord};
use filestore_utils::OptionInspectNone;
use rocksdb::{ColumnFamily, Transaction, TransactionDB};
use strum::AsRefStr;
use tracing::debug;

use super::serializer::{CborEncoder, JsonEncode, JsonEncoder};
use crate::requests::WriteOutcome;

#[derive(AsRefStr, strum::Display, strum::EnumIter, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStoreColumns {
    InlineFiles,       //  FileId -> InlineFileRecord (cbor)
    InlineFilesByTime, //  ListingKey -> FileMetadata

    IndexedFiles,       //  FileId -> IndexedFileRecord
    IndexedFilesByTime, //  ListingKey -> FileMetadata
}

impl FileStoreColumns {
    pub fn cf_db<'a>(&self, db: &'a TransactionDB) -> Result<&'a ColumnFamily> {
        db.cf_handle(self.as_ref())
            .inspect_none(|| {
                tracing::error!("failed to get column family handle for {}", self.as_ref());
            })
            .ok_or_else(|| anyhow!("column family {} not found", self))
    }
}

pub(crate) fn create_inline_file(
    db: &TransactionDB,
    txn: &Transaction<TransactionDB>,
    record: &InlineFileRecord,
) -> Result<()> {
    record.validate()?;
    let serialized_row = CborEncoder::encode(record)?;
    let serialized_metadata = JsonEncoder::encode(&record.metadata)?;
    txn.put_cf(
        FileStoreColumns::InlineFiles.cf_db(db)?,
        record.key(),
        serialized_row,
    )?;
    txn.put_cf(
        FileStoreColumns::InlineFilesByTime.cf_db(db)?,
        record.metadata.listing_key(),
        serialized_metadata,
    )?;
    Ok(())
}

pub(crate) fn delete_inline_file(
    db: &TransactionDB,
    txn: &Transaction<TransactionDB>,
    id: &FileId,
) -> Result<WriteOutcome> {
    let rows_cf = FileStoreColumns::InlineFiles.cf_db(db)?;
    let Some(row) = txn.get_for_update_cf(rows_cf, id.as_bytes(), true)? else {
        debug!(file_id = %id, "inline file already absent");
        return Ok(WriteOutcome::Missing);
    };
    let record: InlineFileRecord = CborEncoder::decode(&row)?;
    txn.delete_cf(rows_cf, id.as_bytes())?;
    txn.delete_cf(
        FileStoreColumns::InlineFilesByTime.cf_db(db)?,
        record.metadata.listing_key(),
    )?;
    Ok(WriteOutcome::Applied)
}

pub(crate) fn create_indexed_file(
    db: &TransactionDB,
    txn: &Transaction<TransactionDB>,
    record: &IndexedFileRecord,
) -> Result<()> {
    let serialized_row = JsonEncoder::encode(record)?;
    let serialized_metadata = JsonEncoder::encode(&record.metadata)?;
    txn.put_cf(
        FileStoreColumns::IndexedFiles.cf_db(db)?,
        record.key(),
        serialized_row,
    )?;
    txn.put_cf(
        FileStoreColumns::IndexedFilesByTime.cf_db(db)?,
        record.metadata.listing_key(),
        serialized_metadata,
    )?;
    Ok(())
}

pub(crate) fn delete_indexed_file(
    db: &TransactionDB,
    txn: &Transaction<TransactionDB>,
    id: &FileId,
) -> Result<WriteOutcome> {
    let rows_cf = FileStoreColumns::IndexedFiles.cf_db(db)?;
    let Some(row) = txn.get_for_update_cf(rows_cf, id.as_bytes(), true)? else {
        debug!(file_id = %id, "index row already absent");
        return Ok(WriteOutcome::Missing);
    };
    let record: IndexedFileRecord = JsonEncoder::decode(&row)?;
    txn.delete_cf(rows_cf, id.as_bytes())?;
    txn.delete_cf(
        FileStoreColumns::IndexedFilesByTime.cf_db(db)?,
        record.metadata.listing_key(),
    )?;
    Ok(WriteOutcome::Applied)
}

/// Metadata rows are kept next to the listing key so that listing never
/// decodes content-bearing rows.
pub(crate) fn decode_listing_entry(value: &[u8]) -> Result<FileMetadata> {
    JsonEncoder::decode(value)
}
