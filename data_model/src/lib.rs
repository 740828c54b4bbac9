pub mod test_objects;

use std::{
    fmt::{self, Display},
    str::FromStr,
};

use anyhow::{anyhow, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use strum::AsRefStr;
use uuid::Uuid;

pub const MAX_FILENAME_LEN: usize = 255;
pub const MAX_CONTENT_TYPE_LEN: usize = 100;
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Length of a listing key: reversed upload time followed by the id bytes.
pub const LISTING_KEY_LEN: usize = 8 + 16;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct FileId(Uuid);

impl FileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FileId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl From<Uuid> for FileId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// Which of the two storage backends owns a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, strum::Display)]
pub enum StorageKind {
    /// Content and metadata stored together in one row.
    Database,
    /// Content stored in the blob store, metadata in an index row.
    Object,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub id: FileId,
    pub filename: String,
    pub content_type: String,
    pub file_size: u64,
    /// Epoch microseconds, assigned by the store at write time.
    pub uploaded_at: u64,
}

impl FileMetadata {
    /// Key of this file in a listing index. Keys sort newest first, ties
    /// broken by ascending id.
    pub fn listing_key(&self) -> Vec<u8> {
        listing_key(self.uploaded_at, &self.id)
    }
}

pub fn listing_key(uploaded_at: u64, id: &FileId) -> Vec<u8> {
    let mut key = Vec::with_capacity(LISTING_KEY_LEN);
    key.extend_from_slice(&(u64::MAX - uploaded_at).to_be_bytes());
    key.extend_from_slice(id.as_bytes());
    key
}

/// Recovers the upload time encoded in a listing key.
pub fn uploaded_at_from_listing_key(key: &[u8]) -> Result<u64> {
    let prefix: [u8; 8] = key
        .get(..8)
        .and_then(|p| p.try_into().ok())
        .ok_or_else(|| anyhow!("listing key too short: {} bytes", key.len()))?;
    Ok(u64::MAX - u64::from_be_bytes(prefix))
}

pub fn validate_filename(filename: &str) -> Result<()> {
    if filename.is_empty() {
        return Err(anyhow!("filename must not be empty"));
    }
    if filename.chars().count() > MAX_FILENAME_LEN {
        return Err(anyhow!(
            "filename exceeds {} characters",
            MAX_FILENAME_LEN
        ));
    }
    Ok(())
}

pub fn validate_content_type(content_type: &str) -> Result<()> {
    if content_type.is_empty() {
        return Err(anyhow!("content type must not be empty"));
    }
    if content_type.chars().count() > MAX_CONTENT_TYPE_LEN {
        return Err(anyhow!(
            "content type exceeds {} characters",
            MAX_CONTENT_TYPE_LEN
        ));
    }
    Ok(())
}

/// A file persisted by the inline backend: metadata and content in one row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineFileRecord {
    pub metadata: FileMetadata,
    pub content: Bytes,
}

impl InlineFileRecord {
    pub fn new(
        id: FileId,
        filename: String,
        content_type: String,
        content: Bytes,
        uploaded_at: u64,
    ) -> Self {
        Self {
            metadata: FileMetadata {
                id,
                filename,
                content_type,
                file_size: content.len() as u64,
                uploaded_at,
            },
            content,
        }
    }

    pub fn key(&self) -> &[u8; 16] {
        self.metadata.id.as_bytes()
    }

    /// The stored size must always match the stored content.
    pub fn validate(&self) -> Result<()> {
        if self.metadata.file_size != self.content.len() as u64 {
            return Err(anyhow!(
                "inline record {} claims {} bytes but holds {}",
                self.metadata.id,
                self.metadata.file_size,
                self.content.len()
            ));
        }
        Ok(())
    }
}

/// Location of an object in the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobRef {
    pub container: String,
    pub object_name: String,
}

impl BlobRef {
    /// Object names embed a fresh uuid so repeated filenames never collide.
    pub fn generate(container: &str, filename: &str) -> Self {
        Self {
            container: container.to_string(),
            object_name: format!("{}/{}", FileId::new(), filename),
        }
    }
}

impl Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.object_name)
    }
}

/// A file persisted by the indexed object backend: metadata plus a
/// reference to content stored elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedFileRecord {
    pub metadata: FileMetadata,
    pub blob: BlobRef,
}

impl IndexedFileRecord {
    pub fn key(&self) -> &[u8; 16] {
        self.metadata.id.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_key_orders_newest_first() {
        let id = FileId::new();
        let older = listing_key(1_000, &id);
        let newer = listing_key(2_000, &id);
        assert!(newer < older);
        assert_eq!(uploaded_at_from_listing_key(&newer).unwrap(), 2_000);
    }

    #[test]
    fn test_listing_key_breaks_ties_by_id() {
        let a: FileId = "00000000-0000-4000-8000-000000000001".parse().unwrap();
        let b: FileId = "00000000-0000-4000-8000-000000000002".parse().unwrap();
        assert!(listing_key(5, &a) < listing_key(5, &b));
    }

    #[test]
    fn test_inline_record_size_matches_content() {
        let record = InlineFileRecord::new(
            FileId::new(),
            "a.txt".to_string(),
            "text/plain".to_string(),
            Bytes::from_static(b"hello"),
            1,
        );
        assert_eq!(record.metadata.file_size, 5);
        assert!(record.validate().is_ok());

        let mut tampered = record.clone();
        tampered.metadata.file_size = 4;
        assert!(tampered.validate().is_err());
    }

    #[test]
    fn test_field_validation() {
        assert!(validate_filename("").is_err());
        assert!(validate_filename(&"x".repeat(MAX_FILENAME_LEN)).is_ok());
        assert!(validate_filename(&"x".repeat(MAX_FILENAME_LEN + 1)).is_err());
        assert!(validate_content_type("").is_err());
        assert!(validate_content_type(&"y".repeat(MAX_CONTENT_TYPE_LEN + 1)).is_err());
        assert!(validate_content_type("image/png").is_ok());
    }

    #[test]
    fn test_blob_refs_are_unique_for_same_filename() {
        let a = BlobRef::generate("files", "report.pdf");
        let b = BlobRef::generate("files", "report.pdf");
        assert_ne!(a, b);
        assert!(a.object_name.ends_with("/report.pdf"));
    }
}
