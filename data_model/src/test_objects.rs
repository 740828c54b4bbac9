pub mod tests {
    use bytes::Bytes;

    use crate::{BlobRef, FileId, FileMetadata, IndexedFileRecord, InlineFileRecord};

    pub const TEST_CONTAINER: &str = "test_files";
    pub const TEST_CONTENT_TYPE: &str = "application/octet-stream";

    pub fn mock_inline_record(filename: &str, content: &'static [u8], uploaded_at: u64) -> InlineFileRecord {
        InlineFileRecord::new(
            FileId::new(),
            filename.to_string(),
            TEST_CONTENT_TYPE.to_string(),
            Bytes::from_static(content),
            uploaded_at,
        )
    }

    pub fn mock_indexed_record(filename: &str, file_size: u64, uploaded_at: u64) -> IndexedFileRecord {
        IndexedFileRecord {
            metadata: FileMetadata {
                id: FileId::new(),
                filename: filename.to_string(),
                content_type: TEST_CONTENT_TYPE.to_string(),
                file_size,
                uploaded_at,
            },
            blob: BlobRef::generate(TEST_CONTAINER, filename),
        }
    }
}
