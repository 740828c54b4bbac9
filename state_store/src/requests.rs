use data_model::{FileId, IndexedFileRecord, InlineFileRecord};

pub struct StateMachineUpdateRequest {
    pub payload: RequestPayload,
}

#[derive(Debug, Clone, strum::Display)]
pub enum RequestPayload {
    CreateInlineFile(InlineFileRecord),
    DeleteInlineFile(FileId),
    CreateIndexedFile(IndexedFileRecord),
    DeleteIndexedFile(FileId),
}

/// Result of applying a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// The request targeted a row that does not exist; nothing was written.
    Missing,
}
