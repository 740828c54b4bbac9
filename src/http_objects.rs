use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::storage::StorageError;

pub const DEFAULT_LIST_TAKE: usize = 100;

#[derive(Debug)]
pub struct ApiError {
    status_code: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status_code: StatusCode, message: &str) -> Self {
        Self {
            status_code,
            message: message.to_string(),
        }
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Internal details stay in the server logs.
    pub fn internal_error(e: anyhow::Error) -> Self {
        error!("internal error: {:?}", e);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }

    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status_code.is_server_error() {
            error!("API Error: {} - {}", self.status_code, self.message);
        } else {
            warn!("API Error: {} - {}", self.status_code, self.message);
        }
        (self.status_code, self.message).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound { .. } => Self::not_found("file not found"),
            StorageError::InvalidInput(message) => Self::bad_request(&message),
            e => Self::internal_error(e.into()),
        }
    }
}

/// File metadata as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub id: String,
    pub filename: String,
    pub content_type: String,
    pub file_size: u64,
    pub uploaded_at: DateTime<Utc>,
}

impl From<data_model::FileMetadata> for FileMetadata {
    fn from(metadata: data_model::FileMetadata) -> Self {
        let uploaded_at =
            DateTime::from_timestamp_micros(metadata.uploaded_at as i64).unwrap_or_default();
        Self {
            id: metadata.id.to_string(),
            filename: metadata.filename,
            content_type: metadata.content_type,
            file_size: metadata.file_size,
            uploaded_at,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ListParams {
    pub skip: Option<usize>,
    pub take: Option<usize>,
}

impl ListParams {
    pub fn window(&self) -> (usize, usize) {
        (
            self.skip.unwrap_or(0),
            self.take.unwrap_or(DEFAULT_LIST_TAKE),
        )
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use data_model::FileId;

    use super::*;

    #[test]
    fn test_metadata_json_shape() -> anyhow::Result<()> {
        let id: FileId = "7d444840-9dc0-11d1-b245-5ffdce74fad2".parse()?;
        let metadata = FileMetadata::from(data_model::FileMetadata {
            id,
            filename: "a.txt".to_string(),
            content_type: "text/plain".to_string(),
            file_size: 3,
            uploaded_at: 1_700_000_000_123_456,
        });
        let json = serde_json::to_value(&metadata)?;
        assert_eq!(json["id"], "7d444840-9dc0-11d1-b245-5ffdce74fad2");
        assert_eq!(json["contentType"], "text/plain");
        assert_eq!(json["fileSize"], 3);
        assert_eq!(json["uploadedAt"], "2023-11-14T22:13:20.123456Z");
        Ok(())
    }

    #[test]
    fn test_storage_errors_map_to_status_codes() {
        let not_found: ApiError = StorageError::NotFound { id: FileId::new() }.into();
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        let invalid: ApiError = StorageError::InvalidInput("take must be > 0".to_string()).into();
        assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);

        let write: ApiError = StorageError::write_failure(anyhow!("disk full")).into();
        assert_eq!(write.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(write.message, "internal server error");

        let cancelled: ApiError = StorageError::Cancelled.into();
        assert_eq!(cancelled.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_list_defaults() {
        assert_eq!(ListParams::default().window(), (0, DEFAULT_LIST_TAKE));
        let params = ListParams {
            skip: Some(5),
            take: Some(7),
        };
        assert_eq!(params.window(), (5, 7));
    }
}
