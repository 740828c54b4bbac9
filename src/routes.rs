use std::sync::Arc;

use anyhow::anyhow;
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json,
    Router,
};
use data_model::{FileId, DEFAULT_CONTENT_TYPE};
use futures::{stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::{
    http_objects::{ApiError, FileMetadata, ListParams},
    storage::{ContentStream, FileStorage, StorageBackend},
};

pub const INLINE_BASE_PATH: &str = "/api/files/db";
pub const INDEXED_BASE_PATH: &str = "/api/files/blob";

const UPLOAD_FIELD: &str = "file";

#[derive(Clone)]
pub struct RouteState {
    pub storage: Arc<StorageBackend>,
    pub base_path: &'static str,
    /// Cancelled on shutdown; every request works on a child of it.
    pub shutdown: CancellationToken,
}

pub fn create_routes(inline: RouteState, indexed: RouteState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .nest(inline.base_path, file_routes(inline))
        .nest(indexed.base_path, file_routes(indexed))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn file_routes(route_state: RouteState) -> Router {
    Router::new()
        .route("/", get(list_files))
        .route("/upload", post(upload_file))
        .route("/{id}", get(download_file).delete(delete_file))
        .route("/{id}/metadata", get(get_file_metadata))
        .layer(DefaultBodyLimit::disable())
        .with_state(route_state)
}

async fn index() -> &'static str {
    "Filestore Server"
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// A malformed id can never name a stored file.
fn parse_file_id(id: &str) -> Result<FileId, ApiError> {
    id.parse()
        .map_err(|_| ApiError::not_found("file not found"))
}

/// Only ASCII without quotes survives in a header parameter.
fn attachment_disposition(filename: &str) -> HeaderValue {
    let sanitized: String = filename
        .chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", sanitized))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

async fn upload_file(
    State(state): State<RouteState>,
    mut files: Multipart,
) -> Result<Response, ApiError> {
    let cancel = state.shutdown.child_token();
    while let Some(mut field) = files
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(&e.to_string()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::bad_request("No file provided"))?;
        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        // An upload needs at least one byte of content.
        let first = loop {
            match field
                .chunk()
                .await
                .map_err(|e| ApiError::bad_request(&e.to_string()))?
            {
                Some(chunk) if chunk.is_empty() => continue,
                chunk => break chunk,
            }
        };
        let Some(first) = first else {
            return Err(ApiError::bad_request("No file provided"));
        };
        let rest = stream::unfold(field, |mut field| async move {
            match field.chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), field)),
                Ok(None) => None,
                Err(e) => Some((Err(anyhow!("error reading upload: {}", e)), field)),
            }
        });
        let content: ContentStream<'_> = stream::once(async move { Ok(first) })
            .chain(rest)
            .boxed();

        let metadata = state
            .storage
            .upload(content, &filename, &content_type, &cancel)
            .await?;
        info!(
            storage = %state.storage.kind(),
            file_id = %metadata.id,
            "file uploaded"
        );
        let location = format!("{}/{}/metadata", state.base_path, metadata.id);
        return Ok((
            StatusCode::CREATED,
            [(header::LOCATION, location)],
            Json(FileMetadata::from(metadata)),
        )
            .into_response());
    }
    Err(ApiError::bad_request("No file provided"))
}

async fn download_file(
    Path(id): Path<String>,
    State(state): State<RouteState>,
) -> Result<Response, ApiError> {
    let id = parse_file_id(&id)?;
    let cancel = state.shutdown.child_token();
    let (metadata, content) = state.storage.download(&id, &cancel).await?;

    let content_type = HeaderValue::from_str(&metadata.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, metadata.file_size)
        .header(
            header::CONTENT_DISPOSITION,
            attachment_disposition(&metadata.filename),
        )
        .body(Body::from_stream(content))
        .map_err(|e| ApiError::internal_error(e.into()))
}

async fn get_file_metadata(
    Path(id): Path<String>,
    State(state): State<RouteState>,
) -> Result<Json<FileMetadata>, ApiError> {
    let id = parse_file_id(&id)?;
    let cancel = state.shutdown.child_token();
    let metadata = state.storage.get_metadata(&id, &cancel).await?;
    Ok(Json(metadata.into()))
}

async fn delete_file(
    Path(id): Path<String>,
    State(state): State<RouteState>,
) -> Result<StatusCode, ApiError> {
    let id = parse_file_id(&id)?;
    let cancel = state.shutdown.child_token();
    state.storage.delete(&id, &cancel).await?;
    info!(storage = %state.storage.kind(), file_id = %id, "file deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn list_files(
    Query(params): Query<ListParams>,
    State(state): State<RouteState>,
) -> Result<Json<Vec<FileMetadata>>, ApiError> {
    let (skip, take) = params.window();
    let cancel = state.shutdown.child_token();
    let files = state.storage.list(skip, take, &cancel).await?;
    Ok(Json(files.into_iter().map(FileMetadata::from).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_disposition() {
        assert_eq!(
            attachment_disposition("report 1.pdf"),
            "attachment; filename=\"report 1.pdf\""
        );
        assert_eq!(
            attachment_disposition("na\"me\u{e9}.txt"),
            "attachment; filename=\"na_me_.txt\""
        );
    }

    #[test]
    fn test_malformed_id_is_not_found() {
        let err = parse_file_id("not-a-uuid").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(parse_file_id(&FileId::new().to_string()).is_ok());
    }
}
