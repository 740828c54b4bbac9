use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::report::StorageKind;

#[derive(Debug, Deserialize)]
struct UploadedFile {
    id: String,
}

/// HTTP client for the filestore endpoints.
#[derive(Clone)]
pub struct BenchClient {
    http: reqwest::Client,
    base_url: String,
}

impl BenchClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("error building http client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self, kind: StorageKind) -> String {
        format!("{}{}", self.base_url, kind.path())
    }

    /// Resolves once the full response body has arrived; non-2xx is an
    /// error.
    pub async fn upload(
        &self,
        kind: StorageKind,
        filename: &str,
        content: Vec<u8>,
    ) -> Result<Bytes> {
        let part = Part::bytes(content)
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")?;
        let form = Form::new().part("file", part);
        let body = self
            .http
            .post(format!("{}/upload", self.endpoint(kind)))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(body)
    }

    /// Uploads and returns the id assigned by the server.
    pub async fn upload_for_id(
        &self,
        kind: StorageKind,
        filename: &str,
        content: Vec<u8>,
    ) -> Result<String> {
        let body = self.upload(kind, filename, content).await?;
        let uploaded: UploadedFile =
            serde_json::from_slice(&body).context("error decoding upload response")?;
        Ok(uploaded.id)
    }

    /// Downloads the full body.
    pub async fn download(&self, kind: StorageKind, id: &str) -> Result<Bytes> {
        let body = self
            .http
            .get(format!("{}/{}", self.endpoint(kind), id))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(body)
    }
}
