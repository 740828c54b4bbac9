use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum Operation {
    Upload,
    Download,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum StorageKind {
    Database,
    Object,
}

impl StorageKind {
    pub const ALL: [StorageKind; 2] = [StorageKind::Database, StorageKind::Object];

    pub fn path(&self) -> &'static str {
        match self {
            StorageKind::Database => "/api/files/db",
            StorageKind::Object => "/api/files/blob",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkResult {
    pub operation: Operation,
    pub storage_type: StorageKind,
    pub file_size_bytes: usize,
    pub file_count: usize,
    pub average_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    #[serde(rename = "throughputMBps")]
    pub throughput_mbps: f64,
    pub success_count: usize,
    pub failure_count: usize,
    pub timestamp: DateTime<Utc>,
}

impl BenchmarkResult {
    pub fn summary(&self) -> String {
        format!(
            "{:<8} {:<8} {:>10} bytes: {:.2}ms avg, {:.2}ms p95, {:.2}ms p99, {:.2} MB/s ({} ok, {} failed)",
            self.operation,
            self.storage_type,
            self.file_size_bytes,
            self.average_latency_ms,
            self.p95_latency_ms,
            self.p99_latency_ms,
            self.throughput_mbps,
            self.success_count,
            self.failure_count,
        )
    }
}

pub fn report_path(dir: &Path, now: DateTime<Utc>) -> PathBuf {
    dir.join(format!("benchmark-{}.json", now.format("%Y%m%d-%H%M%S")))
}

/// Writes all results as one indented JSON array and returns its path.
pub async fn write_report(
    dir: &Path,
    results: &[BenchmarkResult],
    now: DateTime<Utc>,
) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("error creating results dir {}", dir.display()))?;
    let path = report_path(dir, now);
    let json = serde_json::to_string_pretty(results)?;
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("error writing report {}", path.display()))?;
    Ok(path)
}
