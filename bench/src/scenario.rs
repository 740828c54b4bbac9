use std::time::Instant;

use rand::RngCore;
use tracing::{debug, info, warn};

use crate::{
    client::BenchClient,
    report::{BenchmarkResult, Operation, StorageKind},
    stats::ScenarioStats,
};

fn random_content(size: usize) -> Vec<u8> {
    let mut data = vec![0u8; size];
    rand::rng().fill_bytes(&mut data);
    data
}

fn test_filename(i: usize) -> String {
    format!("test-{i}.bin")
}

pub async fn run_upload(
    client: &BenchClient,
    kind: StorageKind,
    file_size: usize,
    count: usize,
) -> BenchmarkResult {
    let mut stats = ScenarioStats::default();
    for i in 0..count {
        let content = random_content(file_size);
        let start = Instant::now();
        match client.upload(kind, &test_filename(i), content).await {
            Ok(_) => stats.record_success(start.elapsed(), file_size as u64),
            Err(e) => {
                debug!(storage = %kind, "upload failed: {:?}", e);
                stats.record_failure();
            }
        }
    }
    stats.finish(Operation::Upload, kind, file_size, count)
}

/// Downloads the first `count` of `ids` one after another.
pub async fn run_download(
    client: &BenchClient,
    kind: StorageKind,
    file_size: usize,
    count: usize,
    ids: &[String],
) -> BenchmarkResult {
    let mut stats = ScenarioStats::default();
    for id in ids.iter().take(count) {
        let start = Instant::now();
        match client.download(kind, id).await {
            Ok(body) => stats.record_success(start.elapsed(), body.len() as u64),
            Err(e) => {
                debug!(storage = %kind, file_id = id.as_str(), "download failed: {:?}", e);
                stats.record_failure();
            }
        }
    }
    stats.finish(Operation::Download, kind, file_size, count)
}

/// Uploads `count` files and collects the ids that came back.
pub async fn seed(
    client: &BenchClient,
    kind: StorageKind,
    file_size: usize,
    count: usize,
) -> Vec<String> {
    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        match client
            .upload_for_id(kind, &test_filename(i), random_content(file_size))
            .await
        {
            Ok(id) => ids.push(id),
            Err(e) => warn!(storage = %kind, "seeding upload failed: {:?}", e),
        }
    }
    ids
}

/// Upload scenarios for every size and backend, then download scenarios
/// over freshly seeded files. Runs strictly sequentially.
pub async fn run_suite(client: &BenchClient, sizes: &[usize], count: usize) -> Vec<BenchmarkResult> {
    let mut results = Vec::new();

    for &size in sizes {
        info!(file_size = size, "running upload scenarios");
        for kind in StorageKind::ALL {
            let result = run_upload(client, kind, size, count).await;
            println!("{}", result.summary());
            results.push(result);
        }
    }

    for &size in sizes {
        info!(file_size = size, "running download scenarios");
        let mut seeded = Vec::new();
        for kind in StorageKind::ALL {
            seeded.push((kind, seed(client, kind, size, count).await));
        }
        for (kind, ids) in seeded {
            if ids.len() < count {
                warn!(
                    storage = %kind,
                    file_size = size,
                    "skipping download scenario, only {} of {} files seeded",
                    ids.len(),
                    count
                );
                continue;
            }
            let result = run_download(client, kind, size, count, &ids).await;
            println!("{}", result.summary());
            results.push(result);
        }
    }
    results
}
