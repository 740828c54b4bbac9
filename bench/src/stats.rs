use std::time::Duration;

use chrono::Utc;

use crate::report::{BenchmarkResult, Operation, StorageKind};

const MIB: f64 = 1024.0 * 1024.0;

/// Value at `floor(n * p)` of an ascending slice, clamped to the last
/// element. Zero for an empty slice.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = (sorted.len() as f64 * p) as usize;
    sorted[index.min(sorted.len() - 1)]
}

pub fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// MiB moved per second of summed request latency.
pub fn throughput_mbps(total_bytes: u64, latencies_ms: &[f64]) -> f64 {
    let total_secs = latencies_ms.iter().sum::<f64>() / 1000.0;
    if total_secs <= 0.0 {
        return 0.0;
    }
    (total_bytes as f64 / MIB) / total_secs
}

/// Accumulates the outcome of every iteration of one scenario.
#[derive(Debug, Default)]
pub struct ScenarioStats {
    latencies_ms: Vec<f64>,
    total_bytes: u64,
    failures: usize,
}

impl ScenarioStats {
    pub fn record_success(&mut self, latency: Duration, bytes: u64) {
        self.latencies_ms.push(latency.as_secs_f64() * 1000.0);
        self.total_bytes += bytes;
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    pub fn finish(
        mut self,
        operation: Operation,
        storage_type: StorageKind,
        file_size_bytes: usize,
        file_count: usize,
    ) -> BenchmarkResult {
        self.latencies_ms.sort_by(f64::total_cmp);
        BenchmarkResult {
            operation,
            storage_type,
            file_size_bytes,
            file_count,
            average_latency_ms: average(&self.latencies_ms),
            p95_latency_ms: percentile(&self.latencies_ms, 0.95),
            p99_latency_ms: percentile(&self.latencies_ms, 0.99),
            throughput_mbps: throughput_mbps(self.total_bytes, &self.latencies_ms),
            success_count: self.latencies_ms.len(),
            failure_count: self.failures,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentiles_use_floor_index() {
        let latencies: Vec<f64> = (1..=100).map(f64::from).collect();
        assert_eq!(percentile(&latencies, 0.95), 96.0);
        assert_eq!(percentile(&latencies, 0.99), 100.0);
        assert_eq!(average(&latencies), 50.5);
    }

    #[test]
    fn test_percentile_index_is_clamped() {
        assert_eq!(percentile(&[7.0], 0.99), 7.0);
        assert_eq!(percentile(&[1.0, 2.0], 1.0), 2.0);
    }

    #[test]
    fn test_empty_stats_are_zero() {
        assert_eq!(percentile(&[], 0.95), 0.0);
        assert_eq!(average(&[]), 0.0);
        assert_eq!(throughput_mbps(1024, &[]), 0.0);
    }

    #[test]
    fn test_throughput_over_summed_latency() {
        // 2 MiB over 500ms + 500ms
        let throughput = throughput_mbps(2 * 1024 * 1024, &[500.0, 500.0]);
        assert!((throughput - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_failures_are_excluded_from_latencies() {
        let mut stats = ScenarioStats::default();
        stats.record_success(Duration::from_millis(30), 100);
        stats.record_failure();
        stats.record_success(Duration::from_millis(10), 100);

        let result = stats.finish(Operation::Upload, StorageKind::Database, 100, 3);
        assert_eq!(result.success_count, 2);
        assert_eq!(result.failure_count, 1);
        assert!((result.average_latency_ms - 20.0).abs() < 1e-9);
        assert!((result.p95_latency_ms - 30.0).abs() < 1e-9);
    }
}
