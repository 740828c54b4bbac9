use std::time::{Duration, Instant};

use opentelemetry::{
    metrics::{Counter, Histogram},
    KeyValue,
};

pub mod storage_stats {
    use opentelemetry::{
        metrics::{Counter, Histogram},
        KeyValue,
    };

    #[derive(Debug)]
    pub struct Metrics {
        pub operations: Histogram<f64>,
        pub bytes_uploaded: Counter<u64>,
        pub bytes_downloaded: Counter<u64>,
        pub partial_deletes: Counter<u64>,
        backend: KeyValue,
    }

    impl Metrics {
        pub fn new(backend: &str) -> Metrics {
            let meter = opentelemetry::global::meter("filestore-server");
            let operations = meter
                .f64_histogram("filestore.storage.operations")
                .with_description("storage operation latencies in seconds")
                .with_unit("s")
                .build();
            let bytes_uploaded = meter
                .u64_counter("filestore.storage.bytes_uploaded")
                .with_description("number of content bytes persisted by uploads")
                .build();
            let bytes_downloaded = meter
                .u64_counter("filestore.storage.bytes_downloaded")
                .with_description("number of content bytes served by downloads")
                .build();
            let partial_deletes = meter
                .u64_counter("filestore.storage.partial_deletes")
                .with_description("deletes whose content removal failed and left an orphan object")
                .build();
            Metrics {
                operations,
                bytes_uploaded,
                bytes_downloaded,
                partial_deletes,
                backend: KeyValue::new("backend", backend.to_string()),
            }
        }

        /// Labels identifying the backend and the operation being measured.
        pub fn labels(&self, operation: &'static str) -> Vec<KeyValue> {
            vec![
                self.backend.clone(),
                KeyValue::new("operation", operation),
            ]
        }

        pub fn record_upload(&self, bytes: u64) {
            self.bytes_uploaded.add(bytes, &[self.backend.clone()]);
        }

        pub fn record_download(&self, bytes: u64) {
            self.bytes_downloaded.add(bytes, &[self.backend.clone()]);
        }

        pub fn record_partial_delete(&self) {
            self.partial_deletes.add(1, &[self.backend.clone()]);
        }
    }
}

#[derive(Clone, Debug)]
pub struct StateStoreMetrics {
    pub state_write: Histogram<f64>,
    pub state_read: Histogram<f64>,
}

impl Default for StateStoreMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStoreMetrics {
    pub fn new() -> Self {
        let meter = opentelemetry::global::meter("state_store");
        let state_write = meter
            .f64_histogram("filestore.state_machine_write_duration")
            .with_unit("s")
            .with_description("State machine writing latency in seconds")
            .build();
        let state_read = meter
            .f64_histogram("filestore.state_machine_read_duration")
            .with_unit("s")
            .with_description("State machine reading latency in seconds")
            .build();
        Self {
            state_write,
            state_read,
        }
    }
}

pub trait TimerUpdate {
    fn add(&self, duration: Duration, labels: &[KeyValue]);
}

impl TimerUpdate for Counter<f64> {
    fn add(&self, duration: Duration, labels: &[KeyValue]) {
        self.add(duration.as_secs_f64(), labels);
    }
}

impl TimerUpdate for Histogram<f64> {
    fn add(&self, duration: Duration, labels: &[KeyValue]) {
        self.record(duration.as_secs_f64(), labels);
    }
}

/// Records the time between its creation and drop into `metric`.
pub struct Timer<'a, T: TimerUpdate + Sync> {
    start: Instant,
    metric: &'a T,
    labels: Vec<KeyValue>,
}

impl<'a, T: TimerUpdate + Sync> Timer<'a, T> {
    pub fn start(metric: &'a T) -> Self {
        Self::start_with_labels(metric, Vec::new())
    }

    pub fn start_with_labels(metric: &'a T, labels: Vec<KeyValue>) -> Self {
        Self {
            start: Instant::now(),
            metric,
            labels,
        }
    }
}

impl<'a, T: TimerUpdate + Sync> Drop for Timer<'a, T> {
    fn drop(&mut self) {
        self.metric.add(self.start.elapsed(), &self.labels);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorded(Mutex<Vec<(Duration, usize)>>);

    impl TimerUpdate for Recorded {
        fn add(&self, duration: Duration, labels: &[KeyValue]) {
            self.0.lock().unwrap().push((duration, labels.len()));
        }
    }

    #[test]
    fn test_timer_records_on_drop() {
        let recorded = Recorded::default();
        {
            let _timer =
                Timer::start_with_labels(&recorded, vec![KeyValue::new("operation", "upload")]);
        }
        let samples = recorded.0.lock().unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].1, 1);
    }
}
