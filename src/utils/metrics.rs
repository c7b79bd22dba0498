use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Global metrics collector for the application.
///
/// Tracks generation API usage, job outcomes, sweep activity, and per-endpoint
/// request counts. Thread-safe and cheap to clone.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    // Generation API metrics
    generation_calls_total: AtomicUsize,
    generation_calls_success: AtomicUsize,
    generation_calls_failed: AtomicUsize,
    generation_retries: AtomicUsize,
    generation_latency_ms: RwLock<Vec<u64>>,

    // Job metrics
    jobs_colorized: AtomicUsize,
    jobs_failed: AtomicUsize,
    refinements_requested: AtomicUsize,

    // Sweep metrics
    sweeps_completed: AtomicUsize,
    sweeps_stopped: AtomicUsize,
    images_loaded: AtomicUsize,

    // Per-endpoint request counters
    endpoint_counters: DashMap<String, AtomicUsize>,

    // Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                generation_calls_total: AtomicUsize::new(0),
                generation_calls_success: AtomicUsize::new(0),
                generation_calls_failed: AtomicUsize::new(0),
                generation_retries: AtomicUsize::new(0),
                generation_latency_ms: RwLock::new(Vec::new()),
                jobs_colorized: AtomicUsize::new(0),
                jobs_failed: AtomicUsize::new(0),
                refinements_requested: AtomicUsize::new(0),
                sweeps_completed: AtomicUsize::new(0),
                sweeps_stopped: AtomicUsize::new(0),
                images_loaded: AtomicUsize::new(0),
                endpoint_counters: DashMap::new(),
                start_time: Instant::now(),
            }),
        }
    }

    // Generation API metrics
    pub fn record_generation_call(&self, success: bool, duration: Duration) {
        self.inner.generation_calls_total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.inner.generation_calls_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.generation_calls_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.generation_latency_ms.write().push(duration.as_millis() as u64);
    }

    pub fn record_generation_retry(&self) {
        self.inner.generation_retries.fetch_add(1, Ordering::Relaxed);
    }

    // Job metrics
    pub fn record_job_outcome(&self, success: bool) {
        if success {
            self.inner.jobs_colorized.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.jobs_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_refinement(&self) {
        self.inner.refinements_requested.fetch_add(1, Ordering::Relaxed);
    }

    // Sweep metrics
    pub fn record_sweep(&self, completed: bool) {
        if completed {
            self.inner.sweeps_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.sweeps_stopped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_images_loaded(&self, count: usize) {
        self.inner.images_loaded.fetch_add(count, Ordering::Relaxed);
    }

    // Endpoint metrics
    pub fn record_endpoint_request(&self, endpoint: &str) {
        self.inner.endpoint_counters
            .entry(endpoint.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    // Get snapshot for reporting
    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency = self.inner.generation_latency_ms.read();
        let latency_avg = avg(&latency);
        let latency_p50 = percentile(&latency, 0.5);
        let latency_p95 = percentile(&latency, 0.95);
        let latency_p99 = percentile(&latency, 0.99);
        drop(latency);

        MetricsSnapshot {
            generation_calls_total: self.inner.generation_calls_total.load(Ordering::Relaxed),
            generation_calls_success: self.inner.generation_calls_success.load(Ordering::Relaxed),
            generation_calls_failed: self.inner.generation_calls_failed.load(Ordering::Relaxed),
            generation_retries: self.inner.generation_retries.load(Ordering::Relaxed),
            generation_latency_avg_ms: latency_avg,
            generation_latency_p50_ms: latency_p50,
            generation_latency_p95_ms: latency_p95,
            generation_latency_p99_ms: latency_p99,
            jobs_colorized: self.inner.jobs_colorized.load(Ordering::Relaxed),
            jobs_failed: self.inner.jobs_failed.load(Ordering::Relaxed),
            refinements_requested: self.inner.refinements_requested.load(Ordering::Relaxed),
            sweeps_completed: self.inner.sweeps_completed.load(Ordering::Relaxed),
            sweeps_stopped: self.inner.sweeps_stopped.load(Ordering::Relaxed),
            images_loaded: self.inner.images_loaded.load(Ordering::Relaxed),
            endpoint_requests: self
                .inner
                .endpoint_counters
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
                .collect(),
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Generate Prometheus-format metrics
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            r#"# HELP generation_calls_total Total number of generation API calls made
# TYPE generation_calls_total counter
generation_calls_total {{}} {}

# HELP generation_calls_success Number of successful generation API calls
# TYPE generation_calls_success counter
generation_calls_success {{}} {}

# HELP generation_calls_failed Number of failed generation API calls
# TYPE generation_calls_failed counter
generation_calls_failed {{}} {}

# HELP generation_retries_total Total retried generation requests
# TYPE generation_retries_total counter
generation_retries_total {{}} {}

# HELP generation_latency_avg_ms Average generation latency in milliseconds
# TYPE generation_latency_avg_ms gauge
generation_latency_avg_ms {{}} {}

# HELP jobs_colorized_total Jobs that reached a successful result
# TYPE jobs_colorized_total counter
jobs_colorized_total {{}} {}

# HELP jobs_failed_total Jobs whose latest attempt failed
# TYPE jobs_failed_total counter
jobs_failed_total {{}} {}

# HELP refinements_requested_total Auto-fix and custom-fix attempts
# TYPE refinements_requested_total counter
refinements_requested_total {{}} {}

# HELP sweeps_completed_total Batch sweeps that ran to the end of the list
# TYPE sweeps_completed_total counter
sweeps_completed_total {{}} {}

# HELP sweeps_stopped_total Batch sweeps halted by a stop request
# TYPE sweeps_stopped_total counter
sweeps_stopped_total {{}} {}

# HELP images_loaded_total Total source images accepted into sessions
# TYPE images_loaded_total counter
images_loaded_total {{}} {}

# HELP uptime_seconds Application uptime in seconds
# TYPE uptime_seconds counter
uptime_seconds {{}} {}
"#,
            snapshot.generation_calls_total,
            snapshot.generation_calls_success,
            snapshot.generation_calls_failed,
            snapshot.generation_retries,
            snapshot.generation_latency_avg_ms,
            snapshot.jobs_colorized,
            snapshot.jobs_failed,
            snapshot.refinements_requested,
            snapshot.sweeps_completed,
            snapshot.sweeps_stopped,
            snapshot.images_loaded,
            snapshot.uptime_seconds,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub generation_calls_total: usize,
    pub generation_calls_success: usize,
    pub generation_calls_failed: usize,
    pub generation_retries: usize,
    pub generation_latency_avg_ms: u64,
    pub generation_latency_p50_ms: u64,
    pub generation_latency_p95_ms: u64,
    pub generation_latency_p99_ms: u64,
    pub jobs_colorized: usize,
    pub jobs_failed: usize,
    pub refinements_requested: usize,
    pub sweeps_completed: usize,
    pub sweeps_stopped: usize,
    pub images_loaded: usize,
    pub endpoint_requests: std::collections::BTreeMap<String, usize>,
    pub uptime_seconds: u64,
}

fn percentile(values: &[u64], p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let idx = ((values.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}

fn avg(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}
