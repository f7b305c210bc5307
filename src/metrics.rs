//! Performance metrics and statistics tracking for the prediction service.

use crate::models::scaler::ScalingOutcome;
use crate::types::prediction::Grade;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for prediction traffic
pub struct PredictionMetrics {
    /// Records that produced a grade
    pub predictions_succeeded: AtomicU64,
    /// Records that produced an error
    pub predictions_failed: AtomicU64,
    /// Records scored with partially scaled or unscaled features
    pub scaling_degraded: AtomicU64,
    /// Batch requests handled
    pub batches: AtomicU64,
    /// Records received through batch requests
    pub batch_records: AtomicU64,
    /// Failures by error kind
    errors_by_kind: RwLock<HashMap<String, u64>>,
    /// Predicted grade distribution
    grades: RwLock<BTreeMap<Grade, u64>>,
    /// Per-record processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl PredictionMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            predictions_succeeded: AtomicU64::new(0),
            predictions_failed: AtomicU64::new(0),
            scaling_degraded: AtomicU64::new(0),
            batches: AtomicU64::new(0),
            batch_records: AtomicU64::new(0),
            errors_by_kind: RwLock::new(HashMap::new()),
            grades: RwLock::new(BTreeMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            start_time: Instant::now(),
        }
    }

    fn record_time(&self, processing_time: Duration) {
        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only last 10000 for memory efficiency
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }
    }

    /// Record a successful prediction
    pub fn record_success(&self, processing_time: Duration, grade: Grade) {
        self.predictions_succeeded.fetch_add(1, Ordering::Relaxed);
        self.record_time(processing_time);

        if let Ok(mut grades) = self.grades.write() {
            *grades.entry(grade).or_insert(0) += 1;
        }
    }

    /// Record a failed record
    pub fn record_failure(&self, processing_time: Duration, kind: &str) {
        self.predictions_failed.fetch_add(1, Ordering::Relaxed);
        self.record_time(processing_time);

        if let Ok(mut by_kind) = self.errors_by_kind.write() {
            *by_kind.entry(kind.to_string()).or_insert(0) += 1;
        }
    }

    /// Record the scaling outcome of one record
    pub fn record_scaling(&self, outcome: &ScalingOutcome) {
        if outcome.is_degraded() {
            self.scaling_degraded.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a batch request
    pub fn record_batch(&self, size: usize) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.batch_records.fetch_add(size as u64, Ordering::Relaxed);
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let Ok(times) = self.processing_times.read() else {
            return ProcessingStats::default();
        };
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: *sorted.last().unwrap_or(&0),
        }
    }

    /// Get current throughput (records per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let total = self.predictions_succeeded.load(Ordering::Relaxed)
            + self.predictions_failed.load(Ordering::Relaxed);
        if elapsed > 0.0 {
            total as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get predicted grade distribution
    pub fn get_grade_distribution(&self) -> BTreeMap<Grade, u64> {
        self.grades.read().map(|g| g.clone()).unwrap_or_default()
    }

    /// Get failures by error kind
    pub fn get_errors_by_kind(&self) -> HashMap<String, u64> {
        self.errors_by_kind
            .read()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    /// Point-in-time copy for reporting endpoints
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            predictions_succeeded: self.predictions_succeeded.load(Ordering::Relaxed),
            predictions_failed: self.predictions_failed.load(Ordering::Relaxed),
            scaling_degraded: self.scaling_degraded.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            grades: self.get_grade_distribution(),
            errors_by_kind: self.get_errors_by_kind(),
            processing: self.get_processing_stats(),
        }
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let snapshot = self.snapshot();
        let total = snapshot.predictions_succeeded + snapshot.predictions_failed;
        let error_rate = if total > 0 {
            (snapshot.predictions_failed as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let batch_records = self.batch_records.load(Ordering::Relaxed);
        let processing = &snapshot.processing;

        info!("==================== PREDICTION METRICS ====================");
        info!(
            "Records: {:>8}  Throughput: {:>6.1} rec/s  Error rate: {:>5.1}%",
            total,
            self.get_throughput(),
            error_rate
        );
        info!(
            "Batches: {:>8}  Batched records: {:>8}  Scaling degraded: {:>6}",
            snapshot.batches, batch_records, snapshot.scaling_degraded
        );
        info!(
            "Processing time (us): mean={} p50={} p95={} p99={} max={}",
            processing.mean_us,
            processing.p50_us,
            processing.p95_us,
            processing.p99_us,
            processing.max_us
        );

        let graded: u64 = snapshot.grades.values().sum();
        for (grade, count) in &snapshot.grades {
            let pct = if graded > 0 {
                (*count as f64 / graded as f64) * 100.0
            } else {
                0.0
            };
            let bar: String = "#".repeat(((pct / 5.0) as usize).min(20));
            info!("  {:7}: {:>6} ({:>5.1}%) {}", grade.as_str(), count, pct, bar);
        }
        for (kind, count) in &snapshot.errors_by_kind {
            info!("  error {}: {}", kind, count);
        }
        info!("============================================================");
    }
}

impl Default for PredictionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Serializable view of the counters
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub predictions_succeeded: u64,
    pub predictions_failed: u64,
    pub scaling_degraded: u64,
    pub batches: u64,
    pub grades: BTreeMap<Grade, u64>,
    pub errors_by_kind: HashMap<String, u64>,
    pub processing: ProcessingStats,
}

/// Periodic metrics reporter
pub struct MetricsReporter {
    metrics: Arc<PredictionMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PredictionMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = PredictionMetrics::new();

        metrics.record_success(Duration::from_micros(100), Grade::A);
        metrics.record_success(Duration::from_micros(300), Grade::A);
        metrics.record_failure(Duration::from_micros(50), "missing_field");
        metrics.record_batch(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.predictions_succeeded, 2);
        assert_eq!(snapshot.predictions_failed, 1);
        assert_eq!(snapshot.batches, 1);
        assert_eq!(snapshot.grades.get(&Grade::A), Some(&2));
        assert_eq!(snapshot.errors_by_kind.get("missing_field"), Some(&1));
        assert_eq!(snapshot.processing.count, 3);
        assert_eq!(snapshot.processing.max_us, 300);
    }

    #[test]
    fn test_scaling_degradation_counter() {
        let metrics = PredictionMetrics::new();

        metrics.record_scaling(&ScalingOutcome::Full);
        metrics.record_scaling(&ScalingOutcome::Skipped {
            reason: "scaler not loaded".to_string(),
        });

        assert_eq!(metrics.scaling_degraded.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_empty_stats() {
        let metrics = PredictionMetrics::new();
        let stats = metrics.get_processing_stats();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.mean_us, 0);
    }
}
