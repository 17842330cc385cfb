//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//!
//! NOTE: All atomics use Relaxed ordering intentionally; these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Geocode latency bucket boundaries (milliseconds)
/// Buckets: ≤50, ≤100, ≤250, ≤500, ≤1000, ≤2500, ≤5000, ≤10000, >10000
const GEOCODE_BUCKET_BOUNDS: [u64; 8] = [50, 100, 250, 500, 1000, 2500, 5000, 10000];
pub const GEOCODE_NUM_BUCKETS: usize = 9;

#[inline]
fn bucket_index(latency_ms: u64) -> usize {
    GEOCODE_BUCKET_BOUNDS.partition_point(|&bound| bound < latency_ms)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; GEOCODE_NUM_BUCKETS]) -> [u64; GEOCODE_NUM_BUCKETS] {
    let mut result = [0u64; GEOCODE_NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Which cascade stage produced a place name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeocodeSource {
    Network,
    Native,
    Coordinates,
}

impl GeocodeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeocodeSource::Network => "network",
            GeocodeSource::Native => "native",
            GeocodeSource::Coordinates => "coordinates",
        }
    }
}

pub struct Metrics {
    fixes_received: AtomicU64,
    geocode_network: AtomicU64,
    geocode_native: AtomicU64,
    geocode_coordinates: AtomicU64,
    strategy_errors: AtomicU64,
    strategy_timeouts: AtomicU64,
    geocode_latency_buckets: [AtomicU64; GEOCODE_NUM_BUCKETS],
    geocode_latency_sum_ms: AtomicU64,
    geocode_latency_max_ms: AtomicU64,
    geocode_since_report: AtomicU64,
    stale_writes_discarded: AtomicU64,
    punches_dispatched: AtomicU64,
    punches_rejected: AtomicU64,
    submission_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            fixes_received: AtomicU64::new(0),
            geocode_network: AtomicU64::new(0),
            geocode_native: AtomicU64::new(0),
            geocode_coordinates: AtomicU64::new(0),
            strategy_errors: AtomicU64::new(0),
            strategy_timeouts: AtomicU64::new(0),
            geocode_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            geocode_latency_sum_ms: AtomicU64::new(0),
            geocode_latency_max_ms: AtomicU64::new(0),
            geocode_since_report: AtomicU64::new(0),
            stale_writes_discarded: AtomicU64::new(0),
            punches_dispatched: AtomicU64::new(0),
            punches_rejected: AtomicU64::new(0),
            submission_failures: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_fix_received(&self) {
        self.fixes_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed cascade and the stage that answered
    pub fn record_geocode(&self, source: GeocodeSource, latency_ms: u64) {
        let counter = match source {
            GeocodeSource::Network => &self.geocode_network,
            GeocodeSource::Native => &self.geocode_native,
            GeocodeSource::Coordinates => &self.geocode_coordinates,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.geocode_latency_buckets[bucket_index(latency_ms)].fetch_add(1, Ordering::Relaxed);
        self.geocode_latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.geocode_since_report.fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.geocode_latency_max_ms, latency_ms);
    }

    #[inline]
    pub fn record_strategy_error(&self) {
        self.strategy_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_strategy_timeout(&self) {
        self.strategy_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_stale_write_discarded(&self) {
        self.stale_writes_discarded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_punch_dispatched(&self) {
        self.punches_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_punch_rejected(&self) {
        self.punches_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_submission_failure(&self) {
        self.submission_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn geocode_count(&self, source: GeocodeSource) -> u64 {
        match source {
            GeocodeSource::Network => self.geocode_network.load(Ordering::Relaxed),
            GeocodeSource::Native => self.geocode_native.load(Ordering::Relaxed),
            GeocodeSource::Coordinates => self.geocode_coordinates.load(Ordering::Relaxed),
        }
    }

    pub fn stale_writes_discarded(&self) -> u64 {
        self.stale_writes_discarded.load(Ordering::Relaxed)
    }

    pub fn punches_dispatched(&self) -> u64 {
        self.punches_dispatched.load(Ordering::Relaxed)
    }

    pub fn submission_failures(&self) -> u64 {
        self.submission_failures.load(Ordering::Relaxed)
    }

    /// Snapshot totals and reset the per-interval latency window
    pub fn report(&self) -> MetricsSummary {
        let window = self.geocode_since_report.swap(0, Ordering::Relaxed);
        let sum = self.geocode_latency_sum_ms.swap(0, Ordering::Relaxed);
        MetricsSummary {
            fixes_received: self.fixes_received.load(Ordering::Relaxed),
            geocode_network: self.geocode_network.load(Ordering::Relaxed),
            geocode_native: self.geocode_native.load(Ordering::Relaxed),
            geocode_coordinates: self.geocode_coordinates.load(Ordering::Relaxed),
            strategy_errors: self.strategy_errors.load(Ordering::Relaxed),
            strategy_timeouts: self.strategy_timeouts.load(Ordering::Relaxed),
            geocode_avg_ms: if window > 0 { sum / window } else { 0 },
            geocode_max_ms: self.geocode_latency_max_ms.swap(0, Ordering::Relaxed),
            geocode_buckets: swap_buckets(&self.geocode_latency_buckets),
            stale_writes_discarded: self.stale_writes_discarded(),
            punches_dispatched: self.punches_dispatched(),
            punches_rejected: self.punches_rejected.load(Ordering::Relaxed),
            submission_failures: self.submission_failures(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub fixes_received: u64,
    pub geocode_network: u64,
    pub geocode_native: u64,
    pub geocode_coordinates: u64,
    pub strategy_errors: u64,
    pub strategy_timeouts: u64,
    pub geocode_avg_ms: u64,
    pub geocode_max_ms: u64,
    pub geocode_buckets: [u64; GEOCODE_NUM_BUCKETS],
    pub stale_writes_discarded: u64,
    pub punches_dispatched: u64,
    pub punches_rejected: u64,
    pub submission_failures: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            fixes_received = %self.fixes_received,
            geocode_network = %self.geocode_network,
            geocode_native = %self.geocode_native,
            geocode_coordinates = %self.geocode_coordinates,
            strategy_errors = %self.strategy_errors,
            strategy_timeouts = %self.strategy_timeouts,
            geocode_avg_ms = %self.geocode_avg_ms,
            geocode_max_ms = %self.geocode_max_ms,
            geocode_buckets = ?self.geocode_buckets,
            stale_writes_discarded = %self.stale_writes_discarded,
            punches_dispatched = %self.punches_dispatched,
            punches_rejected = %self.punches_rejected,
            submission_failures = %self.submission_failures,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(50), 0);
        assert_eq!(bucket_index(51), 1);
        assert_eq!(bucket_index(10_000), 7);
        assert_eq!(bucket_index(60_000), 8);
    }

    #[test]
    fn test_report_resets_window() {
        let metrics = Metrics::new();
        metrics.record_geocode(GeocodeSource::Network, 120);
        metrics.record_geocode(GeocodeSource::Coordinates, 80);

        let summary = metrics.report();
        assert_eq!(summary.geocode_network, 1);
        assert_eq!(summary.geocode_coordinates, 1);
        assert_eq!(summary.geocode_avg_ms, 100);
        assert_eq!(summary.geocode_max_ms, 120);
        assert_eq!(summary.geocode_buckets.iter().sum::<u64>(), 2);

        let next = metrics.report();
        assert_eq!(next.geocode_avg_ms, 0);
        assert_eq!(next.geocode_buckets.iter().sum::<u64>(), 0);
        // totals survive the report
        assert_eq!(next.geocode_network, 1);
    }
}
