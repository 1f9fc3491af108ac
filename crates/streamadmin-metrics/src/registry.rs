use crate::snapshot::{MetricsSnapshot, NodeMetrics, OperationMetrics};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Instant, SystemTime};

/// One bin per power of two microseconds; the last bin catches everything
/// from roughly 36 minutes up.
const NUM_HISTOGRAM_BINS: usize = 32;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Base-2 logarithmic latency histogram.
///
/// Operation latencies span milliseconds (a healthy add) to minutes (a
/// restart waiting out a rebalance), so bins double in width. Percentiles are
/// reported as the upper bound of the bin they fall in.
#[derive(Debug)]
struct LatencyHistogram {
    bins: [AtomicU64; NUM_HISTOGRAM_BINS],
    total_latency: AtomicU64,
    sample_count: AtomicU64,
}

impl LatencyHistogram {
    fn new() -> Self {
        Self {
            bins: std::array::from_fn(|_| AtomicU64::new(0)),
            total_latency: AtomicU64::new(0),
            sample_count: AtomicU64::new(0),
        }
    }

    fn bin_for(latency_us: u64) -> usize {
        // bin b holds [2^(b-1), 2^b)
        let bits = (u64::BITS - latency_us.leading_zeros()) as usize;
        bits.min(NUM_HISTOGRAM_BINS - 1)
    }

    fn bin_upper_bound(bin: usize) -> u64 {
        if bin == 0 {
            0
        } else {
            (1u64 << bin) - 1
        }
    }

    fn record(&self, latency_us: u64) {
        self.bins[Self::bin_for(latency_us)].fetch_add(1, Ordering::Relaxed);
        self.total_latency.fetch_add(latency_us, Ordering::Relaxed);
        self.sample_count.fetch_add(1, Ordering::Relaxed);
    }

    fn percentile(&self, total: u64, percentile: u64) -> u64 {
        // rank of the sample we want, 1-based
        let target = ((total * percentile).div_ceil(100)).max(1);
        let mut seen = 0;
        for (bin, count) in self.bins.iter().enumerate() {
            seen += count.load(Ordering::Relaxed);
            if seen >= target {
                return Self::bin_upper_bound(bin);
            }
        }
        Self::bin_upper_bound(NUM_HISTOGRAM_BINS - 1)
    }

    /// `(avg, p50, p95, p99)` in microseconds, all zero without samples.
    fn calculate_percentiles(&self) -> (u64, u64, u64, u64) {
        let total = self.sample_count.load(Ordering::Relaxed);
        if total == 0 {
            return (0, 0, 0, 0);
        }
        let avg = self.total_latency.load(Ordering::Relaxed) / total;
        (
            avg,
            self.percentile(total, 50),
            self.percentile(total, 95),
            self.percentile(total, 99),
        )
    }
}

#[derive(Debug)]
struct OperationStats {
    call_count: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    rounds: AtomicU64,
    round_retries: AtomicU64,
    retries_by_kind: Mutex<BTreeMap<String, u64>>,
    latencies: LatencyHistogram,
}

impl OperationStats {
    fn new() -> Self {
        Self {
            call_count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            rounds: AtomicU64::new(0),
            round_retries: AtomicU64::new(0),
            retries_by_kind: Mutex::new(BTreeMap::new()),
            latencies: LatencyHistogram::new(),
        }
    }

    fn snapshot(&self) -> OperationMetrics {
        let (avg_latency_us, p50_latency_us, p95_latency_us, p99_latency_us) =
            self.latencies.calculate_percentiles();
        let retries_by_kind = self
            .retries_by_kind
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        OperationMetrics {
            call_count: self.call_count.load(Ordering::Relaxed),
            success_count: self.success_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            rounds: self.rounds.load(Ordering::Relaxed),
            round_retries: self.round_retries.load(Ordering::Relaxed),
            retries_by_kind,
            avg_latency_us,
            p50_latency_us,
            p95_latency_us,
            p99_latency_us,
        }
    }
}

#[derive(Debug)]
struct NodeStats {
    request_count: AtomicU64,
    failure_count: AtomicU64,
    last_request_ms: AtomicU64,
}

impl NodeStats {
    fn new() -> Self {
        Self {
            request_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            last_request_ms: AtomicU64::new(0),
        }
    }

    fn snapshot(&self, node_addr: &str) -> NodeMetrics {
        NodeMetrics {
            node_addr: node_addr.to_string(),
            request_count: self.request_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            last_request_ms: self.last_request_ms.load(Ordering::Relaxed),
        }
    }
}

/// Thread-safe metrics storage.
///
/// Counters are relaxed atomics; the operation and node maps sit behind
/// `RwLock`s that are only written when a new name first appears. The set of
/// operation names is fixed and the node set is bounded by cluster size, so
/// entries are never evicted.
///
/// ```rust
/// use streamadmin_metrics::MetricsRegistry;
///
/// let registry = MetricsRegistry::new();
/// registry.record_operation("delete_index", 1_500, true);
/// registry.record_node_request("10.0.0.1:11210", false);
///
/// let snapshot = registry.snapshot();
/// assert_eq!(snapshot.successful_operations, 1);
/// assert_eq!(snapshot.nodes["10.0.0.1:11210"].failure_count, 1);
/// ```
#[derive(Debug)]
pub struct MetricsRegistry {
    total_operations: AtomicU64,
    successful_operations: AtomicU64,
    failed_operations: AtomicU64,
    split_ownership_detections: AtomicU64,
    operations: RwLock<HashMap<String, Arc<OperationStats>>>,
    nodes: RwLock<HashMap<String, Arc<NodeStats>>>,
    start_time: Instant,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            total_operations: AtomicU64::new(0),
            successful_operations: AtomicU64::new(0),
            failed_operations: AtomicU64::new(0),
            split_ownership_detections: AtomicU64::new(0),
            operations: RwLock::new(HashMap::new()),
            nodes: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    fn operation(&self, name: &str) -> Arc<OperationStats> {
        if let Some(stats) = self
            .operations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
        {
            return stats.clone();
        }
        self.operations
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(OperationStats::new()))
            .clone()
    }

    fn node(&self, node_addr: &str) -> Arc<NodeStats> {
        if let Some(stats) = self
            .nodes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(node_addr)
        {
            return stats.clone();
        }
        self.nodes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(node_addr.to_string())
            .or_insert_with(|| Arc::new(NodeStats::new()))
            .clone()
    }

    /// Records the outcome of a whole operation call.
    pub fn record_operation(&self, operation: &str, latency_us: u64, success: bool) {
        self.total_operations.fetch_add(1, Ordering::Relaxed);
        let stats = self.operation(operation);
        stats.call_count.fetch_add(1, Ordering::Relaxed);
        stats.latencies.record(latency_us);
        if success {
            self.successful_operations.fetch_add(1, Ordering::Relaxed);
            stats.success_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_operations.fetch_add(1, Ordering::Relaxed);
            stats.failure_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_round(&self, operation: &str) {
        self.operation(operation).rounds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_round_retry(&self, operation: &str, kind: &str) {
        let stats = self.operation(operation);
        stats.round_retries.fetch_add(1, Ordering::Relaxed);
        *stats
            .retries_by_kind
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(kind.to_string())
            .or_insert(0) += 1;
    }

    pub fn record_node_request(&self, node_addr: &str, success: bool) {
        let stats = self.node(node_addr);
        stats.request_count.fetch_add(1, Ordering::Relaxed);
        if !success {
            stats.failure_count.fetch_add(1, Ordering::Relaxed);
        }
        stats.last_request_ms.store(now_ms(), Ordering::Relaxed);
    }

    pub fn record_split_ownership(&self, partitions: u64) {
        self.split_ownership_detections
            .fetch_add(partitions, Ordering::Relaxed);
    }

    pub fn uptime_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let operations = self
            .operations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(name, stats)| (name.clone(), stats.snapshot()))
            .collect();
        let nodes = self
            .nodes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(addr, stats)| (addr.clone(), stats.snapshot(addr)))
            .collect();

        MetricsSnapshot {
            uptime_ms: self.uptime_ms(),
            total_operations: self.total_operations.load(Ordering::Relaxed),
            successful_operations: self.successful_operations.load(Ordering::Relaxed),
            failed_operations: self.failed_operations.load(Ordering::Relaxed),
            split_ownership_detections: self.split_ownership_detections.load(Ordering::Relaxed),
            operations,
            nodes,
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_histogram_bins() {
        assert_eq!(LatencyHistogram::bin_for(0), 0);
        assert_eq!(LatencyHistogram::bin_for(1), 1);
        assert_eq!(LatencyHistogram::bin_for(2), 2);
        assert_eq!(LatencyHistogram::bin_for(3), 2);
        assert_eq!(LatencyHistogram::bin_for(1024), 11);
        assert_eq!(LatencyHistogram::bin_for(u64::MAX), NUM_HISTOGRAM_BINS - 1);
    }

    #[test]
    fn test_percentiles_upper_bound() {
        let histogram = LatencyHistogram::new();
        for _ in 0..99 {
            histogram.record(100);
        }
        histogram.record(100_000);

        let (avg, p50, p95, p99) = histogram.calculate_percentiles();
        assert_eq!(avg, (99 * 100 + 100_000) / 100);
        // 100us falls in [64, 128)
        assert_eq!(p50, 127);
        assert_eq!(p95, 127);
        assert_eq!(p99, 127);
        assert_eq!(histogram.percentile(100, 100), (1 << 17) - 1);
    }

    #[test]
    fn test_empty_histogram() {
        assert_eq!(LatencyHistogram::new().calculate_percentiles(), (0, 0, 0, 0));
    }

    #[test]
    fn test_record_operation_outcomes() {
        let registry = MetricsRegistry::new();
        registry.record_operation("add_index", 10, true);
        registry.record_operation("add_index", 20, false);
        registry.record_operation("restart", 30, true);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.total_operations, 3);
        assert_eq!(snapshot.successful_operations, 2);
        assert_eq!(snapshot.failed_operations, 1);
        let add = &snapshot.operations["add_index"];
        assert_eq!(add.call_count, 2);
        assert_eq!(add.success_count, 1);
        assert_eq!(add.failure_count, 1);
        assert_eq!(add.avg_latency_us, 15);
    }

    #[test]
    fn test_round_retries_by_kind() {
        let registry = MetricsRegistry::new();
        registry.record_round("restart");
        registry.record_round("restart");
        registry.record_round("restart");
        registry.record_round_retry("restart", "inconsistent-topology");
        registry.record_round_retry("restart", "inconsistent-topology");

        let restart = registry.snapshot().operations["restart"].clone();
        assert_eq!(restart.rounds, 3);
        assert_eq!(restart.round_retries, 2);
        assert_eq!(restart.retries_by_kind["inconsistent-topology"], 2);
    }

    #[test]
    fn test_split_ownership_counter() {
        let registry = MetricsRegistry::new();
        registry.record_split_ownership(3);
        registry.record_split_ownership(1);
        assert_eq!(registry.snapshot().split_ownership_detections, 4);
    }

    #[test]
    fn test_concurrent_node_requests() {
        let registry = Arc::new(MetricsRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        registry.record_node_request("n1", i % 2 == 0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let node = registry.snapshot().nodes["n1"].clone();
        assert_eq!(node.request_count, 800);
        assert_eq!(node.failure_count, 400);
        assert!(node.last_request_ms > 0);
    }
}
