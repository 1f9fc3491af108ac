// Copyright 2025 StreamAdmin Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::registry::MetricsRegistry;
use crate::snapshot::MetricsSnapshot;
use std::sync::Arc;
use std::time::Instant;

/// Recording surface used by the orchestrator.
///
/// # Example
///
/// ```rust
/// use streamadmin_metrics::{MetricsCollector, StreamAdminMetricsCollector};
/// use std::time::Instant;
///
/// let collector = StreamAdminMetricsCollector::new();
/// let start = Instant::now();
/// collector.record_round("restart");
/// collector.record_round_retry("restart", "stream-ended");
/// collector.record_round("restart");
/// collector.record_node_request("10.0.0.2:11210", true);
/// collector.record_operation("restart", start, true);
///
/// let snapshot = collector.snapshot();
/// assert_eq!(snapshot.operations["restart"].round_retries, 1);
/// ```
pub trait MetricsCollector: Send + Sync {
    /// Records a finished operation call with its latency since `start_time`.
    fn record_operation(&self, operation: &str, start_time: Instant, success: bool);

    /// Records the start of a fan-out round.
    fn record_round(&self, operation: &str);

    /// Records a round being abandoned because of an error of `kind`.
    fn record_round_retry(&self, operation: &str, kind: &str);

    /// Records one worker's outcome against a producer node.
    fn record_node_request(&self, node_addr: &str, success: bool);

    /// Records partitions found active on more than one producer.
    fn record_split_ownership(&self, partitions: usize);

    fn snapshot(&self) -> MetricsSnapshot;
}

/// Default collector backed by a [`MetricsRegistry`].
#[derive(Debug, Clone)]
pub struct StreamAdminMetricsCollector {
    registry: Arc<MetricsRegistry>,
}

impl StreamAdminMetricsCollector {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(MetricsRegistry::new()),
        }
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }
}

impl Default for StreamAdminMetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector for StreamAdminMetricsCollector {
    fn record_operation(&self, operation: &str, start_time: Instant, success: bool) {
        let latency_us = start_time.elapsed().as_micros() as u64;
        self.registry.record_operation(operation, latency_us, success);
    }

    fn record_round(&self, operation: &str) {
        self.registry.record_round(operation);
    }

    fn record_round_retry(&self, operation: &str, kind: &str) {
        self.registry.record_round_retry(operation, kind);
    }

    fn record_node_request(&self, node_addr: &str, success: bool) {
        self.registry.record_node_request(node_addr, success);
    }

    fn record_split_ownership(&self, partitions: usize) {
        self.registry.record_split_ownership(partitions as u64);
    }

    fn snapshot(&self) -> MetricsSnapshot {
        self.registry.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_records_latency() {
        let collector = StreamAdminMetricsCollector::new();
        let start = Instant::now();
        std::thread::sleep(std::time::Duration::from_millis(2));
        collector.record_operation("repair_endpoint", start, false);

        let snapshot = collector.snapshot();
        let repair = &snapshot.operations["repair_endpoint"];
        assert_eq!(repair.failure_count, 1);
        assert!(repair.avg_latency_us >= 2_000);
    }

    #[test]
    fn test_clones_share_registry() {
        let collector = StreamAdminMetricsCollector::new();
        let clone = collector.clone();
        clone.record_split_ownership(2);
        assert_eq!(collector.snapshot().split_ownership_detections, 2);
        assert!(Arc::ptr_eq(collector.registry(), clone.registry()));
    }

    #[test]
    fn test_snapshot_serializes() {
        let collector = StreamAdminMetricsCollector::new();
        collector.record_round("add_index");
        collector.record_node_request("n1", true);

        let value = serde_json::to_value(collector.snapshot()).unwrap();
        assert_eq!(value["operations"]["add_index"]["rounds"], 1);
        assert_eq!(value["nodes"]["n1"]["request_count"], 1);
        assert_eq!(value["split_ownership_detections"], 0);
    }
}
