//! Stream Admin Metrics
//!
//! Thread-safe counters recorded by the stream-admin orchestrator:
//!
//! - per operation: calls, successes, failures, latency percentiles, rounds
//!   and round retries broken down by error kind
//! - per producer node: admin requests issued and how many failed
//! - split-ownership detections (a partition claimed active by two producers)
//!
//! [`MetricsRegistry`] holds the counters, [`MetricsCollector`] is the
//! recording surface the orchestrator depends on, and [`MetricsSnapshot`] is
//! the serializable view.
//!
//! ```rust
//! use streamadmin_metrics::{MetricsCollector, StreamAdminMetricsCollector};
//! use std::time::Instant;
//!
//! let collector = StreamAdminMetricsCollector::new();
//! let start = Instant::now();
//! collector.record_round("add_index");
//! collector.record_operation("add_index", start, true);
//!
//! let snapshot = collector.snapshot();
//! assert_eq!(snapshot.total_operations, 1);
//! assert_eq!(snapshot.operations["add_index"].rounds, 1);
//! ```

mod collector;
mod registry;
mod snapshot;

pub use collector::{MetricsCollector, StreamAdminMetricsCollector};
pub use registry::MetricsRegistry;
pub use snapshot::{MetricsSnapshot, NodeMetrics, OperationMetrics};
