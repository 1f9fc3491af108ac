use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use streamadmin_common::protocol::{PartitionTimestamp, StreamId};
use tracing::{debug, warn};

/// Liveness watchdog told about every stream the orchestrator brings up.
///
/// Registration is fire-and-forget; the orchestrator does not wait on or
/// inspect what the watchdog does with it.
pub trait StreamWatchdog: Send + Sync {
    fn start_stream(&self, stream: StreamId, bucket: &str, timestamp: &PartitionTimestamp);
}

/// One registered `(stream, bucket)` and its latest known positions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveStream {
    pub stream: StreamId,
    pub bucket: String,
    pub timestamp: PartitionTimestamp,
}

/// In-memory [`StreamWatchdog`] keeping the merged active positions per
/// `(stream, bucket)`.
#[derive(Debug, Default)]
pub struct ActiveStreamRegistry {
    streams: Mutex<BTreeMap<(StreamId, String), PartitionTimestamp>>,
    registrations: AtomicU64,
}

impl ActiveStreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, stream: StreamId, bucket: &str) -> Option<PartitionTimestamp> {
        let streams = self.streams.lock().unwrap_or_else(|e| e.into_inner());
        streams.get(&(stream, bucket.to_string())).cloned()
    }

    /// Number of `start_stream` calls received.
    pub fn registrations(&self) -> u64 {
        self.registrations.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> Vec<ActiveStream> {
        let streams = self.streams.lock().unwrap_or_else(|e| e.into_inner());
        streams
            .iter()
            .map(|((stream, bucket), timestamp)| ActiveStream {
                stream: *stream,
                bucket: bucket.clone(),
                timestamp: timestamp.clone(),
            })
            .collect()
    }
}

impl StreamWatchdog for ActiveStreamRegistry {
    fn start_stream(&self, stream: StreamId, bucket: &str, timestamp: &PartitionTimestamp) {
        self.registrations.fetch_add(1, Ordering::Relaxed);

        if timestamp.bucket != bucket {
            warn!(
                stream = %stream,
                bucket,
                found = %timestamp.bucket,
                "ignoring stream registration for another bucket"
            );
            return;
        }

        let mut streams = self.streams.lock().unwrap_or_else(|e| e.into_inner());
        let current = streams
            .entry((stream, bucket.to_string()))
            .or_insert_with(|| PartitionTimestamp::new(timestamp.pool.clone(), bucket));
        if let Err(e) = current.merge(timestamp) {
            warn!(stream = %stream, bucket, error = %e, "ignoring stream registration");
            return;
        }
        debug!(stream = %stream, bucket, partitions = current.len(), "stream registered");
    }
}
