//! Producer Response Types

use serde::{Deserialize, Serialize};

use super::timestamp::PartitionTimestamp;

/// Outcome of a topic request or a partition restart on one producer.
///
/// # Fields
///
/// - `active_timestamps`: partitions the producer is now streaming; this is
///   its authoritative claim of ownership.
/// - `rollback_timestamps`: positions the producer proposes instead of the
///   requested ones when its failover history diverges. For any partition
///   present, the rollback seqno is at most the requested seqno unless the
///   vbuuid changed.
///
/// A failed request can still carry both lists; the worker uses the rollback
/// list to rebuild its next attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicResponse {
    #[serde(default)]
    pub active_timestamps: Vec<PartitionTimestamp>,
    #[serde(default)]
    pub rollback_timestamps: Vec<PartitionTimestamp>,
}

impl TopicResponse {
    pub fn active(active_timestamps: Vec<PartitionTimestamp>) -> Self {
        Self {
            active_timestamps,
            rollback_timestamps: Vec::new(),
        }
    }

    pub fn with_rollback(mut self, rollback_timestamps: Vec<PartitionTimestamp>) -> Self {
        self.rollback_timestamps = rollback_timestamps;
        self
    }
}
