//! Per-bucket partition timestamps.
//!
//! A [`PartitionTimestamp`] is a sparse vector of streaming positions for one
//! bucket. Entries keep their insertion order and partition numbers are unique
//! within a timestamp.

use serde::{Deserialize, Serialize};

use super::error::TimestampError;

/// Pool every bucket lives in.
pub const DEFAULT_POOL_NAME: &str = "default";

/// Number of partitions a bucket is split into.
pub const NUM_PARTITIONS: u16 = 1024;

/// Streaming position of a single partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionEntry {
    pub partition: u16,
    pub seqno: u64,
    /// Failover branch the seqno belongs to.
    pub vbuuid: u64,
    pub snapshot_start: u64,
    pub snapshot_end: u64,
}

impl PartitionEntry {
    pub fn new(partition: u16, seqno: u64, vbuuid: u64, snapshot_start: u64, snapshot_end: u64) -> Self {
        Self {
            partition,
            seqno,
            vbuuid,
            snapshot_start,
            snapshot_end,
        }
    }
}

/// Streaming positions for a set of partitions of one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionTimestamp {
    pub pool: String,
    pub bucket: String,
    #[serde(default)]
    entries: Vec<PartitionEntry>,
}

impl PartitionTimestamp {
    pub fn new(pool: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            pool: pool.into(),
            bucket: bucket.into(),
            entries: Vec::new(),
        }
    }

    pub fn with_capacity(pool: impl Into<String>, bucket: impl Into<String>, capacity: usize) -> Self {
        Self {
            pool: pool.into(),
            bucket: bucket.into(),
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Builds a timestamp from entries, rejecting duplicate partitions.
    pub fn from_entries(
        pool: impl Into<String>,
        bucket: impl Into<String>,
        entries: impl IntoIterator<Item = PartitionEntry>,
    ) -> Result<Self, TimestampError> {
        let mut ts = Self::new(pool, bucket);
        for entry in entries {
            ts.append(entry)?;
        }
        Ok(ts)
    }

    /// Appends the position of a partition not yet present.
    pub fn append(&mut self, entry: PartitionEntry) -> Result<(), TimestampError> {
        if self.contains(entry.partition) {
            return Err(TimestampError::DuplicatePartition {
                bucket: self.bucket.clone(),
                partition: entry.partition,
            });
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Sets the position of a partition, replacing any existing entry in place.
    pub fn upsert(&mut self, entry: PartitionEntry) {
        match self.entries.iter_mut().find(|e| e.partition == entry.partition) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Folds `other` into `self`, later positions winning.
    pub fn merge(&mut self, other: &PartitionTimestamp) -> Result<(), TimestampError> {
        if other.bucket != self.bucket {
            return Err(TimestampError::BucketMismatch {
                expected: self.bucket.clone(),
                found: other.bucket.clone(),
            });
        }
        for entry in &other.entries {
            self.upsert(*entry);
        }
        Ok(())
    }

    pub fn entries(&self) -> &[PartitionEntry] {
        &self.entries
    }

    pub fn partitions(&self) -> impl Iterator<Item = u16> + '_ {
        self.entries.iter().map(|e| e.partition)
    }

    pub fn get(&self, partition: u16) -> Option<&PartitionEntry> {
        self.entries.iter().find(|e| e.partition == partition)
    }

    pub fn contains(&self, partition: u16) -> bool {
        self.get(partition).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks the unique-partition invariant, e.g. after deserializing.
    pub fn validate(&self) -> Result<(), TimestampError> {
        let mut seen = std::collections::HashSet::with_capacity(self.entries.len());
        for entry in &self.entries {
            if !seen.insert(entry.partition) {
                return Err(TimestampError::DuplicatePartition {
                    bucket: self.bucket.clone(),
                    partition: entry.partition,
                });
            }
        }
        Ok(())
    }
}
