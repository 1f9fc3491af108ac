use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use streamadmin_common::protocol::{PartitionTimestamp, TopologyError};
use tokio::sync::RwLock;
use tracing::debug;

use crate::timestamp::retain_partitions;

/// Maps buckets and timestamps onto the producer nodes that own them.
///
/// Every call must see one consistent view of the cluster; implementations
/// are free to refresh that view between calls.
#[async_trait]
pub trait TopologyResolver: Send + Sync {
    /// Every node hosting at least one partition of `buckets`.
    async fn nodes_for_buckets(&self, buckets: &[String]) -> Result<BTreeSet<String>, TopologyError>;

    /// Every node owning at least one of the listed partitions. Fails with
    /// [`TopologyError::InconsistentPartitionMap`] when a listed partition
    /// has no owner.
    async fn nodes_for_partitions(
        &self,
        partitions_by_bucket: &BTreeMap<String, Vec<u16>>,
    ) -> Result<BTreeSet<String>, TopologyError>;

    /// Splits `timestamps` by owning node. Fails with
    /// [`TopologyError::InconsistentPartitionMap`] when a partition has no
    /// unique owner.
    async fn nodes_for_timestamps(
        &self,
        timestamps: &[PartitionTimestamp],
    ) -> Result<BTreeMap<String, Vec<PartitionTimestamp>>, TopologyError>;

    /// Keeps only the partitions `node` owns. Buckets left empty are dropped.
    async fn filter_for_node(
        &self,
        timestamps: &[PartitionTimestamp],
        node: &str,
    ) -> Result<Vec<PartitionTimestamp>, TopologyError>;
}

/// Partition ownership of one bucket.
///
/// Row `p` of `v_bucket_map` lists indexes into `server_list` for partition
/// `p`; the first index is the active owner and `-1` means none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketServerMap {
    pub server_list: Vec<String>,
    pub v_bucket_map: Vec<Vec<i32>>,
}

impl BucketServerMap {
    /// Checks every index refers to a listed server.
    pub fn validate(&self) -> Result<(), TopologyError> {
        for (partition, row) in self.v_bucket_map.iter().enumerate() {
            for &idx in row {
                if idx < -1 || (idx >= 0 && idx as usize >= self.server_list.len()) {
                    return Err(TopologyError::Malformed(format!(
                        "partition {} refers to server index {} of {}",
                        partition,
                        idx,
                        self.server_list.len()
                    )));
                }
            }
        }
        if self.v_bucket_map.len() > usize::from(u16::MAX) + 1 {
            return Err(TopologyError::Malformed(format!(
                "{} partitions exceed the partition number range",
                self.v_bucket_map.len()
            )));
        }
        Ok(())
    }

    /// Active owner of `partition`, if any.
    pub fn owner(&self, partition: u16) -> Option<&str> {
        let idx = *self.v_bucket_map.get(usize::from(partition))?.first()?;
        if idx < 0 {
            return None;
        }
        self.server_list.get(idx as usize).map(String::as_str)
    }

    /// Partitions grouped by active owner.
    pub fn partition_map(&self) -> BTreeMap<String, Vec<u16>> {
        let mut map: BTreeMap<String, Vec<u16>> = BTreeMap::new();
        for partition in 0..self.v_bucket_map.len() {
            let Ok(partition) = u16::try_from(partition) else {
                break;
            };
            if let Some(owner) = self.owner(partition) {
                map.entry(owner.to_string()).or_default().push(partition);
            }
        }
        map
    }

    /// Owners of at least one partition, sorted.
    pub fn node_addresses(&self) -> Vec<String> {
        self.partition_map().into_keys().collect()
    }
}

/// Serialized form of a whole cluster: one server map per bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMap {
    pub buckets: BTreeMap<String, BucketServerMap>,
}

impl ClusterMap {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, TopologyError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| TopologyError::Malformed(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&raw).map_err(|e| TopologyError::Malformed(e.to_string()))
    }
}

/// [`TopologyResolver`] over in-memory bucket server maps.
///
/// Maps are held as `Arc` snapshots; a call clones the snapshot it needs and
/// never observes a half-replaced map.
#[derive(Debug, Default)]
pub struct ClusterMapTopology {
    buckets: RwLock<HashMap<String, Arc<BucketServerMap>>>,
}

impl ClusterMapTopology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cluster_map(map: ClusterMap) -> Result<Self, TopologyError> {
        let mut buckets = HashMap::with_capacity(map.buckets.len());
        for (name, server_map) in map.buckets {
            server_map.validate()?;
            buckets.insert(name, Arc::new(server_map));
        }
        Ok(Self {
            buckets: RwLock::new(buckets),
        })
    }

    /// Installs or replaces the map of `bucket`.
    pub async fn set_bucket(
        &self,
        bucket: impl Into<String>,
        map: BucketServerMap,
    ) -> Result<(), TopologyError> {
        map.validate()?;
        let bucket = bucket.into();
        debug!(bucket = %bucket, servers = map.server_list.len(), "bucket map updated");
        self.buckets.write().await.insert(bucket, Arc::new(map));
        Ok(())
    }

    pub async fn remove_bucket(&self, bucket: &str) -> Option<Arc<BucketServerMap>> {
        self.buckets.write().await.remove(bucket)
    }

    pub async fn bucket(&self, bucket: &str) -> Result<Arc<BucketServerMap>, TopologyError> {
        self.buckets
            .read()
            .await
            .get(bucket)
            .cloned()
            .ok_or_else(|| TopologyError::UnknownBucket(bucket.to_string()))
    }
}

#[async_trait]
impl TopologyResolver for ClusterMapTopology {
    async fn nodes_for_buckets(&self, buckets: &[String]) -> Result<BTreeSet<String>, TopologyError> {
        let mut nodes = BTreeSet::new();
        for bucket in buckets {
            nodes.extend(self.bucket(bucket).await?.node_addresses());
        }
        Ok(nodes)
    }

    async fn nodes_for_partitions(
        &self,
        partitions_by_bucket: &BTreeMap<String, Vec<u16>>,
    ) -> Result<BTreeSet<String>, TopologyError> {
        let mut nodes = BTreeSet::new();
        for (bucket, partitions) in partitions_by_bucket {
            let map = self.bucket(bucket).await?;
            for &partition in partitions {
                let owner = map.owner(partition).ok_or_else(|| {
                    TopologyError::InconsistentPartitionMap {
                        bucket: bucket.clone(),
                        partition,
                    }
                })?;
                nodes.insert(owner.to_string());
            }
        }
        Ok(nodes)
    }

    async fn nodes_for_timestamps(
        &self,
        timestamps: &[PartitionTimestamp],
    ) -> Result<BTreeMap<String, Vec<PartitionTimestamp>>, TopologyError> {
        let mut by_node: BTreeMap<String, Vec<PartitionTimestamp>> = BTreeMap::new();
        for ts in timestamps {
            let map = self.bucket(&ts.bucket).await?;
            for entry in ts.entries() {
                let owner = map.owner(entry.partition).ok_or_else(|| {
                    TopologyError::InconsistentPartitionMap {
                        bucket: ts.bucket.clone(),
                        partition: entry.partition,
                    }
                })?;

                let node_timestamps = by_node.entry(owner.to_string()).or_default();
                let idx = match node_timestamps.iter().position(|t| t.bucket == ts.bucket) {
                    Some(idx) => idx,
                    None => {
                        node_timestamps.push(PartitionTimestamp::new(ts.pool.clone(), ts.bucket.clone()));
                        node_timestamps.len() - 1
                    }
                };
                node_timestamps[idx].upsert(*entry);
            }
        }
        Ok(by_node)
    }

    async fn filter_for_node(
        &self,
        timestamps: &[PartitionTimestamp],
        node: &str,
    ) -> Result<Vec<PartitionTimestamp>, TopologyError> {
        let mut filtered = Vec::with_capacity(timestamps.len());
        for ts in timestamps {
            let map = self.bucket(&ts.bucket).await?;
            if let Some(owned) = retain_partitions(ts, |p| map.owner(p) == Some(node)) {
                filtered.push(owned);
            }
        }
        Ok(filtered)
    }
}
