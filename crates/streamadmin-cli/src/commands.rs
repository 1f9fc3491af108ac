//! Operation runners behind the `streamadmin` subcommands.
//!
//! Every runner takes a [`Context`], performs exactly one orchestrator call
//! and returns a [`Report`] that the binary prints as JSON.

use anyhow::{Context as _, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use streamadmin_client::{HttpClientConfig, HttpClientFactory};
use streamadmin_common::protocol::{Instance, InstanceId, PartitionTimestamp, StreamId};
use streamadmin_metrics::MetricsSnapshot;
use streamadmin_orchestrator::{
    ActiveStream, ActiveStreamRegistry, ClusterMap, ClusterMapTopology, StreamAdmin,
    StreamAdminConfig,
};
use tracing::{debug, info};

/// Contents of the `--config` file.
///
/// Both sections are optional and fall back to their defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub admin: StreamAdminConfig,
    pub client: HttpClientConfig,
}

impl CliConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let config: CliConfig = read_json(path.as_ref())?;
        config.admin.validate()?;
        Ok(config)
    }
}

/// Orchestrator wired to HTTP producers and an in-memory stream registry.
pub struct Context {
    admin: StreamAdmin,
    registry: Arc<ActiveStreamRegistry>,
}

impl Context {
    pub fn new(cluster_map: ClusterMap, config: CliConfig) -> Result<Self> {
        let topology = ClusterMapTopology::from_cluster_map(cluster_map)?;
        let factory = HttpClientFactory::new(config.client);
        let registry = Arc::new(ActiveStreamRegistry::new());
        let admin = StreamAdmin::with_config(Arc::new(factory), Arc::new(topology), config.admin)?
            .with_watchdog(registry.clone());
        Ok(Self { admin, registry })
    }

    /// Loads the cluster map and optional config file, then applies the
    /// `testing` override.
    pub fn from_files(cluster_map: &Path, config: Option<&Path>, testing: bool) -> Result<Self> {
        let map = ClusterMap::from_json_file(cluster_map)
            .with_context(|| format!("loading cluster map {}", cluster_map.display()))?;
        let mut config = match config {
            Some(path) => CliConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => CliConfig::default(),
        };
        config.admin.testing |= testing;
        Self::new(map, config)
    }

    pub fn admin(&self) -> &StreamAdmin {
        &self.admin
    }

    fn report(&self, operation: &'static str, stream: StreamId) -> Report {
        info!(operation, %stream, "operation completed");
        Report {
            operation,
            stream,
            active_streams: self.registry.snapshot(),
            metrics: self.admin.metrics(),
        }
    }
}

/// Outcome of a successful operation.
#[derive(Debug, Serialize)]
pub struct Report {
    pub operation: &'static str,
    pub stream: StreamId,
    pub active_streams: Vec<ActiveStream>,
    pub metrics: MetricsSnapshot,
}

pub async fn add_index(
    ctx: &Context,
    stream: StreamId,
    buckets: &[String],
    instances: &Path,
    timestamps: Option<&Path>,
) -> Result<Report> {
    let instances: Vec<Instance> = read_json(instances)?;
    let timestamps: Vec<PartitionTimestamp> = match timestamps {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };
    info!(
        %stream,
        ?buckets,
        instances = instances.len(),
        timestamps = timestamps.len(),
        "adding index instances"
    );
    ctx.admin
        .add_index(stream, buckets, &instances, &timestamps)
        .await?;
    Ok(ctx.report("add_index", stream))
}

pub async fn delete_index(
    ctx: &Context,
    stream: StreamId,
    buckets: &[String],
    instance_ids: &[InstanceId],
) -> Result<Report> {
    info!(%stream, ?buckets, ?instance_ids, "deleting index instances");
    ctx.admin.delete_index(stream, buckets, instance_ids).await?;
    Ok(ctx.report("delete_index", stream))
}

/// Repairs `endpoint` on every node owning a partition of `buckets`.
pub async fn repair_endpoint(
    ctx: &Context,
    stream: StreamId,
    buckets: &[String],
    endpoint: &str,
) -> Result<Report> {
    let num_partitions = ctx.admin.config().num_partitions;
    let partitions: BTreeMap<String, Vec<u16>> = buckets
        .iter()
        .map(|bucket| (bucket.clone(), (0..num_partitions).collect()))
        .collect();
    info!(%stream, ?buckets, endpoint, "repairing endpoint");
    ctx.admin.repair_endpoint(stream, &partitions, endpoint).await?;
    Ok(ctx.report("repair_endpoint", stream))
}

pub async fn restart(ctx: &Context, stream: StreamId, timestamps: &Path) -> Result<Report> {
    let timestamps: Vec<PartitionTimestamp> = read_json(timestamps)?;
    info!(%stream, buckets = timestamps.len(), "restarting partitions");
    ctx.admin.restart_if_necessary(stream, &timestamps).await?;
    Ok(ctx.report("restart", stream))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    debug!(path = %path.display(), "reading");
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}
