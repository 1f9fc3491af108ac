use futures::FutureExt;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use streamadmin_client::ProducerClientFactory;
use streamadmin_common::protocol::{
    ErrorKind, Instance, InstanceId, PartitionTimestamp, Result, StreamAdminError, StreamId,
    TopologyError,
};
use streamadmin_metrics::{MetricsCollector, MetricsSnapshot, StreamAdminMetricsCollector};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, RoundRetryConfig, StreamAdminConfig};
use crate::timestamp::{check_coverage, expected_for_add, expected_from_timestamps, Coverage, ExpectedPartitions};
use crate::topology::TopologyResolver;
use crate::watchdog::StreamWatchdog;
use crate::worker::{AdminOp, Worker, WorkerEnv, WorkerReport, WorkerStatus, WorkerTask};

/// Active timestamps reported by each node of a round.
type NodeActive = Vec<(String, Vec<PartitionTimestamp>)>;

/// How a round ended.
enum RoundResult {
    /// Every worker succeeded.
    Completed(NodeActive),
    /// A worker failed with an error the operation retries.
    Retry(StreamAdminError),
    Fatal(StreamAdminError),
}

/// Which producers an idempotent operation reaches.
#[derive(Clone, Copy)]
enum Targets<'a> {
    /// Every owner of any partition of the buckets.
    Buckets(&'a [String]),
    /// Owners of the listed partitions only.
    Partitions(&'a BTreeMap<String, Vec<u16>>),
}

/// Pacing of successive rounds within one operation call.
struct RoundPacer<'a> {
    op: AdminOp,
    config: &'a RoundRetryConfig,
    round: u32,
    backoff_ms: u64,
}

impl<'a> RoundPacer<'a> {
    fn new(op: AdminOp, config: &'a RoundRetryConfig) -> Self {
        Self {
            op,
            config,
            round: 0,
            backoff_ms: config.initial_backoff_ms,
        }
    }

    fn begin(&mut self) -> u32 {
        self.round += 1;
        self.round
    }

    /// Sleeps before the next round, or gives up once `max_rounds` is spent.
    async fn retry(&mut self, kind: ErrorKind) -> Result<()> {
        if let Some(max_rounds) = self.config.max_rounds {
            if self.round >= max_rounds {
                error!(op = self.op.as_str(), rounds = self.round, kind = %kind, "giving up");
                return Err(StreamAdminError::RoundsExhausted {
                    operation: self.op.as_str().to_string(),
                    rounds: self.round,
                    kind,
                });
            }
        }
        tokio::time::sleep(Duration::from_millis(self.backoff_ms)).await;
        self.backoff_ms = self.config.next_backoff(self.backoff_ms);
        Ok(())
    }
}

/// Stream-admin orchestrator.
///
/// Every operation fans out one [`Worker`] per relevant producer node, joins
/// them and decides whether the round stands, must be reissued, or has failed
/// for good. Operations are idempotent with respect to the desired end state,
/// so reissuing a round is always safe.
///
/// # Rounds
///
/// - Workers of a round run concurrently in one `JoinSet` and share a
///   cancellation token.
/// - A worker failure the operation retries cancels its siblings; the round
///   is drained and a new one starts after a backoff.
/// - A fatal failure cancels the siblings and returns at once without waiting
///   for them.
/// - Add and restart rounds that complete are checked for single ownership:
///   every requested partition must be reported active by exactly one node.
///   Otherwise the round is reissued.
///
/// # Example
///
/// ```no_run
/// # use std::sync::Arc;
/// # use streamadmin_client::HttpClientFactory;
/// # use streamadmin_common::protocol::StreamId;
/// # use streamadmin_orchestrator::{ActiveStreamRegistry, ClusterMap, ClusterMapTopology, StreamAdmin};
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let topology = ClusterMapTopology::from_cluster_map(ClusterMap::from_json_file("cluster.json")?)?;
/// let registry = Arc::new(ActiveStreamRegistry::new());
/// let admin = StreamAdmin::new(Arc::new(HttpClientFactory::default()), Arc::new(topology))
///     .with_watchdog(registry.clone());
///
/// admin.delete_index(StreamId::Maintenance, &["default".to_string()], &[42]).await?;
/// # Ok(())
/// # }
/// ```
pub struct StreamAdmin {
    factory: Arc<dyn ProducerClientFactory>,
    topology: Arc<dyn TopologyResolver>,
    watchdog: Option<Arc<dyn StreamWatchdog>>,
    metrics: Arc<dyn MetricsCollector>,
    config: StreamAdminConfig,
}

impl StreamAdmin {
    pub fn new(factory: Arc<dyn ProducerClientFactory>, topology: Arc<dyn TopologyResolver>) -> Self {
        Self::build(factory, topology, StreamAdminConfig::default())
    }

    /// Fails if `config` does not pass [`StreamAdminConfig::validate`].
    pub fn with_config(
        factory: Arc<dyn ProducerClientFactory>,
        topology: Arc<dyn TopologyResolver>,
        config: StreamAdminConfig,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(factory, topology, config))
    }

    fn build(
        factory: Arc<dyn ProducerClientFactory>,
        topology: Arc<dyn TopologyResolver>,
        config: StreamAdminConfig,
    ) -> Self {
        info!(
            pool = %config.pool,
            num_partitions = config.num_partitions,
            testing = config.testing,
            "stream admin initialized"
        );
        Self {
            factory,
            topology,
            watchdog: None,
            metrics: Arc::new(StreamAdminMetricsCollector::new()),
            config,
        }
    }

    /// Registers every validated active stream with `watchdog`.
    pub fn with_watchdog(mut self, watchdog: Arc<dyn StreamWatchdog>) -> Self {
        self.watchdog = Some(watchdog);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &StreamAdminConfig {
        &self.config
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Starts or augments `stream` so that `instances` receive mutations of
    /// `buckets`.
    ///
    /// A bucket with an entry in `request_timestamps` starts from it;
    /// otherwise every partition of the bucket starts from the owning node's
    /// failover history. Returns immediately if `buckets` or `instances` is
    /// empty.
    pub async fn add_index(
        &self,
        stream: StreamId,
        buckets: &[String],
        instances: &[Instance],
        request_timestamps: &[PartitionTimestamp],
    ) -> Result<()> {
        if buckets.is_empty() || instances.is_empty() {
            debug!(stream = %stream, "add_index: nothing to do");
            return Ok(());
        }
        for ts in request_timestamps {
            ts.validate()?;
        }

        let start = Instant::now();
        let result = self.add_index_rounds(stream, buckets, instances, request_timestamps).await;
        self.finish(AdminOp::AddIndex, stream, start, &result);
        result
    }

    async fn add_index_rounds(
        &self,
        stream: StreamId,
        buckets: &[String],
        instances: &[Instance],
        request_timestamps: &[PartitionTimestamp],
    ) -> Result<()> {
        let op = AdminOp::AddIndex;
        let expected = expected_for_add(buckets, request_timestamps, self.config.num_partitions);
        let buckets: Arc<[String]> = Arc::from(buckets);
        let instances: Arc<[Instance]> = Arc::from(instances);
        let requested: Arc<[PartitionTimestamp]> = Arc::from(request_timestamps);
        let mut pacer = RoundPacer::new(op, &self.config.round_retry);

        loop {
            let round = self.begin_round(&mut pacer, stream);
            let nodes = match self.topology.nodes_for_buckets(&buckets).await {
                Ok(nodes) => nodes,
                Err(e) => {
                    self.round_topology_failure(&mut pacer, stream, e).await?;
                    continue;
                }
            };

            let tasks = nodes
                .into_iter()
                .map(|node| {
                    let task = WorkerTask::AddIndex {
                        buckets: buckets.clone(),
                        instances: instances.clone(),
                        requested: requested.clone(),
                    };
                    (node, task)
                })
                .collect();

            match self.run_round(stream, op, round, tasks).await {
                RoundResult::Completed(active) => {
                    if self.validate_active(op, stream, round, &expected, &active) {
                        self.register_active(stream, &active);
                        return Ok(());
                    }
                    self.retry_round(&mut pacer, ErrorKind::InconsistentTopology).await?;
                }
                RoundResult::Retry(e) => self.retry_round(&mut pacer, e.kind()).await?,
                RoundResult::Fatal(e) => return Err(e),
            }
        }
    }

    /// Removes `instance_ids` from the topic of `stream` on every node owning
    /// `buckets`. A node whose topic is already gone counts as done.
    pub async fn delete_index(
        &self,
        stream: StreamId,
        buckets: &[String],
        instance_ids: &[InstanceId],
    ) -> Result<()> {
        if buckets.is_empty() || instance_ids.is_empty() {
            debug!(stream = %stream, "delete_index: nothing to do");
            return Ok(());
        }

        let start = Instant::now();
        let instance_ids: Arc<[InstanceId]> = Arc::from(instance_ids);
        let result = self
            .fan_out_idempotent(AdminOp::DeleteIndex, stream, Targets::Buckets(buckets), || {
                WorkerTask::DeleteIndex {
                    instance_ids: instance_ids.clone(),
                }
            })
            .await;
        self.finish(AdminOp::DeleteIndex, stream, start, &result);
        result
    }

    /// Asks every node owning a partition of `partitions_by_bucket` to
    /// re-establish delivery to `endpoint`. Streaming positions are left
    /// alone.
    pub async fn repair_endpoint(
        &self,
        stream: StreamId,
        partitions_by_bucket: &BTreeMap<String, Vec<u16>>,
        endpoint: &str,
    ) -> Result<()> {
        if partitions_by_bucket.is_empty() {
            debug!(stream = %stream, "repair_endpoint: nothing to do");
            return Ok(());
        }

        let start = Instant::now();
        let endpoints: Arc<[String]> = Arc::from(vec![endpoint.to_string()]);
        let targets = Targets::Partitions(partitions_by_bucket);
        let result = self
            .fan_out_idempotent(AdminOp::RepairEndpoint, stream, targets, || {
                WorkerTask::RepairEndpoint {
                    endpoints: endpoints.clone(),
                }
            })
            .await;
        self.finish(AdminOp::RepairEndpoint, stream, start, &result);
        result
    }

    async fn fan_out_idempotent(
        &self,
        op: AdminOp,
        stream: StreamId,
        targets: Targets<'_>,
        task: impl Fn() -> WorkerTask,
    ) -> Result<()> {
        let mut pacer = RoundPacer::new(op, &self.config.round_retry);

        loop {
            let round = self.begin_round(&mut pacer, stream);
            let lookup = match targets {
                Targets::Buckets(buckets) => self.topology.nodes_for_buckets(buckets).await,
                Targets::Partitions(partitions) => self.topology.nodes_for_partitions(partitions).await,
            };
            let nodes = match lookup {
                Ok(nodes) => nodes,
                Err(e) => {
                    self.round_topology_failure(&mut pacer, stream, e).await?;
                    continue;
                }
            };

            let tasks = nodes.into_iter().map(|node| (node, task())).collect();
            match self.run_round(stream, op, round, tasks).await {
                RoundResult::Completed(_) => return Ok(()),
                RoundResult::Retry(e) => self.retry_round(&mut pacer, e.kind()).await?,
                RoundResult::Fatal(e) => return Err(e),
            }
        }
    }

    /// Restarts the partitions of `restart_timestamps` that are not
    /// streaming, at the given positions.
    ///
    /// A partition map that is moving underneath (rebalance in flight) makes
    /// the round start over instead of failing the call.
    pub async fn restart_if_necessary(
        &self,
        stream: StreamId,
        restart_timestamps: &[PartitionTimestamp],
    ) -> Result<()> {
        if restart_timestamps.iter().all(PartitionTimestamp::is_empty) {
            debug!(stream = %stream, "restart: nothing to do");
            return Ok(());
        }
        for ts in restart_timestamps {
            ts.validate()?;
        }

        let start = Instant::now();
        let result = self.restart_rounds(stream, restart_timestamps).await;
        self.finish(AdminOp::Restart, stream, start, &result);
        result
    }

    async fn restart_rounds(&self, stream: StreamId, restart_timestamps: &[PartitionTimestamp]) -> Result<()> {
        let op = AdminOp::Restart;
        let expected = expected_from_timestamps(restart_timestamps);
        let mut pacer = RoundPacer::new(op, &self.config.round_retry);

        loop {
            let round = self.begin_round(&mut pacer, stream);
            let by_node = match self.topology.nodes_for_timestamps(restart_timestamps).await {
                Ok(by_node) => by_node,
                Err(e) => {
                    self.round_topology_failure(&mut pacer, stream, e).await?;
                    continue;
                }
            };

            let tasks = by_node
                .into_iter()
                .map(|(node, timestamps)| (node, WorkerTask::Restart { timestamps }))
                .collect();

            match self.run_round(stream, op, round, tasks).await {
                RoundResult::Completed(active) => {
                    if self.validate_active(op, stream, round, &expected, &active) {
                        self.register_active(stream, &active);
                        return Ok(());
                    }
                    self.retry_round(&mut pacer, ErrorKind::InconsistentTopology).await?;
                }
                RoundResult::Retry(e) => self.retry_round(&mut pacer, e.kind()).await?,
                RoundResult::Fatal(e) => return Err(e),
            }
        }
    }

    fn begin_round(&self, pacer: &mut RoundPacer<'_>, stream: StreamId) -> u32 {
        let round = pacer.begin();
        self.metrics.record_round(pacer.op.as_str());
        debug!(op = pacer.op.as_str(), stream = %stream, round, "round started");
        round
    }

    async fn retry_round(&self, pacer: &mut RoundPacer<'_>, kind: ErrorKind) -> Result<()> {
        self.metrics.record_round_retry(pacer.op.as_str(), kind.as_str());
        pacer.retry(kind).await
    }

    /// Either schedules another round for a topology failure or surfaces it.
    async fn round_topology_failure(
        &self,
        pacer: &mut RoundPacer<'_>,
        stream: StreamId,
        e: TopologyError,
    ) -> Result<()> {
        let kind = e.kind();
        if !pacer.op.retries_round_on(kind) {
            error!(op = pacer.op.as_str(), stream = %stream, error = %e, "topology lookup failed");
            return Err(e.into());
        }
        warn!(
            op = pacer.op.as_str(),
            stream = %stream,
            round = pacer.round,
            error = %e,
            "topology is moving, retrying round"
        );
        self.retry_round(pacer, kind).await
    }

    /// Runs one worker per `(node, task)` and joins them.
    async fn run_round(
        &self,
        stream: StreamId,
        op: AdminOp,
        round: u32,
        tasks: Vec<(String, WorkerTask)>,
    ) -> RoundResult {
        let cancel = CancellationToken::new();
        let env = WorkerEnv {
            topic: stream.topic_name(self.config.testing),
            pool: self.config.pool.clone(),
            topology: self.topology.clone(),
            metrics: self.metrics.clone(),
            config: self.config.worker.clone(),
        };

        let mut workers = JoinSet::new();
        for (node, task) in tasks {
            let client = self.factory.client_for_node(&node);
            let worker = Worker::new(node, client, env.clone(), cancel.child_token());
            workers.spawn(async move {
                let node = worker.node().to_string();
                AssertUnwindSafe(worker.run(task))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| WorkerReport::panicked(node))
            });
        }

        let mut active = NodeActive::with_capacity(workers.len());
        let mut retry: Option<StreamAdminError> = None;

        while let Some(joined) = workers.join_next().await {
            let report = match joined {
                Ok(report) => report,
                Err(e) => {
                    cancel.cancel();
                    workers.detach_all();
                    error!(op = op.as_str(), stream = %stream, round, error = %e, "worker task lost");
                    return RoundResult::Fatal(StreamAdminError::WorkerFailed {
                        node: "unknown".to_string(),
                        reason: e.to_string(),
                    });
                }
            };

            match report.status {
                WorkerStatus::Succeeded => {
                    debug!(
                        op = op.as_str(),
                        node = %report.node,
                        round,
                        attempts = report.attempts,
                        timestamps = report.active.len(),
                        "worker done"
                    );
                    active.push((report.node, report.active));
                }
                WorkerStatus::Cancelled => {}
                WorkerStatus::Failed(e) => {
                    cancel.cancel();
                    if op.retries_round_on(e.kind()) {
                        warn!(
                            op = op.as_str(),
                            stream = %stream,
                            node = %report.node,
                            round,
                            kind = %e.kind(),
                            error = %e,
                            "abandoning round"
                        );
                        retry.get_or_insert(e);
                    } else {
                        error!(
                            op = op.as_str(),
                            stream = %stream,
                            node = %report.node,
                            round,
                            kind = %e.kind(),
                            error = %e,
                            "fatal worker error"
                        );
                        workers.detach_all();
                        return RoundResult::Fatal(e);
                    }
                }
            }
        }

        match retry {
            Some(e) => RoundResult::Retry(e),
            None => RoundResult::Completed(active),
        }
    }

    /// Checks every expected partition is active on exactly one node.
    fn validate_active(
        &self,
        op: AdminOp,
        stream: StreamId,
        round: u32,
        expected: &ExpectedPartitions,
        active: &NodeActive,
    ) -> bool {
        let claims = active
            .iter()
            .flat_map(|(node, timestamps)| timestamps.iter().map(move |ts| (node.as_str(), ts)));
        let Coverage { missing, split } = check_coverage(expected, claims);

        if !split.is_empty() {
            self.metrics.record_split_ownership(split.len());
            for owned in &split {
                warn!(
                    op = op.as_str(),
                    stream = %stream,
                    round,
                    bucket = %owned.bucket,
                    partition = owned.partition,
                    nodes = ?owned.nodes,
                    "partition active on more than one producer"
                );
            }
        }
        if !missing.is_empty() {
            warn!(
                op = op.as_str(),
                stream = %stream,
                round,
                missing = missing.len(),
                first = ?missing.first(),
                "partitions not active on any producer"
            );
        }
        missing.is_empty() && split.is_empty()
    }

    fn register_active(&self, stream: StreamId, active: &NodeActive) {
        let Some(watchdog) = &self.watchdog else {
            return;
        };
        for (_, timestamps) in active {
            for ts in timestamps {
                watchdog.start_stream(stream, &ts.bucket, ts);
            }
        }
    }

    fn finish(&self, op: AdminOp, stream: StreamId, start: Instant, result: &Result<()>) {
        self.metrics.record_operation(op.as_str(), start, result.is_ok());
        match result {
            Ok(()) => info!(
                op = op.as_str(),
                stream = %stream,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "operation complete"
            ),
            Err(e) => error!(
                op = op.as_str(),
                stream = %stream,
                kind = %e.kind(),
                error = %e,
                "operation failed"
            ),
        }
    }
}
