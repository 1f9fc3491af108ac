//! Per-node worker.
//!
//! A worker is bound to one producer node for one round. It retries its
//! operation against that node until it succeeds, hits an error the
//! operation cannot absorb, exceeds the elapsed-time ceiling, or is
//! cancelled because a sibling already decided the round.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use streamadmin_client::ProducerClient;
use streamadmin_common::protocol::{
    ErrorKind, Instance, InstanceId, PartitionTimestamp, ProducerError, RetryScope,
    StreamAdminError, TopologyError, DATAPORT_ENDPOINT_TYPE,
};
use streamadmin_metrics::MetricsCollector;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::WorkerConfig;
use crate::timestamp::{
    find_timestamp_for_bucket, is_consistent_rollback, recompute_request_timestamp,
    restart_timestamp_from_request,
};
use crate::topology::TopologyResolver;

/// The four orchestrator operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminOp {
    AddIndex,
    DeleteIndex,
    RepairEndpoint,
    Restart,
}

impl AdminOp {
    pub fn as_str(self) -> &'static str {
        match self {
            AdminOp::AddIndex => "add_index",
            AdminOp::DeleteIndex => "delete_index",
            AdminOp::RepairEndpoint => "repair_endpoint",
            AdminOp::Restart => "restart",
        }
    }

    /// Whether a worker failure of `kind` makes this operation issue a fresh
    /// round rather than give up.
    pub fn retries_round_on(self, kind: ErrorKind) -> bool {
        match self {
            AdminOp::AddIndex => matches!(
                kind,
                ErrorKind::WrongPartitionOwner
                    | ErrorKind::InvalidTimestampBranch
                    | ErrorKind::InvalidNodeAddress
                    | ErrorKind::InconsistentTopology
                    | ErrorKind::NodeTimeout
            ),
            AdminOp::Restart => kind.scope() != RetryScope::Fatal,
            AdminOp::DeleteIndex | AdminOp::RepairEndpoint => {
                matches!(kind, ErrorKind::NodeTimeout | ErrorKind::InconsistentTopology)
            }
        }
    }
}

/// What a worker does with a producer error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    /// The desired end state already holds.
    Done,
    /// Try the same node again, after rollback reconciliation where relevant.
    RetryNode,
    /// Stop and report `kind` to the orchestrator.
    Fail(ErrorKind),
}

pub(crate) fn classify(op: AdminOp, error: &ProducerError) -> Disposition {
    match (op, error) {
        (AdminOp::AddIndex, ProducerError::TopicExists) => Disposition::Fail(ErrorKind::RequestMalformed),
        (AdminOp::AddIndex | AdminOp::Restart, ProducerError::InconsistentFeed) => {
            Disposition::Fail(ErrorKind::InconsistentFeed)
        }
        (AdminOp::Restart, ProducerError::TopicMissing | ProducerError::InvalidBucket) => {
            Disposition::Fail(ErrorKind::RequestMalformed)
        }
        (AdminOp::Restart, ProducerError::Feeder) => Disposition::Fail(ErrorKind::FeederFailure),
        (AdminOp::Restart, ProducerError::StreamEnd) => Disposition::Fail(ErrorKind::StreamEnded),
        (AdminOp::DeleteIndex | AdminOp::RepairEndpoint, ProducerError::TopicMissing) => Disposition::Done,
        _ => Disposition::RetryNode,
    }
}

/// Kind a producer error stands for when it is absorbed by the retry loop.
fn natural_kind(error: &ProducerError) -> ErrorKind {
    match error {
        ProducerError::NotMyPartition => ErrorKind::WrongPartitionOwner,
        ProducerError::InvalidPartitionBranch => ErrorKind::InvalidTimestampBranch,
        ProducerError::InvalidKvAddrs => ErrorKind::InvalidNodeAddress,
        ProducerError::Feeder => ErrorKind::FeederFailure,
        ProducerError::StreamEnd => ErrorKind::StreamEnded,
        ProducerError::InconsistentFeed => ErrorKind::InconsistentFeed,
        ProducerError::TopicMissing | ProducerError::TopicExists | ProducerError::InvalidBucket => {
            ErrorKind::RequestMalformed
        }
        ProducerError::ResponseTimeout | ProducerError::Transport(_) => ErrorKind::NodeTimeout,
    }
}

/// Input of one worker.
#[derive(Debug, Clone)]
pub(crate) enum WorkerTask {
    AddIndex {
        buckets: Arc<[String]>,
        instances: Arc<[Instance]>,
        requested: Arc<[PartitionTimestamp]>,
    },
    DeleteIndex {
        instance_ids: Arc<[InstanceId]>,
    },
    RepairEndpoint {
        endpoints: Arc<[String]>,
    },
    Restart {
        timestamps: Vec<PartitionTimestamp>,
    },
}

impl WorkerTask {
    pub(crate) fn op(&self) -> AdminOp {
        match self {
            WorkerTask::AddIndex { .. } => AdminOp::AddIndex,
            WorkerTask::DeleteIndex { .. } => AdminOp::DeleteIndex,
            WorkerTask::RepairEndpoint { .. } => AdminOp::RepairEndpoint,
            WorkerTask::Restart { .. } => AdminOp::Restart,
        }
    }
}

#[derive(Debug)]
pub(crate) enum WorkerStatus {
    Succeeded,
    /// Told to stop; nothing to report.
    Cancelled,
    Failed(StreamAdminError),
}

#[derive(Debug)]
pub(crate) struct WorkerReport {
    pub node: String,
    pub status: WorkerStatus,
    /// Timestamps the producer reports as streaming.
    pub active: Vec<PartitionTimestamp>,
    pub attempts: u32,
}

impl WorkerReport {
    pub(crate) fn panicked(node: String) -> Self {
        let reason = "worker panicked".to_string();
        Self {
            status: WorkerStatus::Failed(StreamAdminError::WorkerFailed {
                node: node.clone(),
                reason,
            }),
            node,
            active: Vec::new(),
            attempts: 0,
        }
    }
}

/// Everything the workers of a round share.
#[derive(Clone)]
pub(crate) struct WorkerEnv {
    pub topic: String,
    pub pool: String,
    pub topology: Arc<dyn TopologyResolver>,
    pub metrics: Arc<dyn MetricsCollector>,
    pub config: WorkerConfig,
}

enum Outcome {
    Active(Vec<PartitionTimestamp>),
    Cancelled,
    Failed(StreamAdminError, Vec<PartitionTimestamp>),
}

enum PrepareError {
    Producer(ProducerError),
    Topology(TopologyError),
}

pub(crate) struct Worker {
    node: String,
    client: Arc<dyn ProducerClient>,
    env: WorkerEnv,
    cancel: CancellationToken,
    attempts: u32,
}

impl Worker {
    pub(crate) fn new(
        node: String,
        client: Arc<dyn ProducerClient>,
        env: WorkerEnv,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            node,
            client,
            env,
            cancel,
            attempts: 0,
        }
    }

    pub(crate) fn node(&self) -> &str {
        &self.node
    }

    pub(crate) async fn run(mut self, task: WorkerTask) -> WorkerReport {
        let op = task.op();
        debug!(node = %self.node, op = op.as_str(), "worker started");

        let outcome = match task {
            WorkerTask::AddIndex {
                buckets,
                instances,
                requested,
            } => self.add_index(&buckets, &instances, &requested).await,
            WorkerTask::DeleteIndex { instance_ids } => {
                let client = self.client.clone();
                let topic = self.env.topic.clone();
                self.run_idempotent(op, || client.delete_instances(&topic, &instance_ids))
                    .await
            }
            WorkerTask::RepairEndpoint { endpoints } => {
                let client = self.client.clone();
                let topic = self.env.topic.clone();
                self.run_idempotent(op, || client.repair_endpoints(&topic, &endpoints))
                    .await
            }
            WorkerTask::Restart { timestamps } => self.restart(timestamps).await,
        };

        let (status, active) = match outcome {
            Outcome::Active(active) => (WorkerStatus::Succeeded, active),
            Outcome::Cancelled => {
                debug!(node = %self.node, op = op.as_str(), "worker cancelled");
                (WorkerStatus::Cancelled, Vec::new())
            }
            Outcome::Failed(error, active) => (WorkerStatus::Failed(error), active),
        };
        WorkerReport {
            node: self.node,
            status,
            active,
            attempts: self.attempts,
        }
    }

    async fn add_index(
        &mut self,
        buckets: &[String],
        instances: &[Instance],
        requested: &[PartitionTimestamp],
    ) -> Outcome {
        let started = Instant::now();
        let mut pending: Option<Vec<PartitionTimestamp>> = None;

        loop {
            if self.cancel.is_cancelled() {
                return Outcome::Cancelled;
            }
            self.attempts += 1;

            let timestamps = match pending.take() {
                Some(timestamps) => timestamps,
                None => match self.add_timestamps(buckets, requested).await {
                    Ok(timestamps) => timestamps,
                    Err(PrepareError::Topology(e)) => {
                        return Outcome::Failed(e.into(), Vec::new());
                    }
                    Err(PrepareError::Producer(e)) => {
                        self.log_retry(AdminOp::AddIndex, &e);
                        if let Err(stop) = self.pause(started, &e).await {
                            return stop;
                        }
                        continue;
                    }
                },
            };

            let result = self
                .client
                .request_topic(&self.env.topic, DATAPORT_ENDPOINT_TYPE, &timestamps, instances)
                .await;
            self.env.metrics.record_node_request(&self.node, result.is_ok());

            let failure = match result {
                Ok(response) => return Outcome::Active(response.active_timestamps),
                Err(failure) => failure,
            };
            match classify(AdminOp::AddIndex, &failure.error) {
                Disposition::Done => return Outcome::Active(failure.response.active_timestamps),
                Disposition::Fail(kind) => {
                    return Outcome::Failed(
                        self.producer_error(kind, failure.error),
                        failure.response.active_timestamps,
                    );
                }
                Disposition::RetryNode => {
                    self.log_retry(AdminOp::AddIndex, &failure.error);
                    pending = Some(self.apply_rollback(&timestamps, &failure.response.rollback_timestamps));
                    if let Err(stop) = self.pause(started, &failure.error).await {
                        return stop;
                    }
                }
            }
        }
    }

    /// Starting positions for `buckets` restricted to what this node owns.
    /// Buckets without a caller-supplied timestamp start from the node's
    /// failover history.
    async fn add_timestamps(
        &self,
        buckets: &[String],
        requested: &[PartitionTimestamp],
    ) -> Result<Vec<PartitionTimestamp>, PrepareError> {
        let mut full = Vec::with_capacity(buckets.len());
        for bucket in buckets {
            let ts = match find_timestamp_for_bucket(requested, bucket) {
                Some(ts) => restart_timestamp_from_request(&self.env.pool, ts),
                None => {
                    let result = self.client.initial_position(&self.env.pool, bucket).await;
                    self.env.metrics.record_node_request(&self.node, result.is_ok());
                    let initial = result.map_err(PrepareError::Producer)?;
                    restart_timestamp_from_request(&self.env.pool, &initial)
                }
            };
            full.push(ts);
        }

        self.env
            .topology
            .filter_for_node(&full, &self.node)
            .await
            .map_err(PrepareError::Topology)
    }

    async fn restart(&mut self, mut timestamps: Vec<PartitionTimestamp>) -> Outcome {
        let started = Instant::now();

        loop {
            if self.cancel.is_cancelled() {
                return Outcome::Cancelled;
            }
            self.attempts += 1;

            let result = self.client.restart_partitions(&self.env.topic, &timestamps).await;
            self.env.metrics.record_node_request(&self.node, result.is_ok());

            let failure = match result {
                Ok(response) => return Outcome::Active(response.active_timestamps),
                Err(failure) => failure,
            };
            match classify(AdminOp::Restart, &failure.error) {
                Disposition::Done => return Outcome::Active(failure.response.active_timestamps),
                Disposition::Fail(kind) => {
                    return Outcome::Failed(
                        self.producer_error(kind, failure.error),
                        failure.response.active_timestamps,
                    );
                }
                Disposition::RetryNode => {
                    self.log_retry(AdminOp::Restart, &failure.error);
                    timestamps = self.apply_rollback(&timestamps, &failure.response.rollback_timestamps);
                    if let Err(stop) = self.pause(started, &failure.error).await {
                        return stop;
                    }
                }
            }
        }
    }

    /// Loop for delete and repair, which carry no positions.
    async fn run_idempotent<F, Fut>(&mut self, op: AdminOp, call: F) -> Outcome
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<(), ProducerError>>,
    {
        let started = Instant::now();

        loop {
            if self.cancel.is_cancelled() {
                return Outcome::Cancelled;
            }
            self.attempts += 1;

            let result = call().await;
            self.env.metrics.record_node_request(&self.node, result.is_ok());

            let error = match result {
                Ok(()) => return Outcome::Active(Vec::new()),
                Err(error) => error,
            };
            match classify(op, &error) {
                Disposition::Done => {
                    debug!(node = %self.node, op = op.as_str(), "topic already gone");
                    return Outcome::Active(Vec::new());
                }
                Disposition::Fail(kind) => {
                    return Outcome::Failed(self.producer_error(kind, error), Vec::new());
                }
                Disposition::RetryNode => {
                    self.log_retry(op, &error);
                    if let Err(stop) = self.pause(started, &error).await {
                        return stop;
                    }
                }
            }
        }
    }

    fn apply_rollback(
        &self,
        requested: &[PartitionTimestamp],
        rollbacks: &[PartitionTimestamp],
    ) -> Vec<PartitionTimestamp> {
        if rollbacks.is_empty() {
            return requested.to_vec();
        }
        requested
            .iter()
            .map(|ts| {
                if let Some(rollback) = find_timestamp_for_bucket(rollbacks, &ts.bucket) {
                    for proposed in rollback.entries() {
                        match ts.get(proposed.partition) {
                            Some(original) if !is_consistent_rollback(original, proposed) => {
                                warn!(
                                    node = %self.node,
                                    bucket = %ts.bucket,
                                    partition = proposed.partition,
                                    requested = original.seqno,
                                    proposed = proposed.seqno,
                                    "producer proposed a rollback ahead of the requested position"
                                );
                            }
                            _ => {}
                        }
                    }
                }
                recompute_request_timestamp(ts, rollbacks)
            })
            .collect()
    }

    /// Waits before the next attempt, or returns the outcome to stop with.
    async fn pause(&self, started: Instant, last_error: &ProducerError) -> Result<(), Outcome> {
        let elapsed = started.elapsed();
        if elapsed >= self.env.config.max_elapsed() {
            warn!(
                node = %self.node,
                attempts = self.attempts,
                elapsed_ms = elapsed.as_millis() as u64,
                error = %last_error,
                "giving up on node"
            );
            return Err(Outcome::Failed(
                StreamAdminError::NodeTimeout {
                    node: self.node.clone(),
                    elapsed_ms: elapsed.as_millis() as u64,
                    last_error: last_error.to_string(),
                },
                Vec::new(),
            ));
        }

        tokio::select! {
            _ = self.cancel.cancelled() => Err(Outcome::Cancelled),
            _ = tokio::time::sleep(self.env.config.attempt_backoff()) => Ok(()),
        }
    }

    fn log_retry(&self, op: AdminOp, error: &ProducerError) {
        debug!(
            node = %self.node,
            op = op.as_str(),
            attempt = self.attempts,
            kind = %natural_kind(error),
            error = %error,
            "retrying against node"
        );
    }

    fn producer_error(&self, kind: ErrorKind, source: ProducerError) -> StreamAdminError {
        StreamAdminError::Producer {
            node: self.node.clone(),
            kind,
            source,
        }
    }
}
