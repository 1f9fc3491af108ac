use async_trait::async_trait;
use std::sync::Arc;
use streamadmin_common::protocol::{
    Instance, InstanceId, PartitionTimestamp, ProducerError, TopicResponse,
};
use thiserror::Error;

/// A failed topic request or restart.
///
/// Producers may report partial progress alongside the error (partitions that
/// did become active, rollback positions for the ones that did not), so the
/// response travels with the error.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{error}")]
pub struct RequestFailure {
    pub error: ProducerError,
    pub response: TopicResponse,
}

impl RequestFailure {
    pub fn new(error: ProducerError, response: TopicResponse) -> Self {
        Self { error, response }
    }
}

impl From<ProducerError> for RequestFailure {
    fn from(error: ProducerError) -> Self {
        Self {
            error,
            response: TopicResponse::default(),
        }
    }
}

/// Admin surface of one producer node.
///
/// Implementations own their connection lifecycle; the orchestrator never
/// closes or pools them.
#[async_trait]
pub trait ProducerClient: Send + Sync {
    /// Address of the producer this client talks to.
    fn address(&self) -> &str;

    /// Starts or augments `topic` with the given positions and instances.
    async fn request_topic(
        &self,
        topic: &str,
        endpoint_type: &str,
        timestamps: &[PartitionTimestamp],
        instances: &[Instance],
    ) -> Result<TopicResponse, RequestFailure>;

    async fn delete_instances(
        &self,
        topic: &str,
        instance_ids: &[InstanceId],
    ) -> Result<(), ProducerError>;

    /// Re-establishes delivery to `endpoints` without resetting positions.
    async fn repair_endpoints(&self, topic: &str, endpoints: &[String])
        -> Result<(), ProducerError>;

    /// Earliest safe position for every partition of `bucket` this producer
    /// knows about, derived from its failover history.
    async fn initial_position(
        &self,
        pool: &str,
        bucket: &str,
    ) -> Result<PartitionTimestamp, ProducerError>;

    async fn restart_partitions(
        &self,
        topic: &str,
        timestamps: &[PartitionTimestamp],
    ) -> Result<TopicResponse, RequestFailure>;
}

/// Hands out a client per node address.
///
/// Never fails: a client for an unusable address reports the problem from its
/// calls instead.
pub trait ProducerClientFactory: Send + Sync {
    fn client_for_node(&self, node: &str) -> Arc<dyn ProducerClient>;
}
