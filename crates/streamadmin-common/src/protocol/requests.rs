use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use super::timestamp::PartitionTimestamp;

pub type RequestId = u64;
pub type InstanceId = u64;

/// JSON-RPC method names exposed by a producer's admin port.
pub mod methods {
    pub const MUTATION_TOPIC_REQUEST: &str = "mutationTopicRequest";
    pub const DEL_INSTANCES: &str = "delInstances";
    pub const REPAIR_ENDPOINTS: &str = "repairEndpoints";
    pub const INITIAL_RESTART_TIMESTAMP: &str = "initialRestartTimestamp";
    pub const RESTART_VBUCKETS: &str = "restartVbuckets";
}

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// An index definition together with the endpoints that receive its mutations.
///
/// Opaque to the orchestrator beyond `id`; the definition is passed through
/// to producers untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub definition: serde_json::Value,
    #[serde(default)]
    pub endpoints: Vec<String>,
}

impl Instance {
    pub fn new(id: InstanceId, definition: serde_json::Value) -> Self {
        Self {
            id,
            definition,
            endpoints: Vec::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoints.push(endpoint.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicRequest {
    pub topic: String,
    pub endpoint_type: String,
    pub timestamps: Vec<PartitionTimestamp>,
    pub instances: Vec<Instance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelInstancesRequest {
    pub topic: String,
    pub instance_ids: Vec<InstanceId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairEndpointsRequest {
    pub topic: String,
    pub endpoints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialTimestampRequest {
    pub pool: String,
    pub bucket: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartVbucketsRequest {
    pub topic: String,
    pub timestamps: Vec<PartitionTimestamp>,
}

/// Generates an id for an outgoing admin request.
pub fn generate_request_id() -> RequestId {
    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    let counter = REQUEST_ID_COUNTER.fetch_add(1, Ordering::SeqCst);

    // upper 32 bits from the clock, lower 32 from the counter
    (timestamp & 0xFFFFFFFF00000000) | (counter & 0xFFFFFFFF)
}
