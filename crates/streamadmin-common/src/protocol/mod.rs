pub mod error;
pub mod jsonrpc;
pub mod requests;
pub mod responses;
pub mod stream;
pub mod timestamp;


pub use error::{
    ErrorKind, ProducerError, Result, RetryScope, StreamAdminError, TimestampError, TopologyError,
};
pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use requests::{
    generate_request_id, methods, DelInstancesRequest, InitialTimestampRequest, Instance,
    InstanceId, RepairEndpointsRequest, RequestId, RestartVbucketsRequest, TopicRequest,
};
pub use responses::TopicResponse;
pub use stream::{StreamId, DATAPORT_ENDPOINT_TYPE, INIT_TOPIC, MAINT_TOPIC};
pub use timestamp::{PartitionEntry, PartitionTimestamp, DEFAULT_POOL_NAME, NUM_PARTITIONS};
