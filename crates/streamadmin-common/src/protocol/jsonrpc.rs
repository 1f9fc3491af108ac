//! JSON-RPC 2.0 envelope for producer admin calls.
//!
//! Producer errors are carried as application error codes in the
//! `-32010..=-32020` range; the error `data` holds the producer's
//! [`TopicResponse`] when it has one (active and rollback timestamps).
//!
//! # Example
//!
//! ```
//! use streamadmin_common::protocol::jsonrpc::JsonRpcError;
//! use streamadmin_common::protocol::{ProducerError, TopicResponse};
//!
//! let error = JsonRpcError::producer(&ProducerError::InvalidPartitionBranch, Some(&TopicResponse::default()));
//! let (decoded, response) = error.into_producer_failure();
//! assert_eq!(decoded, ProducerError::InvalidPartitionBranch);
//! assert!(response.active_timestamps.is_empty());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ProducerError;
use super::responses::TopicResponse;

/// JSON-RPC 2.0 request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0")
    pub jsonrpc: String,
    /// Name of the method to invoke
    pub method: String,
    /// Parameter values
    pub params: Value,
    /// Request identifier
    pub id: Value,
}

/// JSON-RPC 2.0 response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub result: Option<Value>,
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

/// JSON-RPC 2.0 error
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    pub data: Option<Value>,
}

/// Invalid JSON was received by the server
pub const PARSE_ERROR: i32 = -32700;
/// The method does not exist / is not available
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Invalid method parameter(s)
pub const INVALID_PARAMS: i32 = -32602;
/// Generic server error; decoded as a transport failure
pub const SERVER_ERROR: i32 = -32000;

pub const TOPIC_MISSING: i32 = -32010;
pub const TOPIC_EXISTS: i32 = -32011;
pub const INVALID_BUCKET: i32 = -32012;
pub const NOT_MY_PARTITION: i32 = -32013;
pub const INVALID_PARTITION_BRANCH: i32 = -32014;
pub const INVALID_KV_ADDRS: i32 = -32015;
pub const FEEDER_ERROR: i32 = -32016;
pub const STREAM_END: i32 = -32017;
pub const INCONSISTENT_FEED: i32 = -32018;
pub const RESPONSE_TIMEOUT: i32 = -32019;

impl ProducerError {
    /// Wire code for this error.
    pub fn code(&self) -> i32 {
        match self {
            ProducerError::TopicMissing => TOPIC_MISSING,
            ProducerError::TopicExists => TOPIC_EXISTS,
            ProducerError::InvalidBucket => INVALID_BUCKET,
            ProducerError::NotMyPartition => NOT_MY_PARTITION,
            ProducerError::InvalidPartitionBranch => INVALID_PARTITION_BRANCH,
            ProducerError::InvalidKvAddrs => INVALID_KV_ADDRS,
            ProducerError::Feeder => FEEDER_ERROR,
            ProducerError::StreamEnd => STREAM_END,
            ProducerError::InconsistentFeed => INCONSISTENT_FEED,
            ProducerError::ResponseTimeout => RESPONSE_TIMEOUT,
            ProducerError::Transport(_) => SERVER_ERROR,
        }
    }

    /// Decodes a wire code; unknown codes become transport failures.
    pub fn from_code(code: i32, message: &str) -> Self {
        match code {
            TOPIC_MISSING => ProducerError::TopicMissing,
            TOPIC_EXISTS => ProducerError::TopicExists,
            INVALID_BUCKET => ProducerError::InvalidBucket,
            NOT_MY_PARTITION => ProducerError::NotMyPartition,
            INVALID_PARTITION_BRANCH => ProducerError::InvalidPartitionBranch,
            INVALID_KV_ADDRS => ProducerError::InvalidKvAddrs,
            FEEDER_ERROR => ProducerError::Feeder,
            STREAM_END => ProducerError::StreamEnd,
            INCONSISTENT_FEED => ProducerError::InconsistentFeed,
            RESPONSE_TIMEOUT => ProducerError::ResponseTimeout,
            _ => ProducerError::Transport(format!("{} (code {})", message, code)),
        }
    }
}

impl JsonRpcError {
    /// Create a parse error (-32700)
    pub fn parse_error() -> Self {
        Self {
            code: PARSE_ERROR,
            message: "Parse error".into(),
            data: None,
        }
    }

    /// Create a method not found error (-32601)
    pub fn method_not_found() -> Self {
        Self {
            code: METHOD_NOT_FOUND,
            message: "Method not found".into(),
            data: None,
        }
    }

    /// Create an invalid params error (-32602)
    pub fn invalid_params(msg: &str) -> Self {
        Self {
            code: INVALID_PARAMS,
            message: msg.into(),
            data: None,
        }
    }

    /// Encodes a producer error, attaching the partial response if any.
    pub fn producer(error: &ProducerError, response: Option<&TopicResponse>) -> Self {
        Self {
            code: error.code(),
            message: error.to_string(),
            data: response.and_then(|r| serde_json::to_value(r).ok()),
        }
    }

    /// Decodes into the producer error and whatever response came with it.
    ///
    /// A `data` payload that is not a [`TopicResponse`] is ignored.
    pub fn into_producer_failure(self) -> (ProducerError, TopicResponse) {
        let response = self
            .data
            .and_then(|data| serde_json::from_value::<TopicResponse>(data).ok())
            .unwrap_or_default();
        (ProducerError::from_code(self.code, &self.message), response)
    }
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(error),
            id,
        }
    }
}
