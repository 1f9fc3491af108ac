use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// How far a failure reaches when the orchestrator decides what to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryScope {
    /// Resolved inside the worker's own retry loop against the same node.
    Node,
    /// Sibling workers are cancelled and the whole fan-out is issued again.
    Round,
    /// Surfaced to the caller as-is.
    Fatal,
}

/// Closed set of reasons a stream-admin operation can fail.
///
/// Every terminal worker failure carries one of these; the orchestrator's
/// retry decision is made on the kind alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Producer does not own the requested partition (topology moved).
    WrongPartitionOwner,
    /// Requested epoch diverged from the producer's failover history.
    InvalidTimestampBranch,
    /// Malformed or unreachable node address handed to the producer.
    InvalidNodeAddress,
    /// Partition ownership could not be resolved to a unique node.
    InconsistentTopology,
    /// A worker exhausted its elapsed-time ceiling.
    NodeTimeout,
    /// The producer's upstream feed broke.
    FeederFailure,
    /// The producer reports the partition's stream already terminated.
    StreamEnded,
    /// Non-recoverable request problem.
    RequestMalformed,
    /// Producer-side feed state is inconsistent; never retried.
    InconsistentFeed,
}

impl ErrorKind {
    pub fn scope(self) -> RetryScope {
        match self {
            ErrorKind::WrongPartitionOwner
            | ErrorKind::InvalidTimestampBranch
            | ErrorKind::InvalidNodeAddress => RetryScope::Node,
            ErrorKind::InconsistentTopology
            | ErrorKind::NodeTimeout
            | ErrorKind::FeederFailure
            | ErrorKind::StreamEnded => RetryScope::Round,
            ErrorKind::RequestMalformed | ErrorKind::InconsistentFeed => RetryScope::Fatal,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::WrongPartitionOwner => "wrong-partition-owner",
            ErrorKind::InvalidTimestampBranch => "invalid-timestamp-branch",
            ErrorKind::InvalidNodeAddress => "invalid-node-address",
            ErrorKind::InconsistentTopology => "inconsistent-topology",
            ErrorKind::NodeTimeout => "node-timeout",
            ErrorKind::FeederFailure => "feeder-failure",
            ErrorKind::StreamEnded => "stream-ended",
            ErrorKind::RequestMalformed => "request-malformed",
            ErrorKind::InconsistentFeed => "inconsistent-feed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors reported by a producer node.
///
/// These travel over the wire as numeric JSON-RPC error codes (see
/// [`crate::protocol::jsonrpc`]) so the orchestrator never has to inspect
/// message text to classify them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProducerError {
    #[error("topic missing")]
    TopicMissing,

    #[error("topic already exists")]
    TopicExists,

    #[error("invalid bucket")]
    InvalidBucket,

    #[error("partition not owned by this producer")]
    NotMyPartition,

    #[error("invalid partition branch")]
    InvalidPartitionBranch,

    #[error("invalid node addresses")]
    InvalidKvAddrs,

    #[error("feeder failure")]
    Feeder,

    #[error("stream end")]
    StreamEnd,

    #[error("inconsistent feed")]
    InconsistentFeed,

    #[error("response timeout")]
    ResponseTimeout,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors raised by the topology resolver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("partition {partition} of bucket {bucket} has no unique owner")]
    InconsistentPartitionMap { bucket: String, partition: u16 },

    #[error("unknown bucket {0}")]
    UnknownBucket(String),

    #[error("malformed cluster map: {0}")]
    Malformed(String),
}

impl TopologyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TopologyError::InconsistentPartitionMap { .. } => ErrorKind::InconsistentTopology,
            TopologyError::UnknownBucket(_) | TopologyError::Malformed(_) => {
                ErrorKind::RequestMalformed
            }
        }
    }
}

/// Violations of the per-bucket timestamp invariants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    #[error("partition {partition} appears twice in timestamp for bucket {bucket}")]
    DuplicatePartition { bucket: String, partition: u16 },

    #[error("timestamp for bucket {found} cannot be merged into bucket {expected}")]
    BucketMismatch { expected: String, found: String },
}

/// Caller-facing error of every stream-admin operation.
#[derive(Error, Debug, Clone)]
pub enum StreamAdminError {
    #[error("{kind} from node {node}: {source}")]
    Producer {
        node: String,
        kind: ErrorKind,
        source: ProducerError,
    },

    #[error("node {node} did not settle within {elapsed_ms}ms (last error: {last_error})")]
    NodeTimeout {
        node: String,
        elapsed_ms: u64,
        last_error: String,
    },

    #[error("topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("invalid timestamp: {0}")]
    Timestamp(#[from] TimestampError),

    #[error("worker for node {node} failed: {reason}")]
    WorkerFailed { node: String, reason: String },

    #[error("{operation} gave up after {rounds} rounds (last failure: {kind})")]
    RoundsExhausted {
        operation: String,
        rounds: u32,
        kind: ErrorKind,
    },
}

impl StreamAdminError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StreamAdminError::Producer { kind, .. } => *kind,
            StreamAdminError::NodeTimeout { .. } => ErrorKind::NodeTimeout,
            StreamAdminError::Topology(e) => e.kind(),
            StreamAdminError::Timestamp(_) => ErrorKind::RequestMalformed,
            StreamAdminError::WorkerFailed { .. } => ErrorKind::RequestMalformed,
            StreamAdminError::RoundsExhausted { kind, .. } => *kind,
        }
    }
}

pub type Result<T> = std::result::Result<T, StreamAdminError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_of_every_kind() {
        assert_eq!(ErrorKind::WrongPartitionOwner.scope(), RetryScope::Node);
        assert_eq!(ErrorKind::InvalidTimestampBranch.scope(), RetryScope::Node);
        assert_eq!(ErrorKind::InvalidNodeAddress.scope(), RetryScope::Node);
        assert_eq!(ErrorKind::InconsistentTopology.scope(), RetryScope::Round);
        assert_eq!(ErrorKind::NodeTimeout.scope(), RetryScope::Round);
        assert_eq!(ErrorKind::FeederFailure.scope(), RetryScope::Round);
        assert_eq!(ErrorKind::StreamEnded.scope(), RetryScope::Round);
        assert_eq!(ErrorKind::RequestMalformed.scope(), RetryScope::Fatal);
        assert_eq!(ErrorKind::InconsistentFeed.scope(), RetryScope::Fatal);
    }

    #[test]
    fn test_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&ErrorKind::InvalidTimestampBranch).unwrap();
        assert_eq!(json, "\"invalid-timestamp-branch\"");
        assert_eq!(ErrorKind::InvalidTimestampBranch.to_string(), "invalid-timestamp-branch");
    }

    #[test]
    fn test_topology_error_kind() {
        let inconsistent = TopologyError::InconsistentPartitionMap {
            bucket: "default".to_string(),
            partition: 7,
        };
        assert_eq!(inconsistent.kind(), ErrorKind::InconsistentTopology);
        assert_eq!(
            TopologyError::UnknownBucket("b".to_string()).kind(),
            ErrorKind::RequestMalformed
        );
    }

    #[test]
    fn test_stream_admin_error_kind() {
        let err = StreamAdminError::Producer {
            node: "n1".to_string(),
            kind: ErrorKind::InconsistentFeed,
            source: ProducerError::InconsistentFeed,
        };
        assert_eq!(err.kind(), ErrorKind::InconsistentFeed);
        assert!(err.to_string().contains("n1"));

        let timeout = StreamAdminError::NodeTimeout {
            node: "n2".to_string(),
            elapsed_ms: 100,
            last_error: "transport error: refused".to_string(),
        };
        assert_eq!(timeout.kind(), ErrorKind::NodeTimeout);

        let from_topology: StreamAdminError = TopologyError::Malformed("x".to_string()).into();
        assert_eq!(from_topology.kind(), ErrorKind::RequestMalformed);
    }
}
