//! # streamadmin-orchestrator
//!
//! Control plane for mutation streams between producer nodes and index
//! consumers. [`StreamAdmin`] fans each operation out to the producers that
//! own the relevant partitions, reconciles their answers and retries what
//! failed recoverably.
//!
//! Collaborators are traits: producers are reached through
//! [`streamadmin_client::ProducerClientFactory`], partition ownership comes
//! from a [`TopologyResolver`] and validated streams are handed to a
//! [`StreamWatchdog`].

pub mod admin;
pub mod config;
pub mod timestamp;
pub mod topology;
pub mod watchdog;
pub mod worker;

pub use admin::StreamAdmin;
pub use config::{ConfigError, RoundRetryConfig, StreamAdminConfig, WorkerConfig};
pub use topology::{BucketServerMap, ClusterMap, ClusterMapTopology, TopologyResolver};
pub use watchdog::{ActiveStream, ActiveStreamRegistry, StreamWatchdog};
pub use worker::AdminOp;
