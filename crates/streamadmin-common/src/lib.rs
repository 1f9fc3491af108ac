//! Stream Admin Common Types and Transport
//!
//! Shared protocol definitions for the stream-admin workspace: the data model
//! exchanged with mutation producers, the closed error taxonomy the
//! orchestrator retries on, and the JSON-RPC over HTTP helpers used to talk to
//! a producer's admin port.
//!
//! # Components
//!
//! - [`protocol`] - Partition timestamps, stream ids, requests/responses and errors
//! - [`transport`] - HTTP/JSON-RPC conversion helpers
//!
//! # Example
//!
//! ```
//! use streamadmin_common::{PartitionEntry, PartitionTimestamp, StreamId};
//!
//! let mut ts = PartitionTimestamp::new("default", "beer-sample");
//! ts.append(PartitionEntry::new(0, 10, 0xcafe, 10, 10)).unwrap();
//!
//! assert_eq!(StreamId::Maintenance.topic(), "MAINT_STREAM_TOPIC");
//! assert_eq!(ts.len(), 1);
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
