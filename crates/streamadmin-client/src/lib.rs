//! Producer Clients
//!
//! The orchestrator reaches every producer node through the
//! [`ProducerClient`] trait and obtains clients from a
//! [`ProducerClientFactory`] keyed by data-node address. The default
//! implementation speaks JSON-RPC over HTTP to the producer's admin port.

pub mod address;
pub mod client;
pub mod http;

pub use address::{producer_address, KV_DCP_PORT, KV_DCP_PORT_CLUSTER_RUN, LOCALHOST, PROJECTOR_PORT};
pub use client::{ProducerClient, ProducerClientFactory, RequestFailure};
pub use http::{HttpClientConfig, HttpClientFactory, HttpProducerClient};
