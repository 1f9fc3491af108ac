//! Transport Layer
//!
//! Producers expose their admin API as JSON-RPC 2.0 over HTTP/1.1 at
//! [`ADMIN_PATH`]. This module only holds the conversion helpers; the client
//! that drives them lives in `streamadmin-client`.

pub mod http;

pub use http::{HttpTransport, HyperRequest, HyperResponse, ADMIN_PATH};
