//! HTTP Transport Utilities
//!
//! Conversion between HTTP bodies and JSON-RPC messages for the producer
//! admin port.
//!
//! # Example
//!
//! ```
//! use streamadmin_common::transport::http::HttpTransport;
//! use streamadmin_common::protocol::{methods, JsonRpcResponse};
//! use serde_json::json;
//!
//! let request = HttpTransport::build_request(methods::DEL_INSTANCES, json!({"topic": "t"}), json!(1));
//! assert_eq!(request.method, "delInstances");
//!
//! let response = JsonRpcResponse::success(json!(1), json!({}));
//! let http_response = HttpTransport::to_http_response(response);
//! assert_eq!(http_response.status(), hyper::StatusCode::OK);
//! ```

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Request, Response, StatusCode};

use crate::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, ProducerError, TopicResponse};

/// Path every producer serves its admin API on.
pub const ADMIN_PATH: &str = "/adminport/";

/// Type alias for Hyper incoming requests
pub type HyperRequest = Request<Incoming>;

/// Type alias for Hyper responses with full body
pub type HyperResponse = Response<Full<Bytes>>;

/// HTTP transport utility functions
pub struct HttpTransport;

impl HttpTransport {
    /// Parse a JSON-RPC request from an HTTP body
    ///
    /// Malformed bodies yield a parse error ready to send back.
    ///
    /// ```
    /// use streamadmin_common::transport::http::HttpTransport;
    /// use hyper::body::Bytes;
    ///
    /// let body = Bytes::from(r#"{"jsonrpc":"2.0","method":"restartVbuckets","params":{},"id":1}"#);
    /// let request = HttpTransport::parse_jsonrpc(body).unwrap();
    /// assert_eq!(request.method, "restartVbuckets");
    /// ```
    pub fn parse_jsonrpc(body: Bytes) -> Result<JsonRpcRequest, JsonRpcError> {
        serde_json::from_slice(&body).map_err(|_| JsonRpcError::parse_error())
    }

    /// Parse a JSON-RPC response from an HTTP body
    pub fn parse_response(body: &[u8]) -> Result<JsonRpcResponse, ProducerError> {
        serde_json::from_slice(body)
            .map_err(|e| ProducerError::Transport(format!("invalid JSON-RPC response: {}", e)))
    }

    /// Create an HTTP response from a JSON-RPC response
    pub fn to_http_response(jsonrpc: JsonRpcResponse) -> HyperResponse {
        Self::to_http_response_with_status(jsonrpc, StatusCode::OK)
    }

    /// Create an HTTP error response from a JSON-RPC error
    pub fn to_http_error(id: serde_json::Value, error: JsonRpcError) -> HyperResponse {
        Self::to_http_response(JsonRpcResponse::error(id, error))
    }

    /// Create an HTTP response carrying a producer failure and its partial result
    pub fn to_producer_error(
        id: serde_json::Value,
        error: &ProducerError,
        response: Option<&TopicResponse>,
    ) -> HyperResponse {
        Self::to_http_error(id, JsonRpcError::producer(error, response))
    }

    /// Build a JSON-RPC request
    pub fn build_request(
        method: &str,
        params: serde_json::Value,
        id: serde_json::Value,
    ) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
            id,
        }
    }

    /// Create an HTTP response with a custom status code
    pub fn to_http_response_with_status(jsonrpc: JsonRpcResponse, status: StatusCode) -> HyperResponse {
        let body = serde_json::to_vec(&jsonrpc).unwrap_or_default();

        let mut response = Response::new(Full::new(Bytes::from(body)));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}
