//! JSON-RPC over HTTP producer client.
//!
//! Each call is one `POST http://{producer}/adminport/` carrying a JSON-RPC
//! 2.0 request. Producer errors come back as typed error codes; anything the
//! client cannot interpret (connection refused, garbage body, missing result)
//! becomes [`ProducerError::Transport`].

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::Request;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use streamadmin_common::protocol::{
    generate_request_id, methods, DelInstancesRequest, InitialTimestampRequest, Instance,
    InstanceId, PartitionTimestamp, ProducerError, RepairEndpointsRequest, RestartVbucketsRequest,
    TopicRequest, TopicResponse,
};
use streamadmin_common::transport::{HttpTransport, ADMIN_PATH};
use tracing::debug;

use crate::address::{producer_address, KV_DCP_PORT, KV_DCP_PORT_CLUSTER_RUN, PROJECTOR_PORT};
use crate::client::{ProducerClient, ProducerClientFactory, RequestFailure};

/// Settings for [`HttpClientFactory`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    /// Port producers listen on for admin requests
    ///
    /// Default: 9999
    pub projector_port: u16,
    /// Data port of a production node
    ///
    /// Default: 11210
    pub kv_dcp_port: u16,
    /// First data port of a local development cluster
    ///
    /// Default: 12000
    pub kv_dcp_port_cluster_run: u16,
    /// Upper bound on a single admin call, in milliseconds
    ///
    /// Default: 30000
    pub request_timeout_ms: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            projector_port: PROJECTOR_PORT,
            kv_dcp_port: KV_DCP_PORT,
            kv_dcp_port_cluster_run: KV_DCP_PORT_CLUSTER_RUN,
            request_timeout_ms: 30_000,
        }
    }
}

impl HttpClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Producer client speaking JSON-RPC over HTTP.
pub struct HttpProducerClient {
    node: String,
    /// `None` when the node address could not be mapped to a producer.
    admin_url: Option<String>,
    client: Client<HttpConnector, Full<Bytes>>,
    request_timeout: Duration,
}

impl HttpProducerClient {
    /// Client for a producer at an explicit `host:port`, bypassing address mapping.
    pub fn with_producer_addr(producer_addr: &str, request_timeout: Duration) -> Self {
        Self {
            node: producer_addr.to_string(),
            admin_url: Some(format!("http://{}{}", producer_addr, ADMIN_PATH)),
            client: Client::builder(TokioExecutor::new()).build_http(),
            request_timeout,
        }
    }

    /// Client for the producer next to data node `node`.
    pub fn for_node(node: &str, config: &HttpClientConfig) -> Self {
        let admin_url = match producer_address(node, config) {
            Ok(addr) => {
                debug!(node, producer = %addr, "mapped node to producer");
                Some(format!("http://{}{}", addr, ADMIN_PATH))
            }
            Err(_) => {
                debug!(node, "node address cannot be mapped to a producer");
                None
            }
        };

        Self {
            node: node.to_string(),
            admin_url,
            client: Client::builder(TokioExecutor::new()).build_http(),
            request_timeout: config.request_timeout(),
        }
    }

    pub fn admin_url(&self) -> Option<&str> {
        self.admin_url.as_deref()
    }

    /// Sends one JSON-RPC call and returns its `result`.
    async fn call(&self, method: &str, params: Value) -> Result<Value, RequestFailure> {
        let url = self.admin_url.as_ref().ok_or(ProducerError::InvalidKvAddrs)?;

        let request = HttpTransport::build_request(method, params, json!(generate_request_id()));
        let body = serde_json::to_vec(&request)
            .map_err(|e| ProducerError::Transport(format!("Failed to encode request: {}", e)))?;

        let http_request = Request::builder()
            .method("POST")
            .uri(url)
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| ProducerError::Transport(format!("Failed to build request: {}", e)))?;

        let response = tokio::time::timeout(self.request_timeout, self.client.request(http_request))
            .await
            .map_err(|_| ProducerError::ResponseTimeout)?
            .map_err(|e| ProducerError::Transport(format!("HTTP request failed: {}", e)))?;

        let body_bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| ProducerError::Transport(format!("Failed to read response: {}", e)))?
            .to_bytes();

        let jsonrpc = HttpTransport::parse_response(&body_bytes)?;
        if let Some(error) = jsonrpc.error {
            let (error, response) = error.into_producer_failure();
            debug!(node = %self.node, method, %error, "producer returned error");
            return Err(RequestFailure::new(error, response));
        }

        jsonrpc
            .result
            .ok_or_else(|| ProducerError::Transport("Response missing result".to_string()).into())
    }

    async fn call_as<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RequestFailure> {
        let result = self.call(method, params).await?;
        serde_json::from_value(result).map_err(|e| {
            ProducerError::Transport(format!("Unexpected {} result: {}", method, e)).into()
        })
    }
}

fn to_params<T: serde::Serialize>(params: &T) -> Result<Value, ProducerError> {
    serde_json::to_value(params)
        .map_err(|e| ProducerError::Transport(format!("Failed to encode params: {}", e)))
}

#[async_trait]
impl ProducerClient for HttpProducerClient {
    fn address(&self) -> &str {
        &self.node
    }

    async fn request_topic(
        &self,
        topic: &str,
        endpoint_type: &str,
        timestamps: &[PartitionTimestamp],
        instances: &[Instance],
    ) -> Result<TopicResponse, RequestFailure> {
        let params = to_params(&TopicRequest {
            topic: topic.to_string(),
            endpoint_type: endpoint_type.to_string(),
            timestamps: timestamps.to_vec(),
            instances: instances.to_vec(),
        })?;
        self.call_as(methods::MUTATION_TOPIC_REQUEST, params).await
    }

    async fn delete_instances(
        &self,
        topic: &str,
        instance_ids: &[InstanceId],
    ) -> Result<(), ProducerError> {
        let params = to_params(&DelInstancesRequest {
            topic: topic.to_string(),
            instance_ids: instance_ids.to_vec(),
        })?;
        self.call(methods::DEL_INSTANCES, params)
            .await
            .map(|_| ())
            .map_err(|f| f.error)
    }

    async fn repair_endpoints(
        &self,
        topic: &str,
        endpoints: &[String],
    ) -> Result<(), ProducerError> {
        let params = to_params(&RepairEndpointsRequest {
            topic: topic.to_string(),
            endpoints: endpoints.to_vec(),
        })?;
        self.call(methods::REPAIR_ENDPOINTS, params)
            .await
            .map(|_| ())
            .map_err(|f| f.error)
    }

    async fn initial_position(
        &self,
        pool: &str,
        bucket: &str,
    ) -> Result<PartitionTimestamp, ProducerError> {
        let params = to_params(&InitialTimestampRequest {
            pool: pool.to_string(),
            bucket: bucket.to_string(),
        })?;
        let ts: PartitionTimestamp = self
            .call_as(methods::INITIAL_RESTART_TIMESTAMP, params)
            .await
            .map_err(|f| f.error)?;
        ts.validate()
            .map_err(|e| ProducerError::Transport(format!("Invalid initial position: {}", e)))?;
        Ok(ts)
    }

    async fn restart_partitions(
        &self,
        topic: &str,
        timestamps: &[PartitionTimestamp],
    ) -> Result<TopicResponse, RequestFailure> {
        let params = to_params(&RestartVbucketsRequest {
            topic: topic.to_string(),
            timestamps: timestamps.to_vec(),
        })?;
        self.call_as(methods::RESTART_VBUCKETS, params).await
    }
}

/// Default factory: maps each data node to its producer and builds an HTTP client.
#[derive(Debug, Clone, Default)]
pub struct HttpClientFactory {
    config: HttpClientConfig,
}

impl HttpClientFactory {
    pub fn new(config: HttpClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }
}

impl ProducerClientFactory for HttpClientFactory {
    fn client_for_node(&self, node: &str) -> Arc<dyn ProducerClient> {
        Arc::new(HttpProducerClient::for_node(node, &self.config))
    }
}
