//! HTTP Producer Client Integration Tests
//!
//! These tests run the client against an in-process JSON-RPC server that
//! plays the part of a producer's admin port, and verify:
//! - Requests are posted to `/adminport/` with the right method and params
//! - Typed producer errors and their partial responses survive the wire
//! - Transport-level failures (bad body, hung producer) are classified
//! - Concurrent calls on one client
//!
//! Test URLs use `127.0.0.1` with an ephemeral port.

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use streamadmin_client::{HttpProducerClient, ProducerClient};
use streamadmin_common::protocol::jsonrpc::METHOD_NOT_FOUND;
use streamadmin_common::protocol::{
    Instance, JsonRpcError, JsonRpcRequest, JsonRpcResponse, PartitionEntry, PartitionTimestamp,
    ProducerError, TopicResponse, DEFAULT_POOL_NAME,
};
use streamadmin_common::transport::HttpTransport;
use tokio::net::TcpListener;

type Handler = Arc<dyn Fn(&JsonRpcRequest) -> JsonRpcResponse + Send + Sync>;

/// Fake producer admin port running on a separate task
struct TestProducerServer {
    addr: String,
    requests: Arc<Mutex<Vec<(String, JsonRpcRequest)>>>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestProducerServer {
    /// Starts a new test server on a random port
    async fn new(handler: Handler) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();

        let recorded = requests.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        let Ok((stream, _)) = result else { continue };
                        let io = TokioIo::new(stream);
                        let handler = handler.clone();
                        let recorded = recorded.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req: Request<Incoming>| {
                                let handler = handler.clone();
                                let recorded = recorded.clone();
                                async move {
                                    let path = req.uri().path().to_string();
                                    let body = req.into_body().collect().await?.to_bytes();
                                    let response = match HttpTransport::parse_jsonrpc(body) {
                                        Ok(jsonrpc) => {
                                            let response = handler(&jsonrpc);
                                            recorded.lock().unwrap().push((path, jsonrpc));
                                            response
                                        }
                                        Err(error) => JsonRpcResponse::error(json!(null), error),
                                    };
                                    Ok::<_, hyper::Error>(HttpTransport::to_http_response(response))
                                }
                            });

                            let _ = http1::Builder::new().serve_connection(io, service).await;
                        });
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            requests,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    fn client(&self) -> HttpProducerClient {
        HttpProducerClient::with_producer_addr(&self.addr, Duration::from_secs(5))
    }

    fn requests(&self) -> Vec<(String, JsonRpcRequest)> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for TestProducerServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

fn timestamp(bucket: &str, entries: &[(u16, u64)]) -> PartitionTimestamp {
    PartitionTimestamp::from_entries(
        DEFAULT_POOL_NAME,
        bucket,
        entries
            .iter()
            .map(|&(p, seqno)| PartitionEntry::new(p, seqno, 0xab, seqno, seqno)),
    )
    .unwrap()
}

// ============================================================================
// Success Paths
// ============================================================================

#[tokio::test]
async fn test_request_topic_returns_active_timestamps() {
    let server = TestProducerServer::new(Arc::new(|req: &JsonRpcRequest| {
        let timestamps = req.params["timestamps"].clone();
        JsonRpcResponse::success(req.id.clone(), json!({ "activeTimestamps": timestamps }))
    }))
    .await;
    let client = server.client();

    let requested = vec![timestamp("default", &[(0, 10), (1, 20)])];
    let instances = vec![Instance::new(7, json!({"name": "idx_7"})).with_endpoint("127.0.0.1:9105")];
    let response = client
        .request_topic("MAINT_STREAM_TOPIC", "dataport", &requested, &instances)
        .await
        .unwrap();

    assert_eq!(response.active_timestamps, requested);
    assert!(response.rollback_timestamps.is_empty());

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let (path, jsonrpc) = &requests[0];
    assert_eq!(path, "/adminport/");
    assert_eq!(jsonrpc.method, "mutationTopicRequest");
    assert_eq!(jsonrpc.params["topic"], json!("MAINT_STREAM_TOPIC"));
    assert_eq!(jsonrpc.params["endpointType"], json!("dataport"));
    assert_eq!(jsonrpc.params["instances"][0]["id"], json!(7));
}

#[tokio::test]
async fn test_initial_position() {
    let server = TestProducerServer::new(Arc::new(|req: &JsonRpcRequest| {
        assert_eq!(req.params["pool"], json!("default"));
        let bucket = req.params["bucket"].as_str().unwrap().to_string();
        let ts = timestamp(&bucket, &[(0, 5), (1, 6)]);
        JsonRpcResponse::success(req.id.clone(), serde_json::to_value(ts).unwrap())
    }))
    .await;

    let ts = server
        .client()
        .initial_position(DEFAULT_POOL_NAME, "beer-sample")
        .await
        .unwrap();
    assert_eq!(ts.bucket, "beer-sample");
    assert_eq!(ts.get(1).unwrap().seqno, 6);
    assert_eq!(server.requests()[0].1.method, "initialRestartTimestamp");
}

#[tokio::test]
async fn test_delete_and_repair_success() {
    let server = TestProducerServer::new(Arc::new(|req: &JsonRpcRequest| {
        JsonRpcResponse::success(req.id.clone(), json!({}))
    }))
    .await;
    let client = server.client();

    client.delete_instances("INIT_STREAM_TOPIC", &[1, 2, 3]).await.unwrap();
    client
        .repair_endpoints("INIT_STREAM_TOPIC", &["127.0.0.1:9106".to_string()])
        .await
        .unwrap();

    let requests = server.requests();
    assert_eq!(requests[0].1.method, "delInstances");
    assert_eq!(requests[0].1.params["instanceIds"], json!([1, 2, 3]));
    assert_eq!(requests[1].1.method, "repairEndpoints");
    assert_eq!(requests[1].1.params["endpoints"], json!(["127.0.0.1:9106"]));
}

// ============================================================================
// Producer Error Tests
// ============================================================================

#[tokio::test]
async fn test_rollback_travels_with_error() {
    let server = TestProducerServer::new(Arc::new(|req: &JsonRpcRequest| {
        let partial = TopicResponse::active(vec![timestamp("default", &[(1, 20)])])
            .with_rollback(vec![timestamp("default", &[(7, 100)])]);
        JsonRpcResponse::error(
            req.id.clone(),
            JsonRpcError::producer(&ProducerError::InvalidPartitionBranch, Some(&partial)),
        )
    }))
    .await;

    let failure = server
        .client()
        .restart_partitions("MAINT_STREAM_TOPIC", &[timestamp("default", &[(1, 20), (7, 150)])])
        .await
        .unwrap_err();

    assert_eq!(failure.error, ProducerError::InvalidPartitionBranch);
    assert_eq!(failure.response.active_timestamps[0].get(1).unwrap().seqno, 20);
    assert_eq!(failure.response.rollback_timestamps[0].get(7).unwrap().seqno, 100);
}

#[tokio::test]
async fn test_topic_missing_on_delete() {
    let server = TestProducerServer::new(Arc::new(|req: &JsonRpcRequest| {
        JsonRpcResponse::error(req.id.clone(), JsonRpcError::producer(&ProducerError::TopicMissing, None))
    }))
    .await;

    let err = server.client().delete_instances("t", &[1]).await.unwrap_err();
    assert_eq!(err, ProducerError::TopicMissing);
}

#[tokio::test]
async fn test_unknown_error_code_is_transport() {
    let server = TestProducerServer::new(Arc::new(|req: &JsonRpcRequest| {
        JsonRpcResponse::error(req.id.clone(), JsonRpcError::method_not_found())
    }))
    .await;

    let failure = server
        .client()
        .request_topic("t", "dataport", &[], &[])
        .await
        .unwrap_err();
    match failure.error {
        ProducerError::Transport(msg) => assert!(msg.contains(&METHOD_NOT_FOUND.to_string())),
        other => panic!("unexpected {:?}", other),
    }
}

// ============================================================================
// Transport Failure Tests
// ============================================================================

#[tokio::test]
async fn test_garbage_body_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        loop {
            if let Ok((stream, _)) = listener.accept().await {
                let io = TokioIo::new(stream);
                tokio::spawn(async move {
                    let service = service_fn(|_req: Request<Incoming>| async move {
                        Ok::<_, hyper::Error>(
                            Response::builder()
                                .status(StatusCode::OK)
                                .body(Full::new(Bytes::from_static(b"not json")))
                                .unwrap(),
                        )
                    });
                    let _ = http1::Builder::new().serve_connection(io, service).await;
                });
            }
        }
    });

    let client = HttpProducerClient::with_producer_addr(&addr, Duration::from_secs(5));
    match client.delete_instances("t", &[1]).await {
        Err(ProducerError::Transport(msg)) => assert!(msg.contains("invalid JSON-RPC response")),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_hung_producer_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    // accept and hold connections without ever answering
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let client = HttpProducerClient::with_producer_addr(&addr, Duration::from_millis(200));
    let err = client.initial_position(DEFAULT_POOL_NAME, "default").await.unwrap_err();
    assert_eq!(err, ProducerError::ResponseTimeout);
}

// ============================================================================
// Concurrency Tests
// ============================================================================

#[tokio::test]
async fn test_concurrent_calls() {
    let server = TestProducerServer::new(Arc::new(|req: &JsonRpcRequest| {
        JsonRpcResponse::success(req.id.clone(), json!({}))
    }))
    .await;
    let client = Arc::new(server.client());

    let mut handles = Vec::new();
    for i in 0..10u64 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client.delete_instances("t", &[i]).await
        }));
    }

    for result in join_handles(handles).await {
        assert!(result.is_ok());
    }
    assert_eq!(server.requests().len(), 10);
}

async fn join_handles(
    handles: Vec<tokio::task::JoinHandle<Result<(), ProducerError>>>,
) -> Vec<Result<(), ProducerError>> {
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}
