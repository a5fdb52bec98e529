//! Integration tests for the RPC proxy server

use alloy_primitives::{address, U256};
use reqwest::Client;
use serde_json::{json, Value};
use simtrace_rpc_proxy::proxy::{ProxyServer, ProxyServerBuilder};
use simtrace_sim::{AccountOverride, OverrideSet};
use std::{io::Write, net::SocketAddr, time::Duration};
use tokio::time::sleep;
use wiremock::{
    matchers::{body_partial_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn test_overrides() -> OverrideSet {
    let mut overrides = OverrideSet::new();
    overrides.insert(
        address!("00000000000000000000000000000000000000aa"),
        AccountOverride::default().with_balance(U256::from(1000u64)).with_nonce(2),
    );
    overrides
}

/// Helper to create a test proxy server
async fn create_test_proxy(upstream_url: String) -> ProxyServer {
    ProxyServerBuilder::new()
        .upstream(upstream_url)
        .overrides(test_overrides())
        .request_timeout(5)
        .build()
        .await
        .unwrap()
}

/// Start proxy server on a random port and return the address
async fn start_proxy_server(proxy: ProxyServer) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let actual_addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        proxy.serve_on(listener).await.unwrap();
    });

    // Give the server a moment to start
    sleep(Duration::from_millis(100)).await;
    actual_addr
}

async fn mock_upstream() -> MockServer {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": "0x00000000000000000000000000000000000000000000000000000000000003e8"
        })))
        .mount(&mock_server)
        .await;
    mock_server
}

#[tokio::test]
async fn test_proxy_health_endpoints() {
    simtrace_common::logging::ensure_test_logging(None);
    let proxy = create_test_proxy("http://example.com".to_string()).await;
    let proxy_addr = start_proxy_server(proxy).await;

    let client = Client::new();
    let proxy_url = format!("http://{proxy_addr}");

    let response = client
        .post(&proxy_url)
        .json(&json!({ "jsonrpc": "2.0", "method": "simtrace_ping", "id": 7 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["id"], 7);
    assert_eq!(body["result"]["status"], "ok");

    let response = client
        .post(&proxy_url)
        .json(&json!({ "jsonrpc": "2.0", "method": "simtrace_info", "id": 2 }))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"]["service"], "simtrace-rpc-proxy");
    assert_eq!(body["result"]["overridden_accounts"], 1);
}

#[tokio::test]
async fn test_overrides_endpoint() {
    let proxy = create_test_proxy("http://example.com".to_string()).await;
    let proxy_addr = start_proxy_server(proxy).await;

    let body: Value = Client::new()
        .post(format!("http://{proxy_addr}"))
        .json(&json!({ "jsonrpc": "2.0", "method": "simtrace_overrides", "id": 1 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["result"]["addresses"], json!(["0x00000000000000000000000000000000000000aa"]));
    assert_eq!(
        body["result"]["fragment"]["0x00000000000000000000000000000000000000aa"]["balance"],
        "0x3e8"
    );
}

#[tokio::test]
async fn test_eth_call_is_rewritten() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "eth_call",
            "params": [
                { "to": "0x00000000000000000000000000000000000000bb" },
                "latest",
                { "0x00000000000000000000000000000000000000aa": { "balance": "0x3e8", "nonce": "0x2" } }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": "0x01"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let proxy = create_test_proxy(mock_server.uri()).await;
    let proxy_addr = start_proxy_server(proxy).await;

    let response = Client::new()
        .post(format!("http://{proxy_addr}"))
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [{ "to": "0x00000000000000000000000000000000000000bb" }, "latest"]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"], "0x01");
}

#[tokio::test]
async fn test_other_methods_pass_through_verbatim() {
    let mock_server = mock_upstream().await;
    let proxy = create_test_proxy(mock_server.uri()).await;
    let proxy_addr = start_proxy_server(proxy).await;

    let raw = r#"{ "jsonrpc":"2.0", "id":9, "method":"eth_getBalance", "params":["0xaa", "latest"] }"#;
    let response = Client::new()
        .post(format!("http://{proxy_addr}"))
        .header("content-type", "application/json")
        .body(raw)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let received = mock_server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].body, raw.as_bytes());
}

#[tokio::test]
async fn test_garbage_is_forwarded() {
    let mock_server = mock_upstream().await;
    let proxy = create_test_proxy(mock_server.uri()).await;
    let proxy_addr = start_proxy_server(proxy).await;

    Client::new().post(format!("http://{proxy_addr}")).body("not json").send().await.unwrap();

    let received = mock_server.received_requests().await.unwrap();
    assert_eq!(received[0].body, b"not json");
}

#[tokio::test]
async fn test_upstream_status_is_relayed() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&mock_server)
        .await;

    let proxy = create_test_proxy(mock_server.uri()).await;
    let proxy_addr = start_proxy_server(proxy).await;

    let response = Client::new()
        .post(format!("http://{proxy_addr}"))
        .json(&json!({ "jsonrpc": "2.0", "id": 1, "method": "eth_blockNumber" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 429);
    assert_eq!(response.text().await.unwrap(), "rate limited");
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    let proxy = create_test_proxy("http://127.0.0.1:9".to_string()).await;
    let proxy_addr = start_proxy_server(proxy).await;

    let response = Client::new()
        .post(format!("http://{proxy_addr}"))
        .json(&json!({ "jsonrpc": "2.0", "id": 5, "method": "eth_blockNumber" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["id"], 5);
    assert!(body["error"]["message"].as_str().unwrap().contains("Upstream"));
}

#[tokio::test]
async fn test_shutdown_stops_server() {
    let proxy = create_test_proxy("http://example.com".to_string()).await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy_addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(proxy.serve_on(listener));
    sleep(Duration::from_millis(100)).await;

    let body: Value = Client::new()
        .post(format!("http://{proxy_addr}"))
        .json(&json!({ "jsonrpc": "2.0", "method": "simtrace_shutdown", "id": 1 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["result"]["status"], "shutting_down");

    let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
    assert!(result.is_ok(), "server did not stop after shutdown request");
}

#[tokio::test]
async fn test_builder_requires_upstream() {
    assert!(ProxyServerBuilder::new().build().await.is_err());
    assert!(ProxyServerBuilder::new().upstream("not a url").build().await.is_err());
}

#[tokio::test]
async fn test_overrides_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"0x00000000000000000000000000000000000000cc": {{"code": "0x00"}}}}"#).unwrap();

    let overrides = OverrideSet::from_json_file(file.path()).unwrap();
    let proxy = ProxyServerBuilder::new()
        .upstream("http://example.com")
        .overrides(overrides)
        .build()
        .await
        .unwrap();

    assert_eq!(proxy.rpc_handler.overrides().len(), 1);
    assert!(proxy.rpc_handler.interceptor().fragment().contains("\"code\":\"0x00\""));
}
