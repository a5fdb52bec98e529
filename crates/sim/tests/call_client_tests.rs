//! CallClient against a mocked node.

use alloy_primitives::{address, bytes, Address, U256};
use alloy_rpc_types::{BlockId, TransactionRequest};
use serde_json::{json, Value};
use simtrace_sim::{AccountOverride, CallClient, OverrideSet};
use wiremock::{
    matchers::{method, path},
    Match, Mock, MockServer, Request, Respond, ResponseTemplate,
};

const TOKEN: Address = address!("00000000000000000000000000000000000000aa");

/// Matches `eth_call` requests whose last param equals the expected fragment.
struct CarriesOverrides(Value);

impl Match for CarriesOverrides {
    fn matches(&self, request: &Request) -> bool {
        let Ok(body) = serde_json::from_slice::<Value>(&request.body) else {
            return false;
        };
        body["method"] == "eth_call"
            && body["params"].as_array().and_then(|p| p.last()) == Some(&self.0)
    }
}

/// Answers with `result`, echoing the request id.
struct EchoResult(Value);

impl Respond for EchoResult {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or_default();
        ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": body["id"],
            "result": self.0,
        }))
    }
}

fn overrides() -> OverrideSet {
    let mut set = OverrideSet::new();
    set.insert(
        TOKEN,
        AccountOverride::default().with_balance(U256::from(5u64)).with_code(bytes!("60006000f3")),
    );
    set
}

fn balance_of_call() -> TransactionRequest {
    TransactionRequest::default()
        .to(TOKEN)
        .input(bytes!("70a08231000000000000000000000000000000000000000000000000000000000000dead").into())
}

#[tokio::test]
async fn test_call_sends_override_fragment() {
    simtrace_common::logging::ensure_test_logging(None);
    let server = MockServer::start().await;

    let expected = json!({
        "0x00000000000000000000000000000000000000aa": { "code": "0x60006000f3", "balance": "0x5" }
    });
    Mock::given(method("POST"))
        .and(path("/"))
        .and(CarriesOverrides(expected))
        .respond_with(EchoResult(json!(
            "0x00000000000000000000000000000000000000000000000000000000000003e8"
        )))
        .expect(1)
        .mount(&server)
        .await;

    let client = CallClient::new(server.uri().parse().unwrap(), &overrides()).unwrap();
    let output = client.call(&balance_of_call(), BlockId::latest()).await.unwrap();

    assert_eq!(U256::from_be_slice(&output), U256::from(1000u64));
    assert_eq!(client.interceptor().accounts(), 1);
}

#[tokio::test]
async fn test_call_params_order() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(EchoResult(json!("0x")))
        .mount(&server)
        .await;

    let client = CallClient::new(server.uri().parse().unwrap(), &overrides()).unwrap();
    let output = client.call(&balance_of_call(), BlockId::latest()).await.unwrap();
    assert!(output.is_empty());

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);

    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let params = sent["params"].as_array().unwrap();
    assert_eq!(params.len(), 3);
    assert_eq!(params[0]["to"], json!("0x00000000000000000000000000000000000000aa"));
    assert_eq!(params[1], json!("latest"));
    assert!(params[2].get("0x00000000000000000000000000000000000000aa").is_some());

    let declared: usize = requests[0].headers["content-length"].to_str().unwrap().parse().unwrap();
    assert_eq!(declared, requests[0].body.len());
}

#[tokio::test]
async fn test_http_error_propagates() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("node is syncing"))
        .mount(&server)
        .await;

    let client = CallClient::new(server.uri().parse().unwrap(), &overrides()).unwrap();
    let err = client.call(&balance_of_call(), BlockId::latest()).await.unwrap_err();

    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn test_rpc_error_propagates() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(|request: &Request| {
            let body: Value = serde_json::from_slice(&request.body).unwrap_or_default();
            ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": body["id"],
                "error": { "code": 3, "message": "execution reverted" }
            }))
        })
        .mount(&server)
        .await;

    let client = CallClient::new(server.uri().parse().unwrap(), &overrides()).unwrap();
    let err = client.call(&balance_of_call(), BlockId::latest()).await.unwrap_err();

    assert!(err.to_string().contains("execution reverted"));
}

#[tokio::test]
async fn test_unreachable_node_is_transport_error() {
    // Nothing listens on the discard port.
    let client = CallClient::new("http://127.0.0.1:9".parse().unwrap(), &OverrideSet::new()).unwrap();
    assert!(client.call(&balance_of_call(), BlockId::latest()).await.is_err());
}
