//! Forwarding of JSON-RPC traffic to the upstream node

use bytes::Bytes;
use eyre::{Result, WrapErr};
use reqwest::{
    header::{CONTENT_LENGTH, CONTENT_TYPE},
    StatusCode, Url,
};
use simtrace_sim::{OverrideInterceptor, OverrideSet};
use std::time::{Duration, Instant};
use tracing::debug;

/// Raw upstream answer, relayed to the client as is.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    /// HTTP status returned by the node
    pub status: StatusCode,
    /// Response body, untouched
    pub body: Bytes,
}

/// Forwards request bodies to a single upstream node, appending the
/// configured state overrides to every `eth_call` on the way.
///
/// No retries: an upstream failure is reported to the caller immediately.
pub struct RpcHandler {
    upstream_client: reqwest::Client,
    upstream_url: Url,
    interceptor: OverrideInterceptor,
    overrides: OverrideSet,
}

impl RpcHandler {
    /// Creates a handler for `upstream_url`
    ///
    /// # Arguments
    /// * `upstream_url` - JSON-RPC endpoint of the node
    /// * `overrides` - Account overrides applied to every `eth_call`
    /// * `request_timeout` - Deadline for a single upstream round-trip
    pub fn new(upstream_url: Url, overrides: OverrideSet, request_timeout: Duration) -> Result<Self> {
        let upstream_client = reqwest::Client::builder().timeout(request_timeout).build()?;
        let interceptor =
            OverrideInterceptor::new(&overrides).wrap_err("Failed to prepare state overrides")?;

        Ok(Self { upstream_client, upstream_url, interceptor, overrides })
    }

    /// Node every request is forwarded to
    pub fn upstream_url(&self) -> &Url {
        &self.upstream_url
    }

    /// Accounts being overridden
    pub fn overrides(&self) -> &OverrideSet {
        &self.overrides
    }

    /// Interceptor applied to outgoing bodies
    pub fn interceptor(&self) -> &OverrideInterceptor {
        &self.interceptor
    }

    /// Sends `body` upstream, rewritten if it is an `eth_call`.
    ///
    /// Any HTTP status from the node counts as a reply; only transport
    /// failures (connect, timeout, broken body) are errors.
    pub async fn handle_request(&self, body: &Bytes) -> Result<UpstreamReply> {
        let outgoing = self.interceptor.intercept(body);
        let rewritten = outgoing.len() != body.len();
        let start = Instant::now();

        let response = self
            .upstream_client
            .post(self.upstream_url.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_LENGTH, outgoing.len())
            .body(outgoing)
            .send()
            .await
            .wrap_err_with(|| format!("Upstream {} unreachable", self.upstream_url))?;

        let status = response.status();
        let body = response.bytes().await.wrap_err("Failed to read upstream response")?;

        debug!(
            %status,
            rewritten,
            bytes = body.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Upstream replied"
        );

        Ok(UpstreamReply { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, U256};
    use serde_json::{json, Value};
    use simtrace_sim::AccountOverride;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    async fn create_test_rpc_handler() -> (RpcHandler, MockServer) {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": "0x1"
            })))
            .mount(&mock_server)
            .await;

        let mut overrides = OverrideSet::new();
        overrides.insert(
            address!("00000000000000000000000000000000000000aa"),
            AccountOverride::default().with_balance(U256::from(1)),
        );

        let handler =
            RpcHandler::new(mock_server.uri().parse().unwrap(), overrides, Duration::from_secs(5))
                .unwrap();

        (handler, mock_server)
    }

    #[tokio::test]
    async fn test_eth_call_forwarded_with_overrides() {
        let (handler, mock_server) = create_test_rpc_handler().await;

        let body = Bytes::from(
            json!({"jsonrpc": "2.0", "id": 1, "method": "eth_call", "params": [{}, "latest"]})
                .to_string(),
        );
        let reply = handler.handle_request(&body).await.unwrap();
        assert_eq!(reply.status, StatusCode::OK);

        let received = mock_server.received_requests().await.unwrap();
        let sent: Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(
            sent["params"][2],
            json!({ "0x00000000000000000000000000000000000000aa": { "balance": "0x1" } })
        );
    }

    #[tokio::test]
    async fn test_other_methods_forwarded_verbatim() {
        let (handler, mock_server) = create_test_rpc_handler().await;

        let body = Bytes::from_static(br#"{"jsonrpc":"2.0","id":3,"method":"eth_chainId"}"#);
        handler.handle_request(&body).await.unwrap();

        let received = mock_server.received_requests().await.unwrap();
        assert_eq!(received[0].body, body.to_vec());
    }

    #[tokio::test]
    async fn test_upstream_status_is_relayed() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&mock_server)
            .await;

        let handler = RpcHandler::new(
            mock_server.uri().parse().unwrap(),
            OverrideSet::new(),
            Duration::from_secs(5),
        )
        .unwrap();

        let reply = handler.handle_request(&Bytes::from_static(b"{}")).await.unwrap();
        assert_eq!(reply.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(reply.body, Bytes::from_static(b"slow down"));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_error() {
        let handler = RpcHandler::new(
            "http://127.0.0.1:9".parse().unwrap(),
            OverrideSet::new(),
            Duration::from_secs(2),
        )
        .unwrap();

        assert!(handler.handle_request(&Bytes::from_static(b"{}")).await.is_err());
    }
}
