//! Core proxy server implementation

use crate::{
    health::HealthService,
    rpc::{RpcHandler, UpstreamReply},
};
use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use eyre::{eyre, Result, WrapErr};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use simtrace_sim::OverrideSet;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::broadcast};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};

/// Builder for configuring ProxyServer with fluent API and sensible defaults
#[derive(Debug, Clone)]
pub struct ProxyServerBuilder {
    upstream: Option<String>,
    overrides: OverrideSet,
    request_timeout: u64,
}

impl Default for ProxyServerBuilder {
    fn default() -> Self {
        Self {
            upstream: None, // required
            overrides: OverrideSet::new(),
            request_timeout: 30,
        }
    }
}

impl ProxyServerBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the upstream node URL
    pub fn upstream(mut self, url: impl Into<String>) -> Self {
        self.upstream = Some(url.into());
        self
    }

    /// Set the account overrides appended to every `eth_call`
    pub fn overrides(mut self, overrides: OverrideSet) -> Self {
        self.overrides = overrides;
        self
    }

    /// Set the per-request upstream timeout in seconds
    pub fn request_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout = seconds;
        self
    }

    /// Build the ProxyServer with the configured settings
    pub async fn build(self) -> Result<ProxyServer> {
        let upstream = self.upstream.ok_or_else(|| eyre!("No upstream RPC URL configured"))?;
        let upstream_url: Url =
            upstream.parse().wrap_err_with(|| format!("Invalid upstream URL {upstream}"))?;

        ProxyServer::new(upstream_url, self.overrides, Duration::from_secs(self.request_timeout))
    }
}

/// Proxy server that relays JSON-RPC traffic to one node, simulating every
/// `eth_call` against the configured state overrides.
///
/// Use ProxyServerBuilder for easy configuration:
/// ```no_run
/// # use simtrace_rpc_proxy::proxy::ProxyServerBuilder;
/// # async fn example() -> eyre::Result<()> {
/// let proxy = ProxyServerBuilder::new()
///     .upstream("http://localhost:8545")
///     .request_timeout(10)
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ProxyServer {
    /// Upstream forwarder carrying the override interceptor
    pub rpc_handler: Arc<RpcHandler>,
    /// Health check service for monitoring
    pub health_service: Arc<HealthService>,
    /// Shutdown signal sender
    shutdown_tx: broadcast::Sender<()>,
}

#[derive(Clone)]
struct AppState {
    proxy: ProxyServer,
}

/// The parts of a request needed to route it. Anything that does not fit
/// (batches, garbage) goes upstream untouched.
#[derive(Deserialize)]
struct RequestHead {
    method: String,
    #[serde(default)]
    id: Value,
}

impl ProxyServer {
    fn new(upstream_url: Url, overrides: OverrideSet, request_timeout: Duration) -> Result<Self> {
        info!(
            upstream = %upstream_url,
            accounts = overrides.len(),
            "Starting SimTrace RPC Proxy"
        );
        for address in overrides.addresses() {
            info!("  - overriding {}", address);
        }

        let rpc_handler = Arc::new(RpcHandler::new(upstream_url, overrides, request_timeout)?);
        let health_service = Arc::new(HealthService::new());
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self { rpc_handler, health_service, shutdown_tx })
    }

    /// Starts the proxy server listening on the specified address
    ///
    /// Serves JSON-RPC on `POST /` until `simtrace_shutdown` is received.
    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_on(listener).await
    }

    /// Like [`serve`](Self::serve), on an already bound listener
    pub async fn serve_on(self, listener: TcpListener) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let addr = listener.local_addr()?;

        let app = Router::new()
            .route("/", post(handle_rpc))
            .layer(TraceLayer::new_for_http())
            .layer(
                CorsLayer::new()
                    .allow_methods([Method::POST, Method::GET])
                    .allow_headers(Any)
                    .allow_origin(Any),
            )
            .with_state(AppState { proxy: self });

        info!("SimTrace RPC Proxy listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Shutdown signal received, stopping server gracefully");
            })
            .await?;

        Ok(())
    }

    fn handle_local(&self, head: &RequestHead) -> Option<Value> {
        let handler = &self.rpc_handler;
        let response = match head.method.as_str() {
            "simtrace_ping" => self.health_service.ping(&head.id),
            "simtrace_info" => self.health_service.info(
                &head.id,
                handler.upstream_url().as_str(),
                handler.overrides().len(),
            ),
            "simtrace_overrides" => {
                let addresses: Vec<String> =
                    handler.overrides().addresses().map(|a| format!("0x{a:040x}")).collect();
                json!({
                    "jsonrpc": "2.0",
                    "id": head.id,
                    "result": {
                        "addresses": addresses,
                        "fragment": serde_json::from_str::<Value>(handler.interceptor().fragment())
                            .unwrap_or(Value::Null)
                    }
                })
            }
            "simtrace_shutdown" => {
                info!("Shutdown request received");
                // Send shutdown signal (non-blocking)
                let _ = self.shutdown_tx.send(());
                json!({
                    "jsonrpc": "2.0",
                    "id": head.id,
                    "result": {
                        "status": "shutting_down",
                        "message": "Server shutdown initiated"
                    }
                })
            }
            _ => return None,
        };
        Some(response)
    }
}

async fn handle_rpc(State(state): State<AppState>, body: Bytes) -> Response {
    debug!(bytes = body.len(), "Received RPC request");

    if let Ok(head) = serde_json::from_slice::<RequestHead>(&body) {
        if let Some(response) = state.proxy.handle_local(&head) {
            return Json(response).into_response();
        }
        debug!(method = %head.method, "Forwarding to upstream");
    }

    match state.proxy.rpc_handler.handle_request(&body).await {
        Ok(UpstreamReply { status, body }) => {
            (status, [(CONTENT_TYPE, "application/json")], body).into_response()
        }
        Err(e) => {
            warn!("Upstream request failed: {:#}", e);
            let id = serde_json::from_slice::<RequestHead>(&body).map(|h| h.id).unwrap_or_default();
            let error = json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32603, "message": format!("Upstream unavailable: {e}") }
            });
            (StatusCode::BAD_GATEWAY, Json(error)).into_response()
        }
    }
}
