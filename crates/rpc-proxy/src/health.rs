//! Health check service for proxy status

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

/// Name reported by the status methods.
pub const SERVICE_NAME: &str = "simtrace-rpc-proxy";

/// Health check service for monitoring proxy status
///
/// Answers the `simtrace_ping` and `simtrace_info` methods locally, without
/// contacting the upstream node.
pub struct HealthService {
    started_at: DateTime<Utc>,
}

impl Default for HealthService {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthService {
    /// Creates a new health service, recording the current time as the
    /// start time for uptime calculations.
    pub fn new() -> Self {
        Self { started_at: Utc::now() }
    }

    /// Returns a simple ping response with current status
    pub fn ping(&self, id: &Value) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "status": "ok",
                "service": SERVICE_NAME,
                "timestamp": Utc::now().timestamp()
            }
        })
    }

    /// Returns detailed information about the proxy service
    ///
    /// # Arguments
    /// * `id` - Request id to echo back
    /// * `upstream` - Node the proxy forwards to
    /// * `accounts` - Number of overridden accounts
    pub fn info(&self, id: &Value, upstream: &str, accounts: usize) -> Value {
        let uptime = (Utc::now() - self.started_at).num_seconds().max(0);

        json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "service": SERVICE_NAME,
                "version": env!("CARGO_PKG_VERSION"),
                "upstream": upstream,
                "overridden_accounts": accounts,
                "uptime": uptime,
                "started_at": self.started_at.to_rfc3339(),
                "pid": std::process::id()
            }
        })
    }
}
