// SimTrace - EVM call simulation and trace decoding
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use std::sync::Arc;

use alloy_rpc_client::RpcClient;
use alloy_rpc_types::{BlockId, TransactionRequest};
use reqwest::Url;
use simtrace_common::{TraceCallResponse, TraceConfig};
use tracing::debug;

use crate::{
    catalog::EventCatalog,
    error::TraceError,
    reconstruct::{ExtractionMode, TraceReport},
};

const DEBUG_TRACE_CALL: &str = "debug_traceCall";

/// Traces calls on a node and decodes the events they emit.
#[derive(Debug, Clone)]
pub struct TraceClient {
    client: RpcClient,
    catalog: Arc<EventCatalog>,
    mode: ExtractionMode,
    config: TraceConfig,
}

impl TraceClient {
    /// Wrap an existing RPC client. Starts with the ERC-20 catalog, lenient
    /// extraction and the default trace config.
    pub fn new(client: RpcClient) -> Self {
        Self {
            client,
            catalog: Arc::new(EventCatalog::erc20()),
            mode: ExtractionMode::default(),
            config: TraceConfig::default(),
        }
    }

    /// Connect to a node over HTTP.
    pub fn http(url: Url) -> Self {
        Self::new(RpcClient::new_http(url))
    }

    /// Decode against `catalog` instead of the ERC-20 preset.
    pub fn with_catalog(mut self, catalog: impl Into<Arc<EventCatalog>>) -> Self {
        self.catalog = catalog.into();
        self
    }

    /// How malformed log steps are handled.
    pub fn with_mode(mut self, mode: ExtractionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Tracer options sent with every `debug_traceCall`.
    pub fn with_config(mut self, config: TraceConfig) -> Self {
        self.config = config;
        self
    }

    /// The catalog logs are matched against.
    pub fn catalog(&self) -> &EventCatalog {
        &self.catalog
    }

    /// Fetch the raw struct-log trace of `call` at `block`.
    pub async fn debug_trace_call(
        &self,
        call: &TransactionRequest,
        block: BlockId,
    ) -> Result<TraceCallResponse, TraceError> {
        debug!(to = ?call.to, ?block, config = ?self.config, "Requesting trace");
        let response: TraceCallResponse =
            self.client.request(DEBUG_TRACE_CALL, (call.clone(), block, self.config)).await?;
        debug!(steps = response.struct_logs.len(), failed = response.failed, "Received trace");
        Ok(response)
    }

    /// Trace `call` at `block` and reconstruct the events it emitted.
    ///
    /// Fails up front if the configured tracer would not capture the stack
    /// and memory needed to rebuild logs.
    pub async fn trace_call(
        &self,
        call: &TransactionRequest,
        block: BlockId,
    ) -> Result<TraceReport, TraceError> {
        if !self.config.captures_logs() {
            return Err(TraceError::BlindConfig);
        }

        let response = self.debug_trace_call(call, block).await?;
        let report = TraceReport::from_response(&response, &self.catalog, self.mode)?;
        debug!(
            gas = report.gas,
            failed = report.failed,
            logs = report.logs.len(),
            decoded = report.events().count(),
            skipped = report.skipped.len(),
            "Traced call"
        );
        Ok(report)
    }
}
