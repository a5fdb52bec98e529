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

use alloy_primitives::Bytes;
use alloy_rpc_client::{ClientBuilder, RpcClient};
use alloy_rpc_types::{BlockId, TransactionRequest};
use alloy_transport::TransportResult;
use reqwest::Url;
use tracing::debug;

use crate::{
    interceptor::{InterceptorError, OverrideInterceptor, ETH_CALL},
    overrides::OverrideSet,
    transport::OverrideTransport,
};

/// `eth_call` client whose every call runs against the same overridden state.
#[derive(Debug, Clone)]
pub struct CallClient {
    client: RpcClient,
    interceptor: Arc<OverrideInterceptor>,
}

impl CallClient {
    /// Connect to `url`, overriding the accounts in `overrides`.
    ///
    /// Fails only if the override set cannot be serialized.
    pub fn new(url: Url, overrides: &OverrideSet) -> Result<Self, InterceptorError> {
        Self::with_client(reqwest::Client::new(), url, overrides)
    }

    /// Like [`new`](Self::new), with a caller-configured `reqwest` client
    /// (timeouts, proxies, TLS).
    pub fn with_client(
        http: reqwest::Client,
        url: Url,
        overrides: &OverrideSet,
    ) -> Result<Self, InterceptorError> {
        let interceptor = Arc::new(OverrideInterceptor::new(overrides)?);
        let transport = OverrideTransport::with_client(http, url, interceptor);
        Ok(Self::from_transport(transport))
    }

    /// Build on an already configured transport.
    pub fn from_transport(transport: OverrideTransport) -> Self {
        let interceptor = transport.interceptor().clone();
        let is_local = transport.guess_local();
        let client = ClientBuilder::default().transport(transport, is_local);
        Self { client, interceptor }
    }

    /// Execute `call` at `block` against the overridden state and return the
    /// raw return data.
    pub async fn call(&self, call: &TransactionRequest, block: BlockId) -> TransportResult<Bytes> {
        debug!(to = ?call.to, ?block, accounts = self.interceptor.accounts(), "Simulating call");
        self.client.request(ETH_CALL, (call.clone(), block)).await
    }

    /// Underlying alloy client, for requests other than `eth_call`.
    pub fn rpc_client(&self) -> &RpcClient {
        &self.client
    }

    /// Interceptor shared with the transport.
    pub fn interceptor(&self) -> &OverrideInterceptor {
        &self.interceptor
    }
}
