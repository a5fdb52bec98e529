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

//! HTTP transport that rewrites requests before they hit the wire.
//!
//! Mirrors alloy's reqwest transport, except that the request packet is
//! serialized by hand so the [`OverrideInterceptor`] can see and replace the
//! exact bytes that are sent.

use std::{
    sync::Arc,
    task::{Context, Poll},
};

use alloy_json_rpc::{RequestPacket, ResponsePacket};
use alloy_transport::{utils::guess_local_url, TransportError, TransportErrorKind, TransportFut};
use bytes::Bytes;
use reqwest::{
    header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE},
    Client, Url,
};
use tower::Service;
use tracing::{debug, debug_span, trace, Instrument};

use crate::interceptor::OverrideInterceptor;

/// Alloy transport over `reqwest` that passes every outgoing body through an
/// [`OverrideInterceptor`].
///
/// There are no retries and no timeouts here: configure deadlines on the
/// [`reqwest::Client`] given to [`OverrideTransport::with_client`].
#[derive(Clone, Debug)]
pub struct OverrideTransport {
    client: Client,
    url: Url,
    interceptor: Arc<OverrideInterceptor>,
}

impl OverrideTransport {
    /// Create a transport with a default `reqwest` client.
    pub fn new(url: Url, interceptor: Arc<OverrideInterceptor>) -> Self {
        Self::with_client(Client::new(), url, interceptor)
    }

    /// Create a transport around a caller-configured `reqwest` client.
    pub fn with_client(client: Client, url: Url, interceptor: Arc<OverrideInterceptor>) -> Self {
        Self { client, url, interceptor }
    }

    /// Node endpoint.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Interceptor applied to every outgoing body.
    pub fn interceptor(&self) -> &Arc<OverrideInterceptor> {
        &self.interceptor
    }

    /// Whether the endpoint looks like a local node.
    pub fn guess_local(&self) -> bool {
        guess_local_url(self.url.as_str())
    }

    async fn do_reqwest(self, req: RequestPacket) -> Result<ResponsePacket, TransportError> {
        let body = Bytes::from(serde_json::to_vec(&req).map_err(TransportError::ser_err)?);
        let body = self.interceptor.intercept(&body);

        let resp = self
            .client
            .post(self.url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(CONTENT_LENGTH, body.len())
            .body(body)
            .send()
            .await
            .map_err(TransportErrorKind::custom)?;

        let status = resp.status();
        debug!(%status, "Received response from node");

        let body = resp.bytes().await.map_err(TransportErrorKind::custom)?;
        debug!(bytes = body.len(), "Retrieved response body");
        trace!(body = %String::from_utf8_lossy(&body), "Response body");

        if !status.is_success() {
            return Err(TransportErrorKind::http_error(
                status.as_u16(),
                String::from_utf8_lossy(&body).into_owned(),
            ));
        }

        serde_json::from_slice(&body)
            .map_err(|err| TransportError::deser_err(err, String::from_utf8_lossy(&body)))
    }
}

impl Service<RequestPacket> for OverrideTransport {
    type Response = ResponsePacket;
    type Error = TransportError;
    type Future = TransportFut<'static>;

    #[inline]
    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    #[inline]
    fn call(&mut self, req: RequestPacket) -> Self::Future {
        let this = self.clone();
        let span = debug_span!("OverrideTransport", url = %this.url);
        Box::pin(this.do_reqwest(req).instrument(span))
    }
}
