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

//! Appends the override fragment to outgoing `eth_call` requests.
//!
//! The interceptor never fails a request: bodies it cannot understand, and
//! every method other than `eth_call`, are passed through byte for byte.

use std::{collections::BTreeMap, fmt};

use bytes::Bytes;
use serde::Deserialize;
use serde_json::value::{to_raw_value, RawValue};
use thiserror::Error;
use tracing::debug;

use crate::overrides::OverrideSet;

/// The only method whose requests get rewritten.
pub const ETH_CALL: &str = "eth_call";

/// Failure to build an interceptor.
#[derive(Error, Debug)]
pub enum InterceptorError {
    /// The override set could not be rendered as JSON
    #[error("Failed to serialize override set: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Request rewriter holding a pre-serialized override set.
///
/// The fragment is rendered once at construction, so every rewritten call
/// carries byte-identical override JSON.
#[derive(Clone)]
pub struct OverrideInterceptor {
    fragment: Box<RawValue>,
    accounts: usize,
}

/// Borrowed view of a JSON-RPC request. Only used to recognise the
/// envelope; the rewritten body is built from [`Members`].
#[derive(Deserialize)]
struct Envelope<'a> {
    #[serde(rename = "jsonrpc", borrow)]
    _version: &'a RawValue,
    #[serde(borrow)]
    id: &'a RawValue,
    method: String,
    #[serde(borrow, default)]
    params: Vec<&'a RawValue>,
}

/// Every top-level member of a request, values kept verbatim.
type Members<'a> = BTreeMap<String, &'a RawValue>;

impl OverrideInterceptor {
    /// Serialize `overrides` into the fragment appended to each `eth_call`.
    pub fn new(overrides: &OverrideSet) -> Result<Self, InterceptorError> {
        let fragment = serde_json::value::to_raw_value(overrides)?;
        debug!(accounts = overrides.len(), bytes = fragment.get().len(), "Prepared override fragment");
        Ok(Self { fragment, accounts: overrides.len() })
    }

    /// The JSON text appended to each `eth_call`.
    pub fn fragment(&self) -> &str {
        self.fragment.get()
    }

    /// Number of overridden accounts.
    pub fn accounts(&self) -> usize {
        self.accounts
    }

    /// Return the body to send in place of `body`.
    ///
    /// `body` is left untouched; when nothing needs rewriting the result is a
    /// cheap clone of it.
    pub fn intercept(&self, body: &Bytes) -> Bytes {
        match self.rewrite(body) {
            Some(rewritten) => Bytes::from(rewritten),
            None => body.clone(),
        }
    }

    /// Rewrite a single request or a batch. `None` means "send as is".
    fn rewrite(&self, body: &[u8]) -> Option<Vec<u8>> {
        let first = body.iter().find(|b| !b.is_ascii_whitespace())?;

        if *first == b'[' {
            let batch: Vec<&RawValue> = match serde_json::from_slice(body) {
                Ok(batch) => batch,
                Err(err) => {
                    debug!(%err, "Batch is not a JSON array, forwarding unmodified");
                    return None;
                }
            };

            let mut out = Vec::with_capacity(batch.len());
            let mut rewritten = 0usize;
            for request in &batch {
                match self.append_fragment(request) {
                    Ok(Some(request)) => {
                        out.push(request);
                        rewritten += 1;
                    }
                    Ok(None) => out.push((*request).to_owned()),
                    Err(err) => {
                        debug!(%err, "Batch holds a non JSON-RPC element, forwarding unmodified");
                        return None;
                    }
                }
            }
            if rewritten == 0 {
                return None;
            }

            debug!(rewritten, total = batch.len(), "Appended overrides to batched eth_call");
            return serde_json::to_vec(&out).ok();
        }

        let request: &RawValue = serde_json::from_slice(body).ok()?;
        match self.append_fragment(request) {
            Ok(Some(request)) => Some(request.get().as_bytes().to_vec()),
            Ok(None) => None,
            Err(err) => {
                debug!(%err, "Body is not a JSON-RPC request, forwarding unmodified");
                None
            }
        }
    }

    /// Append the fragment to one request. `Ok(None)` for methods other
    /// than `eth_call`, an error if `request` is not a JSON-RPC envelope.
    ///
    /// Members other than `params` are carried over as received, unknown
    /// ones included.
    fn append_fragment(&self, request: &RawValue) -> serde_json::Result<Option<Box<RawValue>>> {
        let envelope: Envelope<'_> = serde_json::from_str(request.get())?;
        if envelope.method != ETH_CALL {
            return Ok(None);
        }

        let mut params = envelope.params;
        params.push(&*self.fragment);
        let params = to_raw_value(&params)?;

        let mut members: Members<'_> = serde_json::from_str(request.get())?;
        members.insert("params".to_string(), &*params);

        debug!(id = envelope.id.get(), accounts = self.accounts, "Appended overrides to eth_call");
        to_raw_value(&members).map(Some)
    }
}

impl fmt::Debug for OverrideInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverrideInterceptor")
            .field("accounts", &self.accounts)
            .field("fragment_len", &self.fragment.get().len())
            .finish()
    }
}
