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

//! SimTrace Sim - `eth_call` against a hypothetical world state
//!
//! A transport-level [`OverrideInterceptor`] appends a fixed set of account
//! overrides (balance, nonce, code, storage) to every outgoing `eth_call`,
//! so calls run against an alternate state without touching the chain.
//! [`CallClient`] composes the interceptor with an HTTP transport and an
//! alloy RPC client.

/// Call client that routes `eth_call` through the override transport
pub mod client;
/// Request body rewriting
pub mod interceptor;
/// Account override types and their wire format
pub mod overrides;
/// Alloy transport that applies the interceptor before sending
pub mod transport;

pub use client::CallClient;
pub use interceptor::{InterceptorError, OverrideInterceptor, ETH_CALL};
pub use overrides::{AccountOverride, OverrideSet};
pub use transport::OverrideTransport;
