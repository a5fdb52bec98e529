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

//! SimTrace Common - Shared functionality for SimTrace components
//!
//! This crate provides the pieces shared by the call simulator, the trace
//! decoder and the RPC proxy: hex word handling, the wire types of
//! `debug_traceCall` struct logs, and logging setup.

/// Wire types of execution traces returned by `debug_traceCall`
pub mod types;

/// Logging setup and utilities for consistent logging across SimTrace components
pub mod logging;
/// Conversions between hexadecimal EVM words, bytes and integers
pub mod word;

pub use logging::*;
pub use types::*;
pub use word::*;
