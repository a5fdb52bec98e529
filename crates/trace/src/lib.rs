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

//! SimTrace Trace - events reconstructed from `debug_traceCall` struct logs
//!
//! Pipeline, leaves first: [`extract_log_frame`] reads a `LOGn` step's
//! operands into a [`LogFrame`], [`decode_frame`] matches it against an
//! [`EventCatalog`] and decodes its fields, [`reconstruct_logs`] runs both
//! over a whole trace, and [`TraceClient`] fetches the trace from a node.

/// Event signatures keyed by selector
pub mod catalog;
/// `debug_traceCall` client
pub mod client;
/// Matching and decoding of log frames
pub mod decode;
/// Error types
pub mod error;
/// Reading `LOGn` operands from a trace step
pub mod extract;
/// Extraction and decoding over a whole trace
pub mod reconstruct;

pub use catalog::{EventCatalog, EventDescriptor, EventField};
pub use client::TraceClient;
pub use decode::{decode_frame, DecodedEvent, EventOutcome};
pub use error::{CatalogError, DecodeError, ExtractError, TraceError};
pub use extract::{extract_log_frame, LogFrame};
pub use reconstruct::{reconstruct_logs, ExtractionMode, SkippedStep, TraceReport, TracedLog};
