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

use alloy_primitives::{hex, Bytes};
use serde::{Deserialize, Serialize};

use crate::types::ExecutionStep;

/// Tracer options for `debug_traceCall` with the default struct-log tracer.
///
/// Log reconstruction reads operands from the stack and data from memory,
/// so both captures must be on for it to produce anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceConfig {
    /// Skip storage capture
    pub disable_storage: bool,
    /// Skip stack capture
    pub disable_stack: bool,
    /// Capture memory
    pub enable_memory: bool,
    /// Capture return data
    pub enable_return_data: bool,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            disable_storage: false,
            disable_stack: false,
            enable_memory: true,
            enable_return_data: true,
        }
    }
}

impl TraceConfig {
    /// Whether traces produced with this config carry enough state to
    /// rebuild emitted logs.
    pub fn captures_logs(&self) -> bool {
        !self.disable_stack && self.enable_memory
    }
}

/// Response body of `debug_traceCall` with the struct-log tracer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceCallResponse {
    /// Whether the traced call reverted or failed
    pub failed: bool,
    /// Gas used by the call
    pub gas: u64,
    /// Return data as hex, with or without a `0x` prefix
    #[serde(default)]
    pub return_value: String,
    /// Every executed step, in order
    #[serde(default)]
    pub struct_logs: Vec<ExecutionStep>,
}

impl TraceCallResponse {
    /// Decode [`return_value`](Self::return_value) into bytes.
    pub fn return_data(&self) -> Result<Bytes, hex::FromHexError> {
        let digits = self.return_value.strip_prefix("0x").unwrap_or(&self.return_value);
        hex::decode(digits).map(Bytes::from)
    }

    /// Steps that emit logs, in execution order.
    pub fn log_steps(&self) -> impl Iterator<Item = &ExecutionStep> {
        self.struct_logs.iter().filter(|step| step.is_log())
    }
}
