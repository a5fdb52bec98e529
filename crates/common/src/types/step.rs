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

use std::fmt;

use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serialize};

use crate::word::{parse_word, WordError};

/// Snapshot of the EVM operand stack as rendered by a struct-log tracer.
///
/// Entries are stored bottom to top: the **last** element is the top of the
/// stack. All positional reads should go through [`EvmStack::peek`] so that
/// this convention lives in one place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvmStack(Vec<String>);

impl EvmStack {
    /// Create a stack from words ordered bottom to top.
    pub fn new(words: Vec<String>) -> Self {
        Self(words)
    }

    /// Number of entries on the stack.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the stack is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Return the entry `depth` positions below the top (`0` is the top).
    pub fn peek(&self, depth: usize) -> Option<&str> {
        let index = self.0.len().checked_sub(depth)?.checked_sub(1)?;
        self.0.get(index).map(String::as_str)
    }

    /// Like [`peek`](Self::peek), parsing the entry as a 256-bit word.
    pub fn peek_word(&self, depth: usize) -> Option<Result<U256, WordError>> {
        self.peek(depth).map(parse_word)
    }

    /// Iterate from bottom to top.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Borrow the raw words, bottom to top.
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl<S: Into<String>> FromIterator<S> for EvmStack {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// One row of a struct-log trace.
///
/// The stack and memory are captured *before* the opcode at this step
/// executes, so for a `LOGn` step they hold exactly the operands it consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStep {
    /// Program counter
    pub pc: u64,
    /// Opcode mnemonic, e.g. `LOG3`
    pub op: String,
    /// Gas remaining before this step
    pub gas: u64,
    /// Gas charged for this step
    pub gas_cost: u64,
    /// Call depth, starting at 1 for the outermost frame
    pub depth: u64,
    /// Operand stack, bottom to top
    #[serde(default, deserialize_with = "null_as_default")]
    pub stack: EvmStack,
    /// Memory image as consecutive 32-byte hex chunks
    #[serde(default, deserialize_with = "null_as_default")]
    pub memory: Vec<String>,
    /// Memory size in bytes, when reported
    #[serde(default, rename = "memSize", skip_serializing_if = "Option::is_none")]
    pub mem_size: Option<u64>,
    /// Refund counter, when reported
    #[serde(default, rename = "refund", skip_serializing_if = "Option::is_none")]
    pub refund_counter: Option<u64>,
    /// Error raised by this step, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionStep {
    /// Whether this step emits a log (`LOG0` through `LOG4`, by prefix).
    pub fn is_log(&self) -> bool {
        self.op.starts_with("LOG")
    }
}

impl fmt::Display for ExecutionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@pc={} depth={} gas={}", self.op, self.pc, self.depth, self.gas)
    }
}

/// Nodes emit `null` instead of omitting disabled captures.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
