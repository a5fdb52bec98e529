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

use alloy_primitives::{Bytes, B256};
use serde::{Deserialize, Serialize};
use simtrace_common::{flatten_memory, parse_b256, parse_word, read_range, ExecutionStep};

use crate::error::ExtractError;

/// Maximum number of topics a log can carry.
pub const MAX_TOPICS: usize = 4;

/// Topics and data of one emitted log, rebuilt from a trace step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFrame {
    /// Up to four topics in emission order; `topics[0]` is usually the
    /// event selector
    pub topics: Vec<B256>,
    /// Data section
    pub data: Bytes,
}

impl LogFrame {
    /// The selector topic, if any.
    pub fn selector(&self) -> Option<&B256> {
        self.topics.first()
    }
}

/// Number of topics popped by a log opcode.
pub fn topic_count(op: &str) -> Result<usize, ExtractError> {
    match op {
        "LOG0" => Ok(0),
        "LOG1" => Ok(1),
        "LOG2" => Ok(2),
        "LOG3" => Ok(3),
        "LOG4" => Ok(4),
        _ => Err(ExtractError::UnknownLogOp(op.to_string())),
    }
}

/// Rebuild the log emitted by a `LOGn` step.
///
/// The stack is captured before the opcode runs, so its top holds the
/// operands in pop order: memory offset, data length, then the topics.
/// A zero length never reads memory, matching the VM.
pub fn extract_log_frame(step: &ExecutionStep) -> Result<LogFrame, ExtractError> {
    let count = topic_count(&step.op)?;
    let needed = 2 + count;
    let stack = &step.stack;
    if stack.len() < needed {
        return Err(ExtractError::StackUnderflow {
            op: step.op.clone(),
            needed,
            found: stack.len(),
        });
    }

    let word_at = |depth: usize| {
        stack.peek(depth).ok_or_else(|| ExtractError::StackUnderflow {
            op: step.op.clone(),
            needed,
            found: stack.len(),
        })
    };
    let offset_operand = |depth: usize, operand: &'static str| -> Result<usize, ExtractError> {
        let value = parse_word(word_at(depth)?)
            .map_err(|source| ExtractError::InvalidWord { depth, source })?;
        usize::try_from(value).map_err(|_| ExtractError::OffsetOverflow { operand, value })
    };

    let offset = offset_operand(0, "offset")?;
    let length = offset_operand(1, "length")?;

    let topics = (0..count)
        .map(|i| {
            let depth = 2 + i;
            parse_b256(word_at(depth)?).map_err(|source| ExtractError::InvalidWord { depth, source })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if length == 0 {
        return Ok(LogFrame { topics, data: Bytes::new() });
    }

    let memory = flatten_memory(&step.memory).map_err(ExtractError::MisalignedMemory)?;
    let data = read_range(&memory, offset, length).ok_or(ExtractError::MemoryOutOfBounds {
        offset,
        length,
        memory_len: memory.len(),
    })?;

    Ok(LogFrame { topics, data: Bytes::copy_from_slice(data) })
}
