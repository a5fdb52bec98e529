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

use alloy_primitives::U256;
use alloy_transport::TransportError;
use simtrace_common::WordError;
use thiserror::Error;

/// A `LOGn` step whose operands cannot be read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// The opcode is not one of `LOG0`..`LOG4`
    #[error("Not a log opcode: {0}")]
    UnknownLogOp(String),

    /// Fewer stack items than the opcode pops
    #[error("{op} needs {needed} stack items, found {found}")]
    StackUnderflow {
        /// Offending opcode
        op: String,
        /// Items the opcode pops
        needed: usize,
        /// Items captured
        found: usize,
    },

    /// A stack entry is not a hex word
    #[error("Invalid stack word at depth {depth}: {source}")]
    InvalidWord {
        /// Distance from the top of the stack
        depth: usize,
        /// Why the word was rejected
        #[source]
        source: WordError,
    },

    /// Offset or length larger than `usize`
    #[error("Log {operand} {value} does not fit in memory addressing")]
    OffsetOverflow {
        /// `offset` or `length`
        operand: &'static str,
        /// The value read from the stack
        value: U256,
    },

    /// Memory words that are not exactly 32 bytes
    #[error("Malformed memory capture: {0}")]
    MisalignedMemory(#[source] WordError),

    /// The data range runs past the captured memory
    #[error("Log data [{offset}, +{length}) exceeds captured memory of {memory_len} bytes")]
    MemoryOutOfBounds {
        /// Start of the data range
        offset: usize,
        /// Length of the data range
        length: usize,
        /// Bytes of memory in the step
        memory_len: usize,
    },
}

/// A frame that matched a catalog entry but whose data does not fit it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Data is not exactly one word per body field
    #[error("{event}: expected {expected} bytes of data, got {actual}")]
    LengthMismatch {
        /// Event name
        event: String,
        /// `32 * body fields`
        expected: usize,
        /// Bytes the log carried
        actual: usize,
    },

    /// A `bool` word other than 0 or 1
    #[error("Field {field} is not a valid bool")]
    InvalidBool {
        /// Name of the field
        field: String,
    },

    /// The ABI decoder rejected the log
    #[error("{event}: {reason}")]
    Abi {
        /// Event name
        event: String,
        /// Decoder message
        reason: String,
    },
}

/// Rejected event registration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// Not a valid event declaration or signature
    #[error("Cannot parse event declaration {declaration:?}: {reason}")]
    Parse {
        /// Input text
        declaration: String,
        /// Parser message
        reason: String,
    },

    /// Anonymous events have no selector to file them under
    #[error("Anonymous event {0} has no selector topic")]
    Anonymous(String),

    /// A body parameter that is not a single-word value type
    #[error("{event}: parameter {param} has unsupported type {ty}")]
    UnsupportedType {
        /// Event name
        event: String,
        /// Parameter name
        param: String,
        /// Declared type
        ty: String,
    },

    /// More indexed parameters than a log has topics for
    #[error("{event}: {count} indexed parameters, at most 3 fit in topics")]
    TooManyIndexed {
        /// Event name
        event: String,
        /// Indexed parameters declared
        count: usize,
    },

    /// Body layout that does not line up with the signature
    #[error("{event}: body schema does not match signature, {reason}")]
    SchemaMismatch {
        /// Event name
        event: String,
        /// What differs
        reason: String,
    },
}

/// Failure of a traced call.
#[derive(Error, Debug)]
pub enum TraceError {
    /// The node could not be reached or answered with an error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Strict mode hit a malformed log step
    #[error("Malformed log step #{index} ({op}): {source}")]
    Extract {
        /// Position of the step in the struct-log list
        index: usize,
        /// Opcode of the step
        op: String,
        /// Why it could not be read
        #[source]
        source: ExtractError,
    },

    /// The trace config would not capture stack or memory
    #[error("Trace config disables stack or memory capture, logs cannot be rebuilt")]
    BlindConfig,
}
