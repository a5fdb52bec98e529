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

//! Hex word codec
//!
//! Nodes render stack entries as `0x`-prefixed hex with leading zeros
//! stripped (`0x20`) and memory as unprefixed, zero-padded 32-byte chunks.
//! Both renderings are accepted by the parsers in this module.

use alloy_primitives::{hex, B256, U256};
use thiserror::Error;

/// Size of an EVM word in bytes.
pub const WORD_SIZE: usize = 32;

/// Errors raised while converting hex words.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WordError {
    /// The word contains characters that are not hex digits.
    #[error("invalid hex word {word:?}: {reason}")]
    InvalidHex {
        /// The offending word as it appeared in the trace
        word: String,
        /// Why it was rejected
        reason: String,
    },
    /// The word has more than 256 significant bits.
    #[error("hex word {0:?} does not fit in 256 bits")]
    Overflow(String),
    /// A memory chunk is not exactly one word wide.
    #[error("memory chunk {index} is {len} bytes wide, expected {WORD_SIZE}")]
    ChunkWidth {
        /// Position of the chunk in the memory snapshot
        index: usize,
        /// Decoded width of the chunk in bytes
        len: usize,
    },
    /// The value is too large to be used as a byte offset or length.
    #[error("value {0} does not fit in usize")]
    TooLarge(U256),
}

fn strip_hex_prefix(word: &str) -> &str {
    word.strip_prefix("0x").or_else(|| word.strip_prefix("0X")).unwrap_or(word)
}

/// Parse a hex word (with or without `0x`, any number of leading zeros) as
/// an unsigned 256-bit integer. `"0x"` and the empty string parse as zero.
pub fn parse_word(word: &str) -> Result<U256, WordError> {
    let digits = strip_hex_prefix(word.trim());
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }

    if let Some(bad) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(WordError::InvalidHex {
            word: word.to_string(),
            reason: format!("unexpected character {bad:?}"),
        });
    }

    U256::from_str_radix(digits, 16).map_err(|_| WordError::Overflow(word.to_string()))
}

/// Parse a hex word as a left-padded 32-byte value.
pub fn parse_b256(word: &str) -> Result<B256, WordError> {
    parse_word(word).map(|value| B256::from(value.to_be_bytes::<WORD_SIZE>()))
}

/// Parse a hex word and narrow it to a `usize`, for offsets and lengths.
pub fn parse_usize(word: &str) -> Result<usize, WordError> {
    let value = parse_word(word)?;
    usize::try_from(value).map_err(|_| WordError::TooLarge(value))
}

/// Render a 256-bit integer as a `0x`-prefixed, zero-padded 64-digit word.
pub fn encode_word(value: U256) -> String {
    hex::encode_prefixed(value.to_be_bytes::<WORD_SIZE>())
}

/// Decode one memory chunk, which must be exactly 32 bytes of hex.
pub fn decode_chunk(index: usize, chunk: &str) -> Result<[u8; WORD_SIZE], WordError> {
    let bytes = hex::decode(strip_hex_prefix(chunk.trim()))
        .map_err(|e| WordError::InvalidHex { word: chunk.to_string(), reason: e.to_string() })?;

    <[u8; WORD_SIZE]>::try_from(bytes.as_slice())
        .map_err(|_| WordError::ChunkWidth { index, len: bytes.len() })
}

/// Concatenate a memory snapshot into one contiguous byte buffer.
pub fn flatten_memory<S: AsRef<str>>(words: &[S]) -> Result<Vec<u8>, WordError> {
    let mut memory = Vec::with_capacity(words.len() * WORD_SIZE);
    for (index, word) in words.iter().enumerate() {
        memory.extend_from_slice(&decode_chunk(index, word.as_ref())?);
    }
    Ok(memory)
}

/// Borrow the half-open range `[offset, offset + len)` of `buf`, if it is
/// fully contained in the buffer.
pub fn read_range(buf: &[u8], offset: usize, len: usize) -> Option<&[u8]> {
    let end = offset.checked_add(len)?;
    buf.get(offset..end)
}
