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

use std::{fmt, iter};

use alloy_dyn_abi::{DynSolEvent, DynSolType, DynSolValue, EventExt};
use alloy_primitives::{hex, B256, U256};
use simtrace_common::WORD_SIZE;

use crate::{
    catalog::{EventCatalog, EventDescriptor, EventField},
    error::DecodeError,
    extract::LogFrame,
};

/// An event matched against the catalog, with every field decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    /// Event name
    pub name: String,
    /// Canonical signature the selector was derived from
    pub signature: String,
    /// Values read from `topics[1..]`. Parameters whose topic is missing are
    /// left out; non-value types are kept as the raw topic hash.
    pub indexed: Vec<(String, DynSolValue)>,
    /// Values read from the data section, in declaration order.
    pub fields: Vec<(String, DynSolValue)>,
}

impl DecodedEvent {
    /// Look up a field by name, data section first, then topics.
    pub fn get(&self, name: &str) -> Option<&DynSolValue> {
        self.fields
            .iter()
            .chain(self.indexed.iter())
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }
}

impl fmt::Display for DecodedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, (name, value)) in self.indexed.iter().chain(self.fields.iter()).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={}", format_value(value))?;
        }
        f.write_str(")")
    }
}

/// Result of matching one log against the catalog.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// Known selector, every field decoded
    Decoded(DecodedEvent),
    /// No topics, or a selector the catalog does not know
    Unmatched,
    /// Known selector, but the data does not fit the declared fields
    Invalid(DecodeError),
}

impl EventOutcome {
    /// The decoded event, if there is one.
    pub fn decoded(&self) -> Option<&DecodedEvent> {
        match self {
            Self::Decoded(event) => Some(event),
            _ => None,
        }
    }

    /// Whether the log was not recognised.
    pub fn is_unmatched(&self) -> bool {
        matches!(self, Self::Unmatched)
    }
}

/// Match `frame` by its first topic and decode it.
pub fn decode_frame(frame: &LogFrame, catalog: &EventCatalog) -> EventOutcome {
    let Some(descriptor) = frame.selector().and_then(|selector| catalog.get(selector)) else {
        return EventOutcome::Unmatched;
    };
    match decode_with(descriptor, frame) {
        Ok(event) => EventOutcome::Decoded(event),
        Err(err) => EventOutcome::Invalid(err),
    }
}

/// Decode `frame` against a known layout, ignoring its selector.
///
/// The data must be exactly one word per body field. Topics past the
/// declared indexed parameters are ignored.
pub fn decode_with(
    descriptor: &EventDescriptor,
    frame: &LogFrame,
) -> Result<DecodedEvent, DecodeError> {
    let expected = descriptor.data_len();
    if frame.data.len() != expected {
        return Err(DecodeError::LengthMismatch {
            event: descriptor.name.clone(),
            expected,
            actual: frame.data.len(),
        });
    }

    let topics: Vec<B256> =
        frame.topics.iter().skip(1).take(descriptor.indexed.len()).copied().collect();
    let indexed_fields = &descriptor.indexed[..topics.len()];

    let words = frame.data.chunks_exact(WORD_SIZE).map(B256::from_slice);
    let indexed_words = indexed_fields.iter().zip(topics.iter().copied());
    for (field, word) in descriptor.body.iter().zip(words).chain(indexed_words) {
        check_bool(field, word)?;
    }

    let with_selector = iter::once(descriptor.selector).chain(topics.iter().copied());
    let result = if topics.len() == descriptor.indexed.len() {
        descriptor.event.decode_log_parts(with_selector, &frame.data)
    } else {
        // Log emitted with fewer topics than declared: decode what is there.
        DynSolEvent::new_unchecked(
            Some(descriptor.selector),
            indexed_fields.iter().map(|field| field.ty.clone()).collect(),
            DynSolType::Tuple(descriptor.body.iter().map(|field| field.ty.clone()).collect()),
        )
        .decode_log_parts(with_selector, &frame.data)
    };
    let decoded = result
        .map_err(|err| DecodeError::Abi { event: descriptor.name.clone(), reason: err.to_string() })?;

    Ok(DecodedEvent {
        name: descriptor.name.clone(),
        signature: descriptor.signature.clone(),
        indexed: named(indexed_fields, decoded.indexed),
        fields: named(&descriptor.body, decoded.body),
    })
}

fn named(fields: &[EventField], values: Vec<DynSolValue>) -> Vec<(String, DynSolValue)> {
    fields.iter().map(|field| field.name.clone()).zip(values).collect()
}

/// The decoder reads any non-zero word as `true`; only 0 and 1 are valid.
fn check_bool(field: &EventField, word: B256) -> Result<(), DecodeError> {
    if field.ty == DynSolType::Bool && U256::from_be_bytes(word.0) > U256::from(1) {
        return Err(DecodeError::InvalidBool { field: field.name.clone() });
    }
    Ok(())
}

/// Human-readable rendering of a single-word value.
pub fn format_value(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::Int(n, _) => n.to_string(),
        DynSolValue::Uint(n, _) => n.to_string(),
        DynSolValue::Address(addr) => addr.to_checksum(None),
        DynSolValue::FixedBytes(bytes, size) => hex::encode_prefixed(&bytes[..*size]),
        other => format!("{other:?}"),
    }
}
