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

//! Known event signatures, keyed by selector.
//!
//! A catalog maps `keccak256("Name(type1,...,typeN)")` to the layout needed
//! to decode a log: which parameters come from topics and which are packed
//! into the data section. Only single-word body parameters are accepted, so
//! the data length of a matching log is known up front.
//!
//! Entries come from Solidity declarations with `indexed` markers, from a
//! contract ABI, or from a canonical signature plus the layout of its data
//! section.

use std::collections::HashMap;

use alloy_dyn_abi::{DynSolType, Specifier};
use alloy_json_abi::{Event, EventParam, JsonAbi};
use alloy_primitives::B256;
use simtrace_common::WORD_SIZE;
use tracing::{debug, warn};

use crate::error::CatalogError;

const ERC20_EVENTS: [&str; 2] = [
    "event Transfer(address indexed from, address indexed to, uint256 value)",
    "event Approval(address indexed owner, address indexed spender, uint256 value)",
];

/// Topics left for indexed parameters once the selector is in `topics[0]`.
const MAX_INDEXED: usize = 3;

/// A named, typed event parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventField {
    /// Parameter name, `param{i}` when the declaration leaves it out
    pub name: String,
    /// Resolved ABI type
    pub ty: DynSolType,
}

/// Decoding layout of one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDescriptor {
    /// Event name, e.g. `Transfer`
    pub name: String,
    /// Canonical signature over all parameters in declaration order
    pub signature: String,
    /// `keccak256(signature)`, the expected `topics[0]`
    pub selector: B256,
    /// Parameters carried in `topics[1..]`, in order
    pub indexed: Vec<EventField>,
    /// Parameters carried in the data section, in order
    pub body: Vec<EventField>,
    /// The parsed event this layout was built from
    pub event: Event,
}

impl EventDescriptor {
    /// Build the layout of a parsed event.
    ///
    /// Anonymous events have no selector topic and cannot be looked up, and
    /// body parameters must be value types that fill exactly one word.
    pub fn from_event(event: &Event) -> Result<Self, CatalogError> {
        if event.anonymous {
            return Err(CatalogError::Anonymous(event.name.clone()));
        }

        let mut indexed = Vec::new();
        let mut body = Vec::new();
        for (position, param) in event.inputs.iter().enumerate() {
            let name =
                if param.name.is_empty() { format!("param{position}") } else { param.name.clone() };
            let unsupported = || CatalogError::UnsupportedType {
                event: event.name.clone(),
                param: name.clone(),
                ty: param.ty.clone(),
            };

            let ty = param.resolve().map_err(|_| unsupported())?;
            if param.indexed {
                indexed.push(EventField { name, ty });
            } else if is_word_type(&ty) {
                body.push(EventField { name, ty });
            } else {
                return Err(unsupported());
            }
        }

        if indexed.len() > MAX_INDEXED {
            return Err(CatalogError::TooManyIndexed {
                event: event.name.clone(),
                count: indexed.len(),
            });
        }

        Ok(Self {
            name: event.name.clone(),
            signature: event.signature(),
            selector: event.selector(),
            indexed,
            body,
            event: event.clone(),
        })
    }

    /// Exact data length a matching log must carry.
    pub fn data_len(&self) -> usize {
        WORD_SIZE * self.body.len()
    }
}

/// Whether `ty` is encoded in place as exactly one 32-byte word.
pub(crate) fn is_word_type(ty: &DynSolType) -> bool {
    matches!(
        ty,
        DynSolType::Address
            | DynSolType::Bool
            | DynSolType::Int(_)
            | DynSolType::Uint(_)
            | DynSolType::FixedBytes(_)
    )
}

/// Selector-indexed set of event layouts. Build it once, then share it
/// read-only.
#[derive(Debug, Clone, Default)]
pub struct EventCatalog {
    events: HashMap<B256, EventDescriptor>,
}

impl EventCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the ERC-20 `Transfer` and `Approval` events.
    pub fn erc20() -> Self {
        Self::from_declarations(ERC20_EVENTS).expect("ERC-20 event declarations are valid")
    }

    /// Build a catalog from human-readable declarations, failing on the
    /// first invalid one.
    pub fn from_declarations<I, S>(declarations: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut catalog = Self::new();
        for declaration in declarations {
            catalog.register(declaration.as_ref())?;
        }
        Ok(catalog)
    }

    /// Collect every decodable event of a contract ABI.
    ///
    /// Anonymous events and events with dynamic body parameters are skipped
    /// with a warning.
    pub fn from_abi(abi: &JsonAbi) -> Self {
        let mut catalog = Self::new();
        for event in abi.events() {
            if let Err(err) = catalog.register_event(event) {
                warn!(event = %event.name, %err, "Skipping event");
            }
        }
        catalog
    }

    /// Register a Solidity event declaration such as
    /// `event Transfer(address indexed from, address indexed to, uint256 value)`.
    /// The leading `event` keyword is optional.
    ///
    /// Returns the selector the event is filed under.
    pub fn register(&mut self, declaration: &str) -> Result<B256, CatalogError> {
        let event = Event::parse(declaration.trim()).map_err(|err| CatalogError::Parse {
            declaration: declaration.to_string(),
            reason: err.to_string(),
        })?;
        self.register_event(&event)
    }

    /// Register a canonical signature such as
    /// `Transfer(address,address,uint256)` together with the `(name, type)`
    /// layout of its data section.
    ///
    /// The body must match the trailing parameters of the signature; the
    /// parameters before it are taken to be indexed, in order.
    ///
    /// ```
    /// # use simtrace_trace::EventCatalog;
    /// let mut catalog = EventCatalog::new();
    /// catalog.register_signature("Transfer(address,address,uint256)", &[("value", "uint256")])?;
    /// # Ok::<_, simtrace_trace::CatalogError>(())
    /// ```
    pub fn register_signature(
        &mut self,
        signature: &str,
        body: &[(&str, &str)],
    ) -> Result<B256, CatalogError> {
        let parsed = Event::parse(signature.trim()).map_err(|err| CatalogError::Parse {
            declaration: signature.to_string(),
            reason: err.to_string(),
        })?;
        let mismatch = |reason: String| CatalogError::SchemaMismatch {
            event: parsed.name.clone(),
            reason,
        };

        let total = parsed.inputs.len();
        if body.len() > total {
            return Err(mismatch(format!(
                "{} body fields for {total} parameters",
                body.len()
            )));
        }
        let indexed_count = total - body.len();

        let mut inputs = Vec::with_capacity(total);
        for (position, param) in parsed.inputs.iter().enumerate() {
            let Some(&(name, ty)) = position.checked_sub(indexed_count).map(|i| &body[i]) else {
                inputs.push(EventParam { indexed: true, ..param.clone() });
                continue;
            };

            let declared = DynSolType::parse(ty)
                .map_err(|err| mismatch(format!("field {name}: {err}")))?;
            let expected = param
                .resolve()
                .map_err(|err| mismatch(format!("parameter {position}: {err}")))?;
            if declared != expected {
                return Err(mismatch(format!(
                    "field {name} is {declared}, signature has {expected} at position {position}"
                )));
            }
            inputs.push(EventParam { name: name.to_string(), indexed: false, ..param.clone() });
        }

        self.register_event(&Event { inputs, ..parsed.clone() })
    }

    /// Register an already parsed event. A later registration with the same
    /// selector replaces the earlier one.
    pub fn register_event(&mut self, event: &Event) -> Result<B256, CatalogError> {
        let descriptor = EventDescriptor::from_event(event)?;
        let selector = descriptor.selector;
        debug!(signature = %descriptor.signature, %selector, "Registered event");
        self.events.insert(selector, descriptor);
        Ok(selector)
    }

    /// Exact-match lookup by `topics[0]`.
    pub fn get(&self, selector: &B256) -> Option<&EventDescriptor> {
        self.events.get(selector)
    }

    /// Whether `selector` has an entry.
    pub fn contains(&self, selector: &B256) -> bool {
        self.events.contains_key(selector)
    }

    /// Number of registered events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// All entries, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &EventDescriptor> {
        self.events.values()
    }
}
