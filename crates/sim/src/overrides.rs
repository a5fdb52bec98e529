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

use std::{collections::BTreeMap, fs, path::Path};

use alloy_primitives::{Address, Bytes, B256, U256};
use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};

/// Replacement state for one account during a simulated call.
///
/// Every field is optional; an absent field is left off the wire and the
/// node falls back to real chain state for it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountOverride {
    /// Account nonce
    #[serde(default, with = "alloy_serde::quantity::opt", skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    /// Runtime bytecode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Bytes>,
    /// Balance in wei
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<U256>,
    /// Full storage replacement; slots not listed read as zero
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<BTreeMap<B256, B256>>,
    /// Individual slot patches on top of real storage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_diff: Option<BTreeMap<B256, B256>>,
}

impl AccountOverride {
    /// Set the nonce.
    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    /// Set the balance, in wei.
    pub fn with_balance(mut self, balance: U256) -> Self {
        self.balance = Some(balance);
        self
    }

    /// Replace the runtime bytecode.
    pub fn with_code(mut self, code: impl Into<Bytes>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Replace the whole storage of the account.
    pub fn with_state(mut self, state: impl IntoIterator<Item = (B256, B256)>) -> Self {
        self.state = Some(state.into_iter().collect());
        self
    }

    /// Patch single storage slots, leaving the rest untouched.
    pub fn with_state_diff(mut self, diff: impl IntoIterator<Item = (B256, B256)>) -> Self {
        self.state_diff = Some(diff.into_iter().collect());
        self
    }

    /// Whether the override changes nothing.
    pub fn is_empty(&self) -> bool {
        self.nonce.is_none()
            && self.code.is_none()
            && self.balance.is_none()
            && self.state.is_none()
            && self.state_diff.is_none()
    }
}

/// The set of account overrides applied to every intercepted call.
///
/// Keys are kept sorted, so two serializations of the same set are always
/// byte-identical.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverrideSet(BTreeMap<Address, AccountOverride>);

impl OverrideSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the override for `address`, returning the previous one.
    pub fn insert(&mut self, address: Address, account: AccountOverride) -> Option<AccountOverride> {
        self.0.insert(address, account)
    }

    /// Override for `address`, if any.
    pub fn get(&self, address: &Address) -> Option<&AccountOverride> {
        self.0.get(address)
    }

    /// Number of overridden accounts.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no account is overridden.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Accounts and their overrides, by ascending address.
    pub fn iter(&self) -> impl Iterator<Item = (&Address, &AccountOverride)> {
        self.0.iter()
    }

    /// Overridden addresses in ascending order.
    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.0.keys()
    }

    /// Load a set from a JSON file in the same shape it serializes to:
    ///
    /// ```json
    /// { "0x00…01": { "balance": "0xde0b6b3a7640000", "nonce": "0x1" } }
    /// ```
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read overrides from {}", path.display()))?;
        serde_json::from_str(&contents)
            .wrap_err_with(|| format!("Invalid override set in {}", path.display()))
    }
}

impl FromIterator<(Address, AccountOverride)> for OverrideSet {
    fn from_iter<T: IntoIterator<Item = (Address, AccountOverride)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a OverrideSet {
    type Item = (&'a Address, &'a AccountOverride);
    type IntoIter = std::collections::btree_map::Iter<'a, Address, AccountOverride>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
