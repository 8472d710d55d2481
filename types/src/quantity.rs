//! Ledger-native unsigned quantities (block numbers, gas used).
//!
//! Nodes report these as `0x`-prefixed hex strings of arbitrary width. They
//! are carried in that form end to end and only narrowed to an integer on
//! request, never through a floating-point type.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TypesError;

/// A `0x`-prefixed, lowercase, minimal hex quantity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Quantity(String);

impl Quantity {
    /// Parse a hex quantity as returned by a node (`"0x1b4"`, `"0x0"`).
    ///
    /// Leading zeros are stripped so equal values compare equal.
    pub fn from_hex(raw: &str) -> Result<Self, TypesError> {
        let digits = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .ok_or_else(|| TypesError::InvalidQuantity(raw.to_string()))?;
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypesError::InvalidQuantity(raw.to_string()));
        }
        let trimmed = digits.trim_start_matches('0');
        let canonical = if trimmed.is_empty() { "0" } else { trimmed };
        Ok(Self(format!("0x{}", canonical.to_ascii_lowercase())))
    }

    pub fn from_u128(value: u128) -> Self {
        Self(format!("{value:#x}"))
    }

    /// The value as `u128`, or `None` if it does not fit.
    pub fn as_u128(&self) -> Option<u128> {
        u128::from_str_radix(&self.0[2..], 16).ok()
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Quantity {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<Quantity> for String {
    fn from(q: Quantity) -> Self {
        q.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
