use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised if a store ID cannot be parsed from a string.
#[derive(Debug, Error, Eq, Ord, PartialEq, PartialOrd)]
pub enum ParseStoreIdError {
    /// Raised if the value is not an integer in the supported range.
    #[error("invalid value for store id")]
    InvalidValue,
    /// Raised if an empty value is parsed.
    #[error("empty or missing store id")]
    EmptyValue,
}

/// The unique identifier of a tenant store.
///
/// Every resource and usage counter in Desk is attributed to exactly one
/// store. The numeric value is assigned by the provisioning system and is
/// never reused.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct StoreId(u64);

impl StoreId {
    /// Creates a new store ID from its numeric value.
    #[inline]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the numeric value of this store ID.
    #[inline]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

impl FromStr for StoreId {
    type Err = ParseStoreIdError;

    fn from_str(s: &str) -> Result<StoreId, ParseStoreIdError> {
        if s.is_empty() {
            return Err(ParseStoreIdError::EmptyValue);
        }

        match s.parse::<u64>() {
            Ok(val) => Ok(StoreId::new(val)),
            Err(_) => Err(ParseStoreIdError::InvalidValue),
        }
    }
}
