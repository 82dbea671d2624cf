//! Order number sequences.
//!
//! Order numbers are allocated per *sequence key* (`PREFIX-YEAR`) and printed as
//! `PREFIX-YEAR-NNNNN`. Test-mode checkouts allocate from `TEST-PREFIX-YEAR` so they
//! never consume production ranges.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{InventoryError, Result};

const TEST_NAMESPACE: &str = "TEST";

/// Which number range an order draws from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceMode {
    /// Real customer orders
    Production,
    /// Checkout rehearsals and test-mode payments
    Test,
}

/// Bucket under which order numbers are allocated independently.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SequenceKey {
    prefix: String,
    year: i32,
}

impl SequenceKey {
    /// Build a key.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Storage`] if the prefix is empty or contains characters
    /// other than ASCII alphanumerics and `-`.
    pub fn new(prefix: impl Into<String>, year: i32) -> Result<Self> {
        let prefix = prefix.into();
        if prefix.is_empty()
            || prefix.starts_with('-')
            || prefix.ends_with('-')
            || !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(InventoryError::Storage(format!(
                "Invalid sequence prefix: {prefix:?}"
            )));
        }
        Ok(Self {
            prefix: prefix.to_ascii_uppercase(),
            year,
        })
    }

    /// Key for `prefix`/`year` in the given mode.
    ///
    /// # Errors
    ///
    /// Same as [`SequenceKey::new`].
    pub fn for_mode(prefix: &str, year: i32, mode: SequenceMode) -> Result<Self> {
        match mode {
            SequenceMode::Production => Self::new(prefix, year),
            SequenceMode::Test => Self::new(format!("{TEST_NAMESPACE}-{prefix}"), year),
        }
    }

    /// Prefix part, upper-cased.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Year part.
    #[must_use]
    pub const fn year(&self) -> i32 {
        self.year
    }

    /// Mode inferred from the namespace.
    #[must_use]
    pub fn mode(&self) -> SequenceMode {
        if self
            .prefix
            .strip_prefix(TEST_NAMESPACE)
            .is_some_and(|rest| rest.starts_with('-'))
        {
            SequenceMode::Test
        } else {
            SequenceMode::Production
        }
    }

    /// Storage key, `PREFIX-YEAR`.
    #[must_use]
    pub fn as_storage_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.prefix, self.year)
    }
}

impl FromStr for SequenceKey {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self> {
        let (prefix, year) = s
            .rsplit_once('-')
            .ok_or_else(|| InventoryError::Storage(format!("Invalid sequence key: {s:?}")))?;
        let year = year
            .parse::<i32>()
            .map_err(|_| InventoryError::Storage(format!("Invalid sequence key year: {s:?}")))?;
        Self::new(prefix, year)
    }
}

/// A minted, customer-facing order number.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderNumber {
    /// Key it was drawn from
    pub key: SequenceKey,
    /// Value within the key
    pub number: u64,
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:05}", self.key, self.number)
    }
}

/// Post-increment value for a counter currently at `last_number`.
///
/// # Errors
///
/// Returns [`InventoryError::Storage`] if the counter is exhausted.
pub fn next_after(key: &SequenceKey, last_number: u64) -> Result<u64> {
    last_number
        .checked_add(1)
        .ok_or_else(|| InventoryError::Storage(format!("Sequence {key} is exhausted")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn formats_order_numbers() {
        let key = SequenceKey::new("alcbf", 2026).unwrap();
        assert_eq!(key.to_string(), "ALCBF-2026");
        let order = OrderNumber { key, number: 42 };
        assert_eq!(order.to_string(), "ALCBF-2026-00042");

        let wide = OrderNumber {
            key: SequenceKey::new("ALCBF", 2026).unwrap(),
            number: 1_234_567,
        };
        assert_eq!(wide.to_string(), "ALCBF-2026-1234567");
    }

    #[test]
    fn test_mode_uses_separate_namespace() {
        let live = SequenceKey::for_mode("ALCBF", 2026, SequenceMode::Production).unwrap();
        let test = SequenceKey::for_mode("ALCBF", 2026, SequenceMode::Test).unwrap();
        assert_ne!(live, test);
        assert_eq!(test.to_string(), "TEST-ALCBF-2026");
        assert_eq!(live.mode(), SequenceMode::Production);
        assert_eq!(test.mode(), SequenceMode::Test);
        // A prefix that merely starts with the letters is not the test namespace.
        assert_eq!(
            SequenceKey::new("TESTFEST", 2026).unwrap().mode(),
            SequenceMode::Production
        );
    }

    #[test]
    fn parses_storage_keys() {
        let key: SequenceKey = "TEST-ALCBF-2026".parse().unwrap();
        assert_eq!(key.prefix(), "TEST-ALCBF");
        assert_eq!(key.year(), 2026);
        assert!("ALCBF".parse::<SequenceKey>().is_err());
        assert!("ALCBF-20x6".parse::<SequenceKey>().is_err());
        assert!(SequenceKey::new("", 2026).is_err());
        assert!(SequenceKey::new("A B", 2026).is_err());
    }

    #[test]
    fn next_after_increments_and_detects_exhaustion() {
        let key = SequenceKey::new("ALCBF", 2026).unwrap();
        assert_eq!(next_after(&key, 0).unwrap(), 1);
        assert!(next_after(&key, u64::MAX).is_err());
    }
}
