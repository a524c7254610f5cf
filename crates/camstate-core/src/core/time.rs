// crates/camstate-core/src/core/time.rs
// ============================================================================
// Module: camstate Time Model
// Description: Unix millisecond timestamps for metadata records.
// Purpose: Keep every persisted time value in one canonical unit.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! All timestamps in the relational schema are Unix milliseconds. The newtype
//! keeps them from being mixed up with durations and sizes, which are also
//! stored as plain integers.

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;

/// Unix epoch milliseconds.
///
/// # Invariants
/// - Values before the epoch are representable but never produced by [`Timestamp::now`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Wraps a raw millisecond value.
    #[must_use]
    pub const fn from_millis(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw millisecond value.
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Reads the wall clock.
    #[must_use]
    pub fn now() -> Self {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Self(i64::try_from(now.as_millis()).unwrap_or(i64::MAX))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
