// crates/camstate-core/src/core/capability.rs
// ============================================================================
// Module: camstate Capabilities
// Description: Capability tokens, capability sets, and callers.
// Purpose: Express per-entry access requirements as static bitsets.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Every state entry declares which capabilities may read it and which may
//! write it. A caller carries its own [`CapabilitySet`]; access is granted when
//! the two sets intersect. Sets are fixed at registration and never depend on
//! the current value.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use thiserror::Error;

// ============================================================================
// SECTION: Capability
// ============================================================================

/// Authorization token carried by callers and required by entries.
///
/// # Invariants
/// - Discriminants are stable bit positions; append new variants at the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    /// Live view clients.
    Viewer = 0,
    /// Operators allowed to drive the camera and annotate recordings.
    Operator = 1,
    /// Administrators allowed to change device configuration.
    Admin = 2,
    /// Hardware pollers reporting sensor and device state.
    Hardware = 3,
    /// Internal timers and lifecycle tasks.
    System = 4,
}

impl Capability {
    /// Every capability in bit order.
    pub const ALL: [Self; 5] = [Self::Viewer, Self::Operator, Self::Admin, Self::Hardware, Self::System];

    /// Returns the bit mask for this capability.
    #[must_use]
    pub const fn bit(self) -> u32 {
        1 << (self as u32)
    }

    /// Returns the stable token for this capability.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Operator => "operator",
            Self::Admin => "admin",
            Self::Hardware => "hardware",
            Self::System => "system",
        }
    }
}

/// Unknown capability token.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown capability: {0}")]
pub struct ParseCapabilityError(pub String);

impl FromStr for Capability {
    type Err = ParseCapabilityError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|capability| capability.as_str() == value)
            .ok_or_else(|| ParseCapabilityError(value.to_string()))
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Capability Set
// ============================================================================

/// Bitset of capabilities.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CapabilitySet(u32);

impl CapabilitySet {
    /// The empty set. Nobody holding it passes any check.
    pub const EMPTY: Self = Self(0);
    /// Every capability.
    pub const ALL: Self = Self::of(&Capability::ALL);

    /// Builds a set from a slice of capabilities.
    #[must_use]
    pub const fn of(capabilities: &[Capability]) -> Self {
        let mut bits = 0;
        let mut index = 0;
        while index < capabilities.len() {
            bits |= capabilities[index].bit();
            index += 1;
        }
        Self(bits)
    }

    /// Returns a copy with `capability` added.
    #[must_use]
    pub const fn with(self, capability: Capability) -> Self {
        Self(self.0 | capability.bit())
    }

    /// Returns a copy with `capability` removed.
    #[must_use]
    pub const fn without(self, capability: Capability) -> Self {
        Self(self.0 & !capability.bit())
    }

    /// Returns true when `capability` is in the set.
    #[must_use]
    pub const fn contains(self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    /// Returns true when the two sets share at least one capability.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns the union of both sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns the intersection of both sets.
    #[must_use]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Returns true when the set is empty.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns the number of capabilities in the set.
    #[must_use]
    pub const fn len(self) -> u32 {
        self.0.count_ones()
    }

    /// Iterates the capabilities in bit order.
    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL.into_iter().filter(move |capability| self.contains(*capability))
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

impl From<Capability> for CapabilitySet {
    fn from(capability: Capability) -> Self {
        Self(capability.bit())
    }
}

impl BitOr for Capability {
    type Output = CapabilitySet;

    fn bitor(self, rhs: Self) -> CapabilitySet {
        CapabilitySet::from(self).with(rhs)
    }
}

impl BitOr<Capability> for CapabilitySet {
    type Output = Self;

    fn bitor(self, rhs: Capability) -> Self {
        self.with(rhs)
    }
}

impl BitOr for CapabilitySet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(Capability::as_str)).finish()
    }
}

impl Serialize for CapabilitySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter().map(Capability::as_str))
    }
}

impl<'de> Deserialize<'de> for CapabilitySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tokens = Vec::<String>::deserialize(deserializer)?;
        tokens
            .iter()
            .map(|token| token.parse::<Capability>())
            .collect::<Result<Self, _>>()
            .map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// SECTION: Access Policy
// ============================================================================

/// Operation being authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    /// Reading the current value.
    Read,
    /// Replacing the value.
    Write,
}

impl Access {
    /// Returns a stable label for the access kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

/// Read and write requirements declared by a state entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessPolicy {
    /// Capabilities allowed to read.
    pub read: CapabilitySet,
    /// Capabilities allowed to write.
    pub write: CapabilitySet,
}

impl AccessPolicy {
    /// Creates a policy from explicit sets.
    #[must_use]
    pub const fn new(read: CapabilitySet, write: CapabilitySet) -> Self {
        Self {
            read,
            write,
        }
    }

    /// Returns the requirement set for an operation.
    #[must_use]
    pub const fn required(&self, access: Access) -> CapabilitySet {
        match access {
            Access::Read => self.read,
            Access::Write => self.write,
        }
    }
}

// ============================================================================
// SECTION: Caller
// ============================================================================

/// Identity and capabilities of whoever requests a read or mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Caller identifier used in logs and audit events.
    id: String,
    /// Capabilities held by the caller.
    capabilities: CapabilitySet,
}

impl Caller {
    /// Creates a caller.
    #[must_use]
    pub fn new(id: impl Into<String>, capabilities: CapabilitySet) -> Self {
        Self {
            id: id.into(),
            capabilities,
        }
    }

    /// Internal caller holding every capability.
    #[must_use]
    pub fn system() -> Self {
        Self::new("system", CapabilitySet::ALL)
    }

    /// Returns the caller identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the caller capabilities.
    #[must_use]
    pub const fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }
}
