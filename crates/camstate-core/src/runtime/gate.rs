// crates/camstate-core/src/runtime/gate.rs
// ============================================================================
// Module: camstate Permission Gate
// Description: Capability checks for reads and writes of state entries.
// Purpose: Decide access from static per-entry capability sets.
// Dependencies: crate::core, crate::runtime::registry
// ============================================================================

//! ## Overview
//! Access is granted iff the caller's capability set intersects the set the
//! entry declares for the operation. An entry that declares an empty set is
//! unreachable for that operation. Denials are returned, not logged; the
//! caller of the gate decides how to report them.

use std::sync::Arc;

use crate::core::Access;
use crate::core::AccessPolicy;
use crate::core::Caller;
use crate::runtime::registry::ObservableRegistry;
use crate::runtime::registry::RegistryError;
use crate::runtime::registry::StateEntry;

/// Result of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// Caller may proceed.
    Allow,
    /// Caller lacks every required capability.
    Deny,
}

impl AccessDecision {
    /// Returns true for [`AccessDecision::Allow`].
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Permission gate bound to a registry.
#[derive(Debug, Clone)]
pub struct PermissionGate {
    /// Registry providing entry policies.
    registry: Arc<ObservableRegistry>,
}

impl PermissionGate {
    /// Creates a gate over `registry`.
    #[must_use]
    pub const fn new(registry: Arc<ObservableRegistry>) -> Self {
        Self {
            registry,
        }
    }

    /// Authorizes `caller` for `access` on the entry named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownState`] when no such entry exists.
    pub fn authorize(
        &self,
        caller: &Caller,
        name: &str,
        access: Access,
    ) -> Result<AccessDecision, RegistryError> {
        let entry = self.registry.entry(name)?;
        Ok(Self::check(caller, &entry, access))
    }

    /// Authorizes `caller` against an already resolved entry.
    #[must_use]
    pub fn check(caller: &Caller, entry: &StateEntry, access: Access) -> AccessDecision {
        Self::evaluate(caller, entry.policy(), access)
    }

    /// Evaluates a policy directly.
    #[must_use]
    pub const fn evaluate(caller: &Caller, policy: &AccessPolicy, access: Access) -> AccessDecision {
        if caller.capabilities().intersects(policy.required(access)) {
            AccessDecision::Allow
        } else {
            AccessDecision::Deny
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AccessDecision;
    use super::PermissionGate;
    use crate::core::Access;
    use crate::core::AccessPolicy;
    use crate::core::Caller;
    use crate::core::Capability;
    use crate::core::CapabilitySet;

    #[test]
    fn empty_requirement_denies_system_caller() {
        let policy = AccessPolicy::new(CapabilitySet::from(Capability::Viewer), CapabilitySet::EMPTY);
        let system = Caller::system();
        assert_eq!(PermissionGate::evaluate(&system, &policy, Access::Read), AccessDecision::Allow);
        assert_eq!(PermissionGate::evaluate(&system, &policy, Access::Write), AccessDecision::Deny);
    }
}
