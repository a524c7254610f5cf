// crates/camstate-core/src/runtime/registry.rs
// ============================================================================
// Module: camstate Observable Registry
// Description: Process-wide table of named, typed, observable state entries.
// Purpose: Own current values, access policies, validators, and observers.
// Dependencies: crate::core, crate::interfaces, thiserror
// ============================================================================

//! ## Overview
//! The registry is the single source of truth for live state. Entries are
//! registered once by their owning module and never removed. Values are held
//! as `Arc<StateValue>` behind a short-lived lock so readers clone a pointer
//! and never wait on a writer's persistence or observer work.
//!
//! Values change only through [`crate::runtime::MutationPipeline`]; the
//! replace operation on [`StateEntry`] is crate-private.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

use thiserror::Error;

use crate::core::AccessPolicy;
use crate::core::CapabilitySet;
use crate::core::StateValue;
use crate::interfaces::StateObserver;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum length of an entry name in bytes.
pub const MAX_ENTRY_NAME_LENGTH: usize = 128;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Registry errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// An entry with the same name already exists.
    #[error("state entry already registered: {0}")]
    DuplicateName(String),
    /// No entry with the given name exists.
    #[error("unknown state entry: {0}")]
    UnknownState(String),
    /// Entry name is empty, too long, or contains unsupported characters.
    #[error("invalid state entry name: {0}")]
    InvalidName(String),
    /// Default value fails the entry's own validator.
    #[error("default for {name} fails validation: {reason}")]
    InvalidDefault {
        /// Entry name.
        name: String,
        /// Validator message.
        reason: String,
    },
    /// Registry lock poisoned.
    #[error("state registry lock poisoned")]
    Lock,
}

// ============================================================================
// SECTION: Entry Specification
// ============================================================================

/// Validator run on every candidate value before it is applied.
pub type Validator = Arc<dyn Fn(&StateValue) -> Result<(), String> + Send + Sync>;

/// Registration parameters for a state entry.
///
/// Read and write sets default to empty, which denies every caller.
#[derive(Clone)]
pub struct StateSpec {
    /// Unique entry name.
    name: String,
    /// Initial and factory-reset value.
    default: StateValue,
    /// Read and write capability requirements.
    policy: AccessPolicy,
    /// Whether changes are written through to the value store.
    persistent: bool,
    /// Optional candidate validator.
    validator: Option<Validator>,
}

impl StateSpec {
    /// Starts a specification with a name and default value.
    #[must_use]
    pub fn new(name: impl Into<String>, default: impl Into<StateValue>) -> Self {
        Self {
            name: name.into(),
            default: default.into(),
            policy: AccessPolicy::default(),
            persistent: false,
            validator: None,
        }
    }

    /// Sets the capabilities allowed to read the entry.
    #[must_use]
    pub fn readable_by(mut self, capabilities: impl Into<CapabilitySet>) -> Self {
        self.policy.read = capabilities.into();
        self
    }

    /// Sets the capabilities allowed to write the entry.
    #[must_use]
    pub fn writable_by(mut self, capabilities: impl Into<CapabilitySet>) -> Self {
        self.policy.write = capabilities.into();
        self
    }

    /// Marks the entry persistent.
    #[must_use]
    pub const fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    /// Attaches a validator.
    #[must_use]
    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&StateValue) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Returns the entry name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for StateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSpec")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("persistent", &self.persistent)
            .field("validator", &self.validator.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: State Entry
// ============================================================================

/// Named, typed, observable unit of process state.
///
/// # Invariants
/// - `name`, `policy`, `persistent`, and `validator` never change after
///   registration.
/// - Observers are only appended; their order is the firing order.
pub struct StateEntry {
    /// Unique entry name.
    name: String,
    /// Default value.
    default: Arc<StateValue>,
    /// Current value.
    value: RwLock<Arc<StateValue>>,
    /// Read and write capability requirements.
    policy: AccessPolicy,
    /// Whether changes are written through to the value store.
    persistent: bool,
    /// Optional candidate validator.
    validator: Option<Validator>,
    /// Observers in registration order.
    observers: RwLock<Vec<Arc<dyn StateObserver>>>,
}

impl StateEntry {
    /// Returns the entry name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the default value.
    #[must_use]
    pub fn default_value(&self) -> Arc<StateValue> {
        Arc::clone(&self.default)
    }

    /// Returns the current value.
    #[must_use]
    pub fn value(&self) -> Arc<StateValue> {
        // The lock only guards an Arc swap, so a poisoned guard still holds a
        // fully-applied value.
        let guard = self.value.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Returns the access policy.
    #[must_use]
    pub const fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Returns true when the entry is written through to the value store.
    #[must_use]
    pub const fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Runs the validator against a candidate.
    ///
    /// # Errors
    ///
    /// Returns the validator message when the candidate is rejected.
    pub fn validate(&self, candidate: &StateValue) -> Result<(), String> {
        match &self.validator {
            Some(validator) => validator(candidate),
            None => Ok(()),
        }
    }

    /// Returns a snapshot of the observers in registration order.
    #[must_use]
    pub fn observers(&self) -> Vec<Arc<dyn StateObserver>> {
        self.observers.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Returns the number of attached observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Swaps in a new value and returns the previous one.
    pub(crate) fn replace(&self, next: Arc<StateValue>) -> Arc<StateValue> {
        let mut guard = self.value.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, next)
    }

    /// Appends an observer.
    fn push_observer(&self, observer: Arc<dyn StateObserver>) {
        self.observers.write().unwrap_or_else(PoisonError::into_inner).push(observer);
    }
}

impl fmt::Debug for StateEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateEntry")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("persistent", &self.persistent)
            .field("observers", &self.observer_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Table of state entries keyed by name.
#[derive(Debug, Default)]
pub struct ObservableRegistry {
    /// Entries keyed by name.
    entries: RwLock<BTreeMap<String, Arc<StateEntry>>>,
}

impl ObservableRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entry with its default as the current value.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateName`] when the name is taken,
    /// [`RegistryError::InvalidName`] for malformed names, and
    /// [`RegistryError::InvalidDefault`] when the default fails the
    /// entry's validator.
    pub fn register(&self, spec: StateSpec) -> Result<Arc<StateEntry>, RegistryError> {
        validate_entry_name(&spec.name)?;
        if let Some(validator) = &spec.validator {
            validator(&spec.default).map_err(|reason| RegistryError::InvalidDefault {
                name: spec.name.clone(),
                reason,
            })?;
        }
        let mut entries = self.entries.write().map_err(|_| RegistryError::Lock)?;
        if entries.contains_key(&spec.name) {
            return Err(RegistryError::DuplicateName(spec.name));
        }
        let default = Arc::new(spec.default);
        let entry = Arc::new(StateEntry {
            name: spec.name.clone(),
            value: RwLock::new(Arc::clone(&default)),
            default,
            policy: spec.policy,
            persistent: spec.persistent,
            validator: spec.validator,
            observers: RwLock::new(Vec::new()),
        });
        entries.insert(spec.name, Arc::clone(&entry));
        Ok(entry)
    }

    /// Returns the entry registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownState`] when no such entry exists.
    pub fn entry(&self, name: &str) -> Result<Arc<StateEntry>, RegistryError> {
        let entries = self.entries.read().map_err(|_| RegistryError::Lock)?;
        entries.get(name).cloned().ok_or_else(|| RegistryError::UnknownState(name.to_string()))
    }

    /// Returns the current value of `name` without any permission check.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownState`] when no such entry exists.
    pub fn get(&self, name: &str) -> Result<Arc<StateValue>, RegistryError> {
        Ok(self.entry(name)?.value())
    }

    /// Appends an observer to an entry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownState`] when no such entry exists.
    pub fn add_observer(
        &self,
        name: &str,
        observer: Arc<dyn StateObserver>,
    ) -> Result<(), RegistryError> {
        self.entry(name)?.push_observer(observer);
        Ok(())
    }

    /// Returns true when `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().is_ok_and(|entries| entries.contains_key(name))
    }

    /// Returns every entry ordered by name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Lock`] when the registry lock is poisoned.
    pub fn entries(&self) -> Result<Vec<Arc<StateEntry>>, RegistryError> {
        let entries = self.entries.read().map_err(|_| RegistryError::Lock)?;
        Ok(entries.values().cloned().collect())
    }

    /// Returns every entry name ordered by name.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries.read().map(|entries| entries.keys().cloned().collect()).unwrap_or_default()
    }

    /// Returns the number of registered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or_default()
    }

    /// Returns true when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates an entry name: ASCII letters, digits, `_`, `-`, and `.`.
fn validate_entry_name(name: &str) -> Result<(), RegistryError> {
    if name.is_empty() || name.len() > MAX_ENTRY_NAME_LENGTH {
        return Err(RegistryError::InvalidName(name.to_string()));
    }
    if !name.bytes().all(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-' | b'.')) {
        return Err(RegistryError::InvalidName(name.to_string()));
    }
    Ok(())
}
