// crates/camstate-core/src/runtime/pipeline.rs
// ============================================================================
// Module: camstate Mutation Pipeline
// Description: The only path through which a state value changes.
// Purpose: Look up, authorize, validate, apply, persist, and dispatch.
// Dependencies: crate::{core, interfaces, runtime}, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`MutationPipeline::mutate`] runs in strict order:
//! 1. resolve the entry ([`StateError::UnknownState`]);
//! 2. authorize the write ([`StateError::PermissionDenied`]);
//! 3. run the validator ([`StateError::Validation`]);
//! 4. swap the value under the pipeline lock;
//! 5. write through to the value store when the entry is persistent;
//! 6. queue the change for the entry's observers.
//!
//! Steps 4 to 6 run under a single lock, so applies never interleave and the
//! dispatcher receives changes in sequence order. A failed write-through is a
//! degraded success: the in-memory value stays applied, the entry is marked
//! dirty, and [`MutationPipeline::flush_pending`] retries it.
//!
//! # Invariants
//! - Failures in steps 1 to 3 leave the value unchanged and fire no observer.
//! - Sequence numbers increase by one per applied change.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use thiserror::Error;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::core::Access;
use crate::core::Caller;
use crate::core::StateValue;
use crate::interfaces::ChangeOrigin;
use crate::interfaces::StateChange;
use crate::interfaces::StateObserver;
use crate::interfaces::ValueStore;
use crate::interfaces::ValueStoreError;
use crate::runtime::dispatch::DispatchConfig;
use crate::runtime::dispatch::DispatchError;
use crate::runtime::dispatch::DispatchStats;
use crate::runtime::dispatch::ObserverDispatcher;
use crate::runtime::gate::AccessDecision;
use crate::runtime::gate::PermissionGate;
use crate::runtime::registry::ObservableRegistry;
use crate::runtime::registry::RegistryError;
use crate::runtime::registry::StateEntry;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Registry and pipeline errors.
///
/// # Invariants
/// - `UnknownState`, `PermissionDenied`, and `Validation` are recoverable and
///   leave no trace in state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    /// No entry with the given name exists.
    #[error("unknown state entry: {0}")]
    UnknownState(String),
    /// Caller lacks the required capability.
    #[error("caller {caller} may not {access} {name}")]
    PermissionDenied {
        /// Entry name.
        name: String,
        /// Caller identifier.
        caller: String,
        /// Denied operation label.
        access: &'static str,
    },
    /// Candidate rejected by the entry validator.
    #[error("invalid value for {name}: {reason}")]
    Validation {
        /// Entry name.
        name: String,
        /// Validator message.
        reason: String,
    },
    /// Write-through to the value store failed; the value stays applied.
    #[error("failed to persist {name}: {reason}")]
    Persistence {
        /// Entry name.
        name: String,
        /// Store error message.
        reason: String,
    },
    /// Registration failed.
    #[error("registry error: {0}")]
    Registry(String),
    /// Observer dispatch failed.
    #[error("dispatch error: {0}")]
    Dispatch(String),
    /// Pipeline lock poisoned.
    #[error("mutation pipeline lock poisoned")]
    Lock,
    /// Pipeline has been closed.
    #[error("mutation pipeline closed")]
    Closed,
}

impl StateError {
    /// Returns the entry name the error refers to, when there is one.
    #[must_use]
    pub fn entry_name(&self) -> Option<&str> {
        match self {
            Self::UnknownState(name)
            | Self::PermissionDenied {
                name, ..
            }
            | Self::Validation {
                name, ..
            }
            | Self::Persistence {
                name, ..
            } => Some(name),
            Self::Registry(_) | Self::Dispatch(_) | Self::Lock | Self::Closed => None,
        }
    }
}

impl From<RegistryError> for StateError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::UnknownState(name) => Self::UnknownState(name),
            RegistryError::Lock => Self::Lock,
            other => Self::Registry(other.to_string()),
        }
    }
}

impl From<DispatchError> for StateError {
    fn from(error: DispatchError) -> Self {
        match error {
            DispatchError::Stopped => Self::Closed,
            other => Self::Dispatch(other.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Proof of an applied change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationReceipt {
    /// Entry name.
    pub name: String,
    /// Sequence number assigned to the change.
    pub sequence: u64,
}

/// Result of a successful apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Applied and, when persistent, durably written.
    Applied(MutationReceipt),
    /// Applied in memory but the write-through failed.
    Degraded {
        /// Receipt of the applied change.
        receipt: MutationReceipt,
        /// The [`StateError::Persistence`] error.
        error: StateError,
    },
}

impl MutationOutcome {
    /// Returns the receipt.
    #[must_use]
    pub const fn receipt(&self) -> &MutationReceipt {
        match self {
            Self::Applied(receipt)
            | Self::Degraded {
                receipt, ..
            } => receipt,
        }
    }

    /// Returns true when the write-through failed.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    /// Returns the persistence error of a degraded outcome.
    #[must_use]
    pub const fn degradation(&self) -> Option<&StateError> {
        match self {
            Self::Applied(_) => None,
            Self::Degraded {
                error, ..
            } => Some(error),
        }
    }
}

// ============================================================================
// SECTION: Pipeline
// ============================================================================

/// State guarded by the single-writer lock.
#[derive(Debug, Default)]
struct PipelineState {
    /// Last assigned sequence number.
    sequence: u64,
    /// Persistent entries whose last write-through failed.
    dirty: BTreeSet<String>,
    /// Set by [`MutationPipeline::close`].
    closed: bool,
}

/// How an apply treats persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Persist {
    /// Write through when the entry is persistent.
    WriteThrough,
    /// Skip the store; the value already matches it or must not be written.
    Skip,
}

/// Single-writer funnel for every state change.
pub struct MutationPipeline {
    /// Registry holding the entries.
    registry: Arc<ObservableRegistry>,
    /// Gate used for read and write checks.
    gate: PermissionGate,
    /// Durable snapshot store.
    values: Arc<dyn ValueStore>,
    /// Background observer delivery.
    dispatcher: ObserverDispatcher,
    /// Single-writer state.
    state: Mutex<PipelineState>,
}

impl MutationPipeline {
    /// Creates a pipeline and starts its dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Dispatch`] when the dispatcher cannot start.
    pub fn new(
        registry: Arc<ObservableRegistry>,
        values: Arc<dyn ValueStore>,
        dispatch: DispatchConfig,
    ) -> Result<Self, StateError> {
        let dispatcher = ObserverDispatcher::start(dispatch)?;
        Ok(Self {
            gate: PermissionGate::new(Arc::clone(&registry)),
            registry,
            values,
            dispatcher,
            state: Mutex::new(PipelineState::default()),
        })
    }

    /// Returns the registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ObservableRegistry> {
        &self.registry
    }

    /// Returns the permission gate.
    #[must_use]
    pub const fn gate(&self) -> &PermissionGate {
        &self.gate
    }

    /// Returns the value store.
    #[must_use]
    pub fn value_store(&self) -> Arc<dyn ValueStore> {
        Arc::clone(&self.values)
    }

    /// Appends an observer to an entry.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnknownState`] when no such entry exists.
    pub fn add_observer(&self, name: &str, observer: Arc<dyn StateObserver>) -> Result<(), StateError> {
        Ok(self.registry.add_observer(name, observer)?)
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Returns the current value without a permission check.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnknownState`] when no such entry exists.
    pub fn get(&self, name: &str) -> Result<Arc<StateValue>, StateError> {
        Ok(self.registry.get(name)?)
    }

    /// Returns the current value when `caller` may read it.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnknownState`] or
    /// [`StateError::PermissionDenied`].
    pub fn read(&self, caller: &Caller, name: &str) -> Result<Arc<StateValue>, StateError> {
        let entry = self.registry.entry(name)?;
        if PermissionGate::check(caller, &entry, Access::Read) == AccessDecision::Deny {
            return Err(denied(caller, name, Access::Read));
        }
        Ok(entry.value())
    }

    /// Returns every entry `caller` may read, keyed by name.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Lock`] when the registry lock is poisoned.
    pub fn snapshot(&self, caller: &Caller) -> Result<BTreeMap<String, Arc<StateValue>>, StateError> {
        Ok(self
            .registry
            .entries()?
            .into_iter()
            .filter(|entry| PermissionGate::check(caller, entry, Access::Read).is_allowed())
            .map(|entry| (entry.name().to_string(), entry.value()))
            .collect())
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Runs lookup, write authorization, and validation without applying.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnknownState`], [`StateError::PermissionDenied`],
    /// or [`StateError::Validation`].
    pub fn precheck(
        &self,
        caller: &Caller,
        name: &str,
        candidate: &StateValue,
    ) -> Result<Arc<StateEntry>, StateError> {
        let entry = self.registry.entry(name)?;
        if PermissionGate::check(caller, &entry, Access::Write) == AccessDecision::Deny {
            return Err(denied(caller, name, Access::Write));
        }
        entry.validate(candidate).map_err(|reason| StateError::Validation {
            name: name.to_string(),
            reason,
        })?;
        Ok(entry)
    }

    /// Mutates an entry on behalf of `caller`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnknownState`], [`StateError::PermissionDenied`],
    /// or [`StateError::Validation`] without changing anything, and
    /// [`StateError::Closed`] after [`MutationPipeline::close`]. Persistence
    /// failures are reported through [`MutationOutcome::Degraded`].
    pub fn mutate(
        &self,
        caller: &Caller,
        name: &str,
        candidate: StateValue,
    ) -> Result<MutationOutcome, StateError> {
        let entry = self.precheck(caller, name, &candidate)?;
        self.apply(&entry, candidate, ChangeOrigin::Caller(caller.id().to_string()), Persist::WriteThrough)
    }

    /// Applies a value without permission or validator checks.
    ///
    /// Used for values whose authority is the metadata store.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnknownState`] or [`StateError::Closed`].
    pub fn force_apply(
        &self,
        name: &str,
        value: StateValue,
        origin: ChangeOrigin,
    ) -> Result<MutationOutcome, StateError> {
        let entry = self.registry.entry(name)?;
        self.apply(&entry, value, origin, Persist::WriteThrough)
    }

    /// Applies a value loaded from the value store. The value is validated
    /// but not written back.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnknownState`] or [`StateError::Validation`].
    pub fn restore(&self, name: &str, value: StateValue) -> Result<MutationReceipt, StateError> {
        let entry = self.registry.entry(name)?;
        entry.validate(&value).map_err(|reason| StateError::Validation {
            name: name.to_string(),
            reason,
        })?;
        let outcome = self.apply(&entry, value, ChangeOrigin::Restore, Persist::Skip)?;
        Ok(outcome.receipt().clone())
    }

    /// Returns an entry to its default without writing the store.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnknownState`] or [`StateError::Closed`].
    pub fn reset_to_default(&self, name: &str) -> Result<MutationReceipt, StateError> {
        let entry = self.registry.entry(name)?;
        let default = entry.default_value().as_ref().clone();
        let outcome = self.apply(&entry, default, ChangeOrigin::Reset, Persist::Skip)?;
        Ok(outcome.receipt().clone())
    }

    /// Swaps the value, persists, and queues observers under the lock.
    fn apply(
        &self,
        entry: &Arc<StateEntry>,
        value: StateValue,
        origin: ChangeOrigin,
        persist: Persist,
    ) -> Result<MutationOutcome, StateError> {
        let mut state = self.lock_state()?;
        if state.closed {
            return Err(StateError::Closed);
        }
        let next = Arc::new(value);
        let previous = entry.replace(Arc::clone(&next));
        state.sequence += 1;
        let receipt = MutationReceipt {
            name: entry.name().to_string(),
            sequence: state.sequence,
        };

        let mut degradation = None;
        if entry.is_persistent() {
            match persist {
                Persist::WriteThrough => match self.values.save(entry.name(), &next) {
                    Ok(()) => {
                        state.dirty.remove(entry.name());
                    }
                    Err(err) => {
                        warn!(entry = entry.name(), error = %err, "write-through failed; value kept in memory");
                        state.dirty.insert(entry.name().to_string());
                        degradation = Some(persistence_error(entry.name(), &err));
                    }
                },
                Persist::Skip => {
                    state.dirty.remove(entry.name());
                }
            }
        }

        let change = StateChange {
            name: entry.name().to_string(),
            old: previous,
            new: next,
            origin,
            sequence: receipt.sequence,
        };
        if let Err(err) = self.dispatcher.dispatch(change, entry.observers()) {
            error!(entry = entry.name(), sequence = receipt.sequence, error = %err, "change not dispatched");
        }
        drop(state);

        Ok(match degradation {
            None => MutationOutcome::Applied(receipt),
            Some(error) => MutationOutcome::Degraded {
                receipt,
                error,
            },
        })
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Returns the entries whose last write-through failed.
    #[must_use]
    pub fn pending_persistence(&self) -> Vec<String> {
        self.lock_state().map(|state| state.dirty.iter().cloned().collect()).unwrap_or_default()
    }

    /// Re-persists every dirty entry with its current value, then flushes
    /// the value store. Returns the number of entries written.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Persistence`] for the first entry that still
    /// fails; it stays dirty.
    pub fn flush_pending(&self) -> Result<usize, StateError> {
        let mut state = self.lock_state()?;
        let mut written = 0;
        let mut first_failure = None;
        let pending: Vec<String> = state.dirty.iter().cloned().collect();
        for name in pending {
            let entry = self.registry.entry(&name)?;
            match self.values.save(&name, &entry.value()) {
                Ok(()) => {
                    state.dirty.remove(&name);
                    written += 1;
                }
                Err(err) => {
                    warn!(entry = %name, error = %err, "retry of write-through failed");
                    if first_failure.is_none() {
                        first_failure = Some(persistence_error(&name, &err));
                    }
                }
            }
        }
        drop(state);
        if let Some(error) = first_failure {
            return Err(error);
        }
        self.values.flush().map_err(|err| persistence_error("*", &err))?;
        if written > 0 {
            debug!(written, "pending state persisted");
        }
        Ok(written)
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Blocks until every queued change has reached its observers.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Closed`] when the dispatcher is stopped.
    pub fn drain(&self) -> Result<(), StateError> {
        Ok(self.dispatcher.drain()?)
    }

    /// Rejects further changes, then drains and stops the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Closed`] when a lane exited before draining.
    pub fn close(&self) -> Result<(), StateError> {
        {
            let mut state = self.lock_state()?;
            state.closed = true;
        }
        Ok(self.dispatcher.shutdown()?)
    }

    /// Returns true after [`MutationPipeline::close`].
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock_state().map_or(true, |state| state.closed)
    }

    /// Returns observer delivery counters.
    #[must_use]
    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    /// Locks the single-writer state.
    fn lock_state(&self) -> Result<MutexGuard<'_, PipelineState>, StateError> {
        self.state.lock().map_err(|_| StateError::Lock)
    }
}

impl std::fmt::Debug for MutationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationPipeline")
            .field("entries", &self.registry.len())
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a permission error.
fn denied(caller: &Caller, name: &str, access: Access) -> StateError {
    StateError::PermissionDenied {
        name: name.to_string(),
        caller: caller.id().to_string(),
        access: access.as_str(),
    }
}

/// Builds a persistence error.
fn persistence_error(name: &str, error: &ValueStoreError) -> StateError {
    StateError::Persistence {
        name: name.to_string(),
        reason: error.to_string(),
    }
}
