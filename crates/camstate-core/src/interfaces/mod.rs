// crates/camstate-core/src/interfaces/mod.rs
// ============================================================================
// Module: camstate Interfaces
// Description: Backend-agnostic interfaces for storage and side effects.
// Purpose: Define the contract surfaces consumed by the camstate runtime.
// Dependencies: crate::core, serde, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how the state core reaches durable storage and side
//! effects without embedding backend details. The runtime only ever talks to
//! a [`ValueStore`], a [`MetadataStore`], and a list of [`StateObserver`]s.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::core::Category;
use crate::core::CategoryId;
use crate::core::MigrationRecord;
use crate::core::NewRecording;
use crate::core::NewTag;
use crate::core::RecordId;
use crate::core::RecordState;
use crate::core::RecordingEntry;
use crate::core::SkippedCategory;
use crate::core::StateValue;
use crate::core::Tag;
use crate::core::TagId;
use crate::core::Timestamp;

// ============================================================================
// SECTION: Value Store
// ============================================================================

/// Value store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueStoreError {
    /// Store I/O error.
    #[error("value store io error: {0}")]
    Io(String),
    /// Stored data failed to decode.
    #[error("value store corruption: {0}")]
    Corrupt(String),
    /// Value rejected by the store.
    #[error("value store invalid data: {0}")]
    Invalid(String),
    /// Store has been closed.
    #[error("value store closed")]
    Closed,
    /// Store reported an error.
    #[error("value store error: {0}")]
    Store(String),
}

/// Durable key to value snapshot store.
///
/// One entry per persistent state entry, keyed by its registered name.
pub trait ValueStore: Send + Sync {
    /// Loads a single value.
    ///
    /// # Errors
    ///
    /// Returns [`ValueStoreError`] when loading fails.
    fn load(&self, key: &str) -> Result<Option<StateValue>, ValueStoreError>;

    /// Loads every stored value.
    ///
    /// # Errors
    ///
    /// Returns [`ValueStoreError`] when loading fails.
    fn load_all(&self) -> Result<BTreeMap<String, StateValue>, ValueStoreError>;

    /// Durably writes a value.
    ///
    /// # Errors
    ///
    /// Returns [`ValueStoreError`] when the write is not durable.
    fn save(&self, key: &str, value: &StateValue) -> Result<(), ValueStoreError>;

    /// Removes a value when present.
    ///
    /// # Errors
    ///
    /// Returns [`ValueStoreError`] when removal fails.
    fn remove(&self, key: &str) -> Result<(), ValueStoreError>;

    /// Removes every value.
    ///
    /// # Errors
    ///
    /// Returns [`ValueStoreError`] when clearing fails.
    fn clear(&self) -> Result<(), ValueStoreError>;

    /// Clears the store except for `keys`, returning the preserved values.
    ///
    /// The default implementation snapshots, clears, and restores. Backends
    /// with transactions should override it so a crash cannot lose the
    /// preserved keys.
    ///
    /// # Errors
    ///
    /// Returns [`ValueStoreError`] when any step fails.
    fn reset_preserving(
        &self,
        keys: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, StateValue>, ValueStoreError> {
        let mut preserved = BTreeMap::new();
        for key in keys {
            if let Some(value) = self.load(key)? {
                preserved.insert(key.clone(), value);
            }
        }
        self.clear()?;
        for (key, value) in &preserved {
            self.save(key, value)?;
        }
        Ok(preserved)
    }

    /// Flushes buffered writes to durable media.
    ///
    /// # Errors
    ///
    /// Returns [`ValueStoreError`] when flushing fails.
    fn flush(&self) -> Result<(), ValueStoreError> {
        Ok(())
    }

    /// Closes the store. Later calls fail with [`ValueStoreError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns [`ValueStoreError`] when the backend fails to close cleanly.
    fn close(&self) -> Result<(), ValueStoreError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Metadata Store
// ============================================================================

/// Metadata store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetadataStoreError {
    /// Store I/O error.
    #[error("metadata store io error: {0}")]
    Io(String),
    /// Relational constraint violation; the caller must resolve it.
    #[error("metadata store integrity violation: {0}")]
    Integrity(String),
    /// Referenced row does not exist.
    #[error("metadata store row not found: {0}")]
    NotFound(String),
    /// Rejected input.
    #[error("metadata store invalid data: {0}")]
    Invalid(String),
    /// Schema version conflict.
    #[error("metadata store version mismatch: {0}")]
    VersionMismatch(String),
    /// Consistency check failed; the process must not continue.
    #[error("metadata store failed startup integrity check: {0}")]
    StartupIntegrity(String),
    /// Store has been closed.
    #[error("metadata store closed")]
    Closed,
    /// Store reported an error.
    #[error("metadata store error: {0}")]
    Store(String),
}

/// Schema migration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    /// Monotonic version number, starting at 1.
    pub version: i64,
    /// Short description for logs.
    pub description: &'static str,
    /// SQL batch applied inside the migration transaction.
    pub sql: &'static str,
}

impl Migration {
    /// Creates a migration step.
    #[must_use]
    pub const fn new(version: i64, description: &'static str, sql: &'static str) -> Self {
        Self {
            version,
            description,
            sql,
        }
    }
}

/// Result of seeding an empty category table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedOutcome {
    /// True when the table was empty and seeding ran.
    pub seeded: bool,
    /// Categories written.
    pub inserted: Vec<CategoryId>,
    /// Categories the store declined, with reasons.
    pub skipped: Vec<SkippedCategory>,
}

/// Relational metadata store for categories, tags, recordings, and migrations.
pub trait MetadataStore: Send + Sync {
    /// Inserts a category with its caller-assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataStoreError::Integrity`] on duplicate id or name.
    fn insert_category(&self, category: &Category) -> Result<(), MetadataStoreError>;

    /// Updates name and color of an existing category.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataStoreError::NotFound`] for unknown ids and
    /// [`MetadataStoreError::Integrity`] on a duplicate name.
    fn update_category(&self, category: &Category) -> Result<(), MetadataStoreError>;

    /// Deletes a category.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataStoreError::Integrity`] while any active tag
    /// references the category.
    fn delete_category(&self, id: CategoryId) -> Result<(), MetadataStoreError>;

    /// Reads one category.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataStoreError`] when the read fails.
    fn read_category(&self, id: CategoryId) -> Result<Option<Category>, MetadataStoreError>;

    /// Reads every category ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataStoreError`] when the read fails.
    fn read_all_categories(&self) -> Result<Vec<Category>, MetadataStoreError>;

    /// Inserts `categories` only when the category table is empty.
    ///
    /// The emptiness check and the inserts are one atomic step. Each insert
    /// is insert-if-absent, so a repeated call never duplicates rows.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataStoreError`] when the transaction fails.
    fn seed_categories_if_empty(
        &self,
        categories: &[Category],
    ) -> Result<SeedOutcome, MetadataStoreError>;

    /// Inserts a tag and returns its new id.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataStoreError::Integrity`] when the category is unknown.
    fn insert_tag(&self, tag: &NewTag) -> Result<TagId, MetadataStoreError>;

    /// Updates title and note of an active tag.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataStoreError::NotFound`] for unknown or deleted tags.
    fn update_tag(
        &self,
        id: TagId,
        title: Option<&str>,
        note: Option<&str>,
    ) -> Result<(), MetadataStoreError>;

    /// Marks a tag deleted. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataStoreError::NotFound`] for unknown tags.
    fn soft_delete_tag(&self, id: TagId) -> Result<(), MetadataStoreError>;

    /// Reads tags that are not deleted, ordered by timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataStoreError`] when the read fails.
    fn read_active_tags(&self) -> Result<Vec<Tag>, MetadataStoreError>;

    /// Reads every tag including deleted ones, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataStoreError`] when the read fails.
    fn read_all_tags(&self) -> Result<Vec<Tag>, MetadataStoreError>;

    /// Reads active tags whose timestamp lies in `[start, end]`.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataStoreError`] when the read fails.
    fn read_tags_in_range(
        &self,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<Tag>, MetadataStoreError>;

    /// Inserts a recording and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataStoreError`] when the insert fails.
    fn insert_record(&self, record: &NewRecording) -> Result<RecordId, MetadataStoreError>;

    /// Moves a recording to a new state.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataStoreError::Invalid`] for transitions outside the
    /// `ready <-> recording <-> defect` chain.
    fn update_record_state(
        &self,
        id: RecordId,
        state: RecordState,
    ) -> Result<(), MetadataStoreError>;

    /// Reads one recording.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataStoreError`] when the read fails.
    fn read_record(&self, id: RecordId) -> Result<Option<RecordingEntry>, MetadataStoreError>;

    /// Reads every recording ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataStoreError`] when the read fails.
    fn read_all_records(&self) -> Result<Vec<RecordingEntry>, MetadataStoreError>;

    /// Reads the active tags that fall inside a recording's time range.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataStoreError::NotFound`] for unknown recordings.
    fn read_tags_for_record(&self, id: RecordId) -> Result<Vec<Tag>, MetadataStoreError> {
        let record = self
            .read_record(id)?
            .ok_or_else(|| MetadataStoreError::NotFound(format!("record {id}")))?;
        match (record.timestamp_start, record.timestamp_end) {
            (Some(start), Some(end)) => self.read_tags_in_range(start, end),
            _ => Ok(Vec::new()),
        }
    }

    /// Recomputes the denormalized tag marker count of a recording.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataStoreError::NotFound`] for unknown recordings.
    fn refresh_tag_markers(&self, id: RecordId) -> Result<i64, MetadataStoreError>;

    /// Returns the highest applied migration version, or 0.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataStoreError`] when the ledger cannot be read.
    fn schema_version(&self) -> Result<i64, MetadataStoreError>;

    /// Applies a migration. Returns false when it was already applied.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataStoreError::VersionMismatch`] for a version below the
    /// current one that was never applied.
    fn apply_migration(&self, migration: &Migration) -> Result<bool, MetadataStoreError>;

    /// Applies every built-in migration not yet in the ledger.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataStoreError`] when a migration fails.
    fn catch_up_migrations(&self) -> Result<Vec<i64>, MetadataStoreError> {
        Ok(Vec::new())
    }

    /// Reads the migration ledger ordered by version.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataStoreError`] when the ledger cannot be read.
    fn read_migrations(&self) -> Result<Vec<MigrationRecord>, MetadataStoreError>;

    /// Runs the startup consistency check.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataStoreError::StartupIntegrity`] when the store is
    /// inconsistent.
    fn check_integrity(&self) -> Result<(), MetadataStoreError>;

    /// Closes the store. Later calls fail with [`MetadataStoreError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns [`MetadataStoreError`] when the backend fails to close cleanly.
    fn close(&self) -> Result<(), MetadataStoreError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Observers
// ============================================================================

/// Where a change came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "caller", rename_all = "snake_case")]
pub enum ChangeOrigin {
    /// Mutation requested by a caller.
    Caller(String),
    /// Value restored from the value store at startup.
    Restore,
    /// Value loaded from the metadata store.
    Sync,
    /// Value returned to its default by a factory reset.
    Reset,
}

/// Change delivered to observers.
#[derive(Debug, Clone)]
pub struct StateChange {
    /// Entry name.
    pub name: String,
    /// Value before the change.
    pub old: Arc<StateValue>,
    /// Value after the change.
    pub new: Arc<StateValue>,
    /// Origin of the change.
    pub origin: ChangeOrigin,
    /// Pipeline-wide sequence number, increasing per applied change.
    pub sequence: u64,
}

/// Observer failures. Logged by the dispatcher and never returned to callers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ObserverError {
    /// Side effect failed.
    #[error("observer failed: {0}")]
    Failed(String),
    /// Target of the side effect is unavailable.
    #[error("observer target unavailable: {0}")]
    Unavailable(String),
}

/// Side-effect handler attached to a state entry.
pub trait StateObserver: Send + Sync {
    /// Label used in logs.
    fn label(&self) -> &str;

    /// Handles a change.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError`] when the side effect fails.
    fn on_change(&self, change: &StateChange) -> Result<(), ObserverError>;
}

/// Observer backed by a closure.
pub struct FnObserver<F> {
    /// Label used in logs.
    label: String,
    /// Handler invoked per change.
    handler: F,
}

impl<F> FnObserver<F>
where
    F: Fn(&StateChange) -> Result<(), ObserverError> + Send + Sync,
{
    /// Wraps a closure as an observer.
    pub fn new(label: impl Into<String>, handler: F) -> Self {
        Self {
            label: label.into(),
            handler,
        }
    }
}

impl<F> StateObserver for FnObserver<F>
where
    F: Fn(&StateChange) -> Result<(), ObserverError> + Send + Sync,
{
    fn label(&self) -> &str {
        &self.label
    }

    fn on_change(&self, change: &StateChange) -> Result<(), ObserverError> {
        (self.handler)(change)
    }
}
