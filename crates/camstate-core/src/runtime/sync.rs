// crates/camstate-core/src/runtime/sync.rs
// ============================================================================
// Module: camstate Sync Bridge
// Description: Category reconciliation between the registry and metadata store.
// Purpose: Keep the "categories" entry and the categories table identical.
// Dependencies: crate::{core, interfaces, runtime}, thiserror, tracing
// ============================================================================

//! ## Overview
//! The bridge moves category data in three directions:
//! - bootstrap: seed an empty categories table from the registry entry;
//! - push: mirror a live change of the entry into the table;
//! - load: overwrite the entry with the table contents.
//!
//! The metadata store owns category identity after bootstrap; the registry
//! entry is authoritative during live operation and the last writer wins.
//! Catalog operations on the bridge write the table first so constraint
//! violations reject the operation before the registry changes.
//!
//! # Invariants
//! - After a completed catalog operation the entry and the table hold the
//!   same set of categories.
//! - Push operations are idempotent; replaying a change is harmless.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::Weak;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use thiserror::Error;
use tracing::info;
use tracing::warn;

use crate::core::CATEGORIES_KEY;
use crate::core::CATEGORY_COUNTER_KEY;
use crate::core::Caller;
use crate::core::Category;
use crate::core::CategoryId;
use crate::core::SkippedCategory;
use crate::core::StateValue;
use crate::core::Timestamp;
use crate::core::decode_categories;
use crate::core::encode_categories;
use crate::interfaces::ChangeOrigin;
use crate::interfaces::MetadataStore;
use crate::interfaces::MetadataStoreError;
use crate::interfaces::ObserverError;
use crate::interfaces::StateChange;
use crate::interfaces::StateObserver;
use crate::runtime::pipeline::MutationPipeline;
use crate::runtime::pipeline::StateError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Sync bridge errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Registry or pipeline rejected the operation.
    #[error(transparent)]
    State(#[from] StateError),
    /// Metadata store rejected the operation.
    #[error(transparent)]
    Store(#[from] MetadataStoreError),
    /// Catalog operation input rejected.
    #[error("invalid category operation: {0}")]
    Invalid(String),
    /// Catalog lock poisoned.
    #[error("category catalog lock poisoned")]
    Lock,
}

/// Kind of category change pushed to the metadata store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryOp {
    /// Category added.
    Insert,
    /// Name or color changed.
    Update,
    /// Category removed.
    Delete,
}

/// Input for a new category. Without a caller-assigned id the next free id
/// is taken from the counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCategory {
    /// Caller-assigned id.
    pub id: Option<CategoryId>,
    /// Display name.
    pub name: String,
    /// Display color.
    pub color: String,
}

impl NewCategory {
    /// Creates a new category request.
    #[must_use]
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            color: color.into(),
        }
    }

    /// Uses `id` instead of allocating one.
    #[must_use]
    pub fn with_id(mut self, id: CategoryId) -> Self {
        self.id = Some(id);
        self
    }
}

/// Outcome of [`SyncBridge::bootstrap_if_empty`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// True when the table was empty and seeding ran.
    pub seeded: bool,
    /// Categories written to the table.
    pub inserted: Vec<CategoryId>,
    /// Entries not copied, with reasons from decoding and from the store.
    pub skipped: Vec<SkippedCategory>,
}

// ============================================================================
// SECTION: Bridge
// ============================================================================

/// Category bridge between the registry and the metadata store.
pub struct SyncBridge {
    /// Pipeline owning the categories entry.
    pipeline: Arc<MutationPipeline>,
    /// Relational metadata store.
    store: Arc<dyn MetadataStore>,
    /// Serializes catalog operations.
    catalog: Mutex<()>,
    /// Set when a push failed and the two sides may differ.
    divergent: AtomicBool,
}

impl SyncBridge {
    /// Creates a bridge.
    #[must_use]
    pub fn new(pipeline: Arc<MutationPipeline>, store: Arc<dyn MetadataStore>) -> Arc<Self> {
        Arc::new(Self {
            pipeline,
            store,
            catalog: Mutex::new(()),
            divergent: AtomicBool::new(false),
        })
    }

    /// Returns the metadata store.
    #[must_use]
    pub fn store(&self) -> Arc<dyn MetadataStore> {
        Arc::clone(&self.store)
    }

    /// Returns true when a push failed since the last load.
    #[must_use]
    pub fn is_divergent(&self) -> bool {
        self.divergent.load(Ordering::Acquire)
    }

    /// Attaches the push observer to the categories entry.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::State`] when the entry is not registered.
    pub fn attach(self: &Arc<Self>) -> Result<(), SyncError> {
        let observer = Arc::new(CategorySyncObserver {
            bridge: Arc::downgrade(self),
        });
        self.pipeline.add_observer(CATEGORIES_KEY, observer)?;
        Ok(())
    }

    /// Seeds the categories table from the registry entry when the table is
    /// empty. The emptiness check and the inserts are one store transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when the entry is missing or the store fails.
    pub fn bootstrap_if_empty(&self) -> Result<BootstrapReport, SyncError> {
        let value = self.pipeline.get(CATEGORIES_KEY)?;
        let decoded = decode_categories(&value);
        let categories: Vec<Category> = decoded.categories.into_values().collect();
        let outcome = self.store.seed_categories_if_empty(&categories)?;
        let mut skipped = decoded.skipped;
        skipped.extend(outcome.skipped);
        for skip in &skipped {
            warn!(key = %skip.key, reason = %skip.reason, "category not bootstrapped");
        }
        if outcome.seeded {
            info!(inserted = outcome.inserted.len(), skipped = skipped.len(), "categories table bootstrapped");
        }
        Ok(BootstrapReport {
            seeded: outcome.seeded,
            inserted: outcome.inserted,
            skipped,
        })
    }

    /// Overwrites the categories entry with the table contents, bypassing
    /// permission and validator checks, and advances the id counter past the
    /// highest stored id. Returns the number of categories loaded.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when the store read or the apply fails.
    pub fn load_into_registry(&self) -> Result<usize, SyncError> {
        let rows = self.store.read_all_categories()?;
        let count = rows.len();
        self.pipeline.force_apply(CATEGORIES_KEY, encode_categories(&rows), ChangeOrigin::Sync)?;
        let next = rows.iter().map(|category| category.id.get()).max().map_or(1, |max| max.saturating_add(1));
        if self.counter()? < next {
            self.pipeline.force_apply(CATEGORY_COUNTER_KEY, StateValue::Int(next), ChangeOrigin::Sync)?;
        }
        self.divergent.store(false, Ordering::Release);
        Ok(count)
    }

    /// Reloads the entry from the table when a push failed.
    /// Returns true when a reload happened.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when the reload fails.
    pub fn reconcile(&self) -> Result<bool, SyncError> {
        if !self.is_divergent() {
            return Ok(false);
        }
        let _catalog = self.lock_catalog()?;
        let count = self.load_into_registry()?;
        info!(categories = count, "category catalog reconciled from metadata store");
        Ok(true)
    }

    /// Mirrors one category change into the table. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] when the store rejects the change; a
    /// delete blocked by active tags surfaces as
    /// [`MetadataStoreError::Integrity`].
    pub fn push_category_change(&self, op: CategoryOp, category: &Category) -> Result<(), SyncError> {
        match op {
            CategoryOp::Insert => match self.store.read_category(category.id)? {
                Some(existing) if existing == *category => Ok(()),
                Some(_) => Ok(self.store.update_category(category)?),
                None => Ok(self.store.insert_category(category)?),
            },
            CategoryOp::Update => match self.store.update_category(category) {
                Err(MetadataStoreError::NotFound(_)) => Ok(self.store.insert_category(category)?),
                other => Ok(other?),
            },
            CategoryOp::Delete => match self.store.read_category(category.id)? {
                None => Ok(()),
                Some(_) => Ok(self.store.delete_category(category.id)?),
            },
        }
    }

    /// Checks that the metadata store would accept `candidate` as the new
    /// categories entry: no removed category has active tags, and names are
    /// non-empty and unique.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] with [`MetadataStoreError::Integrity`] or
    /// [`MetadataStoreError::Invalid`] for the first rejected category.
    pub fn check_registry_state(&self, candidate: &StateValue) -> Result<(), SyncError> {
        let proposed = decode_categories(candidate).categories;
        let table: BTreeMap<CategoryId, Category> =
            self.store.read_all_categories()?.into_iter().map(|category| (category.id, category)).collect();
        let ops = diff_categories(&table, &proposed);
        if ops.iter().any(|(op, _)| *op == CategoryOp::Delete) {
            let tagged: BTreeSet<CategoryId> =
                self.store.read_active_tags()?.into_iter().map(|tag| tag.category_id).collect();
            if let Some((_, category)) =
                ops.iter().find(|(op, category)| *op == CategoryOp::Delete && tagged.contains(&category.id))
            {
                return Err(SyncError::Store(MetadataStoreError::Integrity(format!(
                    "category {} is referenced by active tags",
                    category.id
                ))));
            }
        }
        let mut names = BTreeSet::new();
        for category in proposed.values() {
            if category.name.trim().is_empty() || category.color.trim().is_empty() {
                return Err(SyncError::Store(MetadataStoreError::Invalid(format!(
                    "category {} needs a name and a color",
                    category.id
                ))));
            }
            if !names.insert(category.name.as_str()) {
                return Err(SyncError::Store(MetadataStoreError::Integrity(format!(
                    "category name already exists: {}",
                    category.name
                ))));
            }
        }
        Ok(())
    }

    /// Pushes every difference between the entry and the table into the
    /// table, continuing past rejected operations. Returns the number of
    /// operations applied.
    ///
    /// # Errors
    ///
    /// Returns the first rejection; the bridge is then marked divergent.
    pub fn push_registry_state(&self) -> Result<usize, SyncError> {
        let _catalog = self.lock_catalog()?;
        let registry = self.current()?;
        let table: BTreeMap<CategoryId, Category> =
            self.store.read_all_categories()?.into_iter().map(|category| (category.id, category)).collect();
        let mut applied = 0;
        let mut first_failure = None;
        for (op, category) in diff_categories(&table, &registry) {
            match self.push_category_change(op, category) {
                Ok(()) => applied += 1,
                Err(err) => {
                    warn!(op = op_label(op), category = %category.id, error = %err, "category push rejected");
                    if first_failure.is_none() {
                        first_failure = Some(err);
                    }
                }
            }
        }
        match first_failure {
            None => Ok(applied),
            Some(err) => {
                self.divergent.store(true, Ordering::Release);
                Err(err)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Catalog operations
    // ------------------------------------------------------------------------

    /// Returns the categories held by the registry entry.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when the entry is missing or unreadable.
    pub fn categories(&self, caller: &Caller) -> Result<BTreeMap<CategoryId, Category>, SyncError> {
        let value = self.pipeline.read(caller, CATEGORIES_KEY)?;
        Ok(decode_categories(&value).categories)
    }

    /// Creates a category with the requested id, or the next free id.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::State`] when the caller may not write the
    /// catalog, [`SyncError::Invalid`] for a non-positive id, and
    /// [`SyncError::Store`] with [`MetadataStoreError::Integrity`] on a taken
    /// id or a duplicate name.
    pub fn insert_category(&self, caller: &Caller, request: NewCategory) -> Result<Category, SyncError> {
        let _catalog = self.lock_catalog()?;
        let mut categories = self.current()?;
        let floor = categories.keys().next_back().map_or(1, |id| id.get().saturating_add(1));
        let counter = self.counter()?;
        let id = match request.id {
            Some(id) if id.get() < 1 => {
                return Err(SyncError::Invalid(format!("category id must be positive: {id}")));
            }
            Some(id) if categories.contains_key(&id) => {
                return Err(SyncError::Store(MetadataStoreError::Integrity(format!(
                    "category id already exists: {id}"
                ))));
            }
            Some(id) => id,
            None => CategoryId::new(counter.max(floor)),
        };
        let category = Category {
            id,
            name: request.name,
            color: request.color,
            created_at: Timestamp::now(),
        };
        categories.insert(id, category.clone());
        let candidate = encode_categories(categories.values());
        self.pipeline.precheck(caller, CATEGORIES_KEY, &candidate)?;

        self.store.insert_category(&category)?;
        if let Err(err) = self.commit(caller, candidate) {
            self.compensate(|| self.store.delete_category(id));
            return Err(err);
        }
        let next = id.get().saturating_add(1);
        if next > counter {
            self.pipeline.force_apply(
                CATEGORY_COUNTER_KEY,
                StateValue::Int(next),
                ChangeOrigin::Caller(caller.id().to_string()),
            )?;
        }
        info!(category = %id, caller = caller.id(), "category created");
        Ok(category)
    }

    /// Renames or recolors an existing category.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] with [`MetadataStoreError::NotFound`] for
    /// unknown ids or [`MetadataStoreError::Integrity`] on a duplicate name.
    pub fn update_category(
        &self,
        caller: &Caller,
        id: CategoryId,
        name: &str,
        color: &str,
    ) -> Result<Category, SyncError> {
        let _catalog = self.lock_catalog()?;
        let mut categories = self.current()?;
        let previous = categories
            .get(&id)
            .cloned()
            .ok_or_else(|| SyncError::Store(MetadataStoreError::NotFound(format!("category {id}"))))?;
        let category = Category {
            name: name.to_string(),
            color: color.to_string(),
            ..previous.clone()
        };
        categories.insert(id, category.clone());
        let candidate = encode_categories(categories.values());
        self.pipeline.precheck(caller, CATEGORIES_KEY, &candidate)?;

        self.store.update_category(&category)?;
        if let Err(err) = self.commit(caller, candidate) {
            self.compensate(|| self.store.update_category(&previous));
            return Err(err);
        }
        Ok(category)
    }

    /// Deletes a category.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] with [`MetadataStoreError::Integrity`]
    /// while an active tag references the category.
    pub fn delete_category(&self, caller: &Caller, id: CategoryId) -> Result<(), SyncError> {
        let _catalog = self.lock_catalog()?;
        let mut categories = self.current()?;
        let previous = categories.remove(&id);
        let candidate = encode_categories(categories.values());
        self.pipeline.precheck(caller, CATEGORIES_KEY, &candidate)?;

        match self.store.delete_category(id) {
            Ok(()) => {}
            Err(MetadataStoreError::NotFound(_)) if previous.is_some() => {}
            Err(err) => return Err(err.into()),
        }
        if let Err(err) = self.commit(caller, candidate) {
            if let Some(previous) = previous {
                self.compensate(|| self.store.insert_category(&previous));
            }
            return Err(err);
        }
        info!(category = %id, caller = caller.id(), "category deleted");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Decodes the current entry without a permission check.
    fn current(&self) -> Result<BTreeMap<CategoryId, Category>, SyncError> {
        let value = self.pipeline.get(CATEGORIES_KEY)?;
        Ok(decode_categories(&value).categories)
    }

    /// Returns the next free id recorded in the counter entry.
    fn counter(&self) -> Result<i64, SyncError> {
        Ok(self.pipeline.get(CATEGORY_COUNTER_KEY)?.as_int().unwrap_or(1))
    }

    /// Applies a checked catalog candidate.
    fn commit(&self, caller: &Caller, candidate: StateValue) -> Result<(), SyncError> {
        let outcome = self.pipeline.mutate(caller, CATEGORIES_KEY, candidate)?;
        if let Some(error) = outcome.degradation() {
            warn!(error = %error, "category catalog applied without persistence");
        }
        Ok(())
    }

    /// Reverts a store write after the registry rejected the change.
    fn compensate<F>(&self, undo: F)
    where
        F: FnOnce() -> Result<(), MetadataStoreError>,
    {
        if let Err(err) = undo() {
            warn!(error = %err, "category store compensation failed");
            self.divergent.store(true, Ordering::Release);
        }
    }

    /// Locks the catalog.
    fn lock_catalog(&self) -> Result<MutexGuard<'_, ()>, SyncError> {
        self.catalog.lock().map_err(|_| SyncError::Lock)
    }
}

impl std::fmt::Debug for SyncBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncBridge").field("divergent", &self.is_divergent()).finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Observer
// ============================================================================

/// Observer mirroring caller-originated catalog changes into the store.
///
/// Each delivery reconciles the current entry against the table, so stale
/// or duplicated deliveries converge on the latest state.
struct CategorySyncObserver {
    /// Bridge; weak so the registry does not keep it alive.
    bridge: Weak<SyncBridge>,
}

impl StateObserver for CategorySyncObserver {
    fn label(&self) -> &str {
        "category-sync"
    }

    fn on_change(&self, change: &StateChange) -> Result<(), ObserverError> {
        // Loads, restores, and resets never flow back into the table.
        if !matches!(change.origin, ChangeOrigin::Caller(_)) {
            return Ok(());
        }
        let Some(bridge) = self.bridge.upgrade() else {
            return Err(ObserverError::Unavailable("sync bridge dropped".to_string()));
        };
        bridge.push_registry_state().map(|_| ()).map_err(|err| ObserverError::Failed(err.to_string()))
    }
}

/// Lists the operations turning `old` into `new`: deletes first, then
/// updates and inserts, each in id order.
fn diff_categories<'a>(
    old: &'a BTreeMap<CategoryId, Category>,
    new: &'a BTreeMap<CategoryId, Category>,
) -> Vec<(CategoryOp, &'a Category)> {
    let mut ops: Vec<(CategoryOp, &Category)> =
        old.iter().filter(|(id, _)| !new.contains_key(id)).map(|(_, category)| (CategoryOp::Delete, category)).collect();
    for (id, category) in new {
        match old.get(id) {
            None => ops.push((CategoryOp::Insert, category)),
            Some(previous) if previous.name != category.name || previous.color != category.color => {
                ops.push((CategoryOp::Update, category));
            }
            Some(_) => {}
        }
    }
    ops
}

/// Returns a log label for an operation.
const fn op_label(op: CategoryOp) -> &'static str {
    match op {
        CategoryOp::Insert => "insert",
        CategoryOp::Update => "update",
        CategoryOp::Delete => "delete",
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::CategoryOp;
    use super::diff_categories;
    use crate::core::Category;
    use crate::core::CategoryId;
    use crate::core::Timestamp;

    fn category(id: i64, name: &str) -> (CategoryId, Category) {
        let category = Category {
            id: CategoryId::new(id),
            name: name.to_string(),
            color: "#112233".to_string(),
            created_at: Timestamp::from_millis(1),
        };
        (category.id, category)
    }

    #[test]
    fn diff_orders_deletes_before_inserts() {
        let old: BTreeMap<_, _> = [category(1, "A"), category(2, "B")].into_iter().collect();
        let new: BTreeMap<_, _> = [category(2, "B2"), category(3, "A")].into_iter().collect();
        let ops: Vec<_> = diff_categories(&old, &new).into_iter().map(|(op, c)| (op, c.id.get())).collect();
        assert_eq!(ops, vec![(CategoryOp::Delete, 1), (CategoryOp::Update, 2), (CategoryOp::Insert, 3)]);
    }
}
