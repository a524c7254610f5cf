// crates/camstate-core/src/runtime/memory.rs
// ============================================================================
// Module: camstate In-Memory Stores
// Description: In-memory value and metadata stores for tests and demos.
// Purpose: Provide deterministic store implementations without external deps.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! These stores implement the same contracts as the SQLite backends,
//! including name uniqueness, the tag to category reference, soft deletes,
//! and migration ordering. They are not intended for production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

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
use crate::interfaces::MetadataStore;
use crate::interfaces::MetadataStoreError;
use crate::interfaces::Migration;
use crate::interfaces::SeedOutcome;
use crate::interfaces::ValueStore;
use crate::interfaces::ValueStoreError;

// ============================================================================
// SECTION: Value Store
// ============================================================================

/// In-memory value store for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryValueStore {
    /// Stored values keyed by entry name.
    values: Arc<Mutex<BTreeMap<String, StateValue>>>,
}

impl InMemoryValueStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the value map.
    fn guard(&self) -> Result<MutexGuard<'_, BTreeMap<String, StateValue>>, ValueStoreError> {
        self.values.lock().map_err(|_| ValueStoreError::Store("value store mutex poisoned".to_string()))
    }
}

impl ValueStore for InMemoryValueStore {
    fn load(&self, key: &str) -> Result<Option<StateValue>, ValueStoreError> {
        Ok(self.guard()?.get(key).cloned())
    }

    fn load_all(&self) -> Result<BTreeMap<String, StateValue>, ValueStoreError> {
        Ok(self.guard()?.clone())
    }

    fn save(&self, key: &str, value: &StateValue) -> Result<(), ValueStoreError> {
        self.guard()?.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ValueStoreError> {
        self.guard()?.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), ValueStoreError> {
        self.guard()?.clear();
        Ok(())
    }
}

// ============================================================================
// SECTION: Metadata Store
// ============================================================================

/// Tables of the in-memory metadata store.
#[derive(Debug, Default)]
struct MetadataTables {
    /// Category rows.
    categories: BTreeMap<CategoryId, Category>,
    /// Tag rows.
    tags: BTreeMap<TagId, Tag>,
    /// Recording rows.
    records: BTreeMap<RecordId, RecordingEntry>,
    /// Migration ledger.
    migrations: BTreeMap<i64, MigrationRecord>,
    /// Last assigned tag id.
    last_tag: i64,
    /// Last assigned recording id.
    last_record: i64,
}

impl MetadataTables {
    /// Returns an error when another category already uses `name`.
    fn ensure_unique_name(&self, category: &Category) -> Result<(), MetadataStoreError> {
        let taken = self.categories.values().any(|existing| existing.name == category.name && existing.id != category.id);
        if taken {
            return Err(MetadataStoreError::Integrity(format!("category name already exists: {}", category.name)));
        }
        Ok(())
    }

    /// Counts active tags in a recording's range.
    fn active_tags_in(&self, start: Timestamp, end: Timestamp) -> Vec<Tag> {
        let mut tags: Vec<Tag> = self
            .tags
            .values()
            .filter(|tag| !tag.deleted && start <= tag.timestamp && tag.timestamp <= end)
            .cloned()
            .collect();
        tags.sort_by_key(|tag| (tag.timestamp, tag.id));
        tags
    }
}

/// In-memory metadata store for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryMetadataStore {
    /// Tables protected by a mutex.
    tables: Arc<Mutex<MetadataTables>>,
}

impl InMemoryMetadataStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the tables.
    fn guard(&self) -> Result<MutexGuard<'_, MetadataTables>, MetadataStoreError> {
        self.tables.lock().map_err(|_| MetadataStoreError::Store("metadata store mutex poisoned".to_string()))
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn insert_category(&self, category: &Category) -> Result<(), MetadataStoreError> {
        validate_category(category)?;
        let mut tables = self.guard()?;
        if tables.categories.contains_key(&category.id) {
            return Err(MetadataStoreError::Integrity(format!("category id already exists: {}", category.id)));
        }
        tables.ensure_unique_name(category)?;
        tables.categories.insert(category.id, category.clone());
        Ok(())
    }

    fn update_category(&self, category: &Category) -> Result<(), MetadataStoreError> {
        validate_category(category)?;
        let mut tables = self.guard()?;
        tables.ensure_unique_name(category)?;
        let row = tables
            .categories
            .get_mut(&category.id)
            .ok_or_else(|| MetadataStoreError::NotFound(format!("category {}", category.id)))?;
        row.name.clone_from(&category.name);
        row.color.clone_from(&category.color);
        Ok(())
    }

    fn delete_category(&self, id: CategoryId) -> Result<(), MetadataStoreError> {
        let mut tables = self.guard()?;
        if !tables.categories.contains_key(&id) {
            return Err(MetadataStoreError::NotFound(format!("category {id}")));
        }
        let active = tables.tags.values().filter(|tag| tag.category_id == id && !tag.deleted).count();
        if active > 0 {
            return Err(MetadataStoreError::Integrity(format!("category {id} is referenced by {active} active tags")));
        }
        tables.categories.remove(&id);
        Ok(())
    }

    fn read_category(&self, id: CategoryId) -> Result<Option<Category>, MetadataStoreError> {
        Ok(self.guard()?.categories.get(&id).cloned())
    }

    fn read_all_categories(&self) -> Result<Vec<Category>, MetadataStoreError> {
        Ok(self.guard()?.categories.values().cloned().collect())
    }

    fn seed_categories_if_empty(&self, categories: &[Category]) -> Result<SeedOutcome, MetadataStoreError> {
        let mut tables = self.guard()?;
        let mut outcome = SeedOutcome::default();
        if !tables.categories.is_empty() {
            return Ok(outcome);
        }
        outcome.seeded = true;
        for category in categories {
            if tables.categories.contains_key(&category.id) {
                continue;
            }
            if let Err(err) = validate_category(category).and_then(|()| tables.ensure_unique_name(category)) {
                outcome.skipped.push(SkippedCategory {
                    key: category.id.to_string(),
                    reason: err.to_string(),
                });
                continue;
            }
            tables.categories.insert(category.id, category.clone());
            outcome.inserted.push(category.id);
        }
        Ok(outcome)
    }

    fn insert_tag(&self, tag: &NewTag) -> Result<TagId, MetadataStoreError> {
        let mut tables = self.guard()?;
        if !tables.categories.contains_key(&tag.category_id) {
            return Err(MetadataStoreError::Integrity(format!("tag references unknown category {}", tag.category_id)));
        }
        tables.last_tag += 1;
        let id = TagId::new(tables.last_tag);
        tables.tags.insert(
            id,
            Tag {
                id,
                category_id: tag.category_id,
                timestamp: tag.timestamp,
                title: tag.title.clone(),
                note: tag.note.clone(),
                created_by: tag.created_by.clone(),
                deleted: false,
            },
        );
        Ok(id)
    }

    fn update_tag(&self, id: TagId, title: Option<&str>, note: Option<&str>) -> Result<(), MetadataStoreError> {
        let mut tables = self.guard()?;
        let tag = tables
            .tags
            .get_mut(&id)
            .filter(|tag| !tag.deleted)
            .ok_or_else(|| MetadataStoreError::NotFound(format!("tag {id}")))?;
        tag.title = title.map(str::to_string);
        tag.note = note.map(str::to_string);
        Ok(())
    }

    fn soft_delete_tag(&self, id: TagId) -> Result<(), MetadataStoreError> {
        let mut tables = self.guard()?;
        let tag = tables.tags.get_mut(&id).ok_or_else(|| MetadataStoreError::NotFound(format!("tag {id}")))?;
        tag.deleted = true;
        Ok(())
    }

    fn read_active_tags(&self) -> Result<Vec<Tag>, MetadataStoreError> {
        let tables = self.guard()?;
        Ok(tables.active_tags_in(Timestamp::from_millis(i64::MIN), Timestamp::from_millis(i64::MAX)))
    }

    fn read_all_tags(&self) -> Result<Vec<Tag>, MetadataStoreError> {
        Ok(self.guard()?.tags.values().cloned().collect())
    }

    fn read_tags_in_range(&self, start: Timestamp, end: Timestamp) -> Result<Vec<Tag>, MetadataStoreError> {
        Ok(self.guard()?.active_tags_in(start, end))
    }

    fn insert_record(&self, record: &NewRecording) -> Result<RecordId, MetadataStoreError> {
        if record.filename.trim().is_empty() {
            return Err(MetadataStoreError::Invalid("recording filename must be non-empty".to_string()));
        }
        let mut tables = self.guard()?;
        tables.last_record += 1;
        let id = RecordId::new(tables.last_record);
        let tag_markers = match (record.timestamp_start, record.timestamp_end) {
            (Some(start), Some(end)) => i64::try_from(tables.active_tags_in(start, end).len()).unwrap_or(i64::MAX),
            _ => 0,
        };
        tables.records.insert(
            id,
            RecordingEntry {
                id,
                filename: record.filename.clone(),
                media_type: record.media_type.clone(),
                encoding: record.encoding.clone(),
                timestamp_start: record.timestamp_start,
                timestamp_end: record.timestamp_end,
                duration: record.duration,
                size: record.size,
                resolution: record.resolution.clone(),
                fps: record.fps,
                state: record.state,
                tag_markers,
            },
        );
        Ok(id)
    }

    fn update_record_state(&self, id: RecordId, state: RecordState) -> Result<(), MetadataStoreError> {
        let mut tables = self.guard()?;
        let record = tables.records.get_mut(&id).ok_or_else(|| MetadataStoreError::NotFound(format!("record {id}")))?;
        if !record.state.can_transition_to(state) {
            return Err(MetadataStoreError::Invalid(format!("record {id} cannot move from {} to {state}", record.state)));
        }
        record.state = state;
        Ok(())
    }

    fn read_record(&self, id: RecordId) -> Result<Option<RecordingEntry>, MetadataStoreError> {
        Ok(self.guard()?.records.get(&id).cloned())
    }

    fn read_all_records(&self) -> Result<Vec<RecordingEntry>, MetadataStoreError> {
        Ok(self.guard()?.records.values().cloned().collect())
    }

    fn refresh_tag_markers(&self, id: RecordId) -> Result<i64, MetadataStoreError> {
        let mut tables = self.guard()?;
        let record = tables.records.get(&id).ok_or_else(|| MetadataStoreError::NotFound(format!("record {id}")))?;
        let count = match (record.timestamp_start, record.timestamp_end) {
            (Some(start), Some(end)) => i64::try_from(tables.active_tags_in(start, end).len()).unwrap_or(i64::MAX),
            _ => 0,
        };
        if let Some(record) = tables.records.get_mut(&id) {
            record.tag_markers = count;
        }
        Ok(count)
    }

    fn schema_version(&self) -> Result<i64, MetadataStoreError> {
        Ok(self.guard()?.migrations.keys().next_back().copied().unwrap_or(0))
    }

    fn apply_migration(&self, migration: &Migration) -> Result<bool, MetadataStoreError> {
        let mut tables = self.guard()?;
        if tables.migrations.contains_key(&migration.version) {
            return Ok(false);
        }
        let current = tables.migrations.keys().next_back().copied().unwrap_or(0);
        if migration.version <= current {
            return Err(MetadataStoreError::VersionMismatch(format!(
                "migration {} is older than schema version {current}",
                migration.version
            )));
        }
        tables.migrations.insert(
            migration.version,
            MigrationRecord {
                version: migration.version,
                applied_at: Timestamp::now(),
            },
        );
        Ok(true)
    }

    fn read_migrations(&self) -> Result<Vec<MigrationRecord>, MetadataStoreError> {
        Ok(self.guard()?.migrations.values().copied().collect())
    }

    fn check_integrity(&self) -> Result<(), MetadataStoreError> {
        let tables = self.guard()?;
        let orphan = tables.tags.values().find(|tag| !tag.deleted && !tables.categories.contains_key(&tag.category_id));
        match orphan {
            Some(tag) => Err(MetadataStoreError::StartupIntegrity(format!(
                "active tag {} references missing category {}",
                tag.id, tag.category_id
            ))),
            None => Ok(()),
        }
    }
}

/// Rejects categories with blank names or colors.
fn validate_category(category: &Category) -> Result<(), MetadataStoreError> {
    if category.name.trim().is_empty() {
        return Err(MetadataStoreError::Invalid("category name must be non-empty".to_string()));
    }
    if category.color.trim().is_empty() {
        return Err(MetadataStoreError::Invalid("category color must be non-empty".to_string()));
    }
    Ok(())
}
