// crates/camstate-store-sqlite/src/metadata.rs
// ============================================================================
// Module: SQLite Metadata Store
// Description: Relational store for categories, tags, recordings, migrations.
// Purpose: Implement MetadataStore with enforced referential integrity.
// Dependencies: camstate-core, rusqlite, tracing
// ============================================================================

//! ## Overview
//! [`SqliteMetadataStore`] implements [`MetadataStore`] over the schema built
//! by [`crate::migrations::MIGRATIONS`]. Opening a file only creates the
//! migration ledger; callers run [`MetadataStore::check_integrity`] and
//! [`MetadataStore::catch_up_migrations`] before any other operation.
//!
//! Tags are never removed, so a category referenced only by soft-deleted tags
//! is deleted with foreign key enforcement briefly suspended on the locked
//! connection. The startup check then ignores deleted tags when it looks for
//! dangling references.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::sync::Mutex;

use camstate_core::Category;
use camstate_core::CategoryId;
use camstate_core::MetadataStore;
use camstate_core::MetadataStoreError;
use camstate_core::Migration;
use camstate_core::MigrationRecord;
use camstate_core::NewRecording;
use camstate_core::NewTag;
use camstate_core::RecordId;
use camstate_core::RecordState;
use camstate_core::RecordingEntry;
use camstate_core::SeedOutcome;
use camstate_core::SkippedCategory;
use camstate_core::Tag;
use camstate_core::TagId;
use camstate_core::Timestamp;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::Transaction;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use tracing::info;

use crate::connection::SqliteStoreConfig;
use crate::connection::SqliteStoreError;
use crate::connection::db_error;
use crate::connection::is_foreign_key_violation;
use crate::connection::open;
use crate::connection::unix_millis;
use crate::migrations::LEDGER_SQL;
use crate::migrations::MIGRATIONS;
use crate::migrations::latest_version;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Category columns in row order.
const CATEGORY_COLUMNS: &str = "id, name, color, created_at";
/// Tag columns in row order.
const TAG_COLUMNS: &str = "id, category_id, timestamp, title, note, created_by, deleted";
/// Recording columns in row order.
const RECORD_COLUMNS: &str = "id, filename, media_type, encoding, timestamp_start, timestamp_end, duration, size, \
                              resolution, fps, state, tag_markers";

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed relational metadata store.
pub struct SqliteMetadataStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Connection; `None` once closed.
    connection: Mutex<Option<Connection>>,
}

impl SqliteMetadataStore {
    /// Opens the metadata database and creates the migration ledger.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Corrupt`] when the file is not a database
    /// and [`SqliteStoreError`] for other open failures.
    pub fn open(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        let connection = open(&config)?;
        connection.execute_batch(LEDGER_SQL).map_err(|err| db_error(&err))?;
        Ok(Self {
            config,
            connection: Mutex::new(Some(connection)),
        })
    }

    /// Returns the database path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Runs `op` on the open connection.
    fn with_connection<T>(
        &self,
        op: impl FnOnce(&mut Connection) -> Result<T, SqliteStoreError>,
    ) -> Result<T, MetadataStoreError> {
        let mut guard =
            self.connection.lock().map_err(|_| MetadataStoreError::Store("mutex poisoned".to_string()))?;
        let connection = guard.as_mut().ok_or(MetadataStoreError::Closed)?;
        op(connection).map_err(MetadataStoreError::from)
    }
}

impl std::fmt::Debug for SqliteMetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteMetadataStore").field("path", &self.config.path).finish_non_exhaustive()
    }
}

impl MetadataStore for SqliteMetadataStore {
    fn insert_category(&self, category: &Category) -> Result<(), MetadataStoreError> {
        validate_category(category)?;
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO categories (id, name, color, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![category.id.get(), category.name, category.color, category.created_at.as_millis()],
            )
            .map_err(|err| db_error(&err))?;
            Ok(())
        })
    }

    fn update_category(&self, category: &Category) -> Result<(), MetadataStoreError> {
        validate_category(category)?;
        self.with_connection(|conn| {
            let changed = conn
                .execute(
                    "UPDATE categories SET name = ?2, color = ?3 WHERE id = ?1",
                    params![category.id.get(), category.name, category.color],
                )
                .map_err(|err| db_error(&err))?;
            if changed == 0 {
                return Err(SqliteStoreError::NotFound(format!("category {}", category.id)));
            }
            Ok(())
        })
    }

    fn delete_category(&self, id: CategoryId) -> Result<(), MetadataStoreError> {
        self.with_connection(|conn| delete_category(conn, id))
    }

    fn read_category(&self, id: CategoryId) -> Result<Option<Category>, MetadataStoreError> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ?1"),
                params![id.get()],
                category_from_row,
            )
            .optional()
            .map_err(|err| db_error(&err))
        })
    }

    fn read_all_categories(&self) -> Result<Vec<Category>, MetadataStoreError> {
        self.with_connection(|conn| {
            query_all(conn, &format!("SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY id"), category_from_row)
        })
    }

    fn seed_categories_if_empty(&self, categories: &[Category]) -> Result<SeedOutcome, MetadataStoreError> {
        self.with_connection(|conn| seed_categories(conn, categories))
    }

    fn insert_tag(&self, tag: &NewTag) -> Result<TagId, MetadataStoreError> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO tags (category_id, timestamp, title, note, created_by, deleted) VALUES (?1, ?2, ?3, \
                 ?4, ?5, 0)",
                params![tag.category_id.get(), tag.timestamp.as_millis(), tag.title, tag.note, tag.created_by],
            )
            .map_err(|err| db_error(&err))?;
            Ok(TagId::new(conn.last_insert_rowid()))
        })
    }

    fn update_tag(&self, id: TagId, title: Option<&str>, note: Option<&str>) -> Result<(), MetadataStoreError> {
        self.with_connection(|conn| {
            let changed = conn
                .execute(
                    "UPDATE tags SET title = ?2, note = ?3 WHERE id = ?1 AND COALESCE(deleted, 0) = 0",
                    params![id.get(), title, note],
                )
                .map_err(|err| db_error(&err))?;
            if changed == 0 {
                return Err(SqliteStoreError::NotFound(format!("tag {id}")));
            }
            Ok(())
        })
    }

    fn soft_delete_tag(&self, id: TagId) -> Result<(), MetadataStoreError> {
        self.with_connection(|conn| {
            let changed = conn
                .execute("UPDATE tags SET deleted = 1 WHERE id = ?1", params![id.get()])
                .map_err(|err| db_error(&err))?;
            if changed == 0 {
                return Err(SqliteStoreError::NotFound(format!("tag {id}")));
            }
            Ok(())
        })
    }

    fn read_active_tags(&self) -> Result<Vec<Tag>, MetadataStoreError> {
        self.with_connection(|conn| {
            query_all(
                conn,
                &format!("SELECT {TAG_COLUMNS} FROM tags WHERE COALESCE(deleted, 0) = 0 ORDER BY timestamp, id"),
                tag_from_row,
            )
        })
    }

    fn read_all_tags(&self) -> Result<Vec<Tag>, MetadataStoreError> {
        self.with_connection(|conn| query_all(conn, &format!("SELECT {TAG_COLUMNS} FROM tags ORDER BY id"), tag_from_row))
    }

    fn read_tags_in_range(&self, start: Timestamp, end: Timestamp) -> Result<Vec<Tag>, MetadataStoreError> {
        self.with_connection(|conn| {
            let mut statement = conn
                .prepare(&format!(
                    "SELECT {TAG_COLUMNS} FROM tags WHERE COALESCE(deleted, 0) = 0 AND timestamp BETWEEN ?1 AND ?2 \
                     ORDER BY timestamp, id"
                ))
                .map_err(|err| db_error(&err))?;
            let rows = statement
                .query_map(params![start.as_millis(), end.as_millis()], tag_from_row)
                .map_err(|err| db_error(&err))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(|err| db_error(&err))
        })
    }

    fn insert_record(&self, record: &NewRecording) -> Result<RecordId, MetadataStoreError> {
        if record.filename.trim().is_empty() {
            return Err(MetadataStoreError::Invalid("recording filename must be non-empty".to_string()));
        }
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO records (filename, media_type, encoding, timestamp_start, timestamp_end, duration, \
                 size, resolution, fps, state, tag_markers) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, (SELECT \
                 COUNT(*) FROM tags WHERE COALESCE(deleted, 0) = 0 AND timestamp BETWEEN ?4 AND ?5))",
                params![
                    record.filename,
                    record.media_type,
                    record.encoding,
                    record.timestamp_start.map(Timestamp::as_millis),
                    record.timestamp_end.map(Timestamp::as_millis),
                    record.duration,
                    record.size,
                    record.resolution,
                    record.fps,
                    record.state.as_str(),
                ],
            )
            .map_err(|err| db_error(&err))?;
            Ok(RecordId::new(conn.last_insert_rowid()))
        })
    }

    fn update_record_state(&self, id: RecordId, state: RecordState) -> Result<(), MetadataStoreError> {
        self.with_connection(|conn| {
            let tx = immediate(conn)?;
            let stored: Option<Option<String>> = tx
                .query_row("SELECT state FROM records WHERE id = ?1", params![id.get()], |row| row.get(0))
                .optional()
                .map_err(|err| db_error(&err))?;
            let Some(stored) = stored else {
                return Err(SqliteStoreError::NotFound(format!("record {id}")));
            };
            let current = parse_state(stored.as_deref())?;
            if !current.can_transition_to(state) {
                return Err(SqliteStoreError::Invalid(format!("record {id} cannot move from {current} to {state}")));
            }
            tx.execute("UPDATE records SET state = ?2 WHERE id = ?1", params![id.get(), state.as_str()])
                .map_err(|err| db_error(&err))?;
            tx.commit().map_err(|err| db_error(&err))
        })
    }

    fn read_record(&self, id: RecordId) -> Result<Option<RecordingEntry>, MetadataStoreError> {
        self.with_connection(|conn| {
            let row = conn
                .query_row(&format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?1"), params![id.get()], record_from_row)
                .optional()
                .map_err(|err| db_error(&err))?;
            row.map(finish_record).transpose()
        })
    }

    fn read_all_records(&self) -> Result<Vec<RecordingEntry>, MetadataStoreError> {
        self.with_connection(|conn| {
            query_all(conn, &format!("SELECT {RECORD_COLUMNS} FROM records ORDER BY id"), record_from_row)?
                .into_iter()
                .map(finish_record)
                .collect()
        })
    }

    fn refresh_tag_markers(&self, id: RecordId) -> Result<i64, MetadataStoreError> {
        self.with_connection(|conn| {
            let tx = immediate(conn)?;
            let range: Option<(Option<i64>, Option<i64>)> = tx
                .query_row(
                    "SELECT timestamp_start, timestamp_end FROM records WHERE id = ?1",
                    params![id.get()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(|err| db_error(&err))?;
            let Some((start, end)) = range else {
                return Err(SqliteStoreError::NotFound(format!("record {id}")));
            };
            let count: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM tags WHERE COALESCE(deleted, 0) = 0 AND timestamp BETWEEN ?1 AND ?2",
                    params![start, end],
                    |row| row.get(0),
                )
                .map_err(|err| db_error(&err))?;
            tx.execute("UPDATE records SET tag_markers = ?2 WHERE id = ?1", params![id.get(), count])
                .map_err(|err| db_error(&err))?;
            tx.commit().map_err(|err| db_error(&err))?;
            Ok(count)
        })
    }

    fn schema_version(&self) -> Result<i64, MetadataStoreError> {
        self.with_connection(|conn| schema_version(conn))
    }

    fn apply_migration(&self, migration: &Migration) -> Result<bool, MetadataStoreError> {
        self.with_connection(|conn| apply_migration(conn, migration))
    }

    fn catch_up_migrations(&self) -> Result<Vec<i64>, MetadataStoreError> {
        self.with_connection(|conn| {
            let current = schema_version(conn)?;
            if current > latest_version() {
                return Err(SqliteStoreError::VersionMismatch(format!(
                    "schema version {current} is newer than supported version {}",
                    latest_version()
                )));
            }
            let mut applied = Vec::new();
            for migration in &MIGRATIONS {
                if apply_migration(conn, migration)? {
                    applied.push(migration.version);
                }
            }
            Ok(applied)
        })
    }

    fn read_migrations(&self) -> Result<Vec<MigrationRecord>, MetadataStoreError> {
        self.with_connection(|conn| {
            query_all(conn, "SELECT version, applied_at FROM migrations ORDER BY version", |row| {
                Ok(MigrationRecord {
                    version: row.get(0)?,
                    applied_at: Timestamp::from_millis(row.get(1)?),
                })
            })
        })
    }

    fn check_integrity(&self) -> Result<(), MetadataStoreError> {
        self.with_connection(|conn| check_integrity(conn))
    }

    fn close(&self) -> Result<(), MetadataStoreError> {
        let mut guard =
            self.connection.lock().map_err(|_| MetadataStoreError::Store("mutex poisoned".to_string()))?;
        match guard.take() {
            None => Ok(()),
            Some(connection) => connection.close().map_err(|(_, err)| MetadataStoreError::from(db_error(&err))),
        }
    }
}

// ============================================================================
// SECTION: Queries
// ============================================================================

/// Starts an immediate (write-locking) transaction.
fn immediate(conn: &mut Connection) -> Result<Transaction<'_>, SqliteStoreError> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate).map_err(|err| db_error(&err))
}

/// Runs a query and collects every mapped row.
fn query_all<T>(
    conn: &Connection,
    sql: &str,
    map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>, SqliteStoreError> {
    let mut statement = conn.prepare(sql).map_err(|err| db_error(&err))?;
    let rows = statement.query_map([], map).map_err(|err| db_error(&err))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(|err| db_error(&err))
}

/// Fails unless the category exists and no active tag references it.
fn ensure_deletable(conn: &Connection, id: CategoryId) -> Result<(), SqliteStoreError> {
    let exists: Option<i64> = conn
        .query_row("SELECT id FROM categories WHERE id = ?1", params![id.get()], |row| row.get(0))
        .optional()
        .map_err(|err| db_error(&err))?;
    if exists.is_none() {
        return Err(SqliteStoreError::NotFound(format!("category {id}")));
    }
    let active: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM tags WHERE category_id = ?1 AND COALESCE(deleted, 0) = 0",
            params![id.get()],
            |row| row.get(0),
        )
        .map_err(|err| db_error(&err))?;
    if active > 0 {
        return Err(SqliteStoreError::Constraint(format!("category {id} is referenced by {active} active tags")));
    }
    Ok(())
}

/// Deletes a category that no active tag references.
fn delete_category(conn: &mut Connection, id: CategoryId) -> Result<(), SqliteStoreError> {
    {
        let tx = immediate(conn)?;
        ensure_deletable(&tx, id)?;
        match tx.execute("DELETE FROM categories WHERE id = ?1", params![id.get()]) {
            Ok(_) => return tx.commit().map_err(|err| db_error(&err)),
            Err(err) if is_foreign_key_violation(&err) => {}
            Err(err) => return Err(db_error(&err)),
        }
    }
    // Only soft-deleted tags still point at the row. The pragma is a no-op
    // inside a transaction, so it brackets a fresh one.
    conn.execute_batch("PRAGMA foreign_keys = OFF;").map_err(|err| db_error(&err))?;
    let deleted = delete_with_soft_references(conn, id);
    let restored = conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(|err| db_error(&err));
    deleted.and(restored)
}

/// Deletes a category while foreign keys are suspended.
fn delete_with_soft_references(conn: &mut Connection, id: CategoryId) -> Result<(), SqliteStoreError> {
    let tx = immediate(conn)?;
    ensure_deletable(&tx, id)?;
    tx.execute("DELETE FROM categories WHERE id = ?1", params![id.get()]).map_err(|err| db_error(&err))?;
    tx.commit().map_err(|err| db_error(&err))?;
    info!(category = %id, "category deleted with soft-deleted tag history");
    Ok(())
}

/// Seeds categories inside one immediate transaction when the table is empty.
fn seed_categories(conn: &mut Connection, categories: &[Category]) -> Result<SeedOutcome, SqliteStoreError> {
    let tx = immediate(conn)?;
    let existing: i64 =
        tx.query_row("SELECT COUNT(*) FROM categories", [], |row| row.get(0)).map_err(|err| db_error(&err))?;
    let mut outcome = SeedOutcome::default();
    if existing > 0 {
        return Ok(outcome);
    }
    outcome.seeded = true;
    for category in categories {
        if let Err(err) = validate_category(category) {
            outcome.skipped.push(skip(category, err.to_string()));
            continue;
        }
        let holder: Option<i64> = tx
            .query_row("SELECT id FROM categories WHERE name = ?1", params![category.name], |row| row.get(0))
            .optional()
            .map_err(|err| db_error(&err))?;
        if holder.is_some_and(|holder| holder != category.id.get()) {
            outcome.skipped.push(skip(category, format!("duplicate name {}", category.name)));
            continue;
        }
        let inserted = tx
            .execute(
                "INSERT INTO categories (id, name, color, created_at) VALUES (?1, ?2, ?3, ?4) ON CONFLICT(id) DO \
                 NOTHING",
                params![category.id.get(), category.name, category.color, category.created_at.as_millis()],
            )
            .map_err(|err| db_error(&err))?;
        if inserted == 1 {
            outcome.inserted.push(category.id);
        }
    }
    tx.commit().map_err(|err| db_error(&err))?;
    Ok(outcome)
}

/// Returns the highest recorded migration version, or 0.
fn schema_version(conn: &Connection) -> Result<i64, SqliteStoreError> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM migrations", [], |row| row.get(0))
        .map_err(|err| db_error(&err))
}

/// Applies one migration and records it in the same transaction.
fn apply_migration(conn: &mut Connection, migration: &Migration) -> Result<bool, SqliteStoreError> {
    if migration.version < 1 {
        return Err(SqliteStoreError::Invalid(format!("migration version must be positive: {}", migration.version)));
    }
    let tx = immediate(conn)?;
    let recorded: Option<i64> = tx
        .query_row("SELECT version FROM migrations WHERE version = ?1", params![migration.version], |row| row.get(0))
        .optional()
        .map_err(|err| db_error(&err))?;
    if recorded.is_some() {
        return Ok(false);
    }
    let current = schema_version(&tx)?;
    if migration.version <= current {
        return Err(SqliteStoreError::VersionMismatch(format!(
            "migration {} is older than schema version {current}",
            migration.version
        )));
    }
    tx.execute_batch(migration.sql).map_err(|err| db_error(&err))?;
    tx.execute(
        "INSERT INTO migrations (version, applied_at) VALUES (?1, ?2)",
        params![migration.version, unix_millis()],
    )
    .map_err(|err| db_error(&err))?;
    tx.commit().map_err(|err| db_error(&err))?;
    info!(version = migration.version, description = migration.description, "schema migration applied");
    Ok(true)
}

/// Runs the startup consistency checks.
fn check_integrity(conn: &Connection) -> Result<(), SqliteStoreError> {
    let report = query_all(conn, "PRAGMA integrity_check", |row| row.get::<_, String>(0))?;
    if report != ["ok"] {
        return Err(SqliteStoreError::Corrupt(format!("integrity_check: {}", report.join("; "))));
    }
    let foreign_keys: i64 =
        conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0)).map_err(|err| db_error(&err))?;
    if foreign_keys != 1 {
        return Err(SqliteStoreError::Corrupt("foreign key enforcement is disabled".to_string()));
    }
    if !table_exists(conn, "tags")? || !table_exists(conn, "categories")? {
        return Ok(());
    }
    let orphan: Option<(i64, i64)> = conn
        .query_row(
            "SELECT t.id, t.category_id FROM tags t LEFT JOIN categories c ON c.id = t.category_id WHERE \
             COALESCE(t.deleted, 0) = 0 AND c.id IS NULL ORDER BY t.id LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(|err| db_error(&err))?;
    match orphan {
        Some((tag, category)) => {
            Err(SqliteStoreError::Corrupt(format!("active tag {tag} references missing category {category}")))
        }
        None => Ok(()),
    }
}

/// Returns true when a table exists.
fn table_exists(conn: &Connection, name: &str) -> Result<bool, SqliteStoreError> {
    let found: Option<String> = conn
        .query_row("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1", params![name], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|err| db_error(&err))?;
    Ok(found.is_some())
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Maps a category row.
fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: CategoryId::new(row.get(0)?),
        name: row.get(1)?,
        color: row.get(2)?,
        created_at: Timestamp::from_millis(row.get(3)?),
    })
}

/// Maps a tag row.
fn tag_from_row(row: &Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: TagId::new(row.get(0)?),
        category_id: CategoryId::new(row.get(1)?),
        timestamp: Timestamp::from_millis(row.get(2)?),
        title: row.get(3)?,
        note: row.get(4)?,
        created_by: row.get(5)?,
        deleted: row.get::<_, Option<i64>>(6)?.unwrap_or(0) != 0,
    })
}

/// Recording row with its raw state label.
type RecordRow = (RecordingEntry, Option<String>);

/// Maps a recording row; the state label is parsed by [`finish_record`].
fn record_from_row(row: &Row<'_>) -> rusqlite::Result<RecordRow> {
    let entry = RecordingEntry {
        id: RecordId::new(row.get(0)?),
        filename: row.get(1)?,
        media_type: row.get(2)?,
        encoding: row.get(3)?,
        timestamp_start: row.get::<_, Option<i64>>(4)?.map(Timestamp::from_millis),
        timestamp_end: row.get::<_, Option<i64>>(5)?.map(Timestamp::from_millis),
        duration: row.get(6)?,
        size: row.get(7)?,
        resolution: row.get(8)?,
        fps: row.get(9)?,
        state: RecordState::Ready,
        tag_markers: row.get::<_, Option<i64>>(11)?.unwrap_or(0),
    };
    Ok((entry, row.get(10)?))
}

/// Parses the state label of a mapped recording row.
fn finish_record((mut entry, state): RecordRow) -> Result<RecordingEntry, SqliteStoreError> {
    entry.state = parse_state(state.as_deref())?;
    Ok(entry)
}

/// Parses a stored state label; a missing label means ready.
fn parse_state(label: Option<&str>) -> Result<RecordState, SqliteStoreError> {
    label.map_or(Ok(RecordState::Ready), |label| label.parse().map_err(SqliteStoreError::Invalid))
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

/// Builds a skip record for a seed entry.
fn skip(category: &Category, reason: String) -> SkippedCategory {
    SkippedCategory {
        key: category.id.to_string(),
        reason,
    }
}
