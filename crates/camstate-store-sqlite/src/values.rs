// crates/camstate-store-sqlite/src/values.rs
// ============================================================================
// Module: SQLite Value Store
// Description: Durable key-value store for persistent state entries.
// Purpose: Keep state values across restarts as canonical JSON text.
// Dependencies: camstate-core, rusqlite, tracing
// ============================================================================

//! ## Overview
//! [`SqliteValueStore`] keeps one row per state key. Values are stored as
//! JSON text and decoded back through [`StateValue::from_json_str`], so a row
//! that no longer decodes surfaces as [`ValueStoreError::Corrupt`] instead of
//! a silent default. The file carries its own `store_meta` version and
//! refuses to open when the version is unknown.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

use camstate_core::StateValue;
use camstate_core::ValueStore;
use camstate_core::ValueStoreError;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use tracing::debug;

use crate::connection::SqliteStoreConfig;
use crate::connection::SqliteStoreError;
use crate::connection::SqliteStoreMode;
use crate::connection::db_error;
use crate::connection::open;
use crate::connection::unix_millis;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum encoded size of a single value.
pub const MAX_VALUE_BYTES: usize = 1024 * 1024;
/// Value store schema version.
const SCHEMA_VERSION: i64 = 1;

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed [`ValueStore`].
pub struct SqliteValueStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Connection; `None` once closed.
    connection: Mutex<Option<Connection>>,
}

impl SqliteValueStore {
    /// Opens the value database, creating the schema on first use.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Corrupt`] for foreign files and
    /// [`SqliteStoreError::VersionMismatch`] for unknown schema versions.
    pub fn open(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        let mut connection = open(&config)?;
        initialize_schema(&mut connection)?;
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
    ) -> Result<T, ValueStoreError> {
        let mut guard =
            self.connection.lock().map_err(|_| ValueStoreError::Store("mutex poisoned".to_string()))?;
        let connection = guard.as_mut().ok_or(ValueStoreError::Closed)?;
        op(connection).map_err(ValueStoreError::from)
    }
}

impl std::fmt::Debug for SqliteValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteValueStore").field("path", &self.config.path).finish_non_exhaustive()
    }
}

impl ValueStore for SqliteValueStore {
    fn load(&self, key: &str) -> Result<Option<StateValue>, ValueStoreError> {
        self.with_connection(|conn| {
            let text: Option<String> = conn
                .query_row("SELECT value_json FROM state_values WHERE key = ?1", params![key], |row| row.get(0))
                .optional()
                .map_err(|err| db_error(&err))?;
            text.map(|text| decode(key, &text)).transpose()
        })
    }

    fn load_all(&self) -> Result<BTreeMap<String, StateValue>, ValueStoreError> {
        self.with_connection(|conn| {
            let mut statement =
                conn.prepare("SELECT key, value_json FROM state_values ORDER BY key").map_err(|err| db_error(&err))?;
            let rows = statement
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
                .map_err(|err| db_error(&err))?;
            let mut values = BTreeMap::new();
            for row in rows {
                let (key, text) = row.map_err(|err| db_error(&err))?;
                let value = decode(&key, &text)?;
                values.insert(key, value);
            }
            Ok(values)
        })
    }

    fn save(&self, key: &str, value: &StateValue) -> Result<(), ValueStoreError> {
        let text = encode(key, value)?;
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO state_values (key, value_json, updated_at) VALUES (?1, ?2, ?3) ON CONFLICT(key) DO \
                 UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
                params![key, text, unix_millis()],
            )
            .map_err(|err| db_error(&err))?;
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> Result<(), ValueStoreError> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM state_values WHERE key = ?1", params![key]).map_err(|err| db_error(&err))?;
            Ok(())
        })
    }

    fn clear(&self) -> Result<(), ValueStoreError> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM state_values", []).map_err(|err| db_error(&err))?;
            Ok(())
        })
    }

    fn reset_preserving(&self, keys: &BTreeSet<String>) -> Result<BTreeMap<String, StateValue>, ValueStoreError> {
        self.with_connection(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate).map_err(|err| db_error(&err))?;
            let mut preserved = BTreeMap::new();
            for key in keys {
                let text: Option<String> = tx
                    .query_row("SELECT value_json FROM state_values WHERE key = ?1", params![key], |row| row.get(0))
                    .optional()
                    .map_err(|err| db_error(&err))?;
                if let Some(text) = text {
                    preserved.insert(key.clone(), decode(key, &text)?);
                }
            }
            let mut removed = 0;
            let mut statement = tx.prepare("SELECT key FROM state_values").map_err(|err| db_error(&err))?;
            let stored = statement
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|err| db_error(&err))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| db_error(&err))?;
            drop(statement);
            for key in stored.iter().filter(|key| !keys.contains(*key)) {
                removed += tx.execute("DELETE FROM state_values WHERE key = ?1", params![key]).map_err(|err| db_error(&err))?;
            }
            tx.commit().map_err(|err| db_error(&err))?;
            debug!(removed, preserved = preserved.len(), "value store reset");
            Ok(preserved)
        })
    }

    fn flush(&self) -> Result<(), ValueStoreError> {
        if self.config.journal_mode != SqliteStoreMode::Wal {
            return Ok(());
        }
        self.with_connection(|conn| {
            conn.query_row("PRAGMA wal_checkpoint(FULL);", [], |_| Ok(())).map_err(|err| db_error(&err))
        })
    }

    fn close(&self) -> Result<(), ValueStoreError> {
        let mut guard = self.connection.lock().map_err(|_| ValueStoreError::Store("mutex poisoned".to_string()))?;
        match guard.take() {
            None => Ok(()),
            Some(connection) => connection.close().map_err(|(_, err)| ValueStoreError::from(db_error(&err))),
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Creates the schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| db_error(&err))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| db_error(&err))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", [], |row| row.get(0))
        .optional()
        .map_err(|err| db_error(&err))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| db_error(&err))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS state_values (
                    key TEXT PRIMARY KEY,
                    value_json TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                );",
            )
            .map_err(|err| db_error(&err))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!("unsupported value store version: {value}")));
        }
    }
    tx.commit().map_err(|err| db_error(&err))
}

/// Encodes a value, enforcing the size limit.
fn encode(key: &str, value: &StateValue) -> Result<String, ValueStoreError> {
    let text = value.to_json_string().map_err(|err| ValueStoreError::Invalid(format!("{key}: {err}")))?;
    if text.len() > MAX_VALUE_BYTES {
        return Err(SqliteStoreError::TooLarge {
            max_bytes: MAX_VALUE_BYTES,
            actual_bytes: text.len(),
        }
        .into());
    }
    Ok(text)
}

/// Decodes stored JSON text.
fn decode(key: &str, text: &str) -> Result<StateValue, SqliteStoreError> {
    StateValue::from_json_str(text).map_err(|err| SqliteStoreError::Corrupt(format!("value for {key}: {err}")))
}
