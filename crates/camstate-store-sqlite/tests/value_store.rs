// crates/camstate-store-sqlite/tests/value_store.rs
// ============================================================================
// Module: SQLite Value Store Tests
// Description: Durability and integrity of the SQLite value store.
// Purpose: Validate restart round trips, resets, size limits, and corruption.
// ============================================================================

//! ## Overview
//! Exercises [`SqliteValueStore`] against real database files.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;

use camstate_core::StateValue;
use camstate_core::ValueStore;
use camstate_core::ValueStoreError;
use camstate_store_sqlite::MAX_VALUE_BYTES;
use camstate_store_sqlite::SqliteStoreConfig;
use camstate_store_sqlite::SqliteStoreError;
use camstate_store_sqlite::SqliteStoreMode;
use camstate_store_sqlite::SqliteValueStore;
use rusqlite::Connection;
use rusqlite::params;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn open_at(path: &Path) -> SqliteValueStore {
    SqliteValueStore::open(SqliteStoreConfig::new(path)).expect("open value store")
}

fn theme() -> StateValue {
    let mut map = BTreeMap::new();
    map.insert("mode".to_string(), StateValue::Text("dark".to_string()));
    map.insert("contrast".to_string(), StateValue::Float(1.25));
    map.insert("presets".to_string(), StateValue::List(vec![StateValue::Int(1), StateValue::Bool(false)]));
    StateValue::Map(map)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn values_survive_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("values.sqlite");
    {
        let store = open_at(&path);
        store.save("theme", &theme()).unwrap();
        store.save("categoryCounter", &StateValue::Int(6)).unwrap();
        store.save("categoryCounter", &StateValue::Int(7)).unwrap();
        store.flush().unwrap();
        store.close().unwrap();
    }
    let store = open_at(&path);
    assert_eq!(store.load("theme").unwrap(), Some(theme()));
    let all = store.load_all().unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all.get("categoryCounter"), Some(&StateValue::Int(7)));
}

#[test]
fn missing_key_loads_none() {
    let dir = TempDir::new().unwrap();
    let store = open_at(&dir.path().join("values.sqlite"));
    assert_eq!(store.load("absent").unwrap(), None);
    store.remove("absent").unwrap();
}

#[test]
fn reset_keeps_only_preserved_keys() {
    let dir = TempDir::new().unwrap();
    let store = open_at(&dir.path().join("values.sqlite"));
    store.save("categories", &StateValue::empty_map()).unwrap();
    store.save("categoryCounter", &StateValue::Int(3)).unwrap();
    store.save("theme", &theme()).unwrap();

    let keep: BTreeSet<String> = ["categories", "categoryCounter", "neverStored"].iter().map(ToString::to_string).collect();
    let preserved = store.reset_preserving(&keep).unwrap();

    assert_eq!(preserved.len(), 2);
    assert_eq!(store.load("theme").unwrap(), None);
    assert_eq!(store.load("categoryCounter").unwrap(), Some(StateValue::Int(3)));
    assert_eq!(store.load_all().unwrap().len(), 2);
}

#[test]
fn oversized_value_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = open_at(&dir.path().join("values.sqlite"));
    let big = StateValue::Text("x".repeat(MAX_VALUE_BYTES + 1));
    assert!(matches!(store.save("big", &big), Err(ValueStoreError::Invalid(_))));
    assert_eq!(store.load("big").unwrap(), None);
}

#[test]
fn undecodable_row_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("values.sqlite");
    open_at(&path).close().unwrap();
    let raw = Connection::open(&path).unwrap();
    raw.execute(
        "INSERT INTO state_values (key, value_json, updated_at) VALUES ('theme', 'null', 0)",
        params![],
    )
    .unwrap();
    drop(raw);

    let store = open_at(&path);
    assert!(matches!(store.load("theme"), Err(ValueStoreError::Corrupt(_))));
    assert!(matches!(store.load_all(), Err(ValueStoreError::Corrupt(_))));
}

#[test]
fn unknown_schema_version_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("values.sqlite");
    open_at(&path).close().unwrap();
    let raw = Connection::open(&path).unwrap();
    raw.execute("UPDATE store_meta SET version = 99", params![]).unwrap();
    drop(raw);

    let err = SqliteValueStore::open(SqliteStoreConfig::new(&path)).unwrap_err();
    assert!(matches!(err, SqliteStoreError::VersionMismatch(_)));
}

#[test]
fn delete_journal_mode_flushes_without_checkpoint() {
    let dir = TempDir::new().unwrap();
    let mut config = SqliteStoreConfig::new(dir.path().join("values.sqlite"));
    config.journal_mode = SqliteStoreMode::Delete;
    let store = SqliteValueStore::open(config).unwrap();
    store.save("theme", &theme()).unwrap();
    store.flush().unwrap();
}

#[test]
fn closed_store_rejects_writes() {
    let dir = TempDir::new().unwrap();
    let store = open_at(&dir.path().join("values.sqlite"));
    store.close().unwrap();
    assert!(matches!(store.save("theme", &theme()), Err(ValueStoreError::Closed)));
}
