// crates/camstate-store-sqlite/src/migrations.rs
// ============================================================================
// Module: Metadata Schema Migrations
// Description: Built-in schema migrations for the metadata database.
// Purpose: Define the relational schema as an ordered list of steps.
// Dependencies: camstate-core
// ============================================================================

//! ## Overview
//! Version 1 creates the relational tables; later versions only add indexes.
//! Each step runs inside the transaction that records it in the
//! `migrations` ledger, so a step is either fully applied and recorded or
//! not applied at all.

use camstate_core::Migration;

/// Ledger table, created when the store opens.
pub(crate) const LEDGER_SQL: &str = "CREATE TABLE IF NOT EXISTS migrations (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);";

/// Version 1: categories, tags, and recordings.
const V1_TABLES: &str = "CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    color TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY,
    category_id INTEGER NOT NULL REFERENCES categories(id),
    timestamp INTEGER NOT NULL,
    title TEXT,
    note TEXT,
    created_by TEXT,
    deleted INTEGER DEFAULT 0
);
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY,
    filename TEXT NOT NULL,
    media_type TEXT,
    encoding TEXT,
    timestamp_start INTEGER,
    timestamp_end INTEGER,
    duration INTEGER,
    size INTEGER,
    resolution TEXT,
    fps REAL,
    state TEXT,
    tag_markers INTEGER
);";

/// Version 2: tag timeline lookups.
const V2_TAG_TIMESTAMP_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_tags_timestamp ON tags (timestamp);";

/// Version 3: recording range lookups.
const V3_RECORD_START_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_records_timestamp_start ON records (timestamp_start);";

/// Built-in migrations in application order.
pub const MIGRATIONS: [Migration; 3] = [
    Migration::new(1, "create categories, tags, and records", V1_TABLES),
    Migration::new(2, "index tags by timestamp", V2_TAG_TIMESTAMP_INDEX),
    Migration::new(3, "index records by start time", V3_RECORD_START_INDEX),
];

/// Returns the highest built-in migration version.
#[must_use]
pub const fn latest_version() -> i64 {
    MIGRATIONS[MIGRATIONS.len() - 1].version
}
