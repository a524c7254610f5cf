// crates/camstate-store-sqlite/src/lib.rs
// ============================================================================
// Module: camstate SQLite Stores
// Description: SQLite backends for the metadata and value store interfaces.
// Purpose: Provide durable storage for the camera server state core.
// Dependencies: camstate-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides two independent `SQLite` databases:
//! - [`SqliteMetadataStore`]: the relational schema for categories, tags,
//!   recordings, and the migration ledger, with foreign keys enforced;
//! - [`SqliteValueStore`]: one JSON value per persistent state entry.
//!
//! Both open with the same connection defaults and fail closed on corrupt
//! files. Database contents are treated as untrusted input.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod connection;
pub mod metadata;
pub mod migrations;
pub mod values;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use connection::SqliteStoreConfig;
pub use connection::SqliteStoreError;
pub use connection::SqliteStoreMode;
pub use connection::SqliteSyncMode;
pub use metadata::SqliteMetadataStore;
pub use migrations::MIGRATIONS;
pub use migrations::latest_version;
pub use values::MAX_VALUE_BYTES;
pub use values::SqliteValueStore;
