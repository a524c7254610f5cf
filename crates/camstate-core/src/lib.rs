// crates/camstate-core/src/lib.rs
// ============================================================================
// Module: camstate Core Library
// Description: Public API surface for the camstate state core.
// Purpose: Expose the value model, store interfaces, and runtime components.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! camstate core owns the observable state registry of the camera server: a
//! table of named, typed, permission-gated values whose every change flows
//! through a single mutation pipeline. Durable storage and hardware live
//! behind the traits in [`interfaces`]; this crate never opens files or
//! devices itself.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;

pub use interfaces::ChangeOrigin;
pub use interfaces::FnObserver;
pub use interfaces::MetadataStore;
pub use interfaces::MetadataStoreError;
pub use interfaces::Migration;
pub use interfaces::ObserverError;
pub use interfaces::SeedOutcome;
pub use interfaces::StateChange;
pub use interfaces::StateObserver;
pub use interfaces::ValueStore;
pub use interfaces::ValueStoreError;
pub use runtime::AccessDecision;
pub use runtime::BootstrapReport;
pub use runtime::CategoryOp;
pub use runtime::DispatchConfig;
pub use runtime::DispatchError;
pub use runtime::DispatchStats;
pub use runtime::InMemoryMetadataStore;
pub use runtime::InMemoryValueStore;
pub use runtime::MutationOutcome;
pub use runtime::MutationPipeline;
pub use runtime::MutationReceipt;
pub use runtime::NewCategory;
pub use runtime::ObservableRegistry;
pub use runtime::ObserverDispatcher;
pub use runtime::PermissionGate;
pub use runtime::RegistryError;
pub use runtime::StateEntry;
pub use runtime::StateError;
pub use runtime::StateSpec;
pub use runtime::SyncBridge;
pub use runtime::SyncError;
pub use runtime::Validator;
