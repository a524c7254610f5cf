// crates/camstate-core/src/runtime/mod.rs
// ============================================================================
// Module: camstate Runtime
// Description: Registry, permission gate, mutation pipeline, and sync bridge.
// Purpose: Run the state core on top of the store interfaces.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! The runtime wires the [`ObservableRegistry`] to its single
//! [`MutationPipeline`], the [`PermissionGate`] that guards it, the
//! background [`ObserverDispatcher`], and the [`SyncBridge`] that mirrors
//! categories into the metadata store.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod dispatch;
pub mod gate;
pub mod memory;
pub mod pipeline;
pub mod registry;
pub mod sync;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use dispatch::DispatchConfig;
pub use dispatch::DispatchError;
pub use dispatch::DispatchStats;
pub use dispatch::ObserverDispatcher;
pub use gate::AccessDecision;
pub use gate::PermissionGate;
pub use memory::InMemoryMetadataStore;
pub use memory::InMemoryValueStore;
pub use pipeline::MutationOutcome;
pub use pipeline::MutationPipeline;
pub use pipeline::MutationReceipt;
pub use pipeline::StateError;
pub use registry::ObservableRegistry;
pub use registry::RegistryError;
pub use registry::StateEntry;
pub use registry::StateSpec;
pub use registry::Validator;
pub use sync::BootstrapReport;
pub use sync::CategoryOp;
pub use sync::NewCategory;
pub use sync::SyncBridge;
pub use sync::SyncError;
