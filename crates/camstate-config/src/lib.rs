// crates/camstate-config/src/lib.rs
// ============================================================================
// Module: camstate Config
// Description: Configuration model and loader for the camstate daemon.
// Purpose: Single source of truth for camstate.toml semantics.
// Dependencies: camstate-core, camstate-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded once at startup and validated before any store is
//! opened. See [`CamstateConfig`] for the file layout and resolution order.

pub mod config;

pub use config::AuditConfig;
pub use config::AuditSinkKind;
pub use config::CONFIG_ENV_VAR;
pub use config::CamstateConfig;
pub use config::ConfigError;
pub use config::DEFAULT_CONFIG_NAME;
pub use config::DispatchSection;
pub use config::LoggingConfig;
pub use config::ResetConfig;
pub use config::StorageConfig;
