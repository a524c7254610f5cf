// crates/camstate-daemon/src/lib.rs
// ============================================================================
// Module: camstate Daemon
// Description: State core assembly for the camera server.
// Purpose: Wire stores, modules, hardware, and client fan-out in a fixed order.
// Dependencies: camstate-config, camstate-core, camstate-store-sqlite, tracing
// ============================================================================

//! ## Overview
//! [`LifecycleController`] turns a [`camstate_config::CamstateConfig`] into a
//! running [`StateCore`]. The remaining modules provide the seams the state
//! core talks to: hardware probing and actuation, client broadcast, the
//! mutation request contract, and the audit trail.

pub mod audit;
pub mod broadcast;
pub mod hardware;
pub mod lifecycle;
pub mod logging;
pub mod modules;
pub mod protocol;

pub use audit::AuditOutcome;
pub use audit::FileAuditSink;
pub use audit::MutationAuditEvent;
pub use audit::NoopAuditSink;
pub use audit::StateAuditSink;
pub use audit::StderrAuditSink;
pub use audit::build_audit_sink;
pub use broadcast::BroadcastObserver;
pub use broadcast::ChannelBroadcaster;
pub use broadcast::ClientBroadcaster;
pub use broadcast::NoopBroadcaster;
pub use broadcast::StateUpdate;
pub use hardware::ActuatorObserver;
pub use hardware::HardwareActuator;
pub use hardware::HardwareCapabilities;
pub use hardware::HardwareError;
pub use hardware::HardwareProbe;
pub use hardware::NullHardware;
pub use lifecycle::LifecycleController;
pub use lifecycle::LifecycleError;
pub use lifecycle::ResetReport;
pub use lifecycle::ShutdownReport;
pub use lifecycle::StartupReport;
pub use lifecycle::StateCore;
pub use logging::LOG_ENV_VAR;
pub use logging::filter_directive;
pub use logging::init_logging;
pub use modules::CameraModule;
pub use modules::CatalogModule;
pub use modules::HardwareModule;
pub use modules::StateModule;
pub use modules::SystemModule;
pub use protocol::MutationAck;
pub use protocol::MutationRejection;
pub use protocol::MutationRequest;
pub use protocol::ReasonCode;
pub use protocol::apply_request;
