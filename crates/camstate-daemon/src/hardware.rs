// crates/camstate-daemon/src/hardware.rs
// ============================================================================
// Module: Hardware Seams
// Description: Capability probing and actuation interfaces for device I/O.
// Purpose: Keep GPIO and sensor drivers outside the state core.
// Dependencies: camstate-core, serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! The state core never talks to drivers directly. A [`HardwareProbe`]
//! reports what the device supports once at startup, and a
//! [`HardwareActuator`] receives hardware-bound entry changes through
//! [`ActuatorObserver`]. [`NullHardware`] implements both for hosts without
//! camera hardware and for tests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use camstate_core::ChangeOrigin;
use camstate_core::ObserverError;
use camstate_core::StateChange;
use camstate_core::StateObserver;
use camstate_core::StateValue;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Hardware seam errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HardwareError {
    /// Capability detection failed.
    #[error("hardware probe failed: {0}")]
    Probe(String),
    /// Driver rejected or failed a change.
    #[error("hardware actuation failed: {0}")]
    Actuation(String),
    /// Device is absent or not ready.
    #[error("hardware unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// SECTION: Capabilities
// ============================================================================

/// Detected device capabilities.
///
/// # Invariants
/// - `resolutions` is non-empty and ordered best first.
/// - `max_fps` is positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareCapabilities {
    /// Infrared illuminator present.
    pub ir_led: bool,
    /// Switchable infrared cut filter present.
    pub ir_cut: bool,
    /// Supported capture resolutions, best first.
    pub resolutions: Vec<String>,
    /// Highest supported frame rate.
    pub max_fps: i64,
}

impl HardwareCapabilities {
    /// Capabilities assumed when probing fails.
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            ir_led: false,
            ir_cut: false,
            resolutions: vec!["1280x720".to_string()],
            max_fps: 30,
        }
    }

    /// Checks the struct invariants.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Probe`] naming the violated invariant.
    pub fn validate(&self) -> Result<(), HardwareError> {
        if self.resolutions.is_empty() || self.resolutions.iter().any(|resolution| resolution.trim().is_empty()) {
            return Err(HardwareError::Probe("resolutions must be non-empty".to_string()));
        }
        if self.max_fps <= 0 {
            return Err(HardwareError::Probe("max fps must be positive".to_string()));
        }
        Ok(())
    }

    /// Returns the preferred resolution.
    #[must_use]
    pub fn default_resolution(&self) -> &str {
        self.resolutions.first().map_or("1280x720", String::as_str)
    }

    /// Returns true when `resolution` is supported.
    #[must_use]
    pub fn supports_resolution(&self, resolution: &str) -> bool {
        self.resolutions.iter().any(|supported| supported == resolution)
    }

    /// Encodes the capabilities as a state value.
    #[must_use]
    pub fn to_value(&self) -> StateValue {
        let mut fields = BTreeMap::new();
        fields.insert("irLed".to_string(), StateValue::Bool(self.ir_led));
        fields.insert("irCut".to_string(), StateValue::Bool(self.ir_cut));
        fields.insert(
            "resolutions".to_string(),
            StateValue::List(self.resolutions.iter().map(|resolution| StateValue::Text(resolution.clone())).collect()),
        );
        fields.insert("maxFps".to_string(), StateValue::Int(self.max_fps));
        StateValue::Map(fields)
    }
}

// ============================================================================
// SECTION: Interfaces
// ============================================================================

/// Reports device capabilities.
pub trait HardwareProbe: Send + Sync {
    /// Detects capabilities.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError`] when detection fails.
    fn probe(&self) -> Result<HardwareCapabilities, HardwareError>;
}

/// Applies hardware-bound entry values to the device.
pub trait HardwareActuator: Send + Sync {
    /// Drives the device to match `value` for entry `key`.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError`] when the driver fails.
    fn actuate(&self, key: &str, value: &StateValue) -> Result<(), HardwareError>;
}

/// Probe and actuator for hosts without camera hardware.
#[derive(Debug, Clone)]
pub struct NullHardware {
    /// Capabilities reported by the probe.
    capabilities: HardwareCapabilities,
}

impl NullHardware {
    /// Creates a null device reporting `capabilities`.
    #[must_use]
    pub const fn new(capabilities: HardwareCapabilities) -> Self {
        Self {
            capabilities,
        }
    }
}

impl Default for NullHardware {
    fn default() -> Self {
        Self::new(HardwareCapabilities::minimal())
    }
}

impl HardwareProbe for NullHardware {
    fn probe(&self) -> Result<HardwareCapabilities, HardwareError> {
        Ok(self.capabilities.clone())
    }
}

impl HardwareActuator for NullHardware {
    fn actuate(&self, key: &str, value: &StateValue) -> Result<(), HardwareError> {
        debug!(entry = key, kind = value.kind().as_str(), "null hardware ignored actuation");
        Ok(())
    }
}

// ============================================================================
// SECTION: Observer
// ============================================================================

/// Observer forwarding entry changes to a [`HardwareActuator`].
///
/// Restored values are always forwarded so the device matches state after a
/// restart; other unchanged values are skipped.
pub struct ActuatorObserver {
    /// Actuator receiving changes.
    actuator: Arc<dyn HardwareActuator>,
}

impl ActuatorObserver {
    /// Wraps an actuator.
    #[must_use]
    pub fn new(actuator: Arc<dyn HardwareActuator>) -> Self {
        Self {
            actuator,
        }
    }
}

impl StateObserver for ActuatorObserver {
    fn label(&self) -> &str {
        "hardware-actuator"
    }

    fn on_change(&self, change: &StateChange) -> Result<(), ObserverError> {
        if change.origin != ChangeOrigin::Restore && change.old == change.new {
            return Ok(());
        }
        self.actuator.actuate(&change.name, &change.new).map_err(|err| match err {
            HardwareError::Unavailable(message) => ObserverError::Unavailable(message),
            other => ObserverError::Failed(other.to_string()),
        })
    }
}
