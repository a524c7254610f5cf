// crates/camstate-daemon/src/protocol.rs
// ============================================================================
// Module: Mutation Request Contract
// Description: Client mutation requests, acknowledgements, and rejections.
// Purpose: Apply a flat key/value request with all-keys-checked-first rules.
// Dependencies: camstate-core, serde, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! A [`MutationRequest`] is a flat JSON object of entry names to values.
//! Every key is looked up, authorized, converted, and validated before any
//! value is applied, so a request naming an unknown key or a forbidden entry
//! changes nothing. Keys are processed in lexicographic order; the first
//! failing key is reported with a [`ReasonCode`].
//!
//! A `categories` value is also checked against the metadata store, so a
//! catalog the store would refuse (a removed category with active tags, a
//! duplicate name) is rejected as `invalid` before anything is applied.
//!
//! A key can still fail while applying if a concurrent writer changed the
//! policy inputs between the check and the apply. Keys applied before it
//! stay applied and the rejection names the failing key.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use camstate_core::Access;
use camstate_core::AccessDecision;
use camstate_core::CATEGORIES_KEY;
use camstate_core::Caller;
use camstate_core::MutationPipeline;
use camstate_core::StateError;
use camstate_core::StateValue;
use camstate_core::SyncBridge;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::audit::AuditOutcome;
use crate::audit::MutationAuditEvent;
use crate::audit::StateAuditSink;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Flat mutation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationRequest {
    /// Entry name to requested value.
    pub values: BTreeMap<String, serde_json::Value>,
}

impl MutationRequest {
    /// Creates an empty request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one key.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    /// Parses a request body.
    ///
    /// # Errors
    ///
    /// Returns a [`MutationRejection`] with [`ReasonCode::Invalid`] when the
    /// body is not a JSON object.
    pub fn from_json_str(body: &str) -> Result<Self, MutationRejection> {
        serde_json::from_str(body).map_err(|err| MutationRejection {
            key: String::new(),
            reason: ReasonCode::Invalid,
            message: format!("malformed request: {err}"),
        })
    }
}

/// Reason a key was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasonCode {
    /// No entry with that name.
    Unknown,
    /// Caller may not write the entry.
    Forbidden,
    /// Value failed conversion or validation.
    Invalid,
}

impl ReasonCode {
    /// Classifies a pipeline error.
    #[must_use]
    pub const fn from_error(error: &StateError) -> Self {
        match error {
            StateError::UnknownState(_) => Self::Unknown,
            StateError::PermissionDenied {
                ..
            } => Self::Forbidden,
            _ => Self::Invalid,
        }
    }

    /// Returns the wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Forbidden => "forbidden",
            Self::Invalid => "invalid",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful request result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationAck {
    /// Keys changed, in processing order.
    pub changed: Vec<String>,
    /// Changed keys whose persistence is pending.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<String>,
}

/// Failed request result naming the first failing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{reason} {key}: {message}")]
pub struct MutationRejection {
    /// Failing key.
    pub key: String,
    /// Reason code.
    pub reason: ReasonCode,
    /// Human-readable detail.
    pub message: String,
}

impl MutationRejection {
    /// Builds a rejection from a pipeline error.
    #[must_use]
    pub fn from_error(key: &str, error: &StateError) -> Self {
        Self {
            key: key.to_string(),
            reason: ReasonCode::from_error(error),
            message: error.to_string(),
        }
    }
}

// ============================================================================
// SECTION: Apply
// ============================================================================

/// Applies a request on behalf of `caller`.
///
/// # Errors
///
/// Returns the [`MutationRejection`] for the first failing key.
pub fn apply_request(
    pipeline: &MutationPipeline,
    bridge: &SyncBridge,
    caller: &Caller,
    request: &MutationRequest,
    audit: &dyn StateAuditSink,
) -> Result<MutationAck, MutationRejection> {
    let mut candidates = Vec::with_capacity(request.values.len());
    for (key, json) in &request.values {
        match check_key(pipeline, bridge, caller, key, json) {
            Ok(candidate) => candidates.push((key.as_str(), candidate)),
            Err(rejection) => {
                audit.record(&MutationAuditEvent::new(caller.id(), key, AuditOutcome::Rejected, Some(rejection.reason)));
                return Err(rejection);
            }
        }
    }

    let mut ack = MutationAck::default();
    for (key, candidate) in candidates {
        match pipeline.mutate(caller, key, candidate) {
            Ok(outcome) => {
                let audited = if outcome.is_degraded() {
                    ack.degraded.push(key.to_string());
                    AuditOutcome::Degraded
                } else {
                    AuditOutcome::Applied
                };
                audit.record(&MutationAuditEvent::new(caller.id(), key, audited, None));
                ack.changed.push(key.to_string());
            }
            Err(err) => {
                let rejection = MutationRejection::from_error(key, &err);
                warn!(caller = caller.id(), key, applied = ack.changed.len(), error = %err, "request failed while applying");
                audit.record(&MutationAuditEvent::new(caller.id(), key, AuditOutcome::Rejected, Some(rejection.reason)));
                return Err(rejection);
            }
        }
    }
    Ok(ack)
}

/// Runs lookup, authorization, conversion, and validation for one key.
fn check_key(
    pipeline: &MutationPipeline,
    bridge: &SyncBridge,
    caller: &Caller,
    key: &str,
    json: &serde_json::Value,
) -> Result<StateValue, MutationRejection> {
    match pipeline.gate().authorize(caller, key, Access::Write) {
        Ok(AccessDecision::Allow) => {}
        Ok(AccessDecision::Deny) => {
            return Err(MutationRejection::from_error(
                key,
                &StateError::PermissionDenied {
                    name: key.to_string(),
                    caller: caller.id().to_string(),
                    access: Access::Write.as_str(),
                },
            ));
        }
        Err(err) => return Err(MutationRejection::from_error(key, &StateError::from(err))),
    }
    let candidate = StateValue::from_json(json.clone()).map_err(|err| MutationRejection {
        key: key.to_string(),
        reason: ReasonCode::Invalid,
        message: err.to_string(),
    })?;
    pipeline.precheck(caller, key, &candidate).map_err(|err| MutationRejection::from_error(key, &err))?;
    if key == CATEGORIES_KEY {
        bridge.check_registry_state(&candidate).map_err(|err| MutationRejection {
            key: key.to_string(),
            reason: ReasonCode::Invalid,
            message: err.to_string(),
        })?;
    }
    Ok(candidate)
}
