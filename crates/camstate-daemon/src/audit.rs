// crates/camstate-daemon/src/audit.rs
// ============================================================================
// Module: Mutation Audit
// Description: Audit sinks for client mutation requests.
// Purpose: Record who changed which entry and how it ended, never values.
// Dependencies: camstate-config, serde, serde_json
// ============================================================================

//! ## Overview
//! Every key of a mutation request produces one [`MutationAuditEvent`].
//! Events carry the caller, key, outcome, and reason code; values are left
//! out because entries may hold device secrets. Sinks write JSON lines and
//! swallow their own I/O failures so auditing never blocks a mutation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use camstate_config::AuditConfig;
use camstate_config::AuditSinkKind;
use camstate_core::Timestamp;
use serde::Serialize;

use crate::protocol::ReasonCode;

// ============================================================================
// SECTION: Events
// ============================================================================

/// Final state of one audited key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Change applied and persisted.
    Applied,
    /// Change applied, persistence pending.
    Degraded,
    /// Change rejected before applying.
    Rejected,
}

/// Audit record for one key of a mutation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationAuditEvent {
    /// Event type label.
    pub event: &'static str,
    /// Unix milliseconds when the outcome was known.
    pub timestamp_ms: i64,
    /// Caller identifier.
    pub caller: String,
    /// Entry name.
    pub key: String,
    /// Outcome.
    pub outcome: AuditOutcome,
    /// Reason code for rejections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonCode>,
}

impl MutationAuditEvent {
    /// Builds an event stamped with the current time.
    #[must_use]
    pub fn new(caller: &str, key: &str, outcome: AuditOutcome, reason: Option<ReasonCode>) -> Self {
        Self {
            event: "state_mutation",
            timestamp_ms: Timestamp::now().as_millis(),
            caller: caller.to_string(),
            key: key.to_string(),
            outcome,
            reason,
        }
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Receives mutation audit events.
pub trait StateAuditSink: Send + Sync {
    /// Records one event.
    fn record(&self, event: &MutationAuditEvent);
}

/// Sink that discards events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

impl StateAuditSink for NoopAuditSink {
    fn record(&self, _event: &MutationAuditEvent) {}
}

/// Sink writing JSON lines to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrAuditSink;

impl StateAuditSink for StderrAuditSink {
    fn record(&self, event: &MutationAuditEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{line}");
        }
    }
}

/// Sink appending JSON lines to a file.
pub struct FileAuditSink {
    /// Open log file.
    file: Mutex<File>,
}

impl FileAuditSink {
    /// Opens `path` for appending, creating it when missing.
    ///
    /// # Errors
    ///
    /// Returns [`std::io::Error`] when the file cannot be opened.
    pub fn new(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl StateAuditSink for FileAuditSink {
    fn record(&self, event: &MutationAuditEvent) {
        let Ok(line) = serde_json::to_string(event) else {
            return;
        };
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{line}");
        }
    }
}

/// Builds the sink selected by configuration.
///
/// # Errors
///
/// Returns [`std::io::Error`] when the file sink cannot open its target.
pub fn build_audit_sink(config: &AuditConfig) -> std::io::Result<Arc<dyn StateAuditSink>> {
    Ok(match (config.sink, &config.path) {
        (AuditSinkKind::None, _) => Arc::new(NoopAuditSink),
        (AuditSinkKind::Stderr, _) => Arc::new(StderrAuditSink),
        (AuditSinkKind::File, Some(path)) => Arc::new(FileAuditSink::new(path)?),
        (AuditSinkKind::File, None) => {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, "audit file sink requires a path"));
        }
    })
}
