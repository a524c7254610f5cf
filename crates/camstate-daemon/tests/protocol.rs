// crates/camstate-daemon/tests/protocol.rs
// ============================================================================
// Module: Mutation Request Tests
// Description: Reason codes, all-or-nothing checks, broadcast, and audit.
// ============================================================================
//! ## Overview
//! Exercises the client-facing contract: rejected requests change nothing,
//! accepted requests reach subscribers allowed to read them, and every key
//! leaves one audit line without its value.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use camstate_config::CamstateConfig;
use camstate_core::Caller;
use camstate_core::Capability;
use camstate_core::CapabilitySet;
use camstate_core::ChangeOrigin;
use camstate_core::InMemoryMetadataStore;
use camstate_core::InMemoryValueStore;
use camstate_core::StateChange;
use camstate_core::StateObserver;
use camstate_core::StateValue;
use camstate_daemon::AuditOutcome;
use camstate_daemon::BroadcastObserver;
use camstate_daemon::ChannelBroadcaster;
use camstate_daemon::FileAuditSink;
use camstate_daemon::LifecycleController;
use camstate_daemon::MutationAuditEvent;
use camstate_daemon::MutationRequest;
use camstate_daemon::ReasonCode;
use camstate_daemon::StateAuditSink;
use camstate_daemon::StateCore;
use serde_json::json;

// ============================================================================
// SECTION: Helpers
// ============================================================================

#[derive(Default)]
struct MemoryAudit {
    events: Mutex<Vec<MutationAuditEvent>>,
}

impl StateAuditSink for MemoryAudit {
    fn record(&self, event: &MutationAuditEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn start(controller: LifecycleController) -> StateCore {
    controller
        .startup_with(Arc::new(InMemoryValueStore::new()), Arc::new(InMemoryMetadataStore::new()))
        .unwrap()
}

fn viewer() -> Caller {
    Caller::new("viewer", CapabilitySet::of(&[Capability::Viewer]))
}

fn admin() -> Caller {
    Caller::new("admin", CapabilitySet::of(&[Capability::Admin]))
}

fn text(core: &StateCore, key: &str) -> String {
    core.pipeline().get(key).unwrap().as_text().unwrap().to_string()
}

fn change(name: &str, value: &str) -> StateChange {
    StateChange {
        name: name.to_string(),
        old: Arc::new(StateValue::from("before")),
        new: Arc::new(StateValue::from(value)),
        origin: ChangeOrigin::Caller("admin".to_string()),
        sequence: 7,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn unknown_key_rejects_whole_request() {
    let core = start(LifecycleController::new(CamstateConfig::default()));
    let request = MutationRequest::new().with("theme", json!("dark")).with("zoom", json!(4));

    let rejection = core.apply_request(&admin(), &request).unwrap_err();
    assert_eq!(rejection.key, "zoom");
    assert_eq!(rejection.reason, ReasonCode::Unknown);
    assert_eq!(text(&core, "theme"), "light");
    core.shutdown().unwrap();
}

#[test]
fn forbidden_key_rejects_whole_request() {
    let core = start(LifecycleController::new(CamstateConfig::default()));
    let request = MutationRequest::new().with("deviceName", json!("attic")).with("theme", json!("dark"));

    let rejection = core.apply_request(&viewer(), &request).unwrap_err();
    assert_eq!(rejection.key, "deviceName");
    assert_eq!(rejection.reason, ReasonCode::Forbidden);
    assert_eq!(text(&core, "theme"), "light");

    let ack = core.apply_request(&viewer(), &MutationRequest::new().with("theme", json!("dark"))).unwrap();
    assert_eq!(ack.changed, vec!["theme".to_string()]);
    assert!(ack.degraded.is_empty());
    core.shutdown().unwrap();
}

#[test]
fn invalid_values_are_rejected_before_apply() {
    let core = start(LifecycleController::new(CamstateConfig::default()));
    let request = MutationRequest::new().with("deviceName", json!("attic")).with("theme", json!("sepia"));
    let rejection = core.apply_request(&admin(), &request).unwrap_err();
    assert_eq!((rejection.key.as_str(), rejection.reason), ("theme", ReasonCode::Invalid));
    assert_eq!(text(&core, "deviceName"), "camstate");

    let rejection = core.apply_request(&admin(), &MutationRequest::new().with("timezone", json!(null))).unwrap_err();
    assert_eq!(rejection.reason, ReasonCode::Invalid);
    assert_eq!(text(&core, "timezone"), "UTC");
    core.shutdown().unwrap();
}

#[test]
fn malformed_body_is_invalid() {
    let rejection = MutationRequest::from_json_str("[1, 2]").unwrap_err();
    assert_eq!(rejection.reason, ReasonCode::Invalid);

    let request = MutationRequest::from_json_str(r#"{"theme":"dark","fps":15}"#).unwrap();
    assert_eq!(request.values.len(), 2);
}

#[test]
fn reason_codes_serialize_lowercase() {
    assert_eq!(serde_json::to_string(&ReasonCode::Forbidden).unwrap(), "\"forbidden\"");
    assert_eq!(ReasonCode::Unknown.to_string(), "unknown");
}

#[test]
fn subscribers_receive_accepted_changes() {
    let broadcaster = Arc::new(ChannelBroadcaster::new());
    let updates = broadcaster.subscribe(CapabilitySet::of(&[Capability::Viewer])).unwrap();
    let core = start(LifecycleController::new(CamstateConfig::default()).with_broadcaster(Arc::clone(&broadcaster) as _));

    core.apply_request(&admin(), &MutationRequest::new().with("theme", json!("dark"))).unwrap();
    core.pipeline().drain().unwrap();

    let update = updates.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(update.key, "theme");
    assert_eq!(update.value, json!("dark"));
    assert!(updates.try_recv().is_err());
    core.shutdown().unwrap();
}

#[test]
fn broadcast_skips_subscribers_without_read_access() {
    let broadcaster = Arc::new(ChannelBroadcaster::new());
    let viewer_updates = broadcaster.subscribe(CapabilitySet::of(&[Capability::Viewer])).unwrap();
    let admin_updates = broadcaster.subscribe(CapabilitySet::of(&[Capability::Admin])).unwrap();
    let observer = BroadcastObserver::new(Arc::clone(&broadcaster) as _, CapabilitySet::of(&[Capability::Admin]));

    observer.on_change(&change("wifiPassphrase", "hunter2")).unwrap();

    assert!(viewer_updates.try_recv().is_err());
    let update = admin_updates.try_recv().unwrap();
    assert_eq!(update.sequence, 7);
}

#[test]
fn dropped_subscribers_are_pruned() {
    let broadcaster = Arc::new(ChannelBroadcaster::new());
    let kept = broadcaster.subscribe(CapabilitySet::of(&[Capability::Viewer])).unwrap();
    drop(broadcaster.subscribe(CapabilitySet::of(&[Capability::Viewer])).unwrap());
    let observer = BroadcastObserver::new(Arc::clone(&broadcaster) as _, CapabilitySet::ALL);

    observer.on_change(&change("theme", "dark")).unwrap();

    assert_eq!(broadcaster.subscriber_count(), 1);
    assert!(kept.try_recv().is_ok());
}

#[test]
fn every_key_is_audited_without_values() {
    let audit = Arc::new(MemoryAudit::default());
    let core = start(LifecycleController::new(CamstateConfig::default()).with_audit_sink(Arc::clone(&audit) as _));

    core.apply_request(&admin(), &MutationRequest::new().with("deviceName", json!("attic"))).unwrap();
    core.apply_request(&viewer(), &MutationRequest::new().with("timezone", json!("Asia/Tokyo"))).unwrap_err();

    let events = audit.events.lock().unwrap().clone();
    assert_eq!(events.len(), 2);
    assert_eq!((events[0].key.as_str(), events[0].outcome), ("deviceName", AuditOutcome::Applied));
    assert_eq!(events[1].outcome, AuditOutcome::Rejected);
    assert_eq!(events[1].reason, Some(ReasonCode::Forbidden));
    let line = serde_json::to_string(&events[0]).unwrap();
    assert!(!line.contains("attic"));
    core.shutdown().unwrap();
}

#[test]
fn file_audit_sink_appends_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit").join("mutations.log");
    let sink = FileAuditSink::new(&path).unwrap();
    sink.record(&MutationAuditEvent::new("admin", "theme", AuditOutcome::Applied, None));
    sink.record(&MutationAuditEvent::new("viewer", "deviceName", AuditOutcome::Rejected, Some(ReasonCode::Forbidden)));

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<serde_json::Value> = contents.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["event"], "state_mutation");
    assert_eq!(lines[0]["outcome"], "applied");
    assert!(lines[0].get("reason").is_none());
    assert_eq!(lines[1]["reason"], "forbidden");
}
