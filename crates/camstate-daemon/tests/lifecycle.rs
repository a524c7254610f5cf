// crates/camstate-daemon/tests/lifecycle.rs
// ============================================================================
// Module: Lifecycle Tests
// Description: Startup ordering, restart round trips, factory reset, shutdown.
// ============================================================================
//! ## Overview
//! Drives [`LifecycleController`] against in-memory and `SQLite` stores and
//! checks what survives restarts and factory resets.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use camstate_config::CamstateConfig;
use camstate_core::CATEGORIES_KEY;
use camstate_core::CATEGORY_COUNTER_KEY;
use camstate_core::Caller;
use camstate_core::Capability;
use camstate_core::CapabilitySet;
use camstate_core::CategoryId;
use camstate_core::InMemoryMetadataStore;
use camstate_core::InMemoryValueStore;
use camstate_core::MetadataStore;
use camstate_core::NewCategory;
use camstate_core::NewTag;
use camstate_core::StateValue;
use camstate_core::Timestamp;
use camstate_core::ValueStore;
use camstate_daemon::HardwareActuator;
use camstate_daemon::HardwareCapabilities;
use camstate_daemon::HardwareError;
use camstate_daemon::HardwareProbe;
use camstate_daemon::LifecycleController;
use camstate_daemon::LifecycleError;
use camstate_daemon::MutationRequest;
use camstate_daemon::NullHardware;
use camstate_daemon::ReasonCode;
use camstate_daemon::StateCore;
use serde_json::json;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn config_in(dir: &Path) -> CamstateConfig {
    let mut config = CamstateConfig::default();
    config.storage.state_path = dir.join("state.db");
    config.storage.metadata_path = dir.join("metadata.db");
    config
}

fn admin() -> Caller {
    Caller::new("admin", CapabilitySet::of(&[Capability::Admin]))
}

fn operator() -> Caller {
    Caller::new("operator", CapabilitySet::of(&[Capability::Operator]))
}

fn in_memory(controller: LifecycleController) -> (StateCore, InMemoryValueStore, InMemoryMetadataStore) {
    let values = InMemoryValueStore::new();
    let metadata = InMemoryMetadataStore::new();
    let core = controller.startup_with(Arc::new(values.clone()), Arc::new(metadata.clone())).unwrap();
    (core, values, metadata)
}

fn text(core: &StateCore, key: &str) -> String {
    core.pipeline().get(key).unwrap().as_text().unwrap().to_string()
}

fn catalog_ids(core: &StateCore) -> (Vec<i64>, Vec<i64>) {
    let registry = core.bridge().categories(&admin()).unwrap().into_keys().map(CategoryId::get).collect();
    let table = core.metadata().read_all_categories().unwrap().into_iter().map(|category| category.id.get()).collect();
    (registry, table)
}

fn capable_device() -> HardwareCapabilities {
    HardwareCapabilities {
        ir_led: true,
        ir_cut: true,
        resolutions: vec!["1920x1080".to_string(), "1280x720".to_string()],
        max_fps: 60,
    }
}

struct FailingProbe;

impl HardwareProbe for FailingProbe {
    fn probe(&self) -> Result<HardwareCapabilities, HardwareError> {
        Err(HardwareError::Probe("sensor not responding".to_string()))
    }
}

#[derive(Default)]
struct RecordingActuator {
    calls: Mutex<Vec<(String, StateValue)>>,
}

impl RecordingActuator {
    fn calls_for(&self, key: &str) -> Vec<StateValue> {
        self.calls.lock().unwrap().iter().filter(|(name, _)| name == key).map(|(_, value)| value.clone()).collect()
    }
}

impl HardwareActuator for RecordingActuator {
    fn actuate(&self, key: &str, value: &StateValue) -> Result<(), HardwareError> {
        self.calls.lock().unwrap().push((key.to_string(), value.clone()));
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn startup_registers_modules_and_bootstraps_categories() {
    let (core, _values, metadata) = in_memory(LifecycleController::new(CamstateConfig::default()));
    let registry = core.registry();
    for key in ["deviceName", "theme", "timezone", "hardwareCapabilities", "irLed", "irCut", "resolution", "fps"] {
        assert!(registry.contains(key), "missing {key}");
    }
    assert!(registry.contains(CATEGORIES_KEY));

    let report = core.report();
    assert!(report.bootstrap.seeded);
    assert_eq!(report.categories_loaded, 2);
    assert!(!report.probe_fallback);
    assert_eq!(metadata.read_all_categories().unwrap().len(), 2);
    assert_eq!(core.pipeline().get(CATEGORY_COUNTER_KEY).unwrap().as_int(), Some(3));
    core.shutdown().unwrap();
}

#[test]
fn probe_failure_falls_back_to_minimal_capabilities() {
    let actuator = Arc::new(NullHardware::default());
    let controller =
        LifecycleController::new(CamstateConfig::default()).with_hardware(Arc::new(FailingProbe), actuator);
    let (core, _values, _metadata) = in_memory(controller);

    assert!(core.report().probe_fallback);
    assert_eq!(core.report().capabilities, HardwareCapabilities::minimal());
    assert_eq!(text(&core, "resolution"), "1280x720");
    core.shutdown().unwrap();
}

#[test]
fn invalid_stored_value_keeps_default_and_is_reported() {
    let values = InMemoryValueStore::new();
    values.save("fps", &StateValue::Int(999)).unwrap();
    values.save("theme", &StateValue::from("dark")).unwrap();
    values.save("retiredKey", &StateValue::Bool(true)).unwrap();

    let core = LifecycleController::new(CamstateConfig::default())
        .startup_with(Arc::new(values), Arc::new(InMemoryMetadataStore::new()))
        .unwrap();
    let report = core.report();
    let skipped: Vec<&str> = report.skipped.iter().map(|(key, _)| key.as_str()).collect();
    assert_eq!(skipped, vec!["fps", "retiredKey"]);
    assert!(report.restored.contains(&"theme".to_string()));
    assert_eq!(core.pipeline().get("fps").unwrap().as_int(), Some(30));
    assert_eq!(text(&core, "theme"), "dark");
    core.shutdown().unwrap();
}

#[test]
fn restored_values_reach_the_actuator() {
    let values = InMemoryValueStore::new();
    values.save("resolution", &StateValue::from("1280x720")).unwrap();
    let actuator = Arc::new(RecordingActuator::default());
    let controller = LifecycleController::new(CamstateConfig::default())
        .with_hardware(Arc::new(NullHardware::new(capable_device())), Arc::clone(&actuator) as Arc<dyn HardwareActuator>);
    let core = controller.startup_with(Arc::new(values), Arc::new(InMemoryMetadataStore::new())).unwrap();

    assert_eq!(actuator.calls_for("resolution"), vec![StateValue::from("1280x720")]);

    let request = MutationRequest::new().with("irLed", json!(true));
    core.apply_request(&operator(), &request).unwrap();
    core.pipeline().drain().unwrap();
    assert_eq!(actuator.calls_for("irLed"), vec![StateValue::Bool(true)]);
    core.shutdown().unwrap();
}

#[test]
fn restart_round_trips_persistent_values() {
    let dir = tempfile::tempdir().unwrap();
    let core = LifecycleController::new(config_in(dir.path())).startup().unwrap();
    let request = MutationRequest::new().with("deviceName", json!("porch")).with("theme", json!("dark"));
    let ack = core.apply_request(&admin(), &request).unwrap();
    assert_eq!(ack.changed, vec!["deviceName".to_string(), "theme".to_string()]);
    let category = core.bridge().insert_category(&admin(), NewCategory::new("Delivery", "#F59E0B")).unwrap();
    core.shutdown().unwrap();

    let core = LifecycleController::new(config_in(dir.path())).startup().unwrap();
    assert_eq!(text(&core, "deviceName"), "porch");
    assert_eq!(text(&core, "theme"), "dark");
    assert!(!core.report().bootstrap.seeded);
    assert_eq!(core.report().categories_loaded, 3);
    let categories = core.bridge().categories(&admin()).unwrap();
    assert_eq!(categories.get(&category.id).map(|stored| stored.name.as_str()), Some("Delivery"));
    assert_eq!(core.pipeline().get(CATEGORY_COUNTER_KEY).unwrap().as_int(), Some(category.id.get() + 1));
    core.shutdown().unwrap();
}

#[test]
fn factory_reset_keeps_catalog_and_drops_other_values() {
    let dir = tempfile::tempdir().unwrap();
    let core = LifecycleController::new(config_in(dir.path())).startup().unwrap();
    core.apply_request(&admin(), &MutationRequest::new().with("theme", json!("dark"))).unwrap();
    core.bridge().insert_category(&admin(), NewCategory::new("Delivery", "#F59E0B")).unwrap();

    let report = core.factory_reset().unwrap();
    assert!(report.preserved.contains(&CATEGORIES_KEY.to_string()));
    assert!(report.reset.contains(&"theme".to_string()));
    assert!(!report.reset.contains(&CATEGORIES_KEY.to_string()));
    assert_eq!(text(&core, "theme"), "light");
    assert_eq!(core.bridge().categories(&admin()).unwrap().len(), 3);
    assert_eq!(core.metadata().read_all_categories().unwrap().len(), 3);
    core.shutdown().unwrap();

    let core = LifecycleController::new(config_in(dir.path())).startup().unwrap();
    assert_eq!(text(&core, "theme"), "light");
    assert_eq!(core.bridge().categories(&admin()).unwrap().len(), 3);
    core.shutdown().unwrap();
}

#[test]
fn factory_reset_with_custom_allowlist_keeps_named_keys() {
    let (core, values, _metadata) = in_memory(LifecycleController::new(CamstateConfig::default()));
    let request = MutationRequest::new().with("deviceName", json!("garage")).with("timezone", json!("Europe/Berlin"));
    core.apply_request(&admin(), &request).unwrap();

    let keep: BTreeSet<String> = ["deviceName".to_string()].into_iter().collect();
    let report = core.factory_reset_preserving(&keep).unwrap();
    assert!(report.preserved.contains(&"deviceName".to_string()));
    assert!(!report.preserved.contains(&"timezone".to_string()));
    assert_eq!(text(&core, "deviceName"), "garage");
    assert_eq!(text(&core, "timezone"), "UTC");
    assert_eq!(values.load("timezone").unwrap(), None);
    core.shutdown().unwrap();
}

#[test]
fn corrupt_metadata_file_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    std::fs::write(&config.storage.metadata_path, b"definitely not a sqlite database file").unwrap();

    match LifecycleController::new(config).startup() {
        Err(LifecycleError::StartupIntegrity(_)) => {}
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("startup should fail"),
    }
}

#[test]
fn shutdown_is_idempotent_and_stops_mutations() {
    let (core, _values, _metadata) = in_memory(LifecycleController::new(CamstateConfig::default()));
    core.shutdown().unwrap();
    assert!(core.is_shut_down());
    assert_eq!(core.shutdown().unwrap(), camstate_daemon::ShutdownReport::default());

    let rejection = core.apply_request(&admin(), &MutationRequest::new().with("theme", json!("dark"))).unwrap_err();
    assert_eq!(rejection.reason, ReasonCode::Invalid);
    assert!(matches!(core.factory_reset(), Err(LifecycleError::ShutDown)));
}

#[test]
fn factory_reset_keeps_catalog_even_when_allowlist_omits_it() {
    let (core, _values, _metadata) = in_memory(LifecycleController::new(CamstateConfig::default()));
    let smoke = core.bridge().insert_category(&admin(), NewCategory::new("Smoke", "#AAAAAA")).unwrap();

    let keep: BTreeSet<String> = ["theme".to_string()].into_iter().collect();
    let report = core.factory_reset_preserving(&keep).unwrap();
    assert!(!report.reset.contains(&CATEGORIES_KEY.to_string()));
    assert!(!report.reset.contains(&CATEGORY_COUNTER_KEY.to_string()));
    assert_eq!(catalog_ids(&core), (vec![1, 2, 3], vec![1, 2, 3]));

    let fire = core.bridge().insert_category(&admin(), NewCategory::new("Fire", "#FF5500")).unwrap();
    assert_eq!(fire.id.get(), smoke.id.get() + 1);
    let (registry, table) = catalog_ids(&core);
    assert_eq!(registry, table);
    core.shutdown().unwrap();
}

#[test]
fn catalog_request_dropping_tagged_category_is_rejected() {
    let (core, _values, metadata) = in_memory(LifecycleController::new(CamstateConfig::default()));
    metadata.insert_tag(&NewTag::new(CategoryId::new(1), Timestamp::from_millis(1000), "", "", "operator")).unwrap();
    let kept = core.pipeline().get(CATEGORIES_KEY).unwrap().get("2").unwrap().to_json().unwrap();

    let request = MutationRequest::new().with(CATEGORIES_KEY, json!({ "2": kept }));
    let rejection = core.apply_request(&operator(), &request).unwrap_err();
    assert_eq!((rejection.key.as_str(), rejection.reason), (CATEGORIES_KEY, ReasonCode::Invalid));

    core.pipeline().drain().unwrap();
    assert!(!core.bridge().is_divergent());
    assert_eq!(catalog_ids(&core), (vec![1, 2], vec![1, 2]));
    core.shutdown().unwrap();
}

#[test]
fn shutdown_reconciles_a_diverged_catalog() {
    let (core, _values, metadata) = in_memory(LifecycleController::new(CamstateConfig::default()));
    metadata.insert_tag(&NewTag::new(CategoryId::new(1), Timestamp::from_millis(1000), "", "", "operator")).unwrap();

    core.pipeline().mutate(&operator(), CATEGORIES_KEY, StateValue::empty_map()).unwrap();
    core.pipeline().drain().unwrap();
    assert!(core.bridge().is_divergent());

    core.shutdown().unwrap();
    assert!(!core.bridge().is_divergent());
    let (registry, table) = catalog_ids(&core);
    assert_eq!(registry, table);
    assert_eq!(table, vec![1]);
}
