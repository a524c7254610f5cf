// crates/camstate-core/tests/pipeline.rs
// ============================================================================
// Module: Mutation Pipeline Tests
// Description: Registry, gate, pipeline, and dispatcher behavior.
// ============================================================================
//! ## Overview
//! Covers the mutation order, permission and validation rejections, observer
//! ordering and isolation, degraded persistence, and restore round trips.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use camstate_core::Caller;
use camstate_core::Capability;
use camstate_core::CapabilitySet;
use camstate_core::DispatchConfig;
use camstate_core::FnObserver;
use camstate_core::InMemoryValueStore;
use camstate_core::MutationPipeline;
use camstate_core::ObservableRegistry;
use camstate_core::ObserverError;
use camstate_core::RegistryError;
use camstate_core::StateChange;
use camstate_core::StateError;
use camstate_core::StateSpec;
use camstate_core::StateValue;
use camstate_core::ValueStore;
use camstate_core::ValueStoreError;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Value store whose writes can be switched to fail.
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryValueStore,
    failing: AtomicBool,
}

impl ValueStore for FlakyStore {
    fn load(&self, key: &str) -> Result<Option<StateValue>, ValueStoreError> {
        self.inner.load(key)
    }

    fn load_all(&self) -> Result<BTreeMap<String, StateValue>, ValueStoreError> {
        self.inner.load_all()
    }

    fn save(&self, key: &str, value: &StateValue) -> Result<(), ValueStoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ValueStoreError::Io("disk full".to_string()));
        }
        self.inner.save(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), ValueStoreError> {
        self.inner.remove(key)
    }

    fn clear(&self) -> Result<(), ValueStoreError> {
        self.inner.clear()
    }
}

fn pipeline_with(values: Arc<dyn ValueStore>, config: DispatchConfig) -> MutationPipeline {
    let registry = Arc::new(ObservableRegistry::new());
    MutationPipeline::new(registry, values, config).unwrap()
}

fn pipeline() -> MutationPipeline {
    pipeline_with(Arc::new(InMemoryValueStore::new()), DispatchConfig::default())
}

fn admin() -> Caller {
    Caller::new("admin-1", CapabilitySet::from(Capability::Admin))
}

fn viewer() -> Caller {
    Caller::new("viewer-1", CapabilitySet::from(Capability::Viewer))
}

fn theme_spec() -> StateSpec {
    StateSpec::new("theme", "dark")
        .readable_by(Capability::Viewer | Capability::Admin)
        .writable_by(Capability::Admin)
        .persistent()
        .validator(|value| match value.as_text() {
            Some("dark" | "light") => Ok(()),
            _ => Err("theme must be dark or light".to_string()),
        })
}

fn recorder(log: &Arc<Mutex<Vec<String>>>, label: &str) -> Arc<FnObserver<impl Fn(&StateChange) -> Result<(), ObserverError> + Send + Sync + use<>>> {
    let log = Arc::clone(log);
    let tag = label.to_string();
    Arc::new(FnObserver::new(label, move |change: &StateChange| {
        log.lock().unwrap().push(format!("{tag}:{}:{}", change.name, change.sequence));
        Ok(())
    }))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn get_after_register_returns_default() {
    let pipeline = pipeline();
    pipeline.registry().register(theme_spec()).unwrap();
    assert_eq!(*pipeline.get("theme").unwrap(), StateValue::from("dark"));
}

#[test]
fn duplicate_registration_is_rejected() {
    let pipeline = pipeline();
    pipeline.registry().register(theme_spec()).unwrap();
    let err = pipeline.registry().register(theme_spec()).unwrap_err();
    assert_eq!(err, RegistryError::DuplicateName("theme".to_string()));
}

#[test]
fn default_must_pass_its_own_validator() {
    let pipeline = pipeline();
    let spec = StateSpec::new("fps", 0).validator(|value| match value.as_int() {
        Some(fps) if fps > 0 => Ok(()),
        _ => Err("fps must be positive".to_string()),
    });
    let err = pipeline.registry().register(spec).unwrap_err();
    assert!(matches!(err, RegistryError::InvalidDefault { .. }));
}

#[test]
fn unknown_entry_is_reported_before_permission() {
    let pipeline = pipeline();
    let err = pipeline.mutate(&viewer(), "missing", StateValue::Bool(true)).unwrap_err();
    assert_eq!(err, StateError::UnknownState("missing".to_string()));
}

#[test]
fn denied_mutation_changes_nothing_and_fires_no_observer() {
    let pipeline = pipeline();
    pipeline.registry().register(theme_spec()).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    pipeline.add_observer("theme", recorder(&log, "a")).unwrap();

    let err = pipeline.mutate(&viewer(), "theme", StateValue::from("light")).unwrap_err();
    assert!(matches!(err, StateError::PermissionDenied { .. }));
    pipeline.drain().unwrap();

    assert_eq!(*pipeline.get("theme").unwrap(), StateValue::from("dark"));
    assert!(log.lock().unwrap().is_empty());
    assert_eq!(pipeline.dispatch_stats().delivered, 0);
}

#[test]
fn validation_failure_leaves_value_unchanged() {
    let pipeline = pipeline();
    pipeline.registry().register(theme_spec()).unwrap();
    let err = pipeline.mutate(&admin(), "theme", StateValue::from("neon")).unwrap_err();
    assert!(matches!(err, StateError::Validation { .. }));
    assert_eq!(*pipeline.get("theme").unwrap(), StateValue::from("dark"));
}

#[test]
fn empty_write_set_denies_everyone() {
    let pipeline = pipeline();
    pipeline
        .registry()
        .register(StateSpec::new("hardwareCapabilities", StateValue::empty_map()).readable_by(CapabilitySet::ALL))
        .unwrap();
    let err = pipeline.mutate(&Caller::system(), "hardwareCapabilities", StateValue::empty_map()).unwrap_err();
    assert!(matches!(err, StateError::PermissionDenied { .. }));
}

#[test]
fn reads_are_gated_by_read_set() {
    let pipeline = pipeline();
    pipeline
        .registry()
        .register(StateSpec::new("timezone", "UTC").readable_by(Capability::Admin).writable_by(Capability::Admin))
        .unwrap();
    pipeline.registry().register(theme_spec()).unwrap();

    assert!(matches!(pipeline.read(&viewer(), "timezone"), Err(StateError::PermissionDenied { .. })));
    let snapshot = pipeline.snapshot(&viewer()).unwrap();
    assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["theme"]);
}

#[test]
fn observers_fire_in_registration_order_with_old_and_new() {
    let pipeline = pipeline();
    pipeline.registry().register(theme_spec()).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    pipeline.add_observer("theme", recorder(&log, "first")).unwrap();
    pipeline.add_observer("theme", recorder(&log, "second")).unwrap();
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    pipeline
        .add_observer(
            "theme",
            Arc::new(FnObserver::new("values", move |change: &StateChange| {
                *sink.lock().unwrap() = Some(((*change.old).clone(), (*change.new).clone()));
                Ok(())
            })),
        )
        .unwrap();

    let outcome = pipeline.mutate(&admin(), "theme", StateValue::from("light")).unwrap();
    pipeline.drain().unwrap();

    let sequence = outcome.receipt().sequence;
    assert_eq!(*log.lock().unwrap(), vec![format!("first:theme:{sequence}"), format!("second:theme:{sequence}")]);
    assert_eq!(*seen.lock().unwrap(), Some((StateValue::from("dark"), StateValue::from("light"))));
}

#[test]
fn failing_observer_does_not_stop_later_observers() {
    let pipeline = pipeline();
    pipeline.registry().register(theme_spec()).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    pipeline
        .add_observer(
            "theme",
            Arc::new(FnObserver::new("broken", |_: &StateChange| Err(ObserverError::Failed("gpio busy".to_string())))),
        )
        .unwrap();
    pipeline.add_observer("theme", recorder(&log, "after")).unwrap();

    pipeline.mutate(&admin(), "theme", StateValue::from("light")).unwrap();
    pipeline.drain().unwrap();

    assert_eq!(log.lock().unwrap().len(), 1);
    let stats = pipeline.dispatch_stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.delivered, 1);
}

#[test]
fn hung_observer_times_out_and_lane_keeps_moving() {
    let config = DispatchConfig {
        lanes: 1,
        queue_capacity: 8,
        observer_timeout: Duration::from_millis(50),
    };
    let pipeline = pipeline_with(Arc::new(InMemoryValueStore::new()), config);
    pipeline.registry().register(theme_spec()).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    pipeline
        .add_observer(
            "theme",
            Arc::new(FnObserver::new("slow", |_: &StateChange| {
                thread::sleep(Duration::from_millis(400));
                Ok(())
            })),
        )
        .unwrap();
    pipeline.add_observer("theme", recorder(&log, "fast")).unwrap();

    pipeline.mutate(&admin(), "theme", StateValue::from("light")).unwrap();
    pipeline.drain().unwrap();

    assert_eq!(log.lock().unwrap().len(), 1);
    let stats = pipeline.dispatch_stats();
    assert_eq!(stats.timed_out, 1);
    assert_eq!(stats.replaced, 1);
}

#[test]
fn same_entry_changes_arrive_in_sequence_order() {
    let pipeline = Arc::new(pipeline());
    pipeline
        .registry()
        .register(StateSpec::new("fps", 30).readable_by(CapabilitySet::ALL).writable_by(Capability::Operator))
        .unwrap();
    let sequences = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&sequences);
    pipeline
        .add_observer(
            "fps",
            Arc::new(FnObserver::new("order", move |change: &StateChange| {
                sink.lock().unwrap().push(change.sequence);
                Ok(())
            })),
        )
        .unwrap();

    let operator = Caller::new("op", CapabilitySet::from(Capability::Operator));
    let workers: Vec<_> = (0 .. 4)
        .map(|worker| {
            let pipeline = Arc::clone(&pipeline);
            let operator = operator.clone();
            thread::spawn(move || {
                for step in 0 .. 25 {
                    pipeline.mutate(&operator, "fps", StateValue::Int(worker * 100 + step)).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    pipeline.drain().unwrap();

    let sequences = sequences.lock().unwrap();
    assert_eq!(sequences.len(), 100);
    assert!(sequences.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn persistence_failure_is_degraded_success_and_retried() {
    let store = Arc::new(FlakyStore::default());
    let pipeline = pipeline_with(Arc::clone(&store) as Arc<dyn ValueStore>, DispatchConfig::default());
    pipeline.registry().register(theme_spec()).unwrap();

    store.failing.store(true, Ordering::SeqCst);
    let outcome = pipeline.mutate(&admin(), "theme", StateValue::from("light")).unwrap();
    assert!(outcome.is_degraded());
    assert!(matches!(outcome.degradation(), Some(StateError::Persistence { .. })));
    assert_eq!(*pipeline.get("theme").unwrap(), StateValue::from("light"));
    assert_eq!(pipeline.pending_persistence(), vec!["theme".to_string()]);
    assert!(pipeline.flush_pending().is_err());

    store.failing.store(false, Ordering::SeqCst);
    assert_eq!(pipeline.flush_pending().unwrap(), 1);
    assert!(pipeline.pending_persistence().is_empty());
    assert_eq!(store.load("theme").unwrap(), Some(StateValue::from("light")));
}

#[test]
fn persistent_value_round_trips_through_fresh_registry() {
    let store = InMemoryValueStore::new();
    let first = pipeline_with(Arc::new(store.clone()), DispatchConfig::default());
    first.registry().register(theme_spec()).unwrap();
    first.mutate(&admin(), "theme", StateValue::from("light")).unwrap();
    first.close().unwrap();

    let second = pipeline_with(Arc::new(store.clone()), DispatchConfig::default());
    second.registry().register(theme_spec()).unwrap();
    for (key, value) in store.load_all().unwrap() {
        second.restore(&key, value).unwrap();
    }
    assert_eq!(*second.get("theme").unwrap(), StateValue::from("light"));
}

#[test]
fn reset_to_default_does_not_touch_store() {
    let store = InMemoryValueStore::new();
    let pipeline = pipeline_with(Arc::new(store.clone()), DispatchConfig::default());
    pipeline.registry().register(theme_spec()).unwrap();
    pipeline.mutate(&admin(), "theme", StateValue::from("light")).unwrap();

    pipeline.reset_to_default("theme").unwrap();

    assert_eq!(*pipeline.get("theme").unwrap(), StateValue::from("dark"));
    assert_eq!(store.load("theme").unwrap(), Some(StateValue::from("light")));
}

#[test]
fn closed_pipeline_rejects_mutations() {
    let pipeline = pipeline();
    pipeline.registry().register(theme_spec()).unwrap();
    pipeline.close().unwrap();
    assert!(pipeline.is_closed());
    let err = pipeline.mutate(&admin(), "theme", StateValue::from("light")).unwrap_err();
    assert_eq!(err, StateError::Closed);
}
