// crates/camstate-core/tests/sync_bridge.rs
// ============================================================================
// Module: Sync Bridge Tests
// Description: Category reconciliation against the in-memory metadata store.
// ============================================================================
//! ## Overview
//! Exercises bootstrap, load, push, catalog operations, and reconciliation
//! and checks that the registry entry and the categories table stay equal.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeMap;
use std::sync::Arc;

use camstate_core::CATEGORIES_KEY;
use camstate_core::CATEGORY_COUNTER_KEY;
use camstate_core::Caller;
use camstate_core::Capability;
use camstate_core::CapabilitySet;
use camstate_core::Category;
use camstate_core::CategoryId;
use camstate_core::DispatchConfig;
use camstate_core::InMemoryMetadataStore;
use camstate_core::InMemoryValueStore;
use camstate_core::MetadataStore;
use camstate_core::MetadataStoreError;
use camstate_core::MutationPipeline;
use camstate_core::NewCategory;
use camstate_core::NewTag;
use camstate_core::ObservableRegistry;
use camstate_core::StateError;
use camstate_core::StateSpec;
use camstate_core::StateValue;
use camstate_core::SyncBridge;
use camstate_core::SyncError;
use camstate_core::Timestamp;
use camstate_core::decode_categories;
use camstate_core::encode_categories;
use camstate_core::validate_categories;
use proptest::prelude::*;

// ============================================================================
// SECTION: Helpers
// ============================================================================

struct Fixture {
    pipeline: Arc<MutationPipeline>,
    store: Arc<InMemoryMetadataStore>,
    bridge: Arc<SyncBridge>,
}

fn category(id: i64, name: &str, color: &str) -> Category {
    Category {
        id: CategoryId::new(id),
        name: name.to_string(),
        color: color.to_string(),
        created_at: Timestamp::from_millis(1_700_000_000_000),
    }
}

fn fixture_with(seed: &[Category]) -> Fixture {
    let registry = Arc::new(ObservableRegistry::new());
    registry
        .register(
            StateSpec::new(CATEGORIES_KEY, encode_categories(seed))
                .readable_by(CapabilitySet::ALL)
                .writable_by(Capability::Operator | Capability::Admin)
                .persistent()
                .validator(validate_categories),
        )
        .unwrap();
    registry
        .register(StateSpec::new(CATEGORY_COUNTER_KEY, 1).readable_by(CapabilitySet::ALL).persistent())
        .unwrap();
    let pipeline = Arc::new(
        MutationPipeline::new(registry, Arc::new(InMemoryValueStore::new()), DispatchConfig::default()).unwrap(),
    );
    let store = Arc::new(InMemoryMetadataStore::new());
    let bridge = SyncBridge::new(Arc::clone(&pipeline), Arc::clone(&store) as Arc<dyn MetadataStore>);
    Fixture {
        pipeline,
        store,
        bridge,
    }
}

fn operator() -> Caller {
    Caller::new("drsmith", CapabilitySet::from(Capability::Operator))
}

fn registry_categories(fixture: &Fixture) -> BTreeMap<CategoryId, Category> {
    decode_categories(&fixture.pipeline.get(CATEGORIES_KEY).unwrap()).categories
}

fn table_categories(fixture: &Fixture) -> BTreeMap<CategoryId, Category> {
    fixture.store.read_all_categories().unwrap().into_iter().map(|category| (category.id, category)).collect()
}

fn assert_in_sync(fixture: &Fixture) {
    assert_eq!(registry_categories(fixture), table_categories(fixture));
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn bootstrap_copies_registry_into_empty_table_once() {
    let fixture = fixture_with(&[category(1, "Bleeding", "#FF0000"), category(2, "Suture", "#00FF00")]);
    let report = fixture.bridge.bootstrap_if_empty().unwrap();
    assert!(report.seeded);
    assert_eq!(report.inserted, vec![CategoryId::new(1), CategoryId::new(2)]);
    assert!(report.skipped.is_empty());

    let again = fixture.bridge.bootstrap_if_empty().unwrap();
    assert!(!again.seeded);
    assert!(again.inserted.is_empty());
    assert_eq!(table_categories(&fixture).len(), 2);
}

#[test]
fn bootstrap_reports_skipped_entries() {
    let mut entries = BTreeMap::new();
    entries.insert("1".to_string(), camstate_core::category_to_value(&category(1, "Bleeding", "#FF0000")));
    entries.insert("7".to_string(), camstate_core::category_to_value(&category(8, "Mismatch", "#000000")));
    entries.insert("9".to_string(), StateValue::Int(3));
    let fixture = fixture_with(&[]);
    fixture.pipeline.force_apply(CATEGORIES_KEY, StateValue::Map(entries), camstate_core::ChangeOrigin::Sync).unwrap();

    let report = fixture.bridge.bootstrap_if_empty().unwrap();
    assert_eq!(report.inserted, vec![CategoryId::new(1)]);
    let keys: Vec<_> = report.skipped.iter().map(|skip| skip.key.as_str()).collect();
    assert_eq!(keys, vec!["7", "9"]);
}

#[test]
fn load_overwrites_entry_and_advances_counter() {
    let fixture = fixture_with(&[category(1, "Stale", "#123456")]);
    fixture.store.insert_category(&category(4, "Bleeding", "#FF0000")).unwrap();

    assert_eq!(fixture.bridge.load_into_registry().unwrap(), 1);

    assert_in_sync(&fixture);
    assert_eq!(*fixture.pipeline.get(CATEGORY_COUNTER_KEY).unwrap(), StateValue::Int(5));
}

#[test]
fn catalog_operations_keep_both_sides_equal() {
    let fixture = fixture_with(&[]);
    fixture.bridge.bootstrap_if_empty().unwrap();
    fixture.bridge.load_into_registry().unwrap();
    fixture.bridge.attach().unwrap();

    let bleeding = fixture.bridge.insert_category(&operator(), NewCategory::new("Bleeding", "#FF0000")).unwrap();
    assert_in_sync(&fixture);
    let suture = fixture.bridge.insert_category(&operator(), NewCategory::new("Suture", "#00FF00")).unwrap();
    assert_eq!(suture.id.get(), bleeding.id.get() + 1);
    assert_in_sync(&fixture);

    fixture.bridge.update_category(&operator(), suture.id, "Closure", "#0000FF").unwrap();
    assert_in_sync(&fixture);

    fixture.bridge.delete_category(&operator(), bleeding.id).unwrap();
    assert_in_sync(&fixture);

    fixture.pipeline.drain().unwrap();
    assert_in_sync(&fixture);
    assert!(!fixture.bridge.is_divergent());
}

#[test]
fn duplicate_name_is_rejected_before_registry_changes() {
    let fixture = fixture_with(&[]);
    fixture.bridge.attach().unwrap();
    fixture.bridge.insert_category(&operator(), NewCategory::new("Bleeding", "#FF0000")).unwrap();

    let err = fixture.bridge.insert_category(&operator(), NewCategory::new("Bleeding", "#00FF00")).unwrap_err();
    assert!(matches!(err, SyncError::State(StateError::Validation { .. })));
    assert_in_sync(&fixture);
}

#[test]
fn catalog_write_requires_capability() {
    let fixture = fixture_with(&[]);
    let viewer = Caller::new("tv", CapabilitySet::from(Capability::Viewer));
    let err = fixture.bridge.insert_category(&viewer, NewCategory::new("Bleeding", "#FF0000")).unwrap_err();
    assert!(matches!(err, SyncError::State(StateError::PermissionDenied { .. })));
    assert!(table_categories(&fixture).is_empty());
}

#[test]
fn tagged_category_cannot_be_deleted_until_tags_are_soft_deleted() {
    let fixture = fixture_with(&[]);
    fixture.bridge.attach().unwrap();
    fixture.store.insert_category(&category(5, "Bleeding", "#FF0000")).unwrap();
    fixture.bridge.load_into_registry().unwrap();

    let first = fixture.store.insert_tag(&NewTag::new(CategoryId::new(5), Timestamp::from_millis(1000), "Start", "", "drsmith")).unwrap();
    let second = fixture.store.insert_tag(&NewTag::new(CategoryId::new(5), Timestamp::from_millis(2000), "", "", "drsmith")).unwrap();
    assert!(second > first);

    let err = fixture.bridge.delete_category(&operator(), CategoryId::new(5)).unwrap_err();
    assert!(matches!(err, SyncError::Store(MetadataStoreError::Integrity(_))));
    assert_in_sync(&fixture);

    fixture.store.soft_delete_tag(first).unwrap();
    fixture.store.soft_delete_tag(second).unwrap();
    fixture.bridge.delete_category(&operator(), CategoryId::new(5)).unwrap();
    assert_in_sync(&fixture);
    assert_eq!(fixture.store.read_all_tags().unwrap().len(), 2);
    assert!(fixture.store.read_active_tags().unwrap().is_empty());
}

#[test]
fn direct_entry_mutation_is_pushed_by_observer() {
    let fixture = fixture_with(&[]);
    fixture.bridge.attach().unwrap();
    let value = encode_categories(&[category(3, "Smoke", "#AAAAAA")]);
    fixture.pipeline.mutate(&operator(), CATEGORIES_KEY, value).unwrap();
    fixture.pipeline.drain().unwrap();
    assert_in_sync(&fixture);
}

#[test]
fn failed_push_marks_divergence_and_reconcile_restores_table_view() {
    let fixture = fixture_with(&[]);
    fixture.bridge.attach().unwrap();
    fixture.store.insert_category(&category(5, "Bleeding", "#FF0000")).unwrap();
    fixture.bridge.load_into_registry().unwrap();
    fixture.store.insert_tag(&NewTag::new(CategoryId::new(5), Timestamp::from_millis(1000), "Start", "", "drsmith")).unwrap();

    fixture.pipeline.mutate(&operator(), CATEGORIES_KEY, StateValue::empty_map()).unwrap();
    fixture.pipeline.drain().unwrap();
    assert!(fixture.bridge.is_divergent());
    assert_eq!(fixture.pipeline.dispatch_stats().failed, 1);

    assert!(fixture.bridge.reconcile().unwrap());
    assert!(!fixture.bridge.is_divergent());
    assert_in_sync(&fixture);
    assert!(!fixture.bridge.reconcile().unwrap());
}

#[test]
fn caller_assigned_id_is_kept_and_advances_counter() {
    let fixture = fixture_with(&[]);
    fixture.bridge.attach().unwrap();

    let bleeding = fixture
        .bridge
        .insert_category(&operator(), NewCategory::new("Bleeding", "#FF0000").with_id(CategoryId::new(5)))
        .unwrap();
    assert_eq!(bleeding.id, CategoryId::new(5));
    assert_eq!(*fixture.pipeline.get(CATEGORY_COUNTER_KEY).unwrap(), StateValue::Int(6));

    let low = fixture
        .bridge
        .insert_category(&operator(), NewCategory::new("Suture", "#00FF00").with_id(CategoryId::new(2)))
        .unwrap();
    assert_eq!(low.id, CategoryId::new(2));
    assert_eq!(*fixture.pipeline.get(CATEGORY_COUNTER_KEY).unwrap(), StateValue::Int(6));

    let next = fixture.bridge.insert_category(&operator(), NewCategory::new("Smoke", "#AAAAAA")).unwrap();
    assert_eq!(next.id, CategoryId::new(6));

    let taken = NewCategory::new("Fire", "#FFAA00").with_id(CategoryId::new(5));
    let err = fixture.bridge.insert_category(&operator(), taken).unwrap_err();
    assert!(matches!(err, SyncError::Store(MetadataStoreError::Integrity(_))));
    let zero = NewCategory::new("Fire", "#FFAA00").with_id(CategoryId::new(0));
    assert!(matches!(fixture.bridge.insert_category(&operator(), zero), Err(SyncError::Invalid(_))));

    fixture.pipeline.drain().unwrap();
    assert_in_sync(&fixture);
    assert_eq!(table_categories(&fixture).len(), 3);
}

#[test]
fn registry_state_check_refuses_what_the_store_would_reject() {
    let fixture = fixture_with(&[]);
    fixture.store.insert_category(&category(1, "Bleeding", "#FF0000")).unwrap();
    fixture.store.insert_category(&category(2, "Suture", "#00FF00")).unwrap();
    fixture.bridge.load_into_registry().unwrap();
    fixture.store.insert_tag(&NewTag::new(CategoryId::new(1), Timestamp::from_millis(1000), "", "", "drsmith")).unwrap();

    let without_tagged = encode_categories(&[category(2, "Suture", "#00FF00")]);
    let err = fixture.bridge.check_registry_state(&without_tagged).unwrap_err();
    assert!(matches!(err, SyncError::Store(MetadataStoreError::Integrity(_))));

    let without_untagged = encode_categories(&[category(1, "Bleeding", "#FF0000")]);
    fixture.bridge.check_registry_state(&without_untagged).unwrap();

    let renamed = encode_categories(&[category(1, "Bleeding", "#FF0000"), category(2, "Bleeding", "#00FF00")]);
    assert!(fixture.bridge.check_registry_state(&renamed).is_err());
}

// ============================================================================
// SECTION: Property Tests
// ============================================================================

const NAMES: [&str; 4] = ["Bleeding", "Suture", "Smoke", "Fire"];

#[derive(Debug, Clone)]
enum CatalogStep {
    Insert { id: Option<i64>, name: usize },
    Update { id: i64, name: usize },
    Delete { id: i64 },
    Tag { id: i64 },
    ClearTags,
}

fn catalog_step() -> impl Strategy<Value = CatalogStep> {
    prop_oneof![
        (proptest::option::of(1_i64 .. 8), 0 .. NAMES.len())
            .prop_map(|(id, name)| CatalogStep::Insert { id, name }),
        (1_i64 .. 8, 0 .. NAMES.len()).prop_map(|(id, name)| CatalogStep::Update { id, name }),
        (1_i64 .. 8).prop_map(|id| CatalogStep::Delete { id }),
        (1_i64 .. 8).prop_map(|id| CatalogStep::Tag { id }),
        Just(CatalogStep::ClearTags),
    ]
}

fn run_step(fixture: &Fixture, step: &CatalogStep) {
    // Rejections are expected; only the equality of both sides matters.
    match step {
        CatalogStep::Insert { id, name } => {
            let mut request = NewCategory::new(NAMES[*name], "#FF0000");
            if let Some(id) = id {
                request = request.with_id(CategoryId::new(*id));
            }
            let _ = fixture.bridge.insert_category(&operator(), request);
        }
        CatalogStep::Update { id, name } => {
            let _ = fixture.bridge.update_category(&operator(), CategoryId::new(*id), NAMES[*name], "#00FF00");
        }
        CatalogStep::Delete { id } => {
            let _ = fixture.bridge.delete_category(&operator(), CategoryId::new(*id));
        }
        CatalogStep::Tag { id } => {
            let tag = NewTag::new(CategoryId::new(*id), Timestamp::from_millis(1000), "", "", "drsmith");
            let _ = fixture.store.insert_tag(&tag);
        }
        CatalogStep::ClearTags => {
            for tag in fixture.store.read_active_tags().unwrap() {
                fixture.store.soft_delete_tag(tag.id).unwrap();
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn catalog_sides_stay_equal_for_any_operation_sequence(steps in proptest::collection::vec(catalog_step(), 1 .. 24)) {
        let fixture = fixture_with(&[category(1, "Bleeding", "#FF0000")]);
        fixture.bridge.bootstrap_if_empty().unwrap();
        fixture.bridge.load_into_registry().unwrap();
        fixture.bridge.attach().unwrap();

        for step in &steps {
            run_step(&fixture, step);
            assert_in_sync(&fixture);
        }
        fixture.pipeline.drain().unwrap();
        assert_in_sync(&fixture);
        prop_assert!(!fixture.bridge.is_divergent());
    }
}
