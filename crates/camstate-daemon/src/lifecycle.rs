// crates/camstate-daemon/src/lifecycle.rs
// ============================================================================
// Module: Lifecycle Controller
// Description: Startup ordering, factory reset, and shutdown draining.
// Purpose: Assemble the state core from configuration and tear it down safely.
// Dependencies: camstate-config, camstate-core, camstate-store-sqlite, tracing
// ============================================================================

//! ## Overview
//! [`LifecycleController::startup`] brings the state core up in a fixed
//! order:
//! 1. open the value store;
//! 2. open the metadata store, run the integrity check (fatal), catch up
//!    migrations;
//! 3. register the catalog entries and restore their stored values;
//! 4. bootstrap the categories table when empty, then load it back into the
//!    registry and attach the sync observer;
//! 5. probe hardware, then register the system, hardware, and camera modules;
//! 6. restore every other stored value;
//! 7. attach the client broadcast observer to every entry.
//!
//! [`StateCore::shutdown`] closes the pipeline (draining observers), retries
//! pending persistence, flushes, and closes both stores.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use camstate_config::CamstateConfig;
use camstate_core::BootstrapReport;
use camstate_core::CATEGORIES_KEY;
use camstate_core::CATEGORY_COUNTER_KEY;
use camstate_core::Caller;
use camstate_core::MetadataStore;
use camstate_core::MetadataStoreError;
use camstate_core::MutationPipeline;
use camstate_core::ObservableRegistry;
use camstate_core::RegistryError;
use camstate_core::StateError;
use camstate_core::StateValue;
use camstate_core::SyncBridge;
use camstate_core::SyncError;
use camstate_core::ValueStore;
use camstate_core::ValueStoreError;
use camstate_store_sqlite::SqliteMetadataStore;
use camstate_store_sqlite::SqliteValueStore;
use thiserror::Error;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::audit::StateAuditSink;
use crate::audit::build_audit_sink;
use crate::broadcast::BroadcastObserver;
use crate::broadcast::ClientBroadcaster;
use crate::broadcast::NoopBroadcaster;
use crate::hardware::ActuatorObserver;
use crate::hardware::HardwareActuator;
use crate::hardware::HardwareCapabilities;
use crate::hardware::HardwareProbe;
use crate::hardware::NullHardware;
use crate::modules::CameraModule;
use crate::modules::CatalogModule;
use crate::modules::HardwareModule;
use crate::modules::StateModule;
use crate::modules::SystemModule;
use crate::protocol::MutationAck;
use crate::protocol::MutationRejection;
use crate::protocol::MutationRequest;
use crate::protocol::apply_request;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Lifecycle errors.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Configuration rejected.
    #[error("config error: {0}")]
    Config(String),
    /// Value store failure.
    #[error("value store error: {0}")]
    ValueStore(#[from] ValueStoreError),
    /// Metadata store failure.
    #[error("metadata store error: {0}")]
    Metadata(MetadataStoreError),
    /// Metadata store failed its startup checks.
    #[error("startup integrity failure: {0}")]
    StartupIntegrity(String),
    /// Pipeline failure.
    #[error(transparent)]
    State(#[from] StateError),
    /// Registration failure.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Category sync failure.
    #[error(transparent)]
    Sync(#[from] SyncError),
    /// Audit sink could not be built.
    #[error("audit sink error: {0}")]
    Audit(String),
    /// State core already shut down.
    #[error("state core is shut down")]
    ShutDown,
}

impl From<MetadataStoreError> for LifecycleError {
    fn from(error: MetadataStoreError) -> Self {
        match error {
            MetadataStoreError::StartupIntegrity(message) => Self::StartupIntegrity(message),
            other => Self::Metadata(other),
        }
    }
}

// ============================================================================
// SECTION: Reports
// ============================================================================

/// What startup did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupReport {
    /// Migrations applied during catch-up.
    pub applied_migrations: Vec<i64>,
    /// Category table bootstrap outcome.
    pub bootstrap: BootstrapReport,
    /// Categories loaded from the metadata store.
    pub categories_loaded: usize,
    /// Entries restored from the value store.
    pub restored: Vec<String>,
    /// Stored keys not restored, with reasons.
    pub skipped: Vec<(String, String)>,
    /// Capabilities the modules were built from.
    pub capabilities: HardwareCapabilities,
    /// True when probing failed and minimal capabilities were used.
    pub probe_fallback: bool,
}

/// What a factory reset did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetReport {
    /// Keys whose stored values were kept.
    pub preserved: Vec<String>,
    /// Entries returned to their defaults.
    pub reset: Vec<String>,
}

/// What shutdown did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Dirty entries persisted during shutdown.
    pub flushed: usize,
    /// Entries still not persisted.
    pub unpersisted: Vec<String>,
}

// ============================================================================
// SECTION: Controller
// ============================================================================

/// Builds a [`StateCore`] from configuration and external collaborators.
pub struct LifecycleController {
    /// Validated configuration.
    config: CamstateConfig,
    /// Capability detection.
    probe: Arc<dyn HardwareProbe>,
    /// Hardware actuation.
    actuator: Arc<dyn HardwareActuator>,
    /// Client fan-out.
    broadcaster: Arc<dyn ClientBroadcaster>,
    /// Audit sink override; built from config when absent.
    audit: Option<Arc<dyn StateAuditSink>>,
    /// Catalog entries and first-boot categories.
    catalog: CatalogModule,
}

impl LifecycleController {
    /// Creates a controller with null hardware and no broadcast target.
    #[must_use]
    pub fn new(config: CamstateConfig) -> Self {
        let hardware = Arc::new(NullHardware::default());
        Self {
            config,
            probe: Arc::clone(&hardware) as Arc<dyn HardwareProbe>,
            actuator: hardware,
            broadcaster: Arc::new(NoopBroadcaster),
            audit: None,
            catalog: CatalogModule::default(),
        }
    }

    /// Sets the hardware probe and actuator.
    #[must_use]
    pub fn with_hardware(mut self, probe: Arc<dyn HardwareProbe>, actuator: Arc<dyn HardwareActuator>) -> Self {
        self.probe = probe;
        self.actuator = actuator;
        self
    }

    /// Sets the client broadcaster.
    #[must_use]
    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn ClientBroadcaster>) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    /// Overrides the configured audit sink.
    #[must_use]
    pub fn with_audit_sink(mut self, audit: Arc<dyn StateAuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Overrides the catalog module.
    #[must_use]
    pub fn with_catalog(mut self, catalog: CatalogModule) -> Self {
        self.catalog = catalog;
        self
    }

    /// Opens the configured `SQLite` stores and starts the state core.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] when any startup step fails.
    pub fn startup(self) -> Result<StateCore, LifecycleError> {
        self.config.validate().map_err(|err| LifecycleError::Config(err.to_string()))?;
        info!(path = %self.config.storage.state_path.display(), "opening value store");
        let values = SqliteValueStore::open(self.config.storage.state_store()).map_err(ValueStoreError::from)?;
        info!(path = %self.config.storage.metadata_path.display(), "opening metadata store");
        let metadata = SqliteMetadataStore::open(self.config.storage.metadata_store()).map_err(|err| {
            let err = MetadataStoreError::from(err);
            error!(error = %err, "metadata store failed to open");
            LifecycleError::from(err)
        })?;
        self.startup_with(Arc::new(values), Arc::new(metadata))
    }

    /// Starts the state core on already-open stores.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::StartupIntegrity`] when the metadata store
    /// fails its checks, and [`LifecycleError`] for any other failed step.
    pub fn startup_with(
        self,
        values: Arc<dyn ValueStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Result<StateCore, LifecycleError> {
        let audit = match self.audit {
            Some(audit) => audit,
            None => build_audit_sink(&self.config.audit).map_err(|err| LifecycleError::Audit(err.to_string()))?,
        };

        if let Err(err) = metadata.check_integrity() {
            error!(error = %err, "metadata store failed integrity check");
            return Err(LifecycleError::StartupIntegrity(err.to_string()));
        }
        let applied_migrations = metadata.catch_up_migrations()?;
        if !applied_migrations.is_empty() {
            info!(applied = applied_migrations.len(), "metadata schema migrated");
        }

        let mut stored = values.load_all()?;
        let registry = Arc::new(ObservableRegistry::new());
        let pipeline = Arc::new(MutationPipeline::new(
            Arc::clone(&registry),
            Arc::clone(&values),
            self.config.dispatch.to_dispatch_config(),
        )?);
        let mut restorer = Restorer::new(&pipeline);

        self.catalog.register(&registry)?;
        for key in [CATEGORIES_KEY, CATEGORY_COUNTER_KEY] {
            if let Some(value) = stored.remove(key) {
                restorer.restore(key, value)?;
            }
        }
        let bridge = SyncBridge::new(Arc::clone(&pipeline), Arc::clone(&metadata));
        let bootstrap = bridge.bootstrap_if_empty()?;
        let categories_loaded = bridge.load_into_registry()?;
        bridge.attach()?;

        let (capabilities, probe_fallback) = probe_capabilities(self.probe.as_ref());
        let modules: [Box<dyn StateModule>; 3] = [
            Box::new(SystemModule),
            Box::new(HardwareModule::new(capabilities.clone())),
            Box::new(CameraModule::new(capabilities.clone())),
        ];
        for module in &modules {
            let names = module.register(&registry)?;
            for key in module.actuated_keys() {
                pipeline.add_observer(key, Arc::new(ActuatorObserver::new(Arc::clone(&self.actuator))))?;
            }
            info!(module = module.name(), entries = names.len(), "state module registered");
        }

        for (key, value) in stored {
            if registry.contains(&key) {
                restorer.restore(&key, value)?;
            } else {
                warn!(key = %key, "stored value has no registered entry");
                restorer.skipped.push((key, "no registered entry".to_string()));
            }
        }

        for entry in registry.entries()? {
            let observer = BroadcastObserver::new(Arc::clone(&self.broadcaster), entry.policy().read);
            pipeline.add_observer(entry.name(), Arc::new(observer))?;
        }
        pipeline.drain()?;

        let report = StartupReport {
            applied_migrations,
            bootstrap,
            categories_loaded,
            restored: restorer.restored,
            skipped: restorer.skipped,
            capabilities,
            probe_fallback,
        };
        info!(
            entries = registry.len(),
            restored = report.restored.len(),
            categories = report.categories_loaded,
            "state core ready"
        );
        Ok(StateCore {
            pipeline,
            bridge,
            values,
            metadata,
            audit,
            preserve_keys: self.config.reset.preserve_keys,
            report,
            shut_down: AtomicBool::new(false),
        })
    }
}

/// Probes hardware, falling back to minimal capabilities.
fn probe_capabilities(probe: &dyn HardwareProbe) -> (HardwareCapabilities, bool) {
    match probe.probe().and_then(|capabilities| capabilities.validate().map(|()| capabilities)) {
        Ok(capabilities) => (capabilities, false),
        Err(err) => {
            warn!(error = %err, "hardware probe failed; using minimal capabilities");
            (HardwareCapabilities::minimal(), true)
        }
    }
}

/// Restores stored values, collecting invalid ones instead of failing.
struct Restorer<'a> {
    /// Pipeline applying restored values.
    pipeline: &'a MutationPipeline,
    /// Entries restored.
    restored: Vec<String>,
    /// Keys skipped, with reasons.
    skipped: Vec<(String, String)>,
}

impl<'a> Restorer<'a> {
    /// Creates an empty restorer.
    const fn new(pipeline: &'a MutationPipeline) -> Self {
        Self {
            pipeline,
            restored: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Restores one value. Values the entry rejects are skipped.
    fn restore(&mut self, key: &str, value: StateValue) -> Result<(), LifecycleError> {
        match self.pipeline.restore(key, value) {
            Ok(_) => {
                self.restored.push(key.to_string());
                Ok(())
            }
            Err(StateError::Validation {
                reason, ..
            }) => {
                warn!(key, reason = %reason, "stored value rejected; keeping default");
                self.skipped.push((key.to_string(), reason));
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

// ============================================================================
// SECTION: State Core
// ============================================================================

/// Running state core.
pub struct StateCore {
    /// Mutation pipeline.
    pipeline: Arc<MutationPipeline>,
    /// Category bridge.
    bridge: Arc<SyncBridge>,
    /// Value store.
    values: Arc<dyn ValueStore>,
    /// Metadata store.
    metadata: Arc<dyn MetadataStore>,
    /// Mutation audit sink.
    audit: Arc<dyn StateAuditSink>,
    /// Keys kept by [`StateCore::factory_reset`].
    preserve_keys: BTreeSet<String>,
    /// Startup outcome.
    report: StartupReport,
    /// Set once shutdown ran.
    shut_down: AtomicBool,
}

impl StateCore {
    /// Returns the mutation pipeline.
    #[must_use]
    pub const fn pipeline(&self) -> &Arc<MutationPipeline> {
        &self.pipeline
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ObservableRegistry> {
        self.pipeline.registry()
    }

    /// Returns the category bridge.
    #[must_use]
    pub const fn bridge(&self) -> &Arc<SyncBridge> {
        &self.bridge
    }

    /// Returns the metadata store.
    #[must_use]
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        Arc::clone(&self.metadata)
    }

    /// Returns the startup report.
    #[must_use]
    pub const fn report(&self) -> &StartupReport {
        &self.report
    }

    /// Returns the configured factory reset allowlist.
    #[must_use]
    pub const fn preserve_keys(&self) -> &BTreeSet<String> {
        &self.preserve_keys
    }

    /// Returns every entry `caller` may read.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] when the registry cannot be read.
    pub fn snapshot(&self, caller: &Caller) -> Result<BTreeMap<String, Arc<StateValue>>, StateError> {
        self.pipeline.snapshot(caller)
    }

    /// Applies a client mutation request.
    ///
    /// # Errors
    ///
    /// Returns the [`MutationRejection`] for the first failing key.
    pub fn apply_request(&self, caller: &Caller, request: &MutationRequest) -> Result<MutationAck, MutationRejection> {
        apply_request(&self.pipeline, &self.bridge, caller, request, self.audit.as_ref())
    }

    /// Re-persists entries whose write-through failed, then reloads the
    /// category entry when a push to the metadata store failed.
    /// Returns the number of entries persisted.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] when either step fails.
    pub fn retry_pending(&self) -> Result<usize, LifecycleError> {
        let written = self.pipeline.flush_pending()?;
        self.bridge.reconcile()?;
        Ok(written)
    }

    /// Factory reset with the configured allowlist.
    ///
    /// # Errors
    ///
    /// See [`StateCore::factory_reset_preserving`].
    pub fn factory_reset(&self) -> Result<ResetReport, LifecycleError> {
        self.factory_reset_preserving(&self.preserve_keys)
    }

    /// Clears the value store except for `keys` and returns every other entry
    /// to its default. The category catalog and its id counter are always
    /// kept, whatever `keys` says, and the metadata store is not touched.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::ShutDown`] after shutdown and
    /// [`LifecycleError`] when the store or pipeline fails.
    pub fn factory_reset_preserving(&self, keys: &BTreeSet<String>) -> Result<ResetReport, LifecycleError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(LifecycleError::ShutDown);
        }
        self.pipeline.drain()?;
        let mut kept = keys.clone();
        kept.extend([CATEGORIES_KEY, CATEGORY_COUNTER_KEY].map(String::from));
        let preserved = self.values.reset_preserving(&kept)?;
        let mut reset = Vec::new();
        for name in self.registry().names() {
            if kept.contains(&name) {
                continue;
            }
            self.pipeline.reset_to_default(&name)?;
            reset.push(name);
        }
        self.pipeline.drain()?;
        info!(preserved = preserved.len(), reset = reset.len(), "factory reset complete");
        Ok(ResetReport {
            preserved: preserved.into_keys().collect(),
            reset,
        })
    }

    /// Stops the state core. Every step runs even when an earlier one fails;
    /// the first failure is returned. A second call does nothing.
    ///
    /// # Errors
    ///
    /// Returns the first [`LifecycleError`] encountered.
    pub fn shutdown(&self) -> Result<ShutdownReport, LifecycleError> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(ShutdownReport::default());
        }
        let mut first_error: Option<LifecycleError> = None;
        let mut note = |step: &str, result: Result<(), LifecycleError>| {
            if let Err(err) = result {
                warn!(step, error = %err, "shutdown step failed");
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        };

        note("drain observers", self.pipeline.drain().map_err(LifecycleError::from));
        note("reconcile categories", self.bridge.reconcile().map(|_| ()).map_err(LifecycleError::from));
        note("close pipeline", self.pipeline.close().map_err(LifecycleError::from));
        let flushed = match self.pipeline.flush_pending() {
            Ok(written) => written,
            Err(err) => {
                note("flush pending", Err(err.into()));
                0
            }
        };
        note("flush values", self.values.flush().map_err(LifecycleError::from));
        note("close values", self.values.close().map_err(LifecycleError::from));
        note("close metadata", self.metadata.close().map_err(LifecycleError::from));

        let unpersisted = self.pipeline.pending_persistence();
        info!(flushed, unpersisted = unpersisted.len(), "state core stopped");
        match first_error {
            Some(err) => Err(err),
            None => Ok(ShutdownReport {
                flushed,
                unpersisted,
            }),
        }
    }

    /// Returns true after [`StateCore::shutdown`].
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}
