// crates/camstate-core/src/runtime/dispatch.rs
// ============================================================================
// Module: camstate Observer Dispatcher
// Description: Ordered background delivery of state changes to observers.
// Purpose: Keep side effects off the mutation path without reordering them.
// Dependencies: crate::interfaces, thiserror, tracing
// ============================================================================

//! ## Overview
//! Changes are routed to a fixed number of lanes by a stable hash of the entry
//! name. Each lane is a worker thread draining a bounded queue in FIFO order,
//! so all changes of one entry are delivered in sequence order and the
//! observers of an entry run in registration order.
//!
//! Observer calls run on a per-lane executor thread and are bounded by a
//! timeout. An executor that overruns is abandoned and replaced, so one hung
//! observer costs a timeout and never stalls the lane. Panics are caught and
//! counted as failures. A full queue blocks the sender: updates are never
//! dropped.
//!
//! # Invariants
//! - Same entry, same lane; lane queues are FIFO.
//! - Observer errors, panics, and timeouts never reach the mutating caller.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::mpsc::RecvTimeoutError;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::interfaces::StateChange;
use crate::interfaces::StateObserver;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Default lane count.
pub const DEFAULT_LANES: usize = 4;
/// Default per-lane queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
/// Default per-observer timeout.
pub const DEFAULT_OBSERVER_TIMEOUT: Duration = Duration::from_millis(2000);

/// Dispatcher configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Number of worker lanes.
    pub lanes: usize,
    /// Pending deliveries per lane before senders block.
    pub queue_capacity: usize,
    /// Upper bound on a single observer call.
    pub observer_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            lanes: DEFAULT_LANES,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            observer_timeout: DEFAULT_OBSERVER_TIMEOUT,
        }
    }
}

/// Dispatcher errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Configuration rejected.
    #[error("invalid dispatch config: {0}")]
    Invalid(String),
    /// Worker thread could not be started.
    #[error("failed to start dispatch worker: {0}")]
    Spawn(String),
    /// Dispatcher has been shut down.
    #[error("observer dispatcher stopped")]
    Stopped,
}

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Observer calls that returned `Ok`.
    pub delivered: u64,
    /// Observer calls that returned an error or panicked.
    pub failed: u64,
    /// Observer calls abandoned after the timeout.
    pub timed_out: u64,
    /// Executors replaced after a timeout.
    pub replaced: u64,
}

// ============================================================================
// SECTION: Internals
// ============================================================================

/// A change together with the observers attached when it was applied.
struct Delivery {
    /// Change payload shared by every observer.
    change: Arc<StateChange>,
    /// Observers in registration order.
    observers: Vec<Arc<dyn StateObserver>>,
}

/// Lane queue command.
enum LaneCommand {
    /// Deliver a change.
    Deliver(Delivery),
    /// Acknowledge once everything queued before has been handled.
    Barrier(mpsc::Sender<()>),
    /// Exit the lane.
    Stop,
}

/// Shared counters.
#[derive(Default)]
struct Counters {
    /// See [`DispatchStats::delivered`].
    delivered: AtomicU64,
    /// See [`DispatchStats::failed`].
    failed: AtomicU64,
    /// See [`DispatchStats::timed_out`].
    timed_out: AtomicU64,
    /// See [`DispatchStats::replaced`].
    replaced: AtomicU64,
}

/// Outcome of a single observer call.
enum CallResult {
    /// Observer returned `Ok`.
    Delivered,
    /// Observer returned an error.
    Failed(String),
    /// Observer panicked.
    Panicked,
}

/// Job executed on an executor thread.
type ExecutorJob = (Arc<dyn StateObserver>, Arc<StateChange>);

/// Thread that runs observer calls for one lane.
struct Executor {
    /// Job queue.
    jobs: mpsc::Sender<ExecutorJob>,
    /// Result queue.
    results: mpsc::Receiver<CallResult>,
}

impl Executor {
    /// Spawns an executor thread for `lane`.
    fn spawn(lane: usize, generation: u64) -> std::io::Result<Self> {
        let (jobs, job_rx) = mpsc::channel::<ExecutorJob>();
        let (result_tx, results) = mpsc::channel();
        thread::Builder::new().name(format!("camstate-observer-{lane}-{generation}")).spawn(
            move || {
                while let Ok((observer, change)) = job_rx.recv() {
                    if result_tx.send(call_observer(observer.as_ref(), &change)).is_err() {
                        break;
                    }
                }
            },
        )?;
        Ok(Self {
            jobs,
            results,
        })
    }
}

/// Invokes an observer, converting panics into a result.
fn call_observer(observer: &dyn StateObserver, change: &StateChange) -> CallResult {
    match catch_unwind(AssertUnwindSafe(|| observer.on_change(change))) {
        Ok(Ok(())) => CallResult::Delivered,
        Ok(Err(err)) => CallResult::Failed(err.to_string()),
        Err(_) => CallResult::Panicked,
    }
}

/// Per-lane worker state.
struct LaneWorker {
    /// Lane index.
    index: usize,
    /// Observer call timeout.
    timeout: Duration,
    /// Current executor; `None` when spawning failed and calls run inline.
    executor: Option<Executor>,
    /// Executors spawned so far.
    generation: u64,
    /// Shared counters.
    counters: Arc<Counters>,
}

impl LaneWorker {
    /// Runs the lane until stopped or disconnected.
    fn run(mut self, commands: mpsc::Receiver<LaneCommand>) {
        while let Ok(command) = commands.recv() {
            match command {
                LaneCommand::Deliver(delivery) => self.deliver(&delivery),
                LaneCommand::Barrier(ack) => {
                    let _ = ack.send(());
                }
                LaneCommand::Stop => break,
            }
        }
        debug!(lane = self.index, "observer lane stopped");
    }

    /// Delivers a change to each observer in order.
    fn deliver(&mut self, delivery: &Delivery) {
        for observer in &delivery.observers {
            let result = self.call(observer, &delivery.change);
            self.record(observer.label(), &delivery.change, result);
        }
    }

    /// Calls one observer on the executor, bounded by the timeout.
    fn call(&mut self, observer: &Arc<dyn StateObserver>, change: &Arc<StateChange>) -> Option<CallResult> {
        if self.executor.is_none() {
            self.executor = self.spawn_executor();
        }
        let Some(executor) = &self.executor else {
            return Some(call_observer(observer.as_ref(), change));
        };
        if executor.jobs.send((Arc::clone(observer), Arc::clone(change))).is_err() {
            self.executor = None;
            return Some(call_observer(observer.as_ref(), change));
        }
        match executor.results.recv_timeout(self.timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => {
                self.executor = None;
                self.counters.replaced.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.executor = None;
                Some(CallResult::Panicked)
            }
        }
    }

    /// Spawns a replacement executor, logging when the lane must run inline.
    fn spawn_executor(&mut self) -> Option<Executor> {
        self.generation += 1;
        match Executor::spawn(self.index, self.generation) {
            Ok(executor) => Some(executor),
            Err(err) => {
                warn!(lane = self.index, error = %err, "observer executor unavailable; running inline");
                None
            }
        }
    }

    /// Updates counters and logs failures.
    fn record(&self, label: &str, change: &StateChange, result: Option<CallResult>) {
        match result {
            Some(CallResult::Delivered) => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Some(CallResult::Failed(reason)) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    observer = label,
                    entry = %change.name,
                    sequence = change.sequence,
                    error = %reason,
                    "observer failed"
                );
            }
            Some(CallResult::Panicked) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(observer = label, entry = %change.name, sequence = change.sequence, "observer panicked");
            }
            None => {
                self.counters.timed_out.fetch_add(1, Ordering::Relaxed);
                warn!(
                    observer = label,
                    entry = %change.name,
                    sequence = change.sequence,
                    timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                    "observer timed out; executor replaced"
                );
            }
        }
    }
}

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Lane-partitioned observer dispatcher.
pub struct ObserverDispatcher {
    /// Lane queues.
    lanes: Vec<mpsc::SyncSender<LaneCommand>>,
    /// Lane worker handles, taken on shutdown.
    handles: Mutex<Vec<JoinHandle<()>>>,
    /// Shared counters.
    counters: Arc<Counters>,
    /// Set once shutdown begins.
    stopped: AtomicBool,
}

impl ObserverDispatcher {
    /// Starts the lane workers.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Invalid`] for zero lanes, capacity, or timeout
    /// and [`DispatchError::Spawn`] when a worker cannot be started.
    pub fn start(config: DispatchConfig) -> Result<Self, DispatchError> {
        if config.lanes == 0 {
            return Err(DispatchError::Invalid("lanes must be greater than zero".to_string()));
        }
        if config.queue_capacity == 0 {
            return Err(DispatchError::Invalid("queue_capacity must be greater than zero".to_string()));
        }
        if config.observer_timeout.is_zero() {
            return Err(DispatchError::Invalid("observer_timeout must be greater than zero".to_string()));
        }
        let counters = Arc::new(Counters::default());
        let mut lanes = Vec::with_capacity(config.lanes);
        let mut handles = Vec::with_capacity(config.lanes);
        for index in 0 .. config.lanes {
            let (sender, receiver) = mpsc::sync_channel(config.queue_capacity);
            let worker = LaneWorker {
                index,
                timeout: config.observer_timeout,
                executor: None,
                generation: 0,
                counters: Arc::clone(&counters),
            };
            let handle = thread::Builder::new()
                .name(format!("camstate-lane-{index}"))
                .spawn(move || worker.run(receiver))
                .map_err(|err| DispatchError::Spawn(err.to_string()))?;
            lanes.push(sender);
            handles.push(handle);
        }
        Ok(Self {
            lanes,
            handles: Mutex::new(handles),
            counters,
            stopped: AtomicBool::new(false),
        })
    }

    /// Queues a change for its observers, blocking while the lane is full.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Stopped`] after shutdown.
    pub fn dispatch(
        &self,
        change: StateChange,
        observers: Vec<Arc<dyn StateObserver>>,
    ) -> Result<(), DispatchError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(DispatchError::Stopped);
        }
        if observers.is_empty() {
            return Ok(());
        }
        let lane = self.lane_for(&change.name);
        let delivery = Delivery {
            change: Arc::new(change),
            observers,
        };
        self.lanes[lane].send(LaneCommand::Deliver(delivery)).map_err(|_| DispatchError::Stopped)
    }

    /// Blocks until every change queued before the call has been handled.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Stopped`] when a lane has exited.
    pub fn drain(&self) -> Result<(), DispatchError> {
        let (ack, acks) = mpsc::channel();
        for lane in &self.lanes {
            lane.send(LaneCommand::Barrier(ack.clone())).map_err(|_| DispatchError::Stopped)?;
        }
        drop(ack);
        for _ in 0 .. self.lanes.len() {
            acks.recv().map_err(|_| DispatchError::Stopped)?;
        }
        Ok(())
    }

    /// Drains and stops every lane. Later calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Stopped`] when a lane exited before draining.
    pub fn shutdown(&self) -> Result<(), DispatchError> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let drained = self.drain();
        for lane in &self.lanes {
            let _ = lane.send(LaneCommand::Stop);
        }
        let handles = {
            let mut guard = self.handles.lock().map_err(|_| DispatchError::Stopped)?;
            std::mem::take(&mut *guard)
        };
        for handle in handles {
            if handle.join().is_err() {
                error!("observer lane exited abnormally");
            }
        }
        drained
    }

    /// Returns a snapshot of the delivery counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            timed_out: self.counters.timed_out.load(Ordering::Relaxed),
            replaced: self.counters.replaced.load(Ordering::Relaxed),
        }
    }

    /// Returns the number of lanes.
    #[must_use]
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Returns the lane an entry is routed to.
    #[must_use]
    pub fn lane_for(&self, name: &str) -> usize {
        let lanes = u64::try_from(self.lanes.len()).unwrap_or(1).max(1);
        usize::try_from(fnv1a(name.as_bytes()) % lanes).unwrap_or(0)
    }
}

impl std::fmt::Debug for ObserverDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverDispatcher")
            .field("lanes", &self.lanes.len())
            .field("stopped", &self.stopped.load(Ordering::Relaxed))
            .field("stats", &self.stats())
            .finish()
    }
}

/// 64-bit FNV-1a hash. Stable across runs and platforms.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes.iter().fold(OFFSET, |hash, byte| (hash ^ u64::from(*byte)).wrapping_mul(PRIME))
}
