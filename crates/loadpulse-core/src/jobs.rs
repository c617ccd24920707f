//! Registry of active load schedulers.
//!
//! Every scheduled load is registered here until its finalize step has run.
//! Loads may carry a [`FamilyKey`], an opaque tag naming the resource they
//! work on, so that code which knows nothing about individual loads can ask
//! "is anything loading for X?" or cancel all of them at once.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::logging::targets;
use crate::progress::ProgressMonitor;

new_key_type! {
    /// A unique identifier for a scheduled load.
    pub struct LoadId;
}

/// An opaque tag grouping related loads, e.g. by data source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FamilyKey(Arc<str>);

impl FamilyKey {
    /// Create a family key.
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FamilyKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for FamilyKey {
    fn from(key: String) -> Self {
        Self(Arc::from(key))
    }
}

impl fmt::Display for FamilyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a scheduled load.
///
/// Pulsing runs alongside `Running` and is reported separately by
/// [`LoadHandle::is_pulsing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LoadState {
    /// Built but not yet submitted.
    Created = 0,
    /// Submitted to the background executor.
    Scheduled = 1,
    /// `evaluate()` is running.
    Running = 2,
    /// The result is being handed to the visualizer.
    Finalizing = 3,
    /// Finalize has run; the load is over.
    Done = 4,
}

impl LoadState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Scheduled,
            2 => Self::Running,
            3 => Self::Finalizing,
            _ => Self::Done,
        }
    }
}

/// How a finished load ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadOutcome {
    /// The result was handed to the visualizer.
    Completed,
    /// The task failed and the failure was reported.
    Failed,
    /// The load was cancelled, or its result discarded after cancellation.
    Cancelled,
}

type CancelFn = Box<dyn Fn() -> bool + Send + Sync>;

type DoneListener = Box<dyn FnOnce(LoadOutcome) + Send + 'static>;

#[derive(Default)]
struct DoneListeners {
    outcome: Option<LoadOutcome>,
    pending: Vec<DoneListener>,
}

/// State shared between a scheduler, its handles and the registry.
pub(crate) struct JobShared {
    name: String,
    family: Option<FamilyKey>,
    state: AtomicU8,
    pulsing: AtomicBool,
    finalized: AtomicBool,
    monitor: ProgressMonitor,
    cancel_task: CancelFn,
    listeners: Mutex<DoneListeners>,
}

impl JobShared {
    pub(crate) fn new(
        name: String,
        family: Option<FamilyKey>,
        monitor: ProgressMonitor,
        cancel_task: CancelFn,
    ) -> Self {
        Self {
            name,
            family,
            state: AtomicU8::new(LoadState::Created as u8),
            pulsing: AtomicBool::new(false),
            finalized: AtomicBool::new(false),
            monitor,
            cancel_task,
            listeners: Mutex::new(DoneListeners::default()),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn monitor(&self) -> &ProgressMonitor {
        &self.monitor
    }

    pub(crate) fn state(&self) -> LoadState {
        LoadState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: LoadState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn set_pulsing(&self, pulsing: bool) {
        self.pulsing.store(pulsing, Ordering::Release);
    }

    /// Record the outcome and run every listener registered so far.
    pub(crate) fn notify_done(&self, outcome: LoadOutcome) {
        let pending = {
            let mut listeners = self.listeners.lock();
            listeners.outcome = Some(outcome);
            std::mem::take(&mut listeners.pending)
        };
        for listener in pending {
            listener(outcome);
        }
    }

    pub(crate) fn outcome(&self) -> Option<LoadOutcome> {
        self.listeners.lock().outcome
    }

    /// Claim the single finalize step. Only the first call returns `true`.
    pub(crate) fn claim_finalize(&self) -> bool {
        !self.finalized.swap(true, Ordering::AcqRel)
    }
}

/// A handle to a scheduled load.
///
/// Handles are cheap to clone and stay valid after the load is over.
#[derive(Clone)]
pub struct LoadHandle {
    id: LoadId,
    shared: Arc<JobShared>,
}

impl LoadHandle {
    pub(crate) fn new(id: LoadId, shared: Arc<JobShared>) -> Self {
        Self { id, shared }
    }

    /// The registry id of this load.
    pub fn id(&self) -> LoadId {
        self.id
    }

    /// The task name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The family this load belongs to, if any.
    pub fn family(&self) -> Option<&FamilyKey> {
        self.shared.family.as_ref()
    }

    /// The current lifecycle state.
    pub fn state(&self) -> LoadState {
        self.shared.state()
    }

    /// Whether finalize has run.
    pub fn is_done(&self) -> bool {
        self.state() == LoadState::Done
    }

    /// Whether the UI pulse is still re-arming itself.
    pub fn is_pulsing(&self) -> bool {
        self.shared.pulsing.load(Ordering::Acquire)
    }

    /// How the load ended, once it has.
    pub fn outcome(&self) -> Option<LoadOutcome> {
        self.shared.outcome()
    }

    /// Run `listener` once the load is over.
    ///
    /// The listener runs on the UI thread right after finalize. If the load
    /// is already over it runs immediately on the calling thread.
    pub fn on_done<F>(&self, listener: F)
    where
        F: FnOnce(LoadOutcome) + Send + 'static,
    {
        let mut listeners = self.shared.listeners.lock();
        match listeners.outcome {
            Some(outcome) => {
                drop(listeners);
                listener(outcome);
            }
            None => listeners.pending.push(Box::new(listener)),
        }
    }

    /// The progress handle the task evaluates with.
    pub fn progress(&self) -> &ProgressMonitor {
        &self.shared.monitor
    }

    /// Request cooperative cancellation.
    ///
    /// Trips the progress monitor's token, then asks the task itself to stop.
    /// Returns the task's answer: `true` if it actively honored the request.
    pub fn cancel(&self) -> bool {
        self.shared.monitor.cancel();
        let honored = (self.shared.cancel_task)();
        tracing::debug!(
            target: targets::SCHEDULER,
            id = ?self.id,
            name = %self.shared.name,
            honored,
            "cancellation requested"
        );
        honored
    }
}

impl fmt::Debug for LoadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadHandle")
            .field("id", &self.id)
            .field("name", &self.shared.name)
            .field("family", &self.shared.family)
            .field("state", &self.state())
            .finish()
    }
}

/// Registry of loads that have been scheduled and not yet finalized.
#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<SlotMap<LoadId, Arc<JobShared>>>,
}

impl JobRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, shared: Arc<JobShared>) -> LoadId {
        self.jobs.lock().insert(shared)
    }

    pub(crate) fn remove(&self, id: LoadId) {
        self.jobs.lock().remove(id);
    }

    /// Number of loads not yet finalized.
    pub fn active_count(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Whether any load of `family` is still active.
    pub fn is_any_active(&self, family: &FamilyKey) -> bool {
        self.jobs
            .lock()
            .values()
            .any(|job| job.family.as_ref() == Some(family))
    }

    /// Handles of every active load of `family`.
    pub fn active(&self, family: &FamilyKey) -> Vec<LoadHandle> {
        self.jobs
            .lock()
            .iter()
            .filter(|(_, job)| job.family.as_ref() == Some(family))
            .map(|(id, job)| LoadHandle::new(id, job.clone()))
            .collect()
    }

    /// Handles of every active load.
    pub fn all(&self) -> Vec<LoadHandle> {
        self.jobs
            .lock()
            .iter()
            .map(|(id, job)| LoadHandle::new(id, job.clone()))
            .collect()
    }

    /// Request cancellation of every active load of `family`.
    ///
    /// Returns how many loads were asked to stop. They still finalize
    /// normally, with `complete_loading(None)`.
    pub fn cancel_all(&self, family: &FamilyKey) -> usize {
        // Collect first: task cancellation may take locks of its own.
        let handles = self.active(family);
        for handle in &handles {
            handle.cancel();
        }
        tracing::debug!(
            target: targets::SCHEDULER,
            %family,
            count = handles.len(),
            "cancelled family"
        );
        handles.len()
    }
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("active", &self.active_count())
            .finish()
    }
}
