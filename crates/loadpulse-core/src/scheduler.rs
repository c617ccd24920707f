//! Background execution with a UI pulse and a single finalize step.
//!
//! A [`LoadScheduler`] pairs a [`LoadTask`] with a [`LoadVisualizer`]:
//!
//! 1. `schedule()` submits the task to the background executor and arms a
//!    pulse on the UI thread after a short initial delay.
//! 2. Each pulse asks the visualizer whether it is completed. If not, it
//!    renders one animation step and re-arms itself; otherwise it stops for
//!    good, whether or not the task has finished.
//! 3. The background job evaluates the task. A result, a failure, a
//!    cancellation or a panic all end up in the same place:
//! 4. a finalize job on the UI thread calls `complete_loading` exactly once
//!    and forwards genuine failures to the [`ErrorSink`](crate::ErrorSink).
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use loadpulse_core::{CallbackVisualizer, LoadRuntime, LoadScheduler, NullTask, UiEventLoop};
//!
//! let ui = UiEventLoop::new();
//! let runtime = LoadRuntime::new(ui.handle());
//!
//! let handle = LoadScheduler::new(
//!     &runtime,
//!     NullTask::<Vec<String>>::new(),
//!     CallbackVisualizer::new(|rows: Option<Vec<String>>| println!("{rows:?}")),
//! )
//! .in_family("catalog")
//! .schedule();
//!
//! ui.run_until(Duration::from_secs(1), || handle.is_done());
//! ```

use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{LoadError, LoadResult, PanicError};
use crate::jobs::{FamilyKey, JobRegistry, JobShared, LoadHandle, LoadId, LoadOutcome, LoadState};
use crate::logging::targets;
use crate::progress::ProgressMonitor;
use crate::runtime::LoadRuntime;
use crate::task::LoadTask;
use crate::visualizer::LoadVisualizer;

/// Schedules one task/visualizer pair.
///
/// The scheduler exclusively owns both for the lifetime of the load.
pub struct LoadScheduler<T, V>
where
    T: LoadTask + 'static,
    V: LoadVisualizer<T::Output> + 'static,
{
    runtime: LoadRuntime,
    task: Arc<T>,
    visualizer: V,
    family: Option<FamilyKey>,
}

impl<T, V> LoadScheduler<T, V>
where
    T: LoadTask + 'static,
    V: LoadVisualizer<T::Output> + 'static,
{
    /// Pair `task` with `visualizer` on `runtime`.
    pub fn new(runtime: &LoadRuntime, task: T, visualizer: V) -> Self {
        Self {
            runtime: runtime.clone(),
            task: Arc::new(task),
            visualizer,
            family: None,
        }
    }

    /// Tag the load with a family for batch queries and cancellation.
    pub fn in_family(mut self, family: impl Into<FamilyKey>) -> Self {
        self.family = Some(family.into());
        self
    }

    /// The task name.
    pub fn name(&self) -> &str {
        self.task.name()
    }

    /// Start the load.
    ///
    /// Returns immediately; the returned handle observes and cancels it.
    pub fn schedule(self) -> LoadHandle {
        let LoadScheduler {
            runtime,
            task,
            visualizer,
            family,
        } = self;

        let monitor = ProgressMonitor::new();
        let cancel_target = task.clone();
        let shared = Arc::new(JobShared::new(
            task.name().to_string(),
            family,
            monitor.clone(),
            Box::new(move || cancel_target.cancel()),
        ));
        let id = runtime.jobs().insert(shared.clone());
        let handle = LoadHandle::new(id, shared.clone());
        let visualizer = Arc::new(Mutex::new(visualizer));

        shared.set_state(LoadState::Scheduled);
        tracing::debug!(
            target: targets::SCHEDULER,
            ?id,
            name = %shared.name(),
            family = ?handle.family(),
            "scheduling load"
        );

        let pulse: Pulse<T::Output, V> = Pulse {
            shared: shared.clone(),
            visualizer: visualizer.clone(),
            runtime: runtime.clone(),
            _result: PhantomData,
        };
        shared.set_pulsing(true);
        runtime
            .dispatcher()
            .dispatch_after(runtime.pulse().initial_delay, Box::new(move || pulse.tick()));

        let completion = Completion {
            id,
            shared,
            visualizer,
            runtime: runtime.clone(),
            outcome: None,
        };
        runtime
            .executor()
            .execute(Box::new(move || run_in_background(task, monitor, completion)));

        handle
    }
}

/// Schedule a load without keeping its handle.
///
/// For call sites that only care about the visualizer being called.
pub fn schedule_fire_and_forget<T, V>(runtime: &LoadRuntime, task: T, visualizer: V)
where
    T: LoadTask + 'static,
    V: LoadVisualizer<T::Output> + 'static,
{
    LoadScheduler::new(runtime, task, visualizer).schedule();
}

fn run_in_background<T, V>(
    task: Arc<T>,
    monitor: ProgressMonitor,
    mut completion: Completion<T::Output, V>,
) where
    T: LoadTask + 'static,
    V: LoadVisualizer<T::Output> + 'static,
{
    completion.shared.set_state(LoadState::Running);
    let span =
        tracing::debug_span!(target: targets::SCHEDULER, "evaluate", name = %task.name());
    let _entered = span.enter();

    let outcome = catch_unwind(AssertUnwindSafe(|| task.evaluate(&monitor)))
        .unwrap_or_else(|payload| {
            Err(LoadError::execution(PanicError::from_payload(payload.as_ref())))
        });
    completion.outcome = Some(outcome);
    // Dropping `completion` dispatches finalize.
}

/// Carries the outcome of a load to the UI thread.
///
/// Finalize is dispatched from `Drop`, so it also happens when the executor
/// discards the job without running it; that case finalizes as cancelled.
struct Completion<R, V>
where
    R: Send + 'static,
    V: LoadVisualizer<R> + 'static,
{
    id: LoadId,
    shared: Arc<JobShared>,
    visualizer: Arc<Mutex<V>>,
    runtime: LoadRuntime,
    outcome: Option<LoadResult<R>>,
}

impl<R, V> Drop for Completion<R, V>
where
    R: Send + 'static,
    V: LoadVisualizer<R> + 'static,
{
    fn drop(&mut self) {
        let outcome = self.outcome.take().unwrap_or(Err(LoadError::Cancelled));
        let id = self.id;
        let shared = self.shared.clone();
        let visualizer = self.visualizer.clone();
        let runtime = self.runtime.clone();
        self.runtime.dispatcher().dispatch(Box::new(move || {
            finalize(id, &shared, &visualizer, &runtime, outcome);
        }));
    }
}

/// Marks a load done, unregisters it and notifies its listeners, even if the
/// visualizer panics.
struct FinishGuard<'a> {
    id: LoadId,
    shared: &'a JobShared,
    jobs: &'a JobRegistry,
    outcome: LoadOutcome,
}

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.shared.set_pulsing(false);
        self.shared.set_state(LoadState::Done);
        self.jobs.remove(self.id);
        self.shared.notify_done(self.outcome);
    }
}

fn finalize<R, V>(
    id: LoadId,
    shared: &JobShared,
    visualizer: &Mutex<V>,
    runtime: &LoadRuntime,
    outcome: LoadResult<R>,
) where
    V: LoadVisualizer<R>,
{
    if !shared.claim_finalize() {
        tracing::warn!(target: targets::SCHEDULER, ?id, "finalize requested twice, ignoring");
        return;
    }
    let span =
        tracing::debug_span!(target: targets::SCHEDULER, "finalize", name = %shared.name());
    let _entered = span.enter();

    shared.set_state(LoadState::Finalizing);
    let mut finish = FinishGuard {
        id,
        shared,
        jobs: runtime.jobs(),
        outcome: LoadOutcome::Cancelled,
    };

    let (result, failure) = match outcome {
        Ok(_) if shared.monitor().is_cancelled() => {
            tracing::debug!(target: targets::SCHEDULER, ?id, "discarding result of cancelled load");
            (None, None)
        }
        Ok(value) => (Some(value), None),
        Err(LoadError::Cancelled) => (None, None),
        Err(err) => (None, Some(err)),
    };
    tracing::debug!(
        target: targets::SCHEDULER,
        ?id,
        has_result = result.is_some(),
        failed = failure.is_some(),
        "finalizing load"
    );
    finish.outcome = match (&result, &failure) {
        (Some(_), _) => LoadOutcome::Completed,
        (None, Some(_)) => LoadOutcome::Failed,
        (None, None) => LoadOutcome::Cancelled,
    };

    visualizer.lock().complete_loading(result);

    if let Some(err) = failure {
        runtime.error_sink().report(shared.name(), &err);
    }
}

/// The repeating UI tick animating a running load.
struct Pulse<R, V> {
    shared: Arc<JobShared>,
    visualizer: Arc<Mutex<V>>,
    runtime: LoadRuntime,
    _result: PhantomData<fn(R)>,
}

impl<R, V> Pulse<R, V>
where
    R: 'static,
    V: LoadVisualizer<R> + 'static,
{
    fn tick(self) {
        if self.shared.state() == LoadState::Done {
            self.shared.set_pulsing(false);
            return;
        }

        let completed = {
            let mut visualizer = self.visualizer.lock();
            if visualizer.is_completed() {
                true
            } else {
                visualizer.visualize_loading();
                false
            }
        };

        if completed {
            self.shared.set_pulsing(false);
            tracing::trace!(target: targets::PULSE, name = %self.shared.name(), "pulse stopped");
            return;
        }

        let interval = self.runtime.pulse().interval;
        let dispatcher = self.runtime.dispatcher().clone();
        dispatcher.dispatch_after(interval, Box::new(move || self.tick()));
    }
}
