//! Units of background work.
//!
//! A [`LoadTask`] produces a value on a background thread. Tasks compose by
//! delegation: while a task evaluates another one inline, the inner task is
//! installed as its *nested* task so that cancelling the outer one reaches
//! the inner one too.

use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{LoadResult, PreconditionViolation};
use crate::progress::ProgressMonitor;

/// A cancellable computation run by a [`LoadScheduler`](crate::LoadScheduler).
///
/// `evaluate` runs on a background thread and may block for as long as it
/// needs. It returns:
///
/// - `Ok(value)` on success,
/// - `Err(LoadError::Cancelled)` when it stopped because cancellation was
///   requested through the monitor,
/// - any other `Err` as a genuine failure.
///
/// Tasks are shared between the background thread evaluating them and the UI
/// thread that may cancel them, hence `&self` everywhere and the `Sync` bound.
pub trait LoadTask: Send + Sync {
    /// The value produced by a successful evaluation.
    type Output: Send + 'static;

    /// Human-readable name, used as the title of failure reports.
    fn name(&self) -> &str;

    /// The nested-task slot of this task.
    fn nested(&self) -> &NestedTask;

    /// Run the computation.
    fn evaluate(&self, progress: &ProgressMonitor) -> LoadResult<Self::Output>;

    /// Ask the computation to stop.
    ///
    /// Returns `true` if the request was honored. The default delegates to the
    /// nested task, if any.
    fn cancel(&self) -> bool {
        self.nested().cancel()
    }
}

type CancelFn = Arc<dyn Fn() -> bool + Send + Sync>;

#[derive(Clone)]
struct NestedEntry {
    name: String,
    cancel: CancelFn,
}

/// The slot holding at most one nested task.
///
/// Embed one in every [`LoadTask`] implementation and return it from
/// [`LoadTask::nested`].
#[derive(Default)]
pub struct NestedTask {
    slot: Mutex<Option<NestedEntry>>,
}

impl NestedTask {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `task` as the nested task.
    ///
    /// Fails with [`PreconditionViolation::NestedTaskAlreadySet`] if a task is
    /// already installed; the slot is left untouched in that case.
    pub fn set<T>(&self, task: Arc<T>) -> Result<(), PreconditionViolation>
    where
        T: LoadTask + ?Sized + 'static,
    {
        let mut slot = self.slot.lock();
        if let Some(current) = slot.as_ref() {
            return Err(PreconditionViolation::NestedTaskAlreadySet {
                current: current.name.clone(),
            });
        }
        *slot = Some(NestedEntry {
            name: task.name().to_string(),
            cancel: Arc::new(move || task.cancel()),
        });
        Ok(())
    }

    /// Remove the nested task.
    ///
    /// Fails with [`PreconditionViolation::NoNestedTask`] if none is installed.
    pub fn clear(&self) -> Result<(), PreconditionViolation> {
        self.slot
            .lock()
            .take()
            .map(|_| ())
            .ok_or(PreconditionViolation::NoNestedTask)
    }

    /// Check if a nested task is installed.
    pub fn is_set(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Name of the installed nested task.
    pub fn name(&self) -> Option<String> {
        self.slot.lock().as_ref().map(|entry| entry.name.clone())
    }

    /// Forward a cancellation request to the nested task.
    ///
    /// Returns `false` if no nested task is installed.
    pub fn cancel(&self) -> bool {
        // Clone out so the nested task's own locks are taken after ours is released.
        let cancel = self.slot.lock().as_ref().map(|entry| entry.cancel.clone());
        cancel.is_some_and(|cancel| (*cancel)())
    }
}

impl std::fmt::Debug for NestedTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NestedTask")
            .field("nested", &self.name())
            .finish()
    }
}

/// A task that always succeeds immediately with `T::default()`.
///
/// Useful as a placeholder where a task is required but nothing has to be
/// loaded.
pub struct NullTask<T> {
    nested: NestedTask,
    _output: PhantomData<fn() -> T>,
}

impl<T> NullTask<T> {
    /// Create a new null task.
    pub fn new() -> Self {
        Self {
            nested: NestedTask::new(),
            _output: PhantomData,
        }
    }
}

impl<T> Default for NullTask<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LoadTask for NullTask<T>
where
    T: Default + Send + 'static,
{
    type Output = T;

    fn name(&self) -> &str {
        "Null"
    }

    fn nested(&self) -> &NestedTask {
        &self.nested
    }

    fn evaluate(&self, _progress: &ProgressMonitor) -> LoadResult<T> {
        Ok(T::default())
    }
}

impl<T> std::fmt::Debug for NullTask<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NullTask").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Stoppable {
        nested: NestedTask,
        stopped: AtomicBool,
    }

    impl Stoppable {
        fn new() -> Self {
            Self {
                nested: NestedTask::new(),
                stopped: AtomicBool::new(false),
            }
        }
    }

    impl LoadTask for Stoppable {
        type Output = ();

        fn name(&self) -> &str {
            "stoppable"
        }

        fn nested(&self) -> &NestedTask {
            &self.nested
        }

        fn evaluate(&self, _progress: &ProgressMonitor) -> LoadResult<()> {
            Ok(())
        }

        fn cancel(&self) -> bool {
            self.stopped.store(true, Ordering::SeqCst);
            true
        }
    }

    #[test]
    fn test_null_task_evaluates_to_default() {
        let task = NullTask::<Vec<String>>::new();
        assert_eq!(task.name(), "Null");
        assert_eq!(task.evaluate(&ProgressMonitor::new()).unwrap(), Vec::<String>::new());
        assert!(!task.cancel());
    }

    #[test]
    fn test_nested_set_and_clear() {
        let host = NullTask::<()>::new();
        assert!(!host.nested().is_set());

        host.nested().set(Arc::new(NullTask::<u8>::new())).unwrap();
        assert!(host.nested().is_set());
        assert_eq!(host.nested().name().as_deref(), Some("Null"));

        host.nested().clear().unwrap();
        assert!(!host.nested().is_set());
    }

    #[test]
    fn test_double_set_is_precondition_violation() {
        let host = NullTask::<()>::new();
        host.nested().set(Arc::new(Stoppable::new())).unwrap();

        let err = host.nested().set(Arc::new(NullTask::<u8>::new())).unwrap_err();
        assert_eq!(
            err,
            PreconditionViolation::NestedTaskAlreadySet {
                current: "stoppable".to_string()
            }
        );
        assert_eq!(host.nested().name().as_deref(), Some("stoppable"));
    }

    #[test]
    fn test_clear_without_nested_is_precondition_violation() {
        let host = NullTask::<()>::new();
        assert_eq!(host.nested().clear(), Err(PreconditionViolation::NoNestedTask));
    }

    #[test]
    fn test_cancel_delegates_to_nested() {
        let host = NullTask::<()>::new();
        assert!(!host.cancel());

        let inner = Arc::new(Stoppable::new());
        host.nested().set(inner.clone()).unwrap();
        assert!(host.cancel());
        assert!(inner.stopped.load(Ordering::SeqCst));

        host.nested().clear().unwrap();
        assert!(!host.cancel());
    }

    #[test]
    fn test_nested_accepts_trait_objects() {
        let host = NullTask::<()>::new();
        let inner: Arc<dyn LoadTask<Output = u8>> = Arc::new(NullTask::<u8>::new());
        host.nested().set(inner).unwrap();
        assert!(host.nested().is_set());
    }
}
