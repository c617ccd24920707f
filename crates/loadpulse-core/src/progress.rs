//! Progress and cancellation handle for load tasks.
//!
//! A [`ProgressMonitor`] is handed to [`LoadTask::evaluate`](crate::LoadTask::evaluate).
//! It is the only channel between a running computation and the rest of the
//! engine: the task reports what it is doing through it, and it observes
//! cooperative cancellation through it.
//!
//! # Example
//!
//! ```
//! use loadpulse_core::ProgressMonitor;
//!
//! let monitor = ProgressMonitor::new();
//! monitor.begin_task("Load tables", 4);
//! monitor.sub_task("reading catalog");
//! monitor.worked(2);
//! assert!((monitor.fraction() - 0.5).abs() < f32::EPSILON);
//! assert!(monitor.check_cancelled().is_ok());
//! ```

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{LoadError, LoadResult};
use crate::threadpool::CancellationToken;

/// One level of `begin_task` / `done` nesting.
#[derive(Debug, Clone)]
struct TaskFrame {
    name: String,
    /// Total units of work; zero means unknown.
    total_work: u64,
    worked: u64,
}

/// Internal state shared between monitor clones.
#[derive(Debug, Default)]
struct MonitorInner {
    token: CancellationToken,
    tasks: Mutex<Vec<TaskFrame>>,
    sub_task: Mutex<Option<String>>,
}

/// The frame reported to observers: the innermost one with more than one
/// unit of work, else the innermost one.
fn reported(tasks: &[TaskFrame]) -> Option<&TaskFrame> {
    tasks
        .iter()
        .rev()
        .find(|frame| frame.total_work > 1)
        .or_else(|| tasks.last())
}

/// A thread-safe progress handle shared by a task and its scheduler.
///
/// Cloning is cheap; every clone observes the same state. Nested tasks are
/// evaluated with their host's monitor, so cancelling the host reaches them
/// too. Their `begin_task` / `done` pairs stack on top of the host's task
/// instead of replacing it.
#[derive(Debug, Clone, Default)]
pub struct ProgressMonitor {
    inner: Arc<MonitorInner>,
}

impl ProgressMonitor {
    /// Create a fresh monitor with no work recorded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a monitor observing an existing cancellation token.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                token,
                ..Default::default()
            }),
        }
    }

    /// Start a named unit of work. `total_work` of zero means unknown.
    ///
    /// Called while another task is running, this starts a nested task that
    /// lasts until the matching [`done`](Self::done).
    pub fn begin_task(&self, name: impl Into<String>, total_work: u64) {
        self.inner.tasks.lock().push(TaskFrame {
            name: name.into(),
            total_work,
            worked: 0,
        });
    }

    /// Describe the step currently running.
    pub fn sub_task(&self, message: impl Into<String>) {
        *self.inner.sub_task.lock() = Some(message.into());
    }

    /// Record `units` of completed work on the innermost task.
    pub fn worked(&self, units: u64) {
        if let Some(frame) = self.inner.tasks.lock().last_mut() {
            frame.worked = frame.worked.saturating_add(units);
        }
    }

    /// Finish the innermost task.
    ///
    /// A nested task is popped, handing progress back to its host. The
    /// outermost task stays and is marked fully worked.
    pub fn done(&self) {
        {
            let mut tasks = self.inner.tasks.lock();
            if tasks.len() > 1 {
                tasks.pop();
            } else if let Some(frame) = tasks.last_mut() {
                frame.worked = frame.total_work;
            }
        }
        *self.inner.sub_task.lock() = None;
    }

    /// Completed fraction in `0.0..=1.0`; zero while the total is unknown.
    pub fn fraction(&self) -> f32 {
        let tasks = self.inner.tasks.lock();
        match reported(&tasks) {
            Some(frame) if frame.total_work > 0 => {
                (frame.worked as f32 / frame.total_work as f32).clamp(0.0, 1.0)
            }
            _ => 0.0,
        }
    }

    /// Name of the task currently reported.
    pub fn task_name(&self) -> Option<String> {
        reported(&self.inner.tasks.lock()).map(|frame| frame.name.clone())
    }

    /// Depth of `begin_task` nesting.
    pub fn depth(&self) -> usize {
        self.inner.tasks.lock().len()
    }

    /// Drop every task started above `depth`.
    pub(crate) fn unwind_to(&self, depth: usize) {
        self.inner.tasks.lock().truncate(depth);
    }

    /// Message given to the last [`sub_task`](Self::sub_task), if still running.
    pub fn sub_task_message(&self) -> Option<String> {
        self.inner.sub_task.lock().clone()
    }

    /// Request cooperative cancellation.
    ///
    /// Returns `true` if this call was the one that requested it.
    pub fn cancel(&self) -> bool {
        self.inner.token.cancel()
    }

    /// Check if cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Return [`LoadError::Cancelled`] once cancellation has been requested.
    ///
    /// Long computations call this between steps and propagate with `?`.
    pub fn check_cancelled(&self) -> LoadResult<()> {
        if self.is_cancelled() {
            Err(LoadError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// The token observed by this monitor.
    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_fraction() {
        let monitor = ProgressMonitor::new();
        assert_eq!(monitor.fraction(), 0.0);

        monitor.begin_task("children", 4);
        monitor.worked(1);
        assert!((monitor.fraction() - 0.25).abs() < f32::EPSILON);

        monitor.worked(10);
        assert_eq!(monitor.fraction(), 1.0);

        monitor.done();
        assert_eq!(monitor.fraction(), 1.0);
        assert_eq!(monitor.depth(), 1);
    }

    #[test]
    fn test_nested_task_keeps_host_progress() {
        let monitor = ProgressMonitor::new();
        monitor.begin_task("Load tables", 4);
        monitor.worked(1);

        monitor.begin_task("read ddl", 1);
        assert_eq!(monitor.depth(), 2);
        assert_eq!(monitor.task_name().as_deref(), Some("Load tables"));
        monitor.worked(1);
        monitor.done();

        monitor.worked(1);
        assert_eq!(monitor.depth(), 1);
        assert_eq!(monitor.task_name().as_deref(), Some("Load tables"));
        assert!((monitor.fraction() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_nested_task_with_more_work_is_reported() {
        let monitor = ProgressMonitor::new();
        monitor.begin_task("Load schema", 2);
        monitor.begin_task("Load columns", 10);
        monitor.worked(5);
        assert_eq!(monitor.task_name().as_deref(), Some("Load columns"));
        assert!((monitor.fraction() - 0.5).abs() < f32::EPSILON);

        monitor.done();
        assert_eq!(monitor.task_name().as_deref(), Some("Load schema"));
        assert_eq!(monitor.fraction(), 0.0);
    }

    #[test]
    fn test_worked_without_task_is_ignored() {
        let monitor = ProgressMonitor::new();
        monitor.worked(3);
        monitor.done();
        assert_eq!(monitor.fraction(), 0.0);
        assert_eq!(monitor.task_name(), None);
    }

    #[test]
    fn test_messages() {
        let monitor = ProgressMonitor::new();
        monitor.begin_task("Load columns", 0);
        monitor.sub_task("querying");
        assert_eq!(monitor.task_name().as_deref(), Some("Load columns"));
        assert_eq!(monitor.sub_task_message().as_deref(), Some("querying"));

        monitor.done();
        assert_eq!(monitor.sub_task_message(), None);
    }

    #[test]
    fn test_cancellation_shared_between_clones() {
        let monitor = ProgressMonitor::new();
        let seen_by_task = monitor.clone();
        assert!(seen_by_task.check_cancelled().is_ok());

        assert!(monitor.cancel());
        assert!(!monitor.cancel());
        assert!(seen_by_task.is_cancelled());
        assert!(matches!(seen_by_task.check_cancelled(), Err(LoadError::Cancelled)));
    }

    #[test]
    fn test_with_token() {
        let token = CancellationToken::new();
        let monitor = ProgressMonitor::with_token(token.clone());
        token.cancel();
        assert!(monitor.is_cancelled());
    }
}
