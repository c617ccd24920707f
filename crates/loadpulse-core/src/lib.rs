//! Core of loadpulse: background loads with a live UI pulse.
//!
//! This crate lets an interactive UI start slow computations without blocking
//! its own thread, animate an "in progress" indicator while they run, and merge
//! their results back exactly once:
//!
//! - **Tasks**: [`LoadTask`], the cancellable unit of background work, and
//!   [`NullTask`]. Tasks compose inline through their [`NestedTask`] slot.
//! - **Visualizers**: [`LoadVisualizer`], the UI-thread callbacks of a load.
//! - **Scheduler**: [`LoadScheduler`] runs a task in the background, pulses its
//!   visualizer on the UI thread and finalizes exactly once.
//! - **Job registry**: [`JobRegistry`] answers "is anything loading for X?"
//!   and cancels whole families of loads.
//! - **Deduplication**: [`DedupRegistry`] and [`ExpansionPlaceholder`] keep at
//!   most one load in flight per key.
//! - **Lazy properties**: [`extract_value`] evaluates deferred attributes
//!   inline as nested tasks.
//! - **Host capabilities**: [`BackgroundExecutor`], [`UiDispatcher`] and
//!   [`ErrorSink`], with [`ThreadPool`], [`UiEventLoop`] and
//!   [`TracingErrorSink`] as reference implementations.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use loadpulse_core::{
//!     LoadResult, LoadRuntime, LoadScheduler, LoadTask, LoadVisualizer, NestedTask,
//!     ProgressMonitor, UiEventLoop,
//! };
//!
//! struct CountTables {
//!     nested: NestedTask,
//! }
//!
//! impl LoadTask for CountTables {
//!     type Output = usize;
//!
//!     fn name(&self) -> &str {
//!         "Count tables"
//!     }
//!
//!     fn nested(&self) -> &NestedTask {
//!         &self.nested
//!     }
//!
//!     fn evaluate(&self, progress: &ProgressMonitor) -> LoadResult<usize> {
//!         progress.check_cancelled()?;
//!         Ok(12)
//!     }
//! }
//!
//! #[derive(Default)]
//! struct StatusLine {
//!     text: Option<String>,
//! }
//!
//! impl LoadVisualizer<usize> for StatusLine {
//!     fn is_completed(&self) -> bool {
//!         self.text.is_some()
//!     }
//!
//!     fn visualize_loading(&mut self) {}
//!
//!     fn complete_loading(&mut self, result: Option<usize>) {
//!         self.text = Some(match result {
//!             Some(count) => format!("{count} tables"),
//!             None => "unavailable".to_string(),
//!         });
//!     }
//! }
//!
//! let ui = UiEventLoop::new();
//! let runtime = LoadRuntime::new(ui.handle());
//! let task = CountTables { nested: NestedTask::new() };
//!
//! let handle = LoadScheduler::new(&runtime, task, StatusLine::default()).schedule();
//! assert!(ui.run_until(Duration::from_secs(5), || handle.is_done()));
//! ```

pub mod config;
mod error;
mod event_loop;
mod executor;
mod jobs;
pub mod logging;
mod placeholder;
mod progress;
mod property;
mod registry;
mod runtime;
mod scheduler;
mod task;
pub mod threadpool;
mod visualizer;

pub use config::{LoaderConfig, PulseConfig};
pub use error::{
    BoxError, LoadError, LoadResult, PanicError, PreconditionViolation, ThreadPoolError,
};
pub use event_loop::{UiEventLoop, UiHandle};
pub use executor::{
    BackgroundExecutor, BackgroundJob, ErrorSink, TracingErrorSink, UiDispatcher, UiJob,
};
pub use jobs::{FamilyKey, JobRegistry, LoadHandle, LoadId, LoadOutcome, LoadState};
pub use placeholder::{ExpansionPlaceholder, PLACEHOLDER_FRAMES};
pub use progress::ProgressMonitor;
pub use property::{PropertySource, PropertyValue, extract_value};
pub use registry::DedupRegistry;
pub use runtime::{LoadRuntime, LoadRuntimeBuilder};
pub use scheduler::{LoadScheduler, schedule_fire_and_forget};
pub use task::{LoadTask, NestedTask, NullTask};
pub use threadpool::{CancellationToken, ThreadPool, ThreadPoolConfig};
pub use visualizer::{CallbackVisualizer, LoadVisualizer};

static_assertions::assert_impl_all!(LoadHandle: Send, Sync, Clone);
static_assertions::assert_impl_all!(LoadRuntime: Send, Sync, Clone);
static_assertions::assert_impl_all!(JobRegistry: Send, Sync);
static_assertions::assert_impl_all!(DedupRegistry<String>: Send, Sync);
static_assertions::assert_impl_all!(ExpansionPlaceholder<String>: Send, Sync);
static_assertions::assert_impl_all!(ProgressMonitor: Send, Sync, Clone);
static_assertions::assert_impl_all!(UiHandle: Send, Sync, Clone);
static_assertions::assert_impl_all!(NestedTask: Send, Sync);
