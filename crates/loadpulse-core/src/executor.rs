//! Host capabilities the load engine runs on.
//!
//! The engine never owns threads of its own. It needs three things from its
//! host:
//!
//! - a [`BackgroundExecutor`] that runs a job off the UI thread,
//! - a [`UiDispatcher`] that runs a job on the UI thread, now or after a delay,
//! - an [`ErrorSink`] that presents genuine failures to the user.
//!
//! [`ThreadPool`](crate::threadpool::ThreadPool), [`UiEventLoop`](crate::UiEventLoop)
//! and [`TracingErrorSink`] are the reference implementations.

use std::time::Duration;

use crate::error::LoadError;
use crate::logging::targets;

/// A job submitted to the background executor.
pub type BackgroundJob = Box<dyn FnOnce() + Send + 'static>;

/// A job dispatched to the UI thread.
pub type UiJob = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs off the UI thread.
///
/// A job may block arbitrarily long; that is its entire purpose.
pub trait BackgroundExecutor: Send + Sync {
    /// Submit a job for background execution.
    fn execute(&self, job: BackgroundJob);
}

impl<E: BackgroundExecutor + ?Sized> BackgroundExecutor for &'static E {
    fn execute(&self, job: BackgroundJob) {
        (**self).execute(job);
    }
}

/// Runs jobs on the single UI thread.
///
/// Jobs must be short. Implementations guarantee every job runs on the UI
/// thread and never concurrently with another job.
pub trait UiDispatcher: Send + Sync {
    /// Run `job` on the UI thread as soon as possible.
    fn dispatch(&self, job: UiJob);

    /// Run `job` on the UI thread once `delay` has elapsed.
    fn dispatch_after(&self, delay: Duration, job: UiJob);
}

/// Presents genuine load failures to the user.
///
/// Only ever called on the UI thread, and never for cancellations.
pub trait ErrorSink: Send + Sync {
    /// Report a failure of the load titled `title`.
    fn report(&self, title: &str, cause: &LoadError);
}

/// An [`ErrorSink`] that logs failures through `tracing` at error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, title: &str, cause: &LoadError) {
        tracing::error!(target: targets::ERRORS, title, error = %cause, "load failed");
    }
}
