//! The bundle of host capabilities a load runs with.

use std::sync::Arc;

use crate::config::{LoaderConfig, PulseConfig};
use crate::error::ThreadPoolError;
use crate::executor::{BackgroundExecutor, ErrorSink, TracingErrorSink, UiDispatcher};
use crate::jobs::JobRegistry;
use crate::threadpool::ThreadPool;

/// Everything a [`LoadScheduler`](crate::LoadScheduler) needs from its host.
///
/// Cheap to clone; clones share the executor, dispatcher, error sink and job
/// registry.
#[derive(Clone)]
pub struct LoadRuntime {
    executor: Arc<dyn BackgroundExecutor>,
    dispatcher: Arc<dyn UiDispatcher>,
    error_sink: Arc<dyn ErrorSink>,
    jobs: Arc<JobRegistry>,
    pulse: PulseConfig,
}

impl LoadRuntime {
    /// A runtime on the global thread pool, logging failures through `tracing`.
    pub fn new(dispatcher: impl UiDispatcher + 'static) -> Self {
        Self::builder(dispatcher).build()
    }

    /// A runtime with its own thread pool built from `config`.
    pub fn from_config(
        dispatcher: impl UiDispatcher + 'static,
        config: &LoaderConfig,
    ) -> Result<Self, ThreadPoolError> {
        let pool = ThreadPool::new(config.pool.clone())?;
        Ok(Self::builder(dispatcher)
            .executor(pool)
            .pulse(config.pulse)
            .build())
    }

    /// Start building a runtime around `dispatcher`.
    pub fn builder(dispatcher: impl UiDispatcher + 'static) -> LoadRuntimeBuilder {
        LoadRuntimeBuilder {
            dispatcher: Arc::new(dispatcher),
            executor: None,
            error_sink: None,
            jobs: None,
            pulse: PulseConfig::default(),
        }
    }

    /// The background executor.
    pub fn executor(&self) -> &Arc<dyn BackgroundExecutor> {
        &self.executor
    }

    /// The UI dispatcher.
    pub fn dispatcher(&self) -> &Arc<dyn UiDispatcher> {
        &self.dispatcher
    }

    /// The sink receiving genuine failures.
    pub fn error_sink(&self) -> &Arc<dyn ErrorSink> {
        &self.error_sink
    }

    /// The registry of active loads.
    pub fn jobs(&self) -> &Arc<JobRegistry> {
        &self.jobs
    }

    /// Pulse timing.
    pub fn pulse(&self) -> PulseConfig {
        self.pulse
    }
}

impl std::fmt::Debug for LoadRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadRuntime")
            .field("jobs", &self.jobs)
            .field("pulse", &self.pulse)
            .finish_non_exhaustive()
    }
}

/// Builder for [`LoadRuntime`].
pub struct LoadRuntimeBuilder {
    dispatcher: Arc<dyn UiDispatcher>,
    executor: Option<Arc<dyn BackgroundExecutor>>,
    error_sink: Option<Arc<dyn ErrorSink>>,
    jobs: Option<Arc<JobRegistry>>,
    pulse: PulseConfig,
}

impl LoadRuntimeBuilder {
    /// Run loads on `executor` instead of the global thread pool.
    pub fn executor(mut self, executor: impl BackgroundExecutor + 'static) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    /// Run loads on an executor shared with other runtimes.
    pub fn shared_executor(mut self, executor: Arc<dyn BackgroundExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Report failures to `sink` instead of logging them.
    pub fn error_sink(mut self, sink: impl ErrorSink + 'static) -> Self {
        self.error_sink = Some(Arc::new(sink));
        self
    }

    /// Share a job registry with other runtimes.
    pub fn job_registry(mut self, jobs: Arc<JobRegistry>) -> Self {
        self.jobs = Some(jobs);
        self
    }

    /// Set the pulse timing.
    pub fn pulse(mut self, pulse: PulseConfig) -> Self {
        self.pulse = pulse;
        self
    }

    /// Build the runtime.
    pub fn build(self) -> LoadRuntime {
        LoadRuntime {
            executor: self
                .executor
                .unwrap_or_else(|| Arc::new(ThreadPool::global())),
            dispatcher: self.dispatcher,
            error_sink: self.error_sink.unwrap_or_else(|| Arc::new(TracingErrorSink)),
            jobs: self.jobs.unwrap_or_default(),
            pulse: self.pulse,
        }
    }
}
