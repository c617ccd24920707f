//! Thread pool for background load execution.
//!
//! Provides a global thread pool built on rayon with work-stealing scheduling
//! and a cancellation token for cooperative stops. The pool is the default
//! [`BackgroundExecutor`] of a [`LoadRuntime`](crate::LoadRuntime).
//!
//! # Example
//!
//! ```no_run
//! use loadpulse_core::threadpool::{CancellationToken, ThreadPool};
//! use loadpulse_core::BackgroundExecutor;
//!
//! let pool = ThreadPool::global();
//! let token = CancellationToken::new();
//! let observed = token.clone();
//!
//! pool.execute(Box::new(move || {
//!     while !observed.is_cancelled() {
//!         std::thread::sleep(std::time::Duration::from_millis(10));
//!     }
//! }));
//!
//! token.cancel();
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use rayon::{ThreadPool as RayonThreadPool, ThreadPoolBuilder};

use crate::error::ThreadPoolError;
use crate::executor::{BackgroundExecutor, BackgroundJob};
use crate::logging::targets;

/// Global thread pool instance.
static GLOBAL_POOL: OnceLock<ThreadPool> = OnceLock::new();

/// A cancellation token for cooperative task cancellation.
///
/// Tasks must periodically check the token and exit gracefully when cancelled.
/// Nothing is ever interrupted preemptively.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new cancellation token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Request cancellation.
    ///
    /// Returns `true` if this call flipped the flag, `false` if it was already set.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::AcqRel)
    }
}

/// Configuration for creating a custom thread pool.
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Number of worker threads. `None` means use the number of CPU cores.
    pub num_threads: Option<usize>,
    /// Name prefix for worker threads.
    pub thread_name: String,
    /// Stack size for worker threads in bytes.
    pub stack_size: Option<usize>,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            thread_name: "loadpulse-worker".to_string(),
            stack_size: None,
        }
    }
}

impl ThreadPoolConfig {
    /// Create a new configuration with custom thread count.
    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads: Some(num_threads),
            ..Default::default()
        }
    }

    /// Set the thread name prefix.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

/// A thread pool for executing background loads.
///
/// Any number of loads may run at once; each scheduled load occupies exactly
/// one worker while its `evaluate()` runs.
pub struct ThreadPool {
    pool: RayonThreadPool,
    active_tasks: Arc<AtomicUsize>,
}

impl ThreadPool {
    /// Get the global thread pool instance.
    ///
    /// The global pool is lazily initialized with default settings. If rayon
    /// cannot build it the process cannot run background loads at all, so
    /// failure here aborts with a panic.
    pub fn global() -> &'static ThreadPool {
        GLOBAL_POOL.get_or_init(|| match ThreadPool::new(ThreadPoolConfig::default()) {
            Ok(pool) => pool,
            Err(err) => panic!("{err}"),
        })
    }

    /// Initialize the global thread pool with custom configuration.
    ///
    /// Returns an error if the pool has already been initialized.
    pub fn init_global(config: ThreadPoolConfig) -> Result<&'static ThreadPool, ThreadPoolError> {
        let pool = ThreadPool::new(config)?;
        GLOBAL_POOL
            .set(pool)
            .map_err(|_| ThreadPoolError::AlreadyInitialized)?;
        GLOBAL_POOL.get().ok_or(ThreadPoolError::AlreadyInitialized)
    }

    /// Create a new thread pool with the given configuration.
    pub fn new(config: ThreadPoolConfig) -> Result<Self, ThreadPoolError> {
        let mut builder = ThreadPoolBuilder::new()
            .thread_name(move |index| format!("{}-{}", config.thread_name, index));

        if let Some(num_threads) = config.num_threads {
            builder = builder.num_threads(num_threads);
        }

        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let pool = builder
            .build()
            .map_err(|e| ThreadPoolError::CreationFailed(e.to_string()))?;

        Ok(Self {
            pool,
            active_tasks: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Get the number of threads in the pool.
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Get the number of currently active (running or queued) jobs.
    pub fn active_tasks(&self) -> usize {
        self.active_tasks.load(Ordering::Acquire)
    }
}

impl BackgroundExecutor for ThreadPool {
    fn execute(&self, job: BackgroundJob) {
        self.active_tasks.fetch_add(1, Ordering::AcqRel);
        let active_tasks = self.active_tasks.clone();

        tracing::trace!(target: targets::THREADPOOL, "submitting background job");
        self.pool.spawn(move || {
            job();
            active_tasks.fetch_sub(1, Ordering::AcqRel);
        });
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("num_threads", &self.num_threads())
            .field("active_tasks", &self.active_tasks())
            .finish()
    }
}
