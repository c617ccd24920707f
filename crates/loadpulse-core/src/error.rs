//! Error types for loadpulse.

use thiserror::Error;

/// A boxed, thread-safe error used as the cause of an execution failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The outcome of evaluating a load task when it did not produce a value.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The computation failed. The underlying cause is kept as the error source.
    #[error("execution failed: {0}")]
    Execution(#[source] BoxError),

    /// The computation stopped cooperatively. Never reported as an error.
    #[error("load was cancelled")]
    Cancelled,

    /// The caller misused the task API.
    #[error(transparent)]
    Precondition(#[from] PreconditionViolation),

    /// A property lookup named an attribute the object does not expose.
    #[error("property `{0}` not found")]
    PropertyNotFound(String),
}

impl LoadError {
    /// Wrap any error as an execution failure.
    pub fn execution<E>(cause: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Execution(cause.into())
    }

    /// Whether this is a cooperative cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Programmer misuse of the nested-task link.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionViolation {
    /// A nested task was installed while another one was still set.
    #[error("nested task `{current}` is already set")]
    NestedTaskAlreadySet {
        /// Name of the task currently installed.
        current: String,
    },

    /// The nested task was cleared while none was set.
    #[error("no nested task is set")]
    NoNestedTask,
}

/// Thread pool errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ThreadPoolError {
    /// The rayon pool could not be built.
    #[error("failed to create thread pool: {0}")]
    CreationFailed(String),

    /// The global pool was initialised twice.
    #[error("global thread pool has already been initialized")]
    AlreadyInitialized,
}

/// Error raised when `evaluate()` panics, carrying the panic message.
#[derive(Error, Debug, Clone)]
#[error("task panicked: {message}")]
pub struct PanicError {
    /// The panic payload rendered as text.
    pub message: String,
}

impl PanicError {
    pub(crate) fn from_payload(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self { message }
    }
}

/// A specialized Result type for load operations.
pub type LoadResult<T> = std::result::Result<T, LoadError>;
