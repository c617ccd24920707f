//! Logging facilities for loadpulse.
//!
//! loadpulse uses the `tracing` crate for instrumentation. The libraries never
//! install a subscriber; applications pick their own:
//!
//! ```ignore
//! use tracing_subscriber::EnvFilter;
//!
//! tracing_subscriber::fmt()
//!     .with_env_filter(EnvFilter::new("loadpulse_core::scheduler=debug"))
//!     .init();
//! ```
//!
//! Every log line carries one of the [`targets`] below, so a subsystem can be
//! enabled on its own. Background evaluation runs inside an `evaluate` span
//! and the UI-side merge inside a `finalize` span, both carrying the task name.

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core crate target.
    pub const CORE: &str = "loadpulse_core";
    /// Scheduling and finalize of load jobs.
    pub const SCHEDULER: &str = "loadpulse_core::scheduler";
    /// UI pulse ticks.
    pub const PULSE: &str = "loadpulse_core::pulse";
    /// Dedup registry and placeholder lifecycle.
    pub const REGISTRY: &str = "loadpulse_core::registry";
    /// UI event loop processing.
    pub const EVENT_LOOP: &str = "loadpulse_core::event_loop";
    /// Background thread pool.
    pub const THREADPOOL: &str = "loadpulse_core::threadpool";
    /// Errors forwarded to the user.
    pub const ERRORS: &str = "loadpulse_core::errors";
}
