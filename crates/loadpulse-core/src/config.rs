//! Configuration for the load engine.

use std::time::Duration;

use crate::threadpool::ThreadPoolConfig;

/// Default delay before the first pulse.
pub const DEFAULT_PULSE_DELAY: Duration = Duration::from_millis(100);

/// Default interval between pulses.
pub const DEFAULT_PULSE_INTERVAL: Duration = Duration::from_millis(200);

/// Timing of the UI pulse that animates a running load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseConfig {
    /// Delay between `schedule()` and the first pulse.
    pub initial_delay: Duration,
    /// Delay between consecutive pulses.
    pub interval: Duration,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_PULSE_DELAY,
            interval: DEFAULT_PULSE_INTERVAL,
        }
    }
}

impl PulseConfig {
    /// Create a pulse configuration.
    pub fn new(initial_delay: Duration, interval: Duration) -> Self {
        Self {
            initial_delay,
            interval,
        }
    }

    /// Set the delay before the first pulse.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the interval between pulses.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Top-level configuration of a [`LoadRuntime`](crate::LoadRuntime).
#[derive(Debug, Clone, Default)]
pub struct LoaderConfig {
    /// Pulse timing.
    pub pulse: PulseConfig,
    /// Background pool settings.
    pub pool: ThreadPoolConfig,
}

impl LoaderConfig {
    /// Set the pulse timing.
    pub fn with_pulse(mut self, pulse: PulseConfig) -> Self {
        self.pulse = pulse;
        self
    }

    /// Set the background pool settings.
    pub fn with_pool(mut self, pool: ThreadPoolConfig) -> Self {
        self.pool = pool;
        self
    }
}
