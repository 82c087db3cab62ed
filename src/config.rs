//! Builder configuration.

use std::time::Duration;

const POOL_SIZE_VAR: &str = "THREAD_BUILDER_POOL_SIZE";
const MIN_CALLBACK_DELAY_VAR: &str = "THREAD_BUILDER_MIN_CALLBACK_DELAY_MS";

/// Default number of workers in a builder's shared pool.
pub const DEFAULT_CORE_POOL_SIZE: usize = 1;

/// Default lower bound on the start delay of work that has completion or failure
/// callbacks.
pub const DEFAULT_MIN_CALLBACK_DELAY: Duration = Duration::from_millis(1000);

/// Settings shared by every episode of a [`ThreadBuilder`](crate::ThreadBuilder).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuilderConfig {
    /// Number of workers in the shared pool.
    pub core_pool_size: usize,
    /// Work with an `on_complete` or `on_uncaught_failure` callback never starts
    /// earlier than this after dispatch.
    pub min_callback_delay: Duration,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            core_pool_size: DEFAULT_CORE_POOL_SIZE,
            min_callback_delay: DEFAULT_MIN_CALLBACK_DELAY,
        }
    }
}

impl BuilderConfig {
    /// Create configuration from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `THREAD_BUILDER_POOL_SIZE`: workers in the shared pool (at least 1)
    /// - `THREAD_BUILDER_MIN_CALLBACK_DELAY_MS`: minimum delay of work with callbacks
    ///
    /// Missing or malformed values fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let core_pool_size = std::env::var(POOL_SIZE_VAR)
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_CORE_POOL_SIZE);

        let min_callback_delay = std::env::var(MIN_CALLBACK_DELAY_VAR)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map_or(DEFAULT_MIN_CALLBACK_DELAY, Duration::from_millis);

        Self {
            core_pool_size,
            min_callback_delay,
        }
    }

    /// Set the number of workers in the shared pool.
    #[must_use]
    pub fn with_core_pool_size(mut self, size: usize) -> Self {
        self.core_pool_size = size;
        self
    }

    /// Set the minimum delay of work with callbacks.
    #[must_use]
    pub fn with_min_callback_delay(mut self, delay: Duration) -> Self {
        self.min_callback_delay = delay;
        self
    }
}
