//! Launches one episode of work on a pool.
//!
//! Dispatching turns a [`Schedule`] and an execution shape into a single-shot or
//! periodic task. Unsupported combinations are rejected by [`validate`] before
//! anything is scheduled. Hooks for the new handle are attached before the pool
//! sees it, so even work without any delay cannot finish unobserved.

use std::time::{Duration, Instant};

use crate::{
    ScheduledPool,
    error::ConfigError,
    execution::Shape,
    schedule::Schedule,
    task::{TaskHandle, Work},
    timing,
};

/// Start delay actually used for an episode.
///
/// An unset delay counts as zero. When the episode has a completion or failure
/// callback, the delay is raised to at least `min_callback_delay`.
#[must_use]
pub fn effective_delay(delay: Option<Duration>, has_callbacks: bool, min_callback_delay: Duration) -> Duration {
    let delay = delay.unwrap_or_default();
    if has_callbacks {
        delay.max(min_callback_delay)
    } else {
        delay
    }
}

/// Checks that an execution shape can run under `schedule`.
///
/// # Errors
///
/// - [`ConfigError::UnsupportedSchedule`] for a producer with a repeating interval.
/// - [`ConfigError::ResultCallbackOnEffect`] for a result callback on an effect.
/// - [`ConfigError::ZeroInterval`] for a repeating interval of zero.
pub fn validate(
    shape: Shape,
    schedule: Schedule,
    interval: Option<Duration>,
    has_result_callback: bool,
) -> Result<(), ConfigError> {
    if shape == Shape::Producer && schedule.is_periodic() {
        return Err(ConfigError::UnsupportedSchedule { schedule });
    }
    if shape == Shape::Effect && has_result_callback {
        return Err(ConfigError::ResultCallbackOnEffect);
    }
    if schedule.is_periodic() && interval.is_some_and(|i| i.is_zero()) {
        return Err(ConfigError::ZeroInterval);
    }
    Ok(())
}

/// When and how often a dispatched task runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Launch {
    pub(crate) delay: Duration,
    pub(crate) period: Option<Duration>,
}

impl Launch {
    pub(crate) fn once(delay: Duration) -> Self {
        Self { delay, period: None }
    }

    pub(crate) fn new(schedule: Schedule, delay: Duration, interval: Option<Duration>) -> Self {
        Self {
            delay,
            period: interval.filter(|_| schedule.is_periodic()),
        }
    }
}

/// Creates the handle, lets `attach` register hooks for it, then hands it to `pool`.
pub(crate) fn dispatch<R: Send + 'static>(
    pool: &ScheduledPool,
    work: Work<R>,
    launch: Launch,
    attach: impl FnOnce(&TaskHandle<R>),
) -> TaskHandle<R> {
    let handle = TaskHandle::new(launch.period.is_some());
    attach(&handle);

    let first = timing::deadline_after(Instant::now(), launch.delay);
    match launch.period {
        Some(period) => pool.spawn_fixed_rate(handle.clone(), work, first, period),
        None => pool.spawn_once(handle.clone(), work, first),
    }
    tracing::debug!(
        pool = pool.name(),
        task = %handle.id(),
        delay = ?launch.delay,
        period = ?launch.period,
        "dispatched"
    );
    handle
}
