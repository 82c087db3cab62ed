//! Fault and configuration error types.
//!
//! Two families of errors exist. [`ConfigError`] is returned synchronously by
//! [`ThreadBuilder::start`](crate::ThreadBuilder::start) when a builder cannot
//! launch an episode. [`TaskFault`] describes how a scheduled unit of work ended
//! when it did not produce a value; it is captured by the task handle and never
//! raised on the caller's thread.

use std::{any::Any, error::Error, io, sync::Arc};

use thiserror::Error;

use crate::schedule::Schedule;

/// Boxed error accepted from fallible executions.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Returned by the interruptible sleep helpers in [`thread_util`](crate::thread_util)
/// when the running task was cancelled with interruption.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Error)]
#[error("worker was interrupted while waiting")]
pub struct Interrupted;

/// How a unit of work ended without producing its value.
#[derive(Clone, Debug, Error)]
pub enum TaskFault {
    /// The execution returned an error.
    #[error("execution failed: {0}")]
    User(#[source] Arc<dyn Error + Send + Sync + 'static>),

    /// The execution panicked. Holds the panic message when it was a string.
    #[error("execution panicked: {0}")]
    Panicked(String),

    /// The task was cancelled before or while running.
    #[error("task was cancelled")]
    Cancelled,

    /// The worker running the task was interrupted.
    #[error("task was interrupted")]
    Interrupted,
}

impl TaskFault {
    /// Classifies an error returned by an execution.
    ///
    /// An [`Interrupted`] error, the value returned by the interruptible sleep
    /// helpers, becomes [`TaskFault::Interrupted`]. Everything else is a user fault.
    pub fn from_error(error: BoxError) -> Self {
        if error.is::<Interrupted>() {
            return TaskFault::Interrupted;
        }
        match error.downcast::<TaskFault>() {
            Ok(fault) => *fault,
            Err(error) => TaskFault::User(Arc::from(error)),
        }
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        TaskFault::Panicked(message)
    }

    /// `true` for faults raised by the unit of work itself.
    #[must_use]
    pub fn is_user_fault(&self) -> bool {
        matches!(self, TaskFault::User(_) | TaskFault::Panicked(_))
    }

    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TaskFault::Cancelled)
    }

    #[must_use]
    pub fn is_interruption(&self) -> bool {
        matches!(self, TaskFault::Interrupted)
    }

    /// `true` for the signals that silent mode suppresses.
    #[must_use]
    pub fn is_expected(&self) -> bool {
        self.is_cancellation() || self.is_interruption()
    }
}

impl From<Interrupted> for TaskFault {
    fn from(_: Interrupted) -> Self {
        TaskFault::Interrupted
    }
}

/// Reasons a builder refuses to start an episode.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `start()` was called before an execution was set.
    #[error("no execution was set on the builder")]
    MissingExecution,

    /// A value-producing execution was combined with a repeating interval.
    #[error("producer executions cannot be scheduled as {schedule:?}; periodic scheduling needs an effect")]
    UnsupportedSchedule { schedule: Schedule },

    /// A repeating interval must be longer than zero.
    #[error("interval must be greater than zero")]
    ZeroInterval,

    /// A result callback was registered for an execution that produces nothing.
    #[error("a result callback requires a producer execution")]
    ResultCallbackOnEffect,

    /// A pool must have at least one worker.
    #[error("worker pool size must be at least 1")]
    InvalidPoolSize,

    /// The builder's pool was shut down and accepts no more work.
    #[error("the worker pool has been shut down")]
    PoolShutdown,

    /// Worker or timer threads could not be spawned.
    #[error("failed to create worker pool: {0}")]
    Pool(#[from] io::Error),
}
