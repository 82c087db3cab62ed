//! The unit of work a builder launches.
//!
//! An [`Execution`] is either an *effect*, run for its side effects only, or a
//! *producer* whose value is stored on the [`ExecutorResult`](crate::ExecutorResult)
//! and handed to the result callback. The shape is fixed at construction and
//! decides which schedules and callbacks the builder accepts.

use std::{fmt, sync::Arc};

use crate::{
    error::{BoxError, TaskFault},
    task::Work,
};

/// Shape of an [`Execution`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Shape {
    /// Runs for its side effects and produces nothing.
    Effect,
    /// Produces a value.
    Producer,
}

/// A unit of work together with its [`Shape`].
pub struct Execution<R> {
    shape: Shape,
    work: Work<R>,
}

impl<R> Clone for Execution<R> {
    fn clone(&self) -> Self {
        Self {
            shape: self.shape,
            work: Arc::clone(&self.work),
        }
    }
}

impl<R> fmt::Debug for Execution<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Execution").field("shape", &self.shape).finish_non_exhaustive()
    }
}

impl Execution<()> {
    /// An effect that cannot fail other than by panicking.
    pub fn effect<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            shape: Shape::Effect,
            work: Arc::new(move || {
                f();
                Ok(())
            }),
        }
    }

    /// A fallible effect.
    ///
    /// Returning [`Interrupted`](crate::error::Interrupted), for example by
    /// propagating the result of [`thread_util::sleep`](crate::thread_util::sleep)
    /// with `?`, marks the run as interrupted rather than failed.
    pub fn try_effect<F, E>(f: F) -> Self
    where
        F: Fn() -> Result<(), E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Self {
            shape: Shape::Effect,
            work: Arc::new(move || f().map_err(|e| TaskFault::from_error(e.into()))),
        }
    }
}

impl<R: Send + 'static> Execution<R> {
    /// A producer that cannot fail other than by panicking.
    pub fn producer<F>(f: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
    {
        Self {
            shape: Shape::Producer,
            work: Arc::new(move || Ok(f())),
        }
    }

    /// A fallible producer. Errors are classified like those of
    /// [`Execution::try_effect`].
    pub fn try_producer<F, E>(f: F) -> Self
    where
        F: Fn() -> Result<R, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Self {
            shape: Shape::Producer,
            work: Arc::new(move || f().map_err(|e| TaskFault::from_error(e.into()))),
        }
    }
}

impl<R> Execution<R> {
    #[must_use]
    pub fn shape(&self) -> Shape {
        self.shape
    }

    #[must_use]
    pub fn is_producer(&self) -> bool {
        self.shape == Shape::Producer
    }

    pub(crate) fn work(&self) -> Work<R> {
        Arc::clone(&self.work)
    }
}
