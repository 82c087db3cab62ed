//! What a builder hands back after starting work.

use std::{
    fmt,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;

use crate::{ScheduledPool, task::TaskHandle};

pub(crate) struct ResultInner<R> {
    pool: ScheduledPool,
    tasks: Mutex<Vec<TaskHandle<R>>>,
    guards: Mutex<Vec<ExecutorResult<()>>>,
    value: Mutex<Option<R>>,
}

/// The pool, task handles, timeout guards and produced value of a builder.
///
/// A builder keeps one `ExecutorResult` for its whole life: every episode started
/// through it appends its handle here, and every episode with a timeout appends
/// the result of its guard. Clones share the same state.
pub struct ExecutorResult<R> {
    inner: Arc<ResultInner<R>>,
}

impl<R> Clone for ExecutorResult<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> fmt::Debug for ExecutorResult<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorResult")
            .field("pool", &self.inner.pool)
            .field("tasks", &self.task_count())
            .field("guards", &self.inner.guards.lock().len())
            .field("has_value", &self.inner.value.lock().is_some())
            .finish()
    }
}

impl<R> ExecutorResult<R> {
    pub(crate) fn new(pool: ScheduledPool) -> Self {
        Self {
            inner: Arc::new(ResultInner {
                pool,
                tasks: Mutex::new(Vec::new()),
                guards: Mutex::new(Vec::new()),
                value: Mutex::new(None),
            }),
        }
    }

    /// The pool the tasks run on. Shut it down to stop everything the builder started.
    #[must_use]
    pub fn pool(&self) -> &ScheduledPool {
        &self.inner.pool
    }

    /// Handles of all tasks started so far, in start order.
    #[must_use]
    pub fn tasks(&self) -> Vec<TaskHandle<R>> {
        self.inner.tasks.lock().clone()
    }

    #[must_use]
    pub fn task_count(&self) -> usize {
        self.inner.tasks.lock().len()
    }

    /// Results of the timeout guards, one per episode that had a timeout. Each holds
    /// the guard's private pool and its cancel task.
    #[must_use]
    pub fn guards(&self) -> Vec<ExecutorResult<()>> {
        self.inner.guards.lock().clone()
    }

    pub(crate) fn push_task(&self, handle: TaskHandle<R>) {
        self.inner.tasks.lock().push(handle);
    }

    pub(crate) fn push_guard(&self, guard: ExecutorResult<()>) {
        self.inner.guards.lock().push(guard);
    }

    pub(crate) fn set_value(&self, value: R) {
        *self.inner.value.lock() = Some(value);
    }

    pub(crate) fn downgrade(&self) -> Weak<ResultInner<R>> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(inner: &Weak<ResultInner<R>>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }
}

impl<R: Clone> ExecutorResult<R> {
    /// The most recent value produced by a producer execution, if any settled yet.
    #[must_use]
    pub fn value(&self) -> Option<R> {
        self.inner.value.lock().clone()
    }
}
