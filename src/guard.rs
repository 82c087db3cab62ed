//! Timeout guards.
//!
//! A guard cancels a task that has not finished within its timeout. Each guard
//! runs on its own single-worker pool, measured from dispatch rather than from
//! the task's delayed start, so a task can be cancelled before it ever ran. The
//! guard pool shuts itself down and lets its worker and timer threads exit after
//! the cancel action has run.

use std::{sync::Arc, time::Duration};

use crate::{
    ScheduledPool,
    dispatch::{self, Launch},
    error::ConfigError,
    execution::Shape,
    pool::{FailureHandler, WorkerFactory},
    result::ExecutorResult,
    router::{Router, Routing},
    task::{TaskHandle, Work},
};

const GUARD_NAME: &str = "thread-builder-guard-";

/// Creates the private pool of one guard.
///
/// Done before the guarded task is dispatched, so a failure leaves nothing scheduled.
pub(crate) fn pool(failure_handler: Option<FailureHandler>) -> Result<ScheduledPool, ConfigError> {
    let mut factory = WorkerFactory::new().name(GUARD_NAME);
    if let Some(handler) = failure_handler {
        factory = factory.failure_handler(handler);
    }
    ScheduledPool::with_factory(1, factory)
}

/// Schedules the cancel action for `target` on `pool`.
///
/// The returned result holds `pool` and the single handle of the cancel action.
pub(crate) fn arm<R: Send + 'static>(
    pool: ScheduledPool,
    target: &TaskHandle<R>,
    timeout: Duration,
    may_interrupt: bool,
    routing: Routing<()>,
) -> ExecutorResult<()> {
    let result = ExecutorResult::new(pool.clone());
    let target = target.clone();
    let cancel: Work<()> = Arc::new(move || {
        if !target.is_done() && !target.is_cancelled() {
            tracing::debug!(task = %target.id(), may_interrupt, "timeout elapsed");
            target.cancel(may_interrupt);
        }
        Ok(())
    });

    let handle = dispatch::dispatch(&pool, cancel, Launch::once(timeout), |handle| {
        pool.add_task_hook(handle.id(), Router::new(handle.clone(), Shape::Effect, routing, &result).into_hook());
        pool.shutdown_after(handle.id());
    });
    result.push_task(handle);
    result
}
