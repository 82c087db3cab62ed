//! Routes the outcome of a finished task to the builder's callbacks.
//!
//! A router is registered as an after-execute hook on the pool running its task.
//! It ignores reports for other tasks and periodic firings that keep the task
//! scheduled, so every handle is routed exactly once.

use std::sync::{Arc, Weak};

use crate::{
    error::TaskFault,
    execution::Shape,
    pool::{AfterExecute, FailureHandler, RunReport},
    result::{ExecutorResult, ResultInner},
    task::TaskHandle,
};

/// Callback receiving the value of a producer execution.
pub type ResultHandler<R> = Arc<dyn Fn(&R) + Send + Sync + 'static>;

/// Callbacks and filtering shared by the routers of one builder episode.
pub(crate) struct Routing<R> {
    pub(crate) silent: bool,
    pub(crate) on_failure: Option<FailureHandler>,
    pub(crate) on_result: Option<ResultHandler<R>>,
}

impl<R> Clone for Routing<R> {
    fn clone(&self) -> Self {
        Self {
            silent: self.silent,
            on_failure: self.on_failure.clone(),
            on_result: self.on_result.clone(),
        }
    }
}

pub(crate) struct Router<R> {
    task: TaskHandle<R>,
    shape: Shape,
    routing: Routing<R>,
    result: Weak<ResultInner<R>>,
}

impl<R: Clone + Send + 'static> Router<R> {
    pub(crate) fn new(task: TaskHandle<R>, shape: Shape, routing: Routing<R>, result: &ExecutorResult<R>) -> Self {
        Self {
            task,
            shape,
            routing,
            result: result.downgrade(),
        }
    }

    pub(crate) fn into_hook(self) -> AfterExecute {
        Arc::new(move |report: &RunReport| self.route(report))
    }

    fn route(&self, report: &RunReport) {
        if report.task != self.task.id() || !report.finished {
            return;
        }
        let Some(outcome) = self.task.try_get() else {
            return;
        };
        match outcome {
            Ok(value) if self.shape == Shape::Producer => {
                if let Some(result) = ExecutorResult::upgrade(&self.result) {
                    result.set_value(value.clone());
                }
                if let Some(on_result) = &self.routing.on_result {
                    on_result(&value);
                }
            }
            Ok(_) => {}
            Err(fault) => surface(&fault, self.routing.silent, self.routing.on_failure.as_ref()),
        }
    }
}

/// Delivers `fault` to `on_failure`, or logs it when no handler is set.
///
/// In silent mode cancellation and interruption are dropped.
pub(crate) fn surface(fault: &TaskFault, silent: bool, on_failure: Option<&FailureHandler>) {
    if silent && fault.is_expected() {
        tracing::debug!(%fault, "suppressed");
        return;
    }
    match on_failure {
        Some(handler) => handler(fault),
        None => tracing::error!(%fault, "uncaught task failure"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use crate::ScheduledPool;

    use super::*;

    fn counting() -> (FailureHandler, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let handler: FailureHandler = Arc::new(move |_: &TaskFault| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (handler, count)
    }

    #[test]
    fn silent_mode_drops_only_expected_faults() {
        let (handler, count) = counting();
        surface(&TaskFault::Cancelled, true, Some(&handler));
        surface(&TaskFault::Interrupted, true, Some(&handler));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        surface(&TaskFault::Panicked("x".into()), true, Some(&handler));
        surface(&TaskFault::Cancelled, false, Some(&handler));
        surface(&TaskFault::Interrupted, false, Some(&handler));
        assert_eq!(count.load(Ordering::SeqCst), 3);

        // Without a handler the fault is logged, never lost.
        surface(&TaskFault::Cancelled, false, None);
    }

    #[test]
    fn routes_only_finished_reports_of_its_own_task() {
        let pool = ScheduledPool::new(1).unwrap();
        let result = ExecutorResult::<u32>::new(pool);
        let values = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&values);
        let routing = Routing {
            silent: false,
            on_failure: None,
            on_result: Some(Arc::new(move |v: &u32| seen.lock().push(*v)) as ResultHandler<u32>),
        };
        let task = TaskHandle::new(false);
        let other = TaskHandle::<u32>::new(false);
        let hook = Router::new(task.clone(), Shape::Producer, routing, &result).into_hook();

        task.complete(Ok(11));
        hook(&RunReport {
            task: other.id(),
            finished: true,
        });
        hook(&RunReport {
            task: task.id(),
            finished: false,
        });
        assert!(values.lock().is_empty());

        hook(&RunReport {
            task: task.id(),
            finished: true,
        });
        assert_eq!(*values.lock(), vec![11]);
        assert_eq!(result.value(), Some(11));
    }

    #[test]
    fn effect_faults_reach_the_failure_handler() {
        let result = ExecutorResult::<()>::new(ScheduledPool::new(1).unwrap());
        let (handler, count) = counting();
        let routing = Routing {
            silent: true,
            on_failure: Some(handler),
            on_result: None,
        };
        let task = TaskHandle::new(false);
        let hook = Router::new(task.clone(), Shape::Effect, routing, &result).into_hook();

        task.complete(Err(TaskFault::Panicked("boom".into())));
        hook(&RunReport {
            task: task.id(),
            finished: true,
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(result.value(), None);
    }
}
