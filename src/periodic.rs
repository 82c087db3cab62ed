//! Fixed-rate repetition of a unit of work.
//!
//! The runner waits for each deadline on the pool timer, runs the work on the
//! worker it was polled on and advances the deadline by one period. Deadlines
//! advance from the first one rather than from the end of a run, so a slow run
//! is followed by an immediate one until the schedule has caught up.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    error::TaskFault,
    pool::{PoolShared, RunReport},
    task::{TaskHandle, Work},
    timing::{self, Cancellable, Sleep},
};

pub(crate) async fn run_fixed_rate<T>(
    shared: Arc<PoolShared>,
    handle: TaskHandle<T>,
    work: Work<T>,
    first: Instant,
    period: Duration,
) {
    let state = Arc::clone(handle.state());
    let task = handle.id();
    let mut next_run = first;

    let outcome = loop {
        let wait = Cancellable::new(Sleep::until(shared.timer(), next_run), Arc::clone(&state));
        if wait.await.is_none() {
            break Err(TaskFault::Cancelled);
        }
        // Values of individual firings are not kept.
        if let Err(fault) = state.run(&work) {
            tracing::debug!(%task, %fault, "periodic task stopped by a failed firing");
            break Err(fault);
        }
        if state.is_cancelled() {
            break Err(TaskFault::Cancelled);
        }
        shared.after_execute(&RunReport {
            task,
            finished: false,
        });
        next_run = timing::deadline_after(next_run, period);
    };

    handle.complete(outcome);
    shared.after_execute(&RunReport {
        task,
        finished: true,
    });
}
