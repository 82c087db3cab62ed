//! Task handles.
//!
//! A [`TaskHandle`] is the caller's view of one scheduled unit of work. It can
//! be cancelled, polled for completion, waited on from a thread with
//! [`TaskHandle::get`], or awaited from any async runtime through
//! [`TaskHandle::completion`]. Single-shot handles settle after their one run;
//! periodic handles settle only when cancelled or when a firing fails.
//!
//! Cancellation follows the usual future-task rules: a handle that already
//! settled cannot be cancelled, a cancelled handle reports
//! [`TaskFault::Cancelled`] even if its work keeps running, and a cancellation
//! with interruption raises the task's interruption flag so that helpers in
//! [`thread_util`](crate::thread_util) return early.

use std::{
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering},
    },
    task::{Context, Poll, Waker},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

use crate::{
    error::TaskFault,
    thread_util::{self, Interrupt},
};

/// A unit of work as run by a pool: shared so periodic tasks and later
/// episodes can call it again.
pub type Work<T> = Arc<dyn Fn() -> Result<T, TaskFault> + Send + Sync + 'static>;

const PENDING: u8 = 0;
const RUNNING: u8 = 1;

/// Process-unique identifier of a scheduled task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

// Lifecycle shared by a handle, its runner future and any guard watching it.
pub(crate) struct TaskState {
    id: TaskId,
    periodic: bool,
    status: AtomicU8,
    cancelled: AtomicBool,
    interrupt: Arc<Interrupt>,
    // Waker of the runner future, used to end a pending wait on cancel.
    runner: Mutex<Option<Waker>>,
    // Wakers of `Completion` futures.
    waiters: Mutex<Vec<Waker>>,
    settled: Mutex<bool>,
    settled_signal: Condvar,
}

impl TaskState {
    pub(crate) fn new(periodic: bool) -> Self {
        Self {
            id: TaskId::next(),
            periodic,
            status: AtomicU8::new(PENDING),
            cancelled: AtomicBool::new(false),
            interrupt: Arc::new(Interrupt::default()),
            runner: Mutex::new(None),
            waiters: Mutex::new(Vec::new()),
            settled: Mutex::new(false),
            settled_signal: Condvar::new(),
        }
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn is_periodic(&self) -> bool {
        self.periodic
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.status.load(Ordering::Acquire) == RUNNING
    }

    pub(crate) fn is_done(&self) -> bool {
        *self.settled.lock()
    }

    pub(crate) fn register_waker(&self, waker: &Waker) {
        let mut runner = self.runner.lock();
        if !runner.as_ref().is_some_and(|w| w.will_wake(waker)) {
            *runner = Some(waker.clone());
        }
    }

    pub(crate) fn cancel(&self, may_interrupt: bool) -> bool {
        {
            let mut settled = self.settled.lock();
            if *settled || self.cancelled.swap(true, Ordering::AcqRel) {
                return false;
            }
            if may_interrupt {
                self.interrupt.raise();
            }
            *settled = true;
            self.settled_signal.notify_all();
        }
        if let Some(runner) = self.runner.lock().take() {
            runner.wake();
        }
        self.wake_waiters();
        true
    }

    pub(crate) fn interrupt(&self) {
        self.interrupt.raise();
    }

    // Runs `work` once on the current thread with the interruption flag installed.
    pub(crate) fn run<T>(&self, work: &Work<T>) -> Result<T, TaskFault> {
        if self.is_cancelled() {
            return Err(TaskFault::Cancelled);
        }
        self.status.store(RUNNING, Ordering::Release);
        let outcome = thread_util::with_interrupt(&self.interrupt, || catch_unwind(AssertUnwindSafe(|| work())));
        self.status.store(PENDING, Ordering::Release);
        outcome.unwrap_or_else(|payload| Err(TaskFault::from_panic(payload)))
    }

    // Runs `record` and marks the task settled, unless it already was.
    fn settle(&self, record: impl FnOnce()) {
        {
            let mut settled = self.settled.lock();
            if *settled {
                return;
            }
            record();
            *settled = true;
            self.settled_signal.notify_all();
        }
        // The runner is done; its waker would keep the worker pool referenced.
        self.runner.lock().take();
        self.wake_waiters();
    }

    fn wait_settled(&self, deadline: Option<Instant>) -> bool {
        let mut settled = self.settled.lock();
        while !*settled {
            match deadline {
                Some(deadline) => {
                    if self.settled_signal.wait_until(&mut settled, deadline).timed_out() {
                        return *settled;
                    }
                }
                None => self.settled_signal.wait(&mut settled),
            }
        }
        true
    }

    fn add_waiter(&self, waker: &Waker) {
        let mut waiters = self.waiters.lock();
        if !waiters.iter().any(|w| w.will_wake(waker)) {
            waiters.push(waker.clone());
        }
    }

    fn wake_waiters(&self) {
        let waiters = std::mem::take(&mut *self.waiters.lock());
        waiters.into_iter().for_each(Waker::wake);
    }
}

/// A cancellable, completion-observable reference to one scheduled unit of work.
///
/// Handles are cheap to clone; all clones observe the same task.
pub struct TaskHandle<T> {
    state: Arc<TaskState>,
    outcome: Arc<Mutex<Option<Result<T, TaskFault>>>>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            outcome: Arc::clone(&self.outcome),
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id())
            .field("periodic", &self.is_periodic())
            .field("done", &self.is_done())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(periodic: bool) -> Self {
        Self {
            state: Arc::new(TaskState::new(periodic)),
            outcome: Arc::new(Mutex::new(None)),
        }
    }

    pub(crate) fn state(&self) -> &Arc<TaskState> {
        &self.state
    }

    /// Records the outcome of the task. A cancelled task keeps reporting
    /// [`TaskFault::Cancelled`] whatever its work returned.
    pub(crate) fn complete(&self, outcome: Result<T, TaskFault>) {
        self.state.settle(|| *self.outcome.lock() = Some(outcome));
    }

    #[must_use]
    pub fn id(&self) -> TaskId {
        self.state.id()
    }

    /// `true` for handles created by fixed-rate scheduling.
    #[must_use]
    pub fn is_periodic(&self) -> bool {
        self.state.is_periodic()
    }

    /// `true` once the task produced an outcome or was cancelled.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state.is_done()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }

    /// `true` while the unit of work is executing on a worker.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Attempts to cancel the task.
    ///
    /// Returns `false` if the task already settled or was cancelled before.
    /// With `may_interrupt` the task's interruption flag is raised, so a running
    /// execution that sleeps through [`thread_util`](crate::thread_util) stops
    /// early. Otherwise a running execution is left to finish; its result is
    /// discarded either way.
    pub fn cancel(&self, may_interrupt: bool) -> bool {
        let cancelled = self.state.cancel(may_interrupt);
        if cancelled {
            tracing::debug!(task = %self.id(), may_interrupt, "task cancelled");
        }
        cancelled
    }
}

impl<T: Clone> TaskHandle<T> {
    fn settled_outcome(&self) -> Result<T, TaskFault> {
        if self.is_cancelled() {
            return Err(TaskFault::Cancelled);
        }
        self.outcome.lock().clone().unwrap_or(Err(TaskFault::Cancelled))
    }

    /// The outcome, if the task already settled.
    #[must_use]
    pub fn try_get(&self) -> Option<Result<T, TaskFault>> {
        self.is_done().then(|| self.settled_outcome())
    }

    /// Blocks the current thread until the task settles.
    ///
    /// # Errors
    ///
    /// Returns the [`TaskFault`] the task ended with.
    pub fn get(&self) -> Result<T, TaskFault> {
        self.state.wait_settled(None);
        self.settled_outcome()
    }

    /// Like [`TaskHandle::get`] but gives up after `timeout`, returning `None`.
    /// A timeout too large to represent waits without limit.
    #[must_use]
    pub fn get_timeout(&self, timeout: Duration) -> Option<Result<T, TaskFault>> {
        self.state
            .wait_settled(Instant::now().checked_add(timeout))
            .then(|| self.settled_outcome())
    }

    /// A future resolving to the task's outcome, usable from any executor.
    pub fn completion(&self) -> Completion<T> {
        Completion {
            handle: self.clone(),
        }
    }
}

/// Future returned by [`TaskHandle::completion`].
#[must_use = "futures do nothing unless polled or .awaited"]
pub struct Completion<T> {
    handle: TaskHandle<T>,
}

impl<T: Clone> Future for Completion<T> {
    type Output = Result<T, TaskFault>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(outcome) = self.handle.try_get() {
            return Poll::Ready(outcome);
        }
        self.handle.state.add_waiter(cx.waker());
        match self.handle.try_get() {
            Some(outcome) => Poll::Ready(outcome),
            None => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;

    use super::*;

    #[test]
    fn completed_handle_reports_its_value() {
        let handle = TaskHandle::<u32>::new(false);
        assert!(!handle.is_done());
        assert!(handle.try_get().is_none());

        handle.complete(Ok(7));
        assert!(handle.is_done());
        assert!(matches!(handle.get(), Ok(7)));
        assert!(!handle.cancel(true), "settled handles cannot be cancelled");
        assert!(!handle.is_cancelled());
    }

    #[test]
    fn cancel_settles_and_masks_late_outcomes() {
        let handle = TaskHandle::<u32>::new(false);
        assert!(handle.cancel(false));
        assert!(handle.is_done());
        assert!(!handle.cancel(false), "second cancel is a no-op");

        handle.complete(Ok(1));
        assert!(matches!(handle.get(), Err(TaskFault::Cancelled)));
    }

    #[test]
    fn run_captures_panics_and_honors_cancellation() {
        let handle = TaskHandle::<u32>::new(false);
        let work: Work<u32> = Arc::new(|| -> Result<u32, TaskFault> { panic!("kaboom") });
        let r = handle.state().run(&work);
        assert!(matches!(r, Err(TaskFault::Panicked(ref m)) if m == "kaboom"));

        let cancelled = TaskHandle::<u32>::new(false);
        cancelled.cancel(false);
        let work: Work<u32> = Arc::new(|| Ok(1));
        assert!(matches!(cancelled.state().run(&work), Err(TaskFault::Cancelled)));
    }

    #[test]
    fn get_timeout_gives_up() {
        let handle = TaskHandle::<()>::new(true);
        assert!(handle.get_timeout(Duration::from_millis(20)).is_none());
    }

    #[test]
    fn unbounded_get_timeout_waits_for_the_outcome() {
        let handle = TaskHandle::<u8>::new(false);
        let remote = handle.clone();
        let setter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            remote.complete(Ok(9));
        });
        assert!(matches!(handle.get_timeout(Duration::MAX), Some(Ok(9))));
        setter.join().unwrap();
    }

    #[test]
    fn completion_future_wakes_on_settle() {
        let handle = TaskHandle::<&'static str>::new(false);
        let remote = handle.clone();
        let setter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            remote.complete(Ok("done"));
        });
        assert!(matches!(block_on(handle.completion()), Ok("done")));
        setter.join().unwrap();
    }

    #[test]
    fn ids_are_unique() {
        let a = TaskHandle::<()>::new(false);
        let b = TaskHandle::<()>::new(false);
        assert_ne!(a.id(), b.id());
        assert!(a.id().to_string().starts_with("task-"));
    }
}
