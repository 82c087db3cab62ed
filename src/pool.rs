//! Provides the `ScheduledPool`, a worker pool with delayed and fixed-rate scheduling.
//!
//! Units of work are closures that run to completion on one worker thread. A pool
//! accepts them immediately ([`ScheduledPool::submit`]), after a delay
//! ([`ScheduledPool::schedule`]) or repeatedly at a fixed rate
//! ([`ScheduledPool::schedule_at_fixed_rate`]), and hands back a [`TaskHandle`]
//! for each. Waiting for a start time does not occupy a worker; a per-pool timer
//! thread wakes tasks when they are due.
//!
//! After every run the pool invokes its after-execute hooks, in the order they were
//! added, with a [`RunReport`]. Hooks are how completion routing is attached to
//! tasks. A panic inside a hook is caught and handed to the pool's failure handler.

use std::{
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use futures::executor::{ThreadPool, ThreadPoolBuilder};
use parking_lot::Mutex;

use crate::{
    Priority,
    error::{ConfigError, TaskFault},
    periodic,
    task::{TaskHandle, TaskId, TaskState, Work},
    thread_util,
    timing::{self, Cancellable, Sleep, Timer},
};

const DEFAULT_NAME: &str = "thread-builder-";

// Fixed-rate tasks never fire more often than this.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Hook invoked after every run of every task on a pool.
pub type AfterExecute = Arc<dyn Fn(&RunReport) + Send + Sync + 'static>;

/// Receives faults nobody else handled.
pub type FailureHandler = Arc<dyn Fn(&TaskFault) + Send + Sync + 'static>;

/// Passed to after-execute hooks once a task finished a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunReport {
    /// The task that ran.
    pub task: TaskId,
    /// `true` if the handle settled with this run. Periodic firings that keep the
    /// task scheduled report `false`.
    pub finished: bool,
}

/// Configuration applied to the worker threads of a pool.
#[derive(Clone, Default)]
pub struct WorkerFactory {
    name: Option<String>,
    priority: Option<Priority>,
    failure_handler: Option<FailureHandler>,
}

impl WorkerFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Worker threads are named `name` followed by their index.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Priority recorded on every worker thread.
    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Handler for panics escaping after-execute hooks.
    #[must_use]
    pub fn failure_handler(mut self, handler: FailureHandler) -> Self {
        self.failure_handler = Some(handler);
        self
    }
}

impl fmt::Debug for WorkerFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerFactory")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("failure_handler", &self.failure_handler.is_some())
            .finish()
    }
}

// An after-execute hook, either pool-wide or scoped to one task. Scoped hooks
// only see reports of their task and are dropped after its finished report.
#[derive(Clone)]
struct Hook {
    task: Option<TaskId>,
    run: AfterExecute,
}

// State the task runners need while they are in flight.
pub(crate) struct PoolShared {
    name: String,
    timer: Arc<Timer>,
    hooks: Mutex<Vec<Hook>>,
    failure_handler: Mutex<Option<FailureHandler>>,
    shutdown: AtomicBool,
    tasks: Mutex<Vec<Weak<TaskState>>>,
}

impl PoolShared {
    pub(crate) fn timer(&self) -> Arc<Timer> {
        Arc::clone(&self.timer)
    }

    pub(crate) fn after_execute(&self, report: &RunReport) {
        tracing::trace!(pool = %self.name, task = %report.task, finished = report.finished, "run finished");
        // Snapshot so hooks may add hooks without deadlocking.
        let due: Vec<AfterExecute> = {
            let mut hooks = self.hooks.lock();
            let due = hooks
                .iter()
                .filter(|h| h.task.is_none_or(|t| t == report.task))
                .map(|h| Arc::clone(&h.run))
                .collect();
            if report.finished {
                hooks.retain(|h| h.task != Some(report.task));
            }
            due
        };
        for hook in due {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| hook(report))) {
                let fault = TaskFault::from_panic(payload);
                let handler = self.failure_handler.lock().clone();
                match handler {
                    Some(handler) => handler(&fault),
                    None => tracing::error!(pool = %self.name, task = %report.task, %fault, "after-execute hook panicked"),
                }
            }
        }
    }

    fn add_hook(&self, task: Option<TaskId>, run: AfterExecute) {
        self.hooks.lock().push(Hook { task, run });
    }

    fn forget_hooks(&self, task: TaskId) {
        self.hooks.lock().retain(|h| h.task != Some(task));
    }

    // Records a new task unless the pool is shut down. The flag is only flipped
    // under the same lock, so no admitted task escapes a shutdown sweep.
    fn track(&self, state: &Arc<TaskState>) -> bool {
        let mut tasks = self.tasks.lock();
        if self.shutdown.load(Ordering::Acquire) {
            return false;
        }
        tasks.retain(|t| t.strong_count() > 0);
        tasks.push(Arc::downgrade(state));
        true
    }

    fn shutdown(&self) {
        {
            let _tasks = self.tasks.lock();
            if self.shutdown.swap(true, Ordering::AcqRel) {
                return;
            }
        }
        tracing::debug!(pool = %self.name, "pool shutting down");
        for state in self.live_tasks() {
            if state.is_periodic() || !state.is_running() {
                state.cancel(false);
            }
        }
        self.timer.stop();
    }

    fn live_tasks(&self) -> Vec<Arc<TaskState>> {
        self.tasks.lock().iter().filter_map(Weak::upgrade).collect()
    }
}

impl Drop for PoolShared {
    fn drop(&mut self) {
        self.timer.stop();
    }
}

/// A pool of worker threads executing scheduled units of work.
///
/// Cloning a `ScheduledPool` yields another reference to the same workers. Workers
/// exit once every reference is dropped and no task is pending.
#[derive(Clone)]
pub struct ScheduledPool {
    // `None` once the workers were released; the pool is shut down by then.
    workers: Arc<Mutex<Option<ThreadPool>>>,
    shared: Arc<PoolShared>,
    size: usize,
}

impl fmt::Debug for ScheduledPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledPool")
            .field("name", &self.shared.name)
            .field("size", &self.size)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl ScheduledPool {
    /// Creates a pool with `size` default workers.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidPoolSize`] for `size == 0`, [`ConfigError::Pool`] if
    /// threads could not be spawned.
    pub fn new(size: usize) -> Result<Self, ConfigError> {
        Self::with_factory(size, WorkerFactory::default())
    }

    /// Creates a pool with `size` workers configured by `factory`.
    ///
    /// # Errors
    ///
    /// Same as [`ScheduledPool::new`].
    pub fn with_factory(size: usize, factory: WorkerFactory) -> Result<Self, ConfigError> {
        if size == 0 {
            return Err(ConfigError::InvalidPoolSize);
        }
        let name = factory.name.unwrap_or_else(|| DEFAULT_NAME.to_string());

        let mut builder = ThreadPoolBuilder::new();
        builder.pool_size(size).name_prefix(name.clone());
        if let Some(priority) = factory.priority {
            builder.after_start(move |_| thread_util::set_worker_priority(priority));
        }
        let workers = builder.create()?;
        let timer = Timer::start(name.trim_end_matches(['-', '_']))?;

        tracing::debug!(pool = %name, size, "worker pool created");
        Ok(Self {
            workers: Arc::new(Mutex::new(Some(workers))),
            shared: Arc::new(PoolShared {
                name,
                timer,
                hooks: Mutex::new(Vec::new()),
                failure_handler: Mutex::new(factory.failure_handler),
                shutdown: AtomicBool::new(false),
                tasks: Mutex::new(Vec::new()),
            }),
            size,
        })
    }

    /// Number of worker threads.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Name prefix of the worker threads.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Runs `work` as soon as a worker is free.
    pub fn submit<T, F>(&self, work: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: Fn() -> Result<T, TaskFault> + Send + Sync + 'static,
    {
        self.schedule(work, Duration::ZERO)
    }

    /// Runs `work` once, `delay` from now.
    pub fn schedule<T, F>(&self, work: F, delay: Duration) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: Fn() -> Result<T, TaskFault> + Send + Sync + 'static,
    {
        let handle = TaskHandle::new(false);
        self.spawn_once(handle.clone(), Arc::new(work), timing::deadline_after(Instant::now(), delay));
        handle
    }

    /// Runs `work` first after `initial_delay` and then every `period`.
    ///
    /// Firings are measured from the first deadline, not from the end of the previous
    /// run; a late firing runs immediately but never overlaps the previous one. The
    /// values produced by individual firings are discarded. The handle settles when
    /// it is cancelled, the pool shuts down, or a firing fails.
    pub fn schedule_at_fixed_rate<T, F>(&self, work: F, initial_delay: Duration, period: Duration) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: Fn() -> Result<T, TaskFault> + Send + Sync + 'static,
    {
        let handle = TaskHandle::new(true);
        let first = timing::deadline_after(Instant::now(), initial_delay);
        self.spawn_fixed_rate(handle.clone(), Arc::new(work), first, period);
        handle
    }

    /// Adds a hook run after every task run on this pool.
    pub fn add_after_execute(&self, hook: AfterExecute) {
        self.shared.add_hook(None, hook);
    }

    // Adds a hook that only sees the runs of `task` and is dropped once the task
    // finished.
    pub(crate) fn add_task_hook(&self, task: TaskId, hook: AfterExecute) {
        self.shared.add_hook(Some(task), hook);
    }

    // Replaces the handler for panics escaping hooks.
    pub(crate) fn set_failure_handler(&self, handler: Option<FailureHandler>) {
        *self.shared.failure_handler.lock() = handler;
    }

    #[cfg(test)]
    pub(crate) fn hook_count(&self) -> usize {
        self.shared.hooks.lock().len()
    }

    /// Stops accepting work.
    ///
    /// Tasks still waiting for their start time and all periodic tasks are cancelled.
    /// Tasks already running finish normally. Work scheduled afterwards comes back
    /// as an already-cancelled handle.
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }

    // Shuts the pool down and releases its workers once `task` has finished. The
    // hook holds the pool weakly, since the pool owns its hooks.
    pub(crate) fn shutdown_after(&self, task: TaskId) {
        let shared = Arc::downgrade(&self.shared);
        let workers = Arc::downgrade(&self.workers);
        self.add_task_hook(
            task,
            Arc::new(move |report: &RunReport| {
                if !report.finished {
                    return;
                }
                if let Some(shared) = shared.upgrade() {
                    shared.shutdown();
                }
                // The worker threads exit once the running task lets go of its handle.
                if let Some(workers) = workers.upgrade() {
                    workers.lock().take();
                }
            }),
        );
    }

    /// `true` while the pool still holds its worker threads.
    #[must_use]
    pub fn has_workers(&self) -> bool {
        self.workers.lock().is_some()
    }

    /// Like [`ScheduledPool::shutdown`], but also cancels and interrupts running tasks.
    pub fn shutdown_now(&self) {
        self.shutdown();
        for state in self.shared.live_tasks() {
            state.cancel(true);
            state.interrupt();
        }
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    // Spawns the runner for an already created single-shot handle, so callers can
    // attach hooks for it before it is able to complete.
    pub(crate) fn spawn_once<T: Send + 'static>(&self, handle: TaskHandle<T>, work: Work<T>, due: Instant) {
        if !self.admit(&handle) {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let rejected = handle.clone();
        self.spawn(&rejected, async move {
            let state = Arc::clone(handle.state());
            let start = Cancellable::new(Sleep::until(shared.timer(), due), Arc::clone(&state));
            let outcome = match start.await {
                Some(()) => state.run(&work),
                None => Err(TaskFault::Cancelled),
            };
            handle.complete(outcome);
            shared.after_execute(&RunReport {
                task: handle.id(),
                finished: true,
            });
        });
    }

    pub(crate) fn spawn_fixed_rate<T: Send + 'static>(
        &self,
        handle: TaskHandle<T>,
        work: Work<T>,
        first: Instant,
        period: Duration,
    ) {
        if !self.admit(&handle) {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let rejected = handle.clone();
        self.spawn(
            &rejected,
            periodic::run_fixed_rate(shared, handle, work, first, period.max(MIN_PERIOD)),
        );
    }

    fn admit<T>(&self, handle: &TaskHandle<T>) -> bool {
        if self.shared.track(handle.state()) {
            return true;
        }
        self.reject(handle);
        false
    }

    fn spawn<T>(&self, handle: &TaskHandle<T>, runner: impl Future<Output = ()> + Send + 'static) {
        match self.workers.lock().as_ref() {
            Some(workers) => workers.spawn_ok(runner),
            None => self.reject(handle),
        }
    }

    // A rejected task never runs, so its scoped hooks would never be dropped.
    fn reject<T>(&self, handle: &TaskHandle<T>) {
        tracing::debug!(pool = %self.shared.name, task = %handle.id(), "rejected, pool is shut down");
        self.shared.forget_hooks(handle.id());
        handle.cancel(false);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn zero_sized_pool_is_rejected() {
        assert!(matches!(
            ScheduledPool::new(0),
            Err(ConfigError::InvalidPoolSize)
        ));
    }

    #[test]
    fn submitted_work_produces_its_value() {
        let pool = ScheduledPool::new(2).unwrap();
        let handle = pool.submit(|| Ok(21 * 2));
        assert!(matches!(handle.get(), Ok(42)));
        assert!(!handle.is_periodic());
    }

    #[test]
    fn hooks_see_every_run_in_registration_order() {
        let pool = ScheduledPool::new(1).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            pool.add_after_execute(Arc::new(move |report: &RunReport| {
                seen.lock().push((tag, report.finished));
            }));
        }

        let handle = pool.submit(|| Ok(()));
        handle.get().unwrap();
        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(*seen.lock(), vec![("first", true), ("second", true)]);
    }

    #[test]
    fn hook_panics_reach_the_failure_handler() {
        let caught = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&caught);
        let factory = WorkerFactory::new().failure_handler(Arc::new(move |fault: &TaskFault| {
            assert!(fault.is_user_fault());
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let pool = ScheduledPool::with_factory(1, factory).unwrap();
        pool.add_after_execute(Arc::new(|report: &RunReport| {
            if report.finished {
                panic!("hook failed");
            }
        }));

        pool.submit(|| Ok(())).get().unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(caught.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn task_hooks_are_dropped_once_their_task_finished() {
        let pool = ScheduledPool::new(1).unwrap();
        let seen = Arc::new(AtomicUsize::new(0));
        pool.add_after_execute(Arc::new(|_: &RunReport| {}));

        for _ in 0..200 {
            let handle = TaskHandle::new(false);
            let counter = Arc::clone(&seen);
            pool.add_task_hook(
                handle.id(),
                Arc::new(move |_: &RunReport| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            );
            let work: Work<()> = Arc::new(|| Ok(()));
            pool.spawn_once(handle.clone(), work, Instant::now());
            handle.get().unwrap();
        }
        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(seen.load(Ordering::SeqCst), 200, "each hook sees only its own task");
        assert_eq!(pool.hook_count(), 1, "only the pool-wide hook is left");
    }

    #[test]
    fn rejected_tasks_leave_no_hooks() {
        let pool = ScheduledPool::new(1).unwrap();
        pool.shutdown();
        let handle = TaskHandle::<()>::new(false);
        pool.add_task_hook(handle.id(), Arc::new(|_: &RunReport| {}));
        let work: Work<()> = Arc::new(|| Ok(()));
        pool.spawn_once(handle.clone(), work, Instant::now());

        assert!(handle.is_cancelled());
        assert_eq!(pool.hook_count(), 0);
    }

    #[test]
    fn shutdown_after_releases_the_workers() {
        let pool = ScheduledPool::new(1).unwrap();
        let handle = TaskHandle::new(false);
        pool.shutdown_after(handle.id());
        let work: Work<u8> = Arc::new(|| Ok(1));
        pool.spawn_once(handle.clone(), work, Instant::now());

        assert!(matches!(handle.get(), Ok(1)));
        std::thread::sleep(Duration::from_millis(50));
        assert!(pool.is_shutdown());
        assert!(!pool.has_workers());
        assert!(pool.submit(|| Ok(())).is_cancelled());
    }

    #[test]
    fn huge_delays_do_not_overflow() {
        let pool = ScheduledPool::new(1).unwrap();
        let far = pool.schedule(|| Ok(()), Duration::MAX);
        let periodic = pool.schedule_at_fixed_rate(|| Ok(()), Duration::MAX, Duration::MAX);
        assert!(!far.is_done());
        assert!(far.cancel(false));
        assert!(periodic.cancel(false));
    }

    #[test]
    fn shutdown_cancels_pending_and_rejects_new_work() {
        let pool = ScheduledPool::new(1).unwrap();
        let pending = pool.schedule(|| Ok(()), Duration::from_secs(30));
        pool.shutdown();

        assert!(pool.is_shutdown());
        assert!(matches!(pending.get(), Err(TaskFault::Cancelled)));

        let rejected = pool.submit(|| Ok(()));
        assert!(rejected.is_cancelled());
    }
}
