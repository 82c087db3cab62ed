//! Provides the `ThreadBuilder`, a fluent way to launch scheduled work.
//!
//! A builder is configured once and may then start any number of *episodes*.
//! Every episode runs the configured [`Execution`] on the builder's shared pool,
//! created on the first start and reused afterwards, and appends its handle to
//! the builder's single [`ExecutorResult`].
//!
//! The timing setters decide how an episode runs:
//!
//! - nothing set: once, immediately
//! - a delay: once, after the delay
//! - an interval: repeatedly at a fixed rate, effects only
//! - a timeout: additionally cancel the task if it has not finished when the
//!   timeout elapses, measured from the start call
//!
//! Outcomes never reach the thread calling [`ThreadBuilder::start`]. Values of
//! producers go to the result callback and [`ExecutorResult::value`], faults go
//! to the failure callback or the log.

use std::{fmt, sync::Arc, time::Duration};

use crate::{
    Priority, ScheduledPool,
    config::BuilderConfig,
    dispatch::{self, Launch},
    error::{ConfigError, TaskFault},
    execution::Execution,
    guard,
    pool::{AfterExecute, FailureHandler, RunReport, WorkerFactory},
    result::ExecutorResult,
    router::{ResultHandler, Router, Routing},
    schedule::TimingConfig,
};

/// Supplies the name prefix of the worker threads.
pub type NameSupplier = Arc<dyn Fn() -> String + Send + Sync + 'static>;

/// Supplies the priority of the worker threads.
pub type PrioritySupplier = Arc<dyn Fn() -> Priority + Send + Sync + 'static>;

/// Configures and launches scheduled work.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use thread_builder::{Execution, ThreadBuilder};
///
/// let result = ThreadBuilder::new()
///     .set_delay(Duration::from_millis(10))
///     .set_execution(Execution::producer(|| 6 * 7))
///     .start()
///     .unwrap();
///
/// assert_eq!(result.tasks()[0].get().unwrap(), 42);
/// ```
pub struct ThreadBuilder<R = ()> {
    config: BuilderConfig,
    execution: Option<Execution<R>>,
    timing: TimingConfig,
    may_interrupt: bool,
    silent: bool,
    thread_name: Option<NameSupplier>,
    thread_priority: Option<PrioritySupplier>,
    on_uncaught_failure: Option<FailureHandler>,
    on_complete: Option<AfterExecute>,
    on_result: Option<ResultHandler<R>>,
    pool: Option<ScheduledPool>,
    result: Option<ExecutorResult<R>>,
}

impl<R> fmt::Debug for ThreadBuilder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadBuilder")
            .field("config", &self.config)
            .field("execution", &self.execution)
            .field("timing", &self.timing)
            .field("may_interrupt", &self.may_interrupt)
            .field("silent", &self.silent)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl<R: Clone + Send + 'static> Default for ThreadBuilder<R> {
    fn default() -> Self {
        Self::with_config(BuilderConfig::default())
    }
}

impl<R: Clone + Send + 'static> ThreadBuilder<R> {
    /// A builder with a single-worker pool and default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder whose pool has `size` workers.
    #[must_use]
    pub fn with_pool_size(size: usize) -> Self {
        Self::with_config(BuilderConfig::default().with_core_pool_size(size))
    }

    #[must_use]
    pub fn with_config(config: BuilderConfig) -> Self {
        Self {
            config,
            execution: None,
            timing: TimingConfig::new(),
            may_interrupt: false,
            silent: false,
            thread_name: None,
            thread_priority: None,
            on_uncaught_failure: None,
            on_complete: None,
            on_result: None,
            pool: None,
            result: None,
        }
    }

    /// Waits `delay` after the start call before the first run.
    pub fn set_delay(&mut self, delay: Duration) -> &mut Self {
        self.timing.set_delay(delay);
        self
    }

    /// Cancels the task if it has not finished `timeout` after the start call.
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timing.set_timeout(timeout);
        self
    }

    /// Repeats the execution every `interval`. Only effects can repeat.
    pub fn set_interval(&mut self, interval: Duration) -> &mut Self {
        self.timing.set_interval(interval);
        self
    }

    /// The work to run. Required before starting.
    pub fn set_execution(&mut self, execution: Execution<R>) -> &mut Self {
        self.execution = Some(execution);
        self
    }

    /// Whether a timeout interrupts the task if it is already running.
    pub fn set_may_interrupt(&mut self, may_interrupt: bool) -> &mut Self {
        self.may_interrupt = may_interrupt;
        self
    }

    /// Whether cancellation and interruption are kept away from the failure callback.
    pub fn set_silent(&mut self, silent: bool) -> &mut Self {
        self.silent = silent;
        self
    }

    /// Receives every fault not suppressed by silent mode, and panics raised by
    /// pool hooks. Without it faults are logged at error level. A change applies
    /// from the next start on.
    pub fn set_on_uncaught_failure<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&TaskFault) + Send + Sync + 'static,
    {
        self.on_uncaught_failure = Some(Arc::new(f));
        self
    }

    /// Called after every run of the tasks this builder starts, including each
    /// periodic firing.
    pub fn set_on_complete<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&RunReport) + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(f));
        self
    }

    /// Receives the value of a producer execution.
    pub fn set_on_result<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&R) + Send + Sync + 'static,
    {
        self.on_result = Some(Arc::new(f));
        self
    }

    /// Names the worker threads. Called once, when the pool is created.
    pub fn set_thread_name<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.thread_name = Some(Arc::new(f));
        self
    }

    /// Sets the priority of the worker threads. Called once, when the pool is created.
    pub fn set_thread_priority<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn() -> Priority + Send + Sync + 'static,
    {
        self.thread_priority = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    #[must_use]
    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Starts an episode and returns the builder's result.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] without scheduling anything if no execution is
    /// set, the execution cannot run with the configured timing, or the pool
    /// cannot be created or was shut down.
    pub fn start(&mut self) -> Result<ExecutorResult<R>, ConfigError> {
        self.launch()
    }

    /// Starts an episode and returns the builder, ready for the next one.
    ///
    /// # Errors
    ///
    /// Same as [`ThreadBuilder::start`].
    pub fn start_and_build_other(&mut self) -> Result<&mut Self, ConfigError> {
        self.launch()?;
        Ok(self)
    }

    fn launch(&mut self) -> Result<ExecutorResult<R>, ConfigError> {
        let execution = self.execution.clone().ok_or(ConfigError::MissingExecution)?;
        let schedule = self.timing.classification();
        dispatch::validate(
            execution.shape(),
            schedule,
            self.timing.interval(),
            self.on_result.is_some(),
        )?;

        let pool = self.shared_pool()?;
        let guard_pool = match self.timing.timeout() {
            Some(timeout) if schedule.has_timeout() => {
                Some((guard::pool(self.on_uncaught_failure.clone())?, timeout))
            }
            _ => None,
        };
        let result = self
            .result
            .get_or_insert_with(|| ExecutorResult::new(pool.clone()))
            .clone();

        let has_callbacks = self.on_complete.is_some() || self.on_uncaught_failure.is_some();
        let delay = dispatch::effective_delay(self.timing.delay(), has_callbacks, self.config.min_callback_delay);
        let launch = Launch::new(schedule, delay, self.timing.interval());
        let routing = Routing {
            silent: self.silent,
            on_failure: self.on_uncaught_failure.clone(),
            on_result: self.on_result.clone(),
        };
        let on_complete = self.on_complete.clone();

        tracing::debug!(?schedule, shape = ?execution.shape(), "starting episode");
        let handle = dispatch::dispatch(&pool, execution.work(), launch, |handle| {
            let router = Router::new(handle.clone(), execution.shape(), routing, &result);
            pool.add_task_hook(handle.id(), router.into_hook());
            if let Some(on_complete) = on_complete {
                pool.add_task_hook(handle.id(), on_complete);
            }
        });

        if let Some((guard_pool, timeout)) = guard_pool {
            let routing = Routing {
                silent: self.silent,
                on_failure: self.on_uncaught_failure.clone(),
                on_result: None,
            };
            tracing::debug!(task = %handle.id(), ?timeout, "timeout guard attached");
            result.push_guard(guard::arm(guard_pool, &handle, timeout, self.may_interrupt, routing));
        }
        result.push_task(handle);
        Ok(result)
    }

    // The pool of this builder, created on first use with the worker suppliers.
    fn shared_pool(&mut self) -> Result<ScheduledPool, ConfigError> {
        if let Some(pool) = &self.pool {
            if pool.is_shutdown() {
                return Err(ConfigError::PoolShutdown);
            }
            pool.set_failure_handler(self.on_uncaught_failure.clone());
            return Ok(pool.clone());
        }

        let mut factory = WorkerFactory::new();
        if let Some(name) = &self.thread_name {
            factory = factory.name(name());
        }
        if let Some(priority) = &self.thread_priority {
            factory = factory.priority(priority());
        }
        if let Some(handler) = &self.on_uncaught_failure {
            factory = factory.failure_handler(Arc::clone(handler));
        }
        let pool = ScheduledPool::with_factory(self.config.core_pool_size, factory)?;
        self.pool = Some(pool.clone());
        Ok(pool)
    }
}
