//! Launch work with a delay, a timeout or a repeating interval, on managed worker pools.
//!
//! `thread-builder` wraps a unit of work in a reusable [`ThreadBuilder`]. Any
//! combination of start delay, completion timeout and fixed-rate interval can be
//! configured; the builder classifies the combination, schedules the work on its
//! pool, arms a timeout guard when needed and routes the outcome to callbacks.
//!
//! Features include:
//! - A `ThreadBuilder` with fluent configuration and repeated starts into a
//!   single `ExecutorResult`
//! - `Execution` shapes for side-effect-only and value-producing work
//! - A `ScheduledPool` supporting immediate, delayed and fixed-rate work with
//!   after-execute hooks and graceful or immediate shutdown
//! - `TaskHandle`s that can be cancelled, waited on, or awaited from any async runtime
//! - Timeout guards that cancel unfinished work, optionally interrupting it
//! - Interruptible sleep helpers in [`thread_util`] for work that should stop
//!   when it is cancelled
//!
//! Faults raised by the work never reach the caller's thread. They are captured
//! in the task handle and delivered to the failure callback, or logged through
//! `tracing` when none is set. Cancellation and interruption can be silenced.

pub mod builder;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod execution;
mod guard;
mod periodic;
pub mod pool;
pub mod priority;
pub mod result;
mod router;
pub mod schedule;
pub mod task;
pub mod thread_util;
mod timing;

pub use builder::{NameSupplier, PrioritySupplier, ThreadBuilder};
pub use config::BuilderConfig;
pub use error::{BoxError, ConfigError, Interrupted, TaskFault};
pub use execution::{Execution, Shape};
pub use pool::{AfterExecute, FailureHandler, RunReport, ScheduledPool, WorkerFactory};
pub use priority::Priority;
pub use result::ExecutorResult;
pub use router::ResultHandler;
pub use schedule::{Schedule, TimingConfig, classify};
pub use task::{Completion, TaskHandle, TaskId, Work};
