//! Helpers for code running on pool workers.
//!
//! Rust threads cannot be interrupted from the outside, so cancellation with
//! interruption raises a per-task flag instead. The sleep helpers here observe
//! that flag and return [`Interrupted`] early, which lets a long-running
//! execution stop when its timeout guard fires. Called outside of a pool worker
//! they behave like plain sleeps.

use std::{
    cell::{Cell, RefCell},
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

use crate::{Priority, error::Interrupted};

thread_local! {
    static CURRENT_INTERRUPT: RefCell<Option<Arc<Interrupt>>> = const { RefCell::new(None) };
    static WORKER_PRIORITY: Cell<Option<Priority>> = const { Cell::new(None) };
}

// Interruption flag of a single task. Once raised it stays raised.
#[derive(Default)]
pub(crate) struct Interrupt {
    raised: Mutex<bool>,
    signal: Condvar,
}

impl Interrupt {
    pub(crate) fn raise(&self) {
        *self.raised.lock() = true;
        self.signal.notify_all();
    }

    pub(crate) fn is_raised(&self) -> bool {
        *self.raised.lock()
    }

    // Blocks for `duration` or until raised. Returns `true` if raised.
    fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now().checked_add(duration);
        let mut raised = self.raised.lock();
        while !*raised {
            match deadline {
                Some(deadline) => {
                    if self.signal.wait_until(&mut raised, deadline).timed_out() {
                        break;
                    }
                }
                // Too long to represent: only an interruption ends the wait.
                None => self.signal.wait(&mut raised),
            }
        }
        *raised
    }
}

// Runs `f` with `interrupt` installed as the current task's flag.
pub(crate) fn with_interrupt<T>(interrupt: &Arc<Interrupt>, f: impl FnOnce() -> T) -> T {
    struct Restore(Option<Arc<Interrupt>>);

    impl Drop for Restore {
        fn drop(&mut self) {
            let previous = self.0.take();
            CURRENT_INTERRUPT.with(|current| *current.borrow_mut() = previous);
        }
    }

    let previous = CURRENT_INTERRUPT.with(|current| current.replace(Some(Arc::clone(interrupt))));
    let _restore = Restore(previous);
    f()
}

pub(crate) fn set_worker_priority(priority: Priority) {
    WORKER_PRIORITY.with(|p| p.set(Some(priority)));
}

/// Priority of the current worker, if it belongs to a pool created with a
/// priority supplier.
#[must_use]
pub fn current_priority() -> Option<Priority> {
    WORKER_PRIORITY.with(Cell::get)
}

/// `true` if the task running on this thread has been cancelled with interruption.
#[must_use]
pub fn is_interrupted() -> bool {
    CURRENT_INTERRUPT.with(|current| current.borrow().as_ref().is_some_and(|i| i.is_raised()))
}

/// Sleeps for `duration`, waking early if the running task is interrupted.
///
/// # Errors
///
/// Returns [`Interrupted`] if the task was interrupted before or during the sleep.
/// Returning it from a fallible execution reports the run as interrupted.
pub fn sleep(duration: Duration) -> Result<(), Interrupted> {
    let interrupt = CURRENT_INTERRUPT.with(|current| current.borrow().clone());
    match interrupt {
        Some(interrupt) if interrupt.wait(duration) => Err(Interrupted),
        Some(_) => Ok(()),
        None => {
            std::thread::sleep(duration);
            Ok(())
        }
    }
}

/// Sleeps in steps of `poll` for as long as `condition` returns `true`.
///
/// # Errors
///
/// Returns [`Interrupted`] as soon as the running task is interrupted.
pub fn sleep_while(poll: Duration, mut condition: impl FnMut() -> bool) -> Result<(), Interrupted> {
    while condition() {
        sleep(poll)?;
    }
    Ok(())
}
