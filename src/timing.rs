//! Timing primitives used by the worker pools.
//!
//! Every [`ScheduledPool`](crate::ScheduledPool) owns one timer thread. Tasks
//! waiting for their start time register a deadline and a waker with it instead
//! of blocking a worker, so a single-worker pool can hold any number of delayed
//! tasks. [`Sleep`] is the future that waits for a deadline and [`Cancellable`]
//! stops waiting as soon as the owning task is cancelled.

use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    io,
    pin::Pin,
    sync::{
        Arc,
        atomic::{self, AtomicBool, AtomicU64},
    },
    task::{Context, Poll, Waker},
    thread,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use pin_project_lite::pin_project;

use crate::task::TaskState;

// Longer waits are cut to this; a deadline a century away never fires in practice.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// The instant `wait` after `from`, saturating instead of overflowing.
pub(crate) fn deadline_after(from: Instant, wait: Duration) -> Instant {
    let mut wait = wait.min(FAR_FUTURE);
    loop {
        match from.checked_add(wait) {
            Some(due) => return due,
            None => wait /= 2,
        }
    }
}

struct Entry {
    due: Instant,
    seq: u64,
    waker: Waker,
}

// `BinaryHeap` is a max-heap; order entries so the earliest deadline is on top.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Entry {}

/// Handle to a timer thread.
///
/// The thread exits once [`Timer::stop`] is called; entries still queued at
/// that point are dropped without waking their tasks.
pub(crate) struct Timer {
    queue: Mutex<BinaryHeap<Entry>>,
    signal: Condvar,
    stopped: AtomicBool,
    seq: AtomicU64,
}

impl Timer {
    pub(crate) fn start(name: &str) -> io::Result<Arc<Self>> {
        let timer = Arc::new(Self {
            queue: Mutex::new(BinaryHeap::new()),
            signal: Condvar::new(),
            stopped: AtomicBool::new(false),
            seq: AtomicU64::new(0),
        });
        let driver = Arc::clone(&timer);
        thread::Builder::new()
            .name(format!("{name}-timer"))
            .spawn(move || driver.run())?;
        Ok(timer)
    }

    pub(crate) fn register(&self, due: Instant, waker: Waker) {
        let seq = self.seq.fetch_add(1, atomic::Ordering::Relaxed);
        let mut queue = self.queue.lock();
        let earliest = queue.peek().is_none_or(|top| due < top.due);
        queue.push(Entry { due, seq, waker });
        if earliest {
            self.signal.notify_one();
        }
    }

    pub(crate) fn stop(&self) {
        self.stopped.store(true, atomic::Ordering::Release);
        let _queue = self.queue.lock();
        self.signal.notify_one();
    }

    fn run(&self) {
        let mut queue = self.queue.lock();
        loop {
            if self.stopped.load(atomic::Ordering::Acquire) {
                queue.clear();
                tracing::trace!("timer thread stopped");
                return;
            }

            let now = Instant::now();
            let mut due = Vec::new();
            while queue.peek().is_some_and(|top| top.due <= now) {
                if let Some(entry) = queue.pop() {
                    due.push(entry.waker);
                }
            }
            if !due.is_empty() {
                parking_lot::MutexGuard::unlocked(&mut queue, || {
                    due.into_iter().for_each(Waker::wake);
                });
                continue;
            }

            match queue.peek().map(|top| top.due) {
                Some(deadline) => {
                    self.signal.wait_until(&mut queue, deadline);
                }
                None => self.signal.wait(&mut queue),
            }
        }
    }
}

/// A future that completes once its deadline has passed.
///
/// The deadline is fixed at construction time, not at the first poll.
#[must_use = "futures do nothing unless polled or .awaited"]
pub(crate) struct Sleep {
    timer: Arc<Timer>,
    due: Instant,
    registered: Option<Waker>,
}

impl Sleep {
    pub(crate) fn until(timer: Arc<Timer>, due: Instant) -> Self {
        Self {
            timer,
            due,
            registered: None,
        }
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if Instant::now() >= self.due {
            return Poll::Ready(());
        }
        let stale = self
            .registered
            .as_ref()
            .is_none_or(|w| !w.will_wake(cx.waker()));
        if stale {
            let waker = cx.waker().clone();
            self.timer.register(self.due, waker.clone());
            self.registered = Some(waker);
        }
        Poll::Pending
    }
}

pin_project! {
    /// Polls the inner future until it completes or the task is cancelled.
    ///
    /// Resolves to `None` when the task was cancelled first.
    #[must_use = "futures do nothing unless polled or .awaited"]
    pub(crate) struct Cancellable<F> {
        #[pin]
        future: F,
        state: Arc<TaskState>,
    }
}

impl<F> Cancellable<F> {
    pub(crate) fn new(future: F, state: Arc<TaskState>) -> Self {
        Self { future, state }
    }
}

impl<F: Future> Future for Cancellable<F> {
    type Output = Option<F::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        // Register before checking, so a concurrent cancel always finds a waker.
        this.state.register_waker(cx.waker());
        if this.state.is_cancelled() {
            return Poll::Ready(None);
        }
        this.future.poll(cx).map(Some)
    }
}
