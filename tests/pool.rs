use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use thread_builder::{
    ConfigError, Interrupted, RunReport, ScheduledPool, TaskFault, WorkerFactory, thread_util,
};

#[tokio::test(flavor = "multi_thread")]
async fn submit_and_schedule() {
    let pool = ScheduledPool::new(2).unwrap();

    let now = pool.submit(|| Ok("now"));
    let started = Instant::now();
    let later = pool.schedule(|| Ok("later"), Duration::from_millis(200));

    assert_eq!(now.completion().await.unwrap(), "now");
    assert_eq!(later.completion().await.unwrap(), "later");
    assert!(
        started.elapsed() >= Duration::from_millis(200),
        "scheduled work must wait for its delay"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn delayed_tasks_do_not_occupy_the_worker() {
    let pool = ScheduledPool::new(1).unwrap();
    let _far = pool.schedule(|| Ok(()), Duration::from_secs(60));

    let near = pool.submit(|| Ok(1));
    let outcome = tokio::time::timeout(Duration::from_secs(1), near.completion()).await;
    assert!(
        matches!(outcome, Ok(Ok(1))),
        "a pending delayed task must not block the only worker"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn fixed_rate_firings_never_overlap() {
    let pool = ScheduledPool::new(4).unwrap();
    let active = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let (a, o) = (Arc::clone(&active), Arc::clone(&overlaps));

    let handle = pool.schedule_at_fixed_rate(
        move || {
            if a.fetch_add(1, Ordering::SeqCst) > 0 {
                o.fetch_add(1, Ordering::SeqCst);
            }
            std::thread::sleep(Duration::from_millis(30));
            a.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        },
        Duration::ZERO,
        Duration::from_millis(10),
    );

    tokio::time::sleep(Duration::from_millis(300)).await;
    handle.cancel(false);
    assert_eq!(overlaps.load(Ordering::SeqCst), 0, "late firings must wait for the previous one");
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_stops_periodic_and_pending_work() {
    let pool = ScheduledPool::new(1).unwrap();
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);

    let periodic = pool.schedule_at_fixed_rate(
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
        Duration::ZERO,
        Duration::from_millis(20),
    );
    let pending = pool.schedule(|| Ok(()), Duration::from_secs(10));

    tokio::time::sleep(Duration::from_millis(100)).await;
    pool.shutdown();
    assert!(pool.is_shutdown());

    assert!(matches!(periodic.completion().await, Err(TaskFault::Cancelled)));
    assert!(matches!(pending.completion().await, Err(TaskFault::Cancelled)));

    let after = fired.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fired.load(Ordering::SeqCst), after, "no firing after shutdown");

    let rejected = pool.submit(|| Ok(()));
    assert!(rejected.is_cancelled(), "shut down pools reject new work");
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_lets_running_work_finish() {
    let pool = ScheduledPool::new(1).unwrap();
    let running = pool.submit(|| {
        std::thread::sleep(Duration::from_millis(200));
        Ok(7)
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(running.is_running());
    pool.shutdown();
    assert_eq!(running.completion().await.unwrap(), 7);
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_now_interrupts_running_work() {
    let pool = ScheduledPool::new(1).unwrap();
    let observed = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&observed);

    let running = pool.submit(move || {
        let r = thread_util::sleep(Duration::from_secs(5));
        *slot.lock().unwrap() = Some(r);
        r.map_err(TaskFault::from)
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    let started = Instant::now();
    pool.shutdown_now();

    assert!(matches!(running.completion().await, Err(TaskFault::Cancelled)));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*observed.lock().unwrap(), Some(Err(Interrupted)));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test(flavor = "multi_thread")]
async fn after_execute_hooks_and_failure_handler() {
    let caught = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&caught);
    let factory = WorkerFactory::new()
        .name("hooked-")
        .failure_handler(Arc::new(move |fault: &TaskFault| sink.lock().unwrap().push(fault.to_string())));
    let pool = ScheduledPool::with_factory(1, factory).unwrap();
    assert_eq!(pool.name(), "hooked-");

    let reports = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&reports);
    pool.add_after_execute(Arc::new(|report: &RunReport| {
        if report.finished {
            panic!("hook failed");
        }
    }));
    pool.add_after_execute(Arc::new(move |_: &RunReport| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    pool.submit(|| Ok(())).completion().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(reports.load(Ordering::SeqCst), 1, "later hooks still run");
    assert_eq!(caught.lock().unwrap().len(), 1);
}

#[test]
fn zero_workers_are_rejected() {
    assert!(matches!(
        ScheduledPool::new(0),
        Err(ConfigError::InvalidPoolSize)
    ));
}

#[test]
fn handles_work_on_smol() {
    let pool = ScheduledPool::new(1).unwrap();
    let handle = pool.schedule(|| Ok(vec![1, 2, 3]), Duration::from_millis(20));

    let values = smol::block_on(async {
        smol::Timer::after(Duration::from_millis(5)).await;
        handle.completion().await
    });
    assert_eq!(values.unwrap(), vec![1, 2, 3]);
}
