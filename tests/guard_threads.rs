//! Kept in its own test binary so no other test changes the thread count.

#![cfg(target_os = "linux")]

use std::time::Duration;

use thread_builder::{Execution, ExecutorResult, ThreadBuilder};

fn thread_count() -> usize {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| {
            status
                .lines()
                .find_map(|line| line.strip_prefix("Threads:").and_then(|n| n.trim().parse().ok()))
        })
        .unwrap_or(0)
}

fn wait_for_guards(result: &ExecutorResult<()>) {
    for guard in result.guards() {
        guard.tasks()[0].get().unwrap();
    }
    std::thread::sleep(Duration::from_millis(300));
}

#[test]
fn fired_guards_release_their_threads() {
    let mut builder = ThreadBuilder::new();
    builder
        .set_timeout(Duration::from_millis(20))
        .set_silent(true)
        .set_execution(Execution::effect(|| ()));

    let result = builder.start().unwrap();
    wait_for_guards(&result);
    let before = thread_count();

    for _ in 0..40 {
        builder.start().unwrap();
    }
    wait_for_guards(&result);
    let after = thread_count();

    assert_eq!(result.guards().len(), 41);
    assert!(before > 0, "thread count unavailable");
    assert!(after <= before + 2, "threads before={before} after={after}");
    assert!(result.guards().iter().all(|g| !g.pool().has_workers()));
}
