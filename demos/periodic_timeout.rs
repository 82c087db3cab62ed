use std::time::Duration;

use thread_builder::{Execution, ThreadBuilder};

fn main() {
    tracing_subscriber::fmt().init();

    // Prints a message every 150 ms until the timeout cancels it after 7 seconds.
    let result = ThreadBuilder::new()
        .set_interval(Duration::from_millis(150))
        .set_timeout(Duration::from_secs(7))
        .set_silent(true)
        .set_execution(Execution::effect(|| println!("Tick!")))
        .start()
        .unwrap();

    let heartbeat = &result.tasks()[0];
    let _ = heartbeat.get();
    println!("Heartbeat cancelled: {}", heartbeat.is_cancelled());
}
