use std::time::Duration;

use thread_builder::{Execution, Priority, ThreadBuilder, thread_util};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    let result = ThreadBuilder::new()
        .set_delay(Duration::from_millis(500))
        .set_thread_name(|| "producer-".to_string())
        .set_thread_priority(|| Priority::MAX)
        .set_execution(Execution::producer(|| {
            let worker = std::thread::current().name().map(str::to_string);
            format!("computed on {worker:?} at priority {:?}", thread_util::current_priority())
        }))
        .set_on_result(|value: &String| println!("Callback got: {value}"))
        .start()
        .unwrap();

    // Handles can be awaited from any runtime.
    let value = result.tasks()[0].completion().await.unwrap();
    println!("Awaited: {value}");

    // Give the router a moment to store the value.
    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("Stored on the result: {:?}", result.value());
    result.pool().shutdown();
}
