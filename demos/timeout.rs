use std::time::Duration;

use thread_builder::{Execution, TaskFault, ThreadBuilder, thread_util};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .init();

    let mut builder = ThreadBuilder::with_pool_size(2);
    builder
        .set_timeout(Duration::from_secs(5))
        .set_may_interrupt(true)
        .set_on_uncaught_failure(|fault: &TaskFault| println!("Failure: {fault}"));

    // Has enough time to complete.
    builder.set_execution(Execution::try_effect(|| {
        println!("Start work 1");
        thread_util::sleep(Duration::from_secs(3))?;
        println!("End work 1");
        Ok::<_, thread_builder::Interrupted>(())
    }));
    builder.start_and_build_other().unwrap();

    // Does not have enough time, will be interrupted.
    builder.set_execution(Execution::try_effect(|| {
        println!("Start work 2");
        thread_util::sleep(Duration::from_secs(7))?;
        println!("End work 2");
        Ok::<_, thread_builder::Interrupted>(())
    }));
    let result = builder.start().unwrap();

    for task in result.tasks() {
        println!("{}: {:?}", task.id(), task.get());
    }
}
