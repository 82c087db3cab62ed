use std::time::Duration;

use macro_rules_attribute::apply;
use smol::Timer;
use smol_macros::{Executor, main};
use thread_builder::ScheduledPool;

#[apply(main!)]
async fn main(ex: &Executor<'_>) {
    let pool = ScheduledPool::new(2).unwrap();

    let first = pool.schedule(
        || {
            println!("Work 1");
            Ok(1)
        },
        Duration::from_secs(1),
    );
    let second = pool.schedule(
        || {
            println!("Work 2");
            Ok(2)
        },
        Duration::from_secs(3),
    );

    let waiter = ex.spawn(async move {
        let sum = first.completion().await.unwrap() + second.completion().await.unwrap();
        println!("Sum: {sum}");
    });

    println!("After spawn");
    Timer::after(Duration::from_millis(100)).await;
    waiter.await;
    pool.shutdown();
}
