///
/// A small driver for reactor-sched: three levels of reactions spread
/// across ten logical tags, run to completion on a four-worker pool.
///

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reactor_sched::{EventQueue, ReactionTemplate, Scheduler, SchedulerConfig, Tag};

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let queue = EventQueue::new();
    let completed = Arc::new(AtomicU64::new(0));

    for tag in 0..10u64 {
        for level in 0..3usize {
            let completed = Arc::clone(&completed);
            queue.schedule(
                Tag::new(tag * 1_000_000, 0),
                ReactionTemplate::new(level, 0, move || {
                    completed.fetch_add(1, Ordering::SeqCst);
                    tracing::info!(tag, level, "reaction fired");
                }),
            );
        }
    }

    let config = SchedulerConfig::builder()
        .num_workers(4)
        .max_level(2)
        .stop_tag(Tag::new(9_000_000, 0))
        .build();
    let scheduler = Scheduler::new(config, Box::new(queue)).expect("scheduler init");

    let handles = scheduler.run();
    while completed.load(Ordering::SeqCst) < 30 {
        std::thread::sleep(Duration::from_millis(10));
    }
    scheduler.shutdown();
    scheduler.join_all(handles);

    println!("completed {} reactions", completed.load(Ordering::SeqCst));
}
