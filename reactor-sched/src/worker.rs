///
/// The worker loop.
///
/// Each worker thread repeats get/execute/done until it observes
/// `stop`. Workers hold no scheduler lock while a reaction body runs; a
/// panicking body is caught and logged rather than taking the pool
/// down, since one misbehaving reaction should not stop every other
/// reaction at unrelated levels from making progress.
///

use crate::scheduler::{Scheduler, WorkerId};

pub fn worker_loop(scheduler: &Scheduler, worker: WorkerId) {
    loop {
        let reaction = match scheduler.get_ready_reaction(worker) {
            Some(r) => r,
            None => return,
        };

        let span = tracing::debug_span!(
            "reaction",
            id = reaction.id,
            level = reaction.level(),
            deadline = reaction.deadline(),
        );
        let _enter = span.enter();

        if reaction.execute().is_err() {
            tracing::error!(reaction_id = reaction.id, "reaction body panicked");
        }

        scheduler.done_with_reaction(worker, reaction);
    }
}
