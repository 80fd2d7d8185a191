//! Fixed worker pool over block indices.
//!
//! A single dispatcher pushes block heights into a bounded queue that every
//! worker drains. Each worker folds blocks into its own state; the caller
//! reduces the returned states on one thread. Nothing is shared for writing
//! between workers.

use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use tracing::debug;

/// Capacity of the block queue.
pub const QUEUE_DEPTH: usize = 100;

/// Host headroom left free by the worker pool.
const RESERVED_CPUS: usize = 2;

/// Available parallelism minus headroom, at least 1.
pub fn worker_count() -> usize {
    num_cpus::get().saturating_sub(RESERVED_CPUS).max(1)
}

/// Run `process` for every block in `0..blocks` across `workers` threads.
///
/// Each worker starts from `init()` and its final state is returned. The
/// first error stops dispatch, and no states are returned in that case.
pub fn for_each_block<S, E, I, F>(
    blocks: usize,
    workers: usize,
    init: I,
    process: F,
) -> Result<Vec<S>, E>
where
    S: Send,
    E: Send,
    I: Fn() -> S + Sync,
    F: Fn(&mut S, usize) -> Result<(), E> + Sync,
{
    let workers = workers.max(1);
    let (sender, receiver) = crossbeam_channel::bounded::<usize>(QUEUE_DEPTH);
    let failed = AtomicBool::new(false);

    debug!(blocks, workers, "Dispatching blocks");

    thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let receiver = receiver.clone();
                let (init, process, failed) = (&init, &process, &failed);
                scope.spawn(move || -> Result<S, E> {
                    let mut state = init();
                    for block in receiver.iter() {
                        if failed.load(Ordering::Relaxed) {
                            break;
                        }
                        if let Err(e) = process(&mut state, block) {
                            failed.store(true, Ordering::Relaxed);
                            return Err(e);
                        }
                    }
                    Ok(state)
                })
            })
            .collect();
        drop(receiver);

        for block in 0..blocks {
            // Sending fails once every worker has exited
            if failed.load(Ordering::Relaxed) || sender.send(block).is_err() {
                break;
            }
        }
        drop(sender);

        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(result) => result,
                Err(payload) => panic::resume_unwind(payload),
            })
            .collect()
    })
}
