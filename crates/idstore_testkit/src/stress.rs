//! Contention helpers.
//!
//! These helpers drive many threads against one store so optimistic
//! conflicts actually happen.

use crate::entities::Counter;
use idstore_core::{BasicCrudDao, Key, Store, StoreResult, TransactionalRunner};
use std::sync::Barrier;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a contention run.
#[derive(Debug, Clone)]
pub struct ContentionResult {
    /// Units of work that committed.
    pub committed: usize,
    /// Units of work that failed after retrying.
    pub failed: usize,
    /// Total duration.
    pub duration: Duration,
}

/// Creates a counter at zero and returns its key.
pub fn create_counter(store: &Store) -> StoreResult<Key> {
    let counters = store.dao::<Counter>();
    store
        .runner()
        .run_in_transaction_ret(|tx| counters.create(tx, &Counter { value: 0 }))
}

/// Reads the counter.
pub fn read_counter(store: &Store, key: Key) -> StoreResult<u64> {
    let counters = store.dao::<Counter>();
    store
        .runner()
        .run_in_transaction_ret(|tx| Ok(counters.get_by_key(tx, key)?.value))
}

/// Increments the counter from `threads` threads, `per_thread` times each,
/// with a read-modify-write unit of work per increment.
///
/// All threads start together.
pub fn concurrent_increments(
    store: &Store,
    key: Key,
    threads: usize,
    per_thread: usize,
) -> ContentionResult {
    let counters = store.dao::<Counter>();
    let barrier = Barrier::new(threads);
    let start = Instant::now();

    let outcomes: Vec<(usize, usize)> = thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let counters = &counters;
                let barrier = &barrier;
                scope.spawn(move || {
                    let runner = store.runner();
                    barrier.wait();
                    let mut ok = 0;
                    let mut failed = 0;
                    for _ in 0..per_thread {
                        let result = runner.run_in_transaction(|tx| {
                            let current = counters.get_by_key(tx, key)?;
                            counters.update_by_key(
                                tx,
                                key,
                                &Counter {
                                    value: current.value + 1,
                                },
                            )
                        });
                        match result {
                            Ok(()) => ok += 1,
                            Err(_) => failed += 1,
                        }
                    }
                    (ok, failed)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("worker thread panicked"))
            .collect()
    });

    ContentionResult {
        committed: outcomes.iter().map(|(ok, _)| ok).sum(),
        failed: outcomes.iter().map(|(_, failed)| failed).sum(),
        duration: start.elapsed(),
    }
}
