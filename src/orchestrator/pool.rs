//! Bounded Worker Pool
//!
//! N workers pull unit indices from a shared cursor and hand results back
//! tagged with the index, so output order never depends on completion order.

use futures_util::future::join_all;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    concurrency: usize,
}

impl WorkerPool {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `work` once per item with at most `concurrency` units in flight.
    /// Slot `i` holds the result for `items[i]`, or `None` when cancellation
    /// stopped the pool before that unit was taken.
    pub async fn run<'a, T, R, F, Fut>(
        &self,
        items: &'a [T],
        cancel: &CancellationToken,
        work: F,
    ) -> Vec<Option<R>>
    where
        T: Sync,
        F: Fn(usize, &'a T) -> Fut,
        Fut: Future<Output = R>,
    {
        let cursor = AtomicUsize::new(0);
        let worker_count = self.concurrency.min(items.len());

        let workers = (0..worker_count).map(|worker| {
            let cursor = &cursor;
            let work = &work;
            async move {
                let mut finished = Vec::new();
                loop {
                    if cancel.is_cancelled() {
                        debug!("worker {} stopping on cancellation", worker);
                        break;
                    }
                    let index = cursor.fetch_add(1, Ordering::SeqCst);
                    let Some(item) = items.get(index) else {
                        break;
                    };
                    finished.push((index, work(index, item).await));
                }
                finished
            }
        });

        let mut slots: Vec<Option<R>> = items.iter().map(|_| None).collect();
        for (index, result) in join_all(workers).await.into_iter().flatten() {
            slots[index] = Some(result);
        }
        slots
    }
}
