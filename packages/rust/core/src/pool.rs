//! Bounded-concurrency worker pool.
//!
//! `N` workers pull items from one shared cursor. Each item runs in its own
//! spawned task so a panic becomes that item's outcome instead of taking the
//! worker down. Outcomes flow over a channel to a single collector and come
//! back in input order.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

/// What happened to one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome<R> {
    /// The work function returned.
    Done(R),
    /// The work function panicked (or its task was cancelled).
    Panicked(String),
}

impl<R> ItemOutcome<R> {
    pub fn into_result(self) -> std::result::Result<R, String> {
        match self {
            Self::Done(r) => Ok(r),
            Self::Panicked(msg) => Err(msg),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    concurrency: usize,
}

impl WorkerPool {
    /// A pool of `concurrency` workers; 0 is treated as 1.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Workers actually started for `items` items.
    pub fn workers_for(&self, items: usize) -> usize {
        self.concurrency.min(items)
    }

    /// Run `work` on every item and return one outcome per item, in input order.
    pub async fn run<T, R, F, Fut>(&self, items: Vec<T>, work: F) -> Vec<ItemOutcome<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let total = items.len();
        if total == 0 {
            return Vec::new();
        }

        let workers = self.workers_for(total);
        let cursor = Arc::new(Mutex::new(items.into_iter().enumerate()));
        let work = Arc::new(work);
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, ItemOutcome<R>)>();

        debug!(items = total, workers, "worker pool starting");

        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let cursor = Arc::clone(&cursor);
            let work = Arc::clone(&work);
            let tx = tx.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    // Lock released before the item runs.
                    let next = cursor.lock().await.next();
                    let Some((index, item)) = next else { break };

                    let work = Arc::clone(&work);
                    let outcome = match tokio::spawn(async move { work(item).await }).await {
                        Ok(result) => ItemOutcome::Done(result),
                        Err(e) => {
                            let message = if e.is_panic() {
                                panic_message(e.into_panic())
                            } else {
                                "task cancelled".to_string()
                            };
                            warn!(worker, index, %message, "work item panicked");
                            ItemOutcome::Panicked(message)
                        }
                    };

                    if tx.send((index, outcome)).is_err() {
                        break;
                    }
                }
            }));
        }
        drop(tx);

        let mut slots: Vec<Option<ItemOutcome<R>>> = (0..total).map(|_| None).collect();
        while let Some((index, outcome)) = rx.recv().await {
            slots[index] = Some(outcome);
        }
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "pool worker exited abnormally");
            }
        }

        slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| ItemOutcome::Panicked("item was never attempted".into())))
            .collect()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn preserves_input_order_under_reordered_completion() {
        let pool = WorkerPool::new(4);
        let items: Vec<u64> = (0..20).collect();
        let out = pool
            .run(items, |n| async move {
                // Later items finish first.
                tokio::time::sleep(Duration::from_millis(40 - 2 * n)).await;
                n * 10
            })
            .await;
        let values: Vec<u64> = out.into_iter().map(|o| o.into_result().unwrap()).collect();
        assert_eq!(values, (0..20).map(|n| n * 10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let pool = WorkerPool::new(3);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));
        pool.run((0..12).collect::<Vec<_>>(), move |_: i32| {
            let (active, peak) = (Arc::clone(&a), Arc::clone(&p));
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn panics_become_item_outcomes() {
        let pool = WorkerPool::new(2);
        let out = pool
            .run(vec![1, 2, 3], |n: i32| async move {
                if n == 2 {
                    panic!("boom on {n}");
                }
                n
            })
            .await;
        assert_eq!(out[0], ItemOutcome::Done(1));
        assert_eq!(out[1], ItemOutcome::Panicked("boom on 2".into()));
        assert_eq!(out[2], ItemOutcome::Done(3));
    }

    #[tokio::test]
    async fn zero_concurrency_and_empty_input() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.workers_for(10), 1);
        assert_eq!(WorkerPool::new(8).workers_for(3), 3);
        let out: Vec<ItemOutcome<i32>> = pool.run(Vec::<i32>::new(), |n| async move { n }).await;
        assert!(out.is_empty());
        let out = pool.run(vec![7], |n: i32| async move { n + 1 }).await;
        assert_eq!(out, vec![ItemOutcome::Done(8)]);
    }
}
