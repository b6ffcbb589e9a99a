//! Bounded concurrency pool

use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Why an outcome slot holds no value
#[derive(Error, Debug)]
pub enum PoolError<E> {
    /// The task returned an error
    #[error("task failed: {0}")]
    Task(E),

    /// The task panicked or was aborted
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The pool stopped handing out slots before the task was dispatched
    #[error("pool closed before dispatch")]
    Closed,
}

/// Run `task` over `items` with at most `limit` tasks in flight
///
/// `outcomes[i]` always belongs to `items[i]`, whatever the completion order.
/// A failing or panicking task only poisons its own slot. A `limit` of 0
/// means unbounded. Returns once every task has settled.
pub async fn run_bounded<T, R, E, F, Fut>(
    items: Vec<T>,
    limit: usize,
    task: F,
) -> Vec<Result<R, PoolError<E>>>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    F: Fn(usize, T) -> Fut,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let limit = if limit == 0 { items.len().max(1) } else { limit };
    let semaphore = Arc::new(Semaphore::new(limit));
    let mut handles: Vec<Option<JoinHandle<Result<R, E>>>> = Vec::with_capacity(items.len());

    for (index, item) in items.into_iter().enumerate() {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            handles.push(None);
            continue;
        };
        let fut = task(index, item);
        handles.push(Some(tokio::spawn(async move {
            let result = fut.await;
            drop(permit);
            result
        })));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        let outcome = match handle {
            None => Err(PoolError::Closed),
            Some(handle) => match handle.await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(PoolError::Task(e)),
                Err(join_error) => Err(PoolError::Panicked(join_error.to_string())),
            },
        };
        outcomes.push(outcome);
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Tracks the high-water mark of concurrently running tasks
    #[derive(Default)]
    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Gauge {
        fn enter(&self) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn exit(&self) {
            self.current.fetch_sub(1, Ordering::SeqCst);
        }
    }

    async fn run_with_gauge(count: usize, limit: usize) -> usize {
        let gauge = Arc::new(Gauge::default());
        let items: Vec<u64> = (0..count as u64).collect();
        let outcomes = run_bounded(items, limit, |_, ms| {
            let gauge = Arc::clone(&gauge);
            async move {
                gauge.enter();
                tokio::time::sleep(Duration::from_millis(5 + (ms % 3) * 5)).await;
                gauge.exit();
                Ok::<_, ()>(ms)
            }
        })
        .await;
        assert_eq!(outcomes.len(), count);
        gauge.peak.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_limit_is_never_exceeded() {
        for limit in [1, 2, 3, 7] {
            let peak = run_with_gauge(12, limit).await;
            assert!(peak <= limit, "peak {} exceeded limit {}", peak, limit);
            assert!(peak >= 1);
        }
    }

    #[tokio::test]
    async fn test_zero_limit_is_unbounded() {
        let peak = run_with_gauge(10, 0).await;
        assert_eq!(peak, 10);
    }

    #[tokio::test]
    async fn test_results_keep_submission_order() {
        // Later items finish first.
        let items: Vec<u64> = vec![40, 30, 20, 10, 0];
        let outcomes = run_bounded(items, 5, |index, delay| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok::<_, String>((index, delay))
        })
        .await;

        let values: Vec<(usize, u64)> = outcomes.into_iter().map(|o| o.unwrap()).collect();
        assert_eq!(values, vec![(0, 40), (1, 30), (2, 20), (3, 10), (4, 0)]);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let completed = Arc::new(AtomicUsize::new(0));
        let items: Vec<usize> = (0..6).collect();
        let outcomes = run_bounded(items, 2, |_, n| {
            let completed = Arc::clone(&completed);
            async move {
                if n == 1 {
                    return Err(format!("item {} failed", n));
                }
                if n == 4 {
                    panic!("item {} blew up", n);
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
                completed.fetch_add(1, Ordering::SeqCst);
                Ok(n * 10)
            }
        })
        .await;

        assert_eq!(completed.load(Ordering::SeqCst), 4);
        assert!(matches!(outcomes[1], Err(PoolError::Task(ref m)) if m == "item 1 failed"));
        assert!(matches!(outcomes[4], Err(PoolError::Panicked(_))));
        assert_eq!(outcomes[5].as_ref().ok(), Some(&50));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let outcomes = run_bounded(Vec::<u8>::new(), 0, |_, n| async move { Ok::<_, ()>(n) }).await;
        assert!(outcomes.is_empty());
    }
}
