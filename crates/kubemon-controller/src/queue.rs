//! Ordered work queue with delayed, bounded retries.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

/// Retry behavior for failed work items.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any retry delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Retries allowed before an item is abandoned.
    pub max_requeues: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_secs(1000),
            backoff_multiplier: 2.0,
            max_requeues: 5,
        }
    }
}

impl RetryPolicy {
    /// Calculate delay for the given retry number, starting at 1.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self
            .backoff_multiplier
            .powi(attempt.saturating_sub(1) as i32);
        let delay_millis = (self.initial_delay.as_millis() as f64 * multiplier) as u64;
        Duration::from_millis(delay_millis).min(self.max_delay)
    }

    /// Check if an item that has been requeued `requeues` times may be retried.
    #[must_use]
    pub const fn should_retry(&self, requeues: u32) -> bool {
        requeues < self.max_requeues
    }
}

/// A queued item and how many times it has been requeued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem<T> {
    /// The work item.
    pub item: T,
    /// Number of times this item was requeued after failing.
    pub requeues: u32,
}

/// Sending side of a [`RetryQueue`]. Cheap to clone.
#[derive(Debug)]
pub struct QueueHandle<T> {
    tx: mpsc::UnboundedSender<QueueItem<T>>,
}

impl<T> Clone for QueueHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> QueueHandle<T> {
    /// Enqueues a new item. Returns false if the queue has shut down.
    pub fn push(&self, item: T) -> bool {
        self.tx.send(QueueItem { item, requeues: 0 }).is_ok()
    }
}

/// FIFO queue drained by a single worker.
///
/// Failed items are re-inserted after a backoff delay, so a retry may land
/// behind items enqueued later.
#[derive(Debug)]
pub struct RetryQueue<T> {
    rx: mpsc::UnboundedReceiver<QueueItem<T>>,
    handle: QueueHandle<T>,
    policy: RetryPolicy,
}

impl<T: Send + 'static> RetryQueue<T> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            rx,
            handle: QueueHandle { tx },
            policy,
        }
    }

    /// Returns a handle for producers.
    #[must_use]
    pub fn handle(&self) -> QueueHandle<T> {
        self.handle.clone()
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Waits for the next item.
    pub async fn next(&mut self) -> Option<QueueItem<T>> {
        self.rx.recv().await
    }

    /// Schedules a failed item for another attempt.
    ///
    /// Returns the item back when its retries are exhausted.
    pub fn requeue(&self, mut item: QueueItem<T>) -> Result<Duration, QueueItem<T>> {
        if !self.policy.should_retry(item.requeues) {
            return Err(item);
        }
        item.requeues += 1;
        let delay = self.policy.delay_for_attempt(item.requeues);
        let tx = self.handle.tx.clone();
        debug!(requeues = item.requeues, delay_ms = delay.as_millis() as u64, "requeueing item");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // the worker may have stopped; nothing to do then
            let _ = tx.send(item);
        });
        Ok(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_allows_five_requeues() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(4));
        assert!(!policy.should_retry(5));
    }

    #[test]
    fn delay_grows_and_caps() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_requeues: 5,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(500));
    }

    mod backoff_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn delay_is_monotonic_and_capped(attempt in 1u32..64) {
                let policy = RetryPolicy::default();
                let delay = policy.delay_for_attempt(attempt);
                prop_assert!(delay <= policy.max_delay);
                prop_assert!(policy.delay_for_attempt(attempt + 1) >= delay);
            }
        }
    }

    #[tokio::test]
    async fn preserves_fifo_order() {
        let mut queue = RetryQueue::new(RetryPolicy::default());
        let handle = queue.handle();
        for i in 0..3 {
            assert!(handle.push(i));
        }
        for i in 0..3 {
            assert_eq!(queue.next().await.map(|q| q.item), Some(i));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn requeued_item_returns_after_delay() {
        let mut queue = RetryQueue::new(RetryPolicy::default());
        queue.handle().push("a");
        let item = queue.next().await.unwrap();

        let delay = queue.requeue(item).unwrap();
        assert_eq!(delay, Duration::from_millis(5));
        queue.handle().push("b");

        assert_eq!(queue.next().await.map(|q| q.item), Some("b"));
        let again = queue.next().await.unwrap();
        assert_eq!(again.item, "a");
        assert_eq!(again.requeues, 1);
    }

    #[tokio::test]
    async fn exhausted_item_is_returned() {
        let queue = RetryQueue::new(RetryPolicy::default());
        let item = QueueItem {
            item: "a",
            requeues: 5,
        };
        let returned = queue.requeue(item).unwrap_err();
        assert_eq!(returned.requeues, 5);
    }
}
