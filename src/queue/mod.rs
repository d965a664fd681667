use crate::event::Event;
use crate::metrics::{DropReason, ShipperMetrics};
use clap::ValueEnum;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Notify;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Invalid queue capacity")]
    InvalidCapacity,
}

/// Rule applied when the queue is at capacity and a new event arrives.
/// Overflow is never silent: both variants count the loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Refuse the incoming event; the submitter observes `Dropped`.
    Reject,
    /// Discard the oldest queued event and accept the incoming one.
    #[default]
    EvictOldest,
}

/// What happened to a submitted event. Submission never fails with an error;
/// the producer's logging call site must not be able to observe a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    Dropped,
}

impl SubmitOutcome {
    pub fn is_accepted(self) -> bool {
        matches!(self, SubmitOutcome::Accepted)
    }
}

/// Bounded FIFO buffer between event producers and the sender loop.
///
/// `submit` is safe under concurrent invocation and never blocks beyond the
/// internal lock; the consumer side waits on a [`Notify`] when empty. Size
/// never exceeds capacity.
#[derive(Debug)]
pub struct EventQueue {
    inner: Mutex<VecDeque<Event>>,
    capacity: usize,
    policy: OverflowPolicy,
    notify: Notify,
    metrics: Arc<ShipperMetrics>,
}

impl EventQueue {
    pub fn new(
        capacity: usize,
        policy: OverflowPolicy,
        metrics: Arc<ShipperMetrics>,
    ) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::InvalidCapacity);
        }

        Ok(Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            policy,
            notify: Notify::new(),
            metrics,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueues an event, applying the overflow policy at capacity.
    pub fn submit(&self, event: Event) -> SubmitOutcome {
        self.metrics.record_submitted();

        let depth = {
            let mut queue = self.inner.lock();

            if queue.len() >= self.capacity {
                match self.policy {
                    OverflowPolicy::Reject => {
                        self.metrics.record_dropped(DropReason::QueueFull);
                        self.metrics.set_queue_depth(queue.len());
                        return SubmitOutcome::Dropped;
                    }
                    OverflowPolicy::EvictOldest => {
                        queue.pop_front();
                        self.metrics.record_dropped(DropReason::Evicted);
                    }
                }
            }

            queue.push_back(event);
            queue.len()
        };

        self.metrics.set_queue_depth(depth);
        self.notify.notify_one();
        SubmitOutcome::Accepted
    }

    /// Removes the oldest queued event, if any.
    pub fn try_pop(&self) -> Option<Event> {
        let (event, depth) = {
            let mut queue = self.inner.lock();
            let event = queue.pop_front();
            (event, queue.len())
        };

        if event.is_some() {
            self.metrics.set_queue_depth(depth);
        }
        event
    }

    /// Waits until an event is available and removes it.
    pub async fn pop(&self) -> Event {
        loop {
            // Register interest before the empty check so a submit between
            // try_pop and notified() is not missed.
            let notified = self.notify.notified();
            if let Some(event) = self.try_pop() {
                return event;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(n: u64) -> Event {
        Event::new().with_field("seq", json!(n))
    }

    fn queue(capacity: usize, policy: OverflowPolicy) -> (EventQueue, Arc<ShipperMetrics>) {
        let metrics = Arc::new(ShipperMetrics::new());
        let queue = EventQueue::new(capacity, policy, metrics.clone()).unwrap();
        (queue, metrics)
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let metrics = Arc::new(ShipperMetrics::new());
        assert!(EventQueue::new(0, OverflowPolicy::Reject, metrics).is_err());
    }

    #[test]
    fn fifo_order_is_preserved() {
        let (queue, _) = queue(10, OverflowPolicy::Reject);
        for n in 0..5 {
            assert!(queue.submit(event(n)).is_accepted());
        }
        for n in 0..5 {
            let popped = queue.try_pop().unwrap();
            assert_eq!(popped.get("seq"), Some(&json!(n)));
        }
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn reject_policy_refuses_when_full() {
        let (queue, metrics) = queue(2, OverflowPolicy::Reject);
        assert!(queue.submit(event(0)).is_accepted());
        assert!(queue.submit(event(1)).is_accepted());
        assert_eq!(queue.submit(event(2)), SubmitOutcome::Dropped);

        assert_eq!(queue.len(), 2);
        let snap = metrics.snapshot();
        assert_eq!(snap.events_submitted, 3);
        assert_eq!(snap.dropped_queue_full, 1);
        // Oldest is still the head.
        assert_eq!(queue.try_pop().unwrap().get("seq"), Some(&json!(0)));
    }

    #[test]
    fn evict_policy_discards_exactly_one_oldest() {
        let (queue, metrics) = queue(2, OverflowPolicy::EvictOldest);
        queue.submit(event(0));
        queue.submit(event(1));
        assert!(queue.submit(event(2)).is_accepted());

        assert_eq!(queue.len(), 2);
        assert_eq!(metrics.snapshot().dropped_evicted, 1);
        assert_eq!(queue.try_pop().unwrap().get("seq"), Some(&json!(1)));
        assert_eq!(queue.try_pop().unwrap().get("seq"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn pop_wakes_on_submit() {
        let (queue, _) = queue(4, OverflowPolicy::Reject);
        let queue = Arc::new(queue);

        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::task::yield_now().await;
        queue.submit(event(7));

        let popped = tokio::time::timeout(std::time::Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(popped.get("seq"), Some(&json!(7)));
    }

    #[tokio::test]
    async fn concurrent_submitters_never_exceed_capacity() {
        let (queue, metrics) = queue(16, OverflowPolicy::Reject);
        let queue = Arc::new(queue);

        let mut handles = vec![];
        for producer in 0..8 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                for n in 0..100u64 {
                    queue.submit(event(producer * 1000 + n));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(queue.len() <= 16);
        let snap = metrics.snapshot();
        assert_eq!(snap.events_submitted, 800);
        assert_eq!(snap.dropped_queue_full + queue.len() as u64, 800);
    }
}
