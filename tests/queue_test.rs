use logship::Event;
use logship::metrics::ShipperMetrics;
use logship::queue::{EventQueue, OverflowPolicy, SubmitOutcome};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

fn event(seq: u64) -> Event {
    Event::new().with_field("seq", json!(seq))
}

fn queue_with(capacity: usize, policy: OverflowPolicy) -> (Arc<EventQueue>, Arc<ShipperMetrics>) {
    let metrics = Arc::new(ShipperMetrics::new());
    let queue = Arc::new(EventQueue::new(capacity, policy, metrics.clone()).unwrap());
    (queue, metrics)
}

#[tokio::test]
async fn spare_capacity_events_dequeue_in_fifo_order() {
    let (queue, _) = queue_with(100, OverflowPolicy::Reject);

    let producer = {
        let queue = queue.clone();
        tokio::spawn(async move {
            for seq in 0..50 {
                assert!(queue.submit(event(seq)).is_accepted());
                if seq % 10 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        })
    };

    let mut received = Vec::new();
    for _ in 0..50 {
        let event = timeout(Duration::from_secs(2), queue.pop()).await.unwrap();
        received.push(event.get("seq").unwrap().as_u64().unwrap());
    }
    producer.await.unwrap();

    let expected: Vec<u64> = (0..50).collect();
    assert_eq!(received, expected);
}

#[tokio::test]
async fn reject_policy_bounds_the_queue() {
    let (queue, metrics) = queue_with(3, OverflowPolicy::Reject);

    let mut accepted = 0;
    let mut dropped = 0;
    for seq in 0..10 {
        match queue.submit(event(seq)) {
            SubmitOutcome::Accepted => accepted += 1,
            SubmitOutcome::Dropped => dropped += 1,
        }
        assert!(queue.len() <= 3);
    }

    assert_eq!(accepted, 3);
    assert_eq!(dropped, 7);
    let snap = metrics.snapshot();
    assert_eq!(snap.events_submitted, 10);
    assert_eq!(snap.dropped_queue_full, 7);
    assert_eq!(snap.queue_depth, 3);
}

#[tokio::test]
async fn evict_policy_keeps_newest_and_counts_each_eviction() {
    let (queue, metrics) = queue_with(3, OverflowPolicy::EvictOldest);

    for seq in 0..10 {
        assert!(queue.submit(event(seq)).is_accepted());
        assert!(queue.len() <= 3);
    }

    assert_eq!(metrics.snapshot().dropped_evicted, 7);

    // Survivors are the newest three, still in FIFO order.
    let survivors: Vec<u64> = std::iter::from_fn(|| queue.try_pop())
        .map(|e| e.get("seq").unwrap().as_u64().unwrap())
        .collect();
    assert_eq!(survivors, vec![7, 8, 9]);
}

#[tokio::test]
async fn interleaved_producers_and_consumer_lose_nothing_within_capacity() {
    let (queue, metrics) = queue_with(1000, OverflowPolicy::Reject);

    let mut producers = Vec::new();
    for p in 0..4 {
        let queue = queue.clone();
        producers.push(tokio::spawn(async move {
            for n in 0..100u64 {
                assert!(queue.submit(event(p * 1000 + n)).is_accepted());
            }
        }));
    }

    let consumer = {
        let queue = queue.clone();
        tokio::spawn(async move {
            let mut per_producer: std::collections::HashMap<u64, Vec<u64>> =
                std::collections::HashMap::new();
            for _ in 0..400 {
                let event = timeout(Duration::from_secs(5), queue.pop()).await.unwrap();
                let seq = event.get("seq").unwrap().as_u64().unwrap();
                per_producer.entry(seq / 1000).or_default().push(seq % 1000);
            }
            per_producer
        })
    };

    for producer in producers {
        producer.await.unwrap();
    }
    let per_producer = consumer.await.unwrap();

    // Queue order is FIFO: each producer's own events stay in submission order.
    for (_, seqs) in per_producer {
        let mut sorted = seqs.clone();
        sorted.sort_unstable();
        assert_eq!(seqs, sorted);
    }
    assert_eq!(metrics.snapshot().dropped_total(), 0);
}
