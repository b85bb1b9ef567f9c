//! Integration tests for the bounded change queue

use crawlfeed::queue::{ChangeQueue, QueueError};
use crawlfeed::{Change, Checkpoint, DocumentHandle};
use std::sync::Arc;
use std::time::Duration;

fn change(offset: u64) -> Change {
    Change::created_or_updated(
        DocumentHandle::client(format!("doc-{offset}")),
        Checkpoint::new("wiki", 1, offset),
    )
}

#[tokio::test]
async fn test_fifo_across_producer_consumer_tasks() {
    let queue = Arc::new(ChangeQueue::new(4));
    let total: u64 = 200;

    let producer = {
        let queue = queue.clone();
        tokio::spawn(async move {
            for offset in 0..total {
                queue
                    .produce(change(offset), Duration::from_secs(5))
                    .await
                    .expect("producer should never time out against a draining consumer");
            }
        })
    };

    let consumer = {
        let queue = queue.clone();
        tokio::spawn(async move {
            let mut seen = Vec::new();
            while (seen.len() as u64) < total {
                match queue.try_consume() {
                    Some(change) => seen.push(change.checkpoint.within_snapshot_offset),
                    None => tokio::time::sleep(Duration::from_millis(1)).await,
                }
            }
            seen
        })
    };

    producer.await.unwrap();
    let seen = consumer.await.unwrap();

    // FIFO regardless of interleaving: the k-th produced is the k-th consumed
    let expected: Vec<u64> = (0..total).collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn test_capacity_never_exceeded() {
    let queue = Arc::new(ChangeQueue::new(3));

    for offset in 0..3 {
        queue
            .produce(change(offset), Duration::from_millis(10))
            .await
            .unwrap();
    }
    assert_eq!(queue.len(), 3);

    // Producing beyond capacity is rejected after the timeout
    let err = queue
        .produce(change(3), Duration::from_millis(30))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Timeout(_)));
    assert_eq!(queue.len(), 3);
}

#[tokio::test]
async fn test_blocked_producer_resumes_when_space_frees() {
    let queue = Arc::new(ChangeQueue::new(1));
    queue
        .produce(change(0), Duration::from_millis(10))
        .await
        .unwrap();

    let producer = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.produce(change(1), Duration::from_secs(2)).await })
    };

    // Let the producer block on the full queue, then free a slot
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(queue.try_consume().unwrap().checkpoint.within_snapshot_offset, 0);

    producer.await.unwrap().unwrap();
    assert_eq!(queue.try_consume().unwrap().checkpoint.within_snapshot_offset, 1);
}

#[tokio::test]
async fn test_consume_on_empty_queue_polls_without_blocking() {
    let queue = ChangeQueue::new(2);
    let started = std::time::Instant::now();
    assert!(queue.try_consume().is_none());
    // try_consume must return immediately so a scheduler can poll
    assert!(started.elapsed() < Duration::from_millis(50));
}
