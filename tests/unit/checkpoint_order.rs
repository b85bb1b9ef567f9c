//! Checkpoint ordering and monotonicity enforcement

use crawlfeed::queue::{ChangeSink, CheckpointAndChangeQueue, QueueError};
use crawlfeed::store::FileStore;
use crawlfeed::{Checkpoint, DocumentHandle};
use std::cmp::Ordering;
use std::sync::Arc;

#[test]
fn test_ordering_is_lexicographic_within_a_source() {
    let cases = [
        (Checkpoint::new("wiki", 1, 0), Checkpoint::new("wiki", 1, 1)),
        (Checkpoint::new("wiki", 1, 9), Checkpoint::new("wiki", 2, 0)),
        (Checkpoint::new("wiki", 3, 5), Checkpoint::new("wiki", 4, 0)),
    ];
    for (lesser, greater) in cases {
        assert_eq!(lesser.partial_cmp(&greater), Some(Ordering::Less));
        assert_eq!(greater.partial_cmp(&lesser), Some(Ordering::Greater));
    }
}

#[test]
fn test_no_ordering_across_sources() {
    let a = Checkpoint::new("wiki", 1, 0);
    let b = Checkpoint::new("docs", 1, 0);
    assert_eq!(a.partial_cmp(&b), None);
    assert_eq!(b.partial_cmp(&a), None);
    assert_ne!(a, b);
}

fn queue(dir: &std::path::Path) -> CheckpointAndChangeQueue {
    let store = Arc::new(FileStore::new(dir).unwrap());
    CheckpointAndChangeQueue::new("wiki", store.clone(), store)
}

#[tokio::test]
async fn test_producer_must_advance_the_checkpoint() {
    let dir = tempfile::TempDir::new().unwrap();
    let queue = queue(dir.path());
    queue.start().unwrap();

    queue
        .on_created_or_updated(DocumentHandle::client("a"), Checkpoint::new("wiki", 2, 3))
        .await
        .unwrap();

    // Equal and lesser checkpoints are both stale
    for stale in [Checkpoint::new("wiki", 2, 3), Checkpoint::new("wiki", 1, 9)] {
        let err = queue
            .on_created_or_updated(DocumentHandle::client("b"), stale)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::StaleCheckpoint { .. }));
    }

    // A later offset and a later snapshot both advance
    queue
        .on_created_or_updated(DocumentHandle::client("c"), Checkpoint::new("wiki", 2, 4))
        .await
        .unwrap();
    queue
        .on_created_or_updated(DocumentHandle::client("d"), Checkpoint::new("wiki", 3, 0))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_recorded_checkpoint_must_advance() {
    let dir = tempfile::TempDir::new().unwrap();
    let queue = queue(dir.path());
    queue.start().unwrap();

    queue
        .on_created_or_updated(DocumentHandle::client("a"), Checkpoint::new("wiki", 1, 0))
        .await
        .unwrap();
    queue
        .on_created_or_updated(DocumentHandle::client("b"), Checkpoint::new("wiki", 1, 1))
        .await
        .unwrap();

    queue.record_checkpoint(Checkpoint::new("wiki", 1, 1)).unwrap();

    // Re-recording the same point, or an earlier one, is rejected
    for stale in [Checkpoint::new("wiki", 1, 1), Checkpoint::new("wiki", 1, 0)] {
        let err = queue.record_checkpoint(stale).unwrap_err();
        assert!(matches!(err, QueueError::StaleCheckpoint { .. }));
    }
}

#[tokio::test]
async fn test_foreign_source_checkpoints_are_rejected_not_compared() {
    let dir = tempfile::TempDir::new().unwrap();
    let queue = queue(dir.path());
    queue.start().unwrap();

    let err = queue
        .on_created_or_updated(DocumentHandle::client("a"), Checkpoint::new("docs", 1, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::SourceMismatch { .. }));
}
