//! End-to-end pipeline: monitor -> durable queue -> traverser -> recorder

use async_trait::async_trait;
use crawlfeed::load::HostLoadManager;
use crawlfeed::monitor::{MonitorError, RepositoryMonitor, Snapshot, SnapshotSource};
use crawlfeed::queue::CheckpointAndChangeQueue;
use crawlfeed::schedule::TimeInterval;
use crawlfeed::shutdown::ShutdownCoordinator;
use crawlfeed::store::{CheckpointStore, FileStore, ScheduleStore};
use crawlfeed::traversal::{
    BatchResultRecorder, DelayPolicy, PushError, Pusher, QueryTraverser,
};
use crawlfeed::{DocumentHandle, Schedule};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Repository fixture serving a fixed document listing.
struct FixedRepository {
    docs: Vec<(&'static str, u64)>,
}

#[async_trait]
impl SnapshotSource for FixedRepository {
    async fn capture(&self) -> Result<Snapshot, MonitorError> {
        Ok(self
            .docs
            .iter()
            .map(|(id, stamp)| (id.to_string(), *stamp))
            .collect())
    }
}

/// Downstream consumer collecting pushed payloads.
#[derive(Default)]
struct CollectingPusher {
    pushed: Mutex<Vec<String>>,
}

#[async_trait]
impl Pusher for CollectingPusher {
    async fn push(&self, handle: &DocumentHandle) -> Result<(), PushError> {
        self.pushed.lock().unwrap().push(handle.payload.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_discovered_changes_flow_to_the_pusher_and_checkpoint() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = Arc::new(FileStore::new(dir.path()).unwrap());
    let schedule = Schedule::new("wiki", 60, vec![TimeInterval::new(0, 24).unwrap()]).unwrap();
    store.store_schedule(&schedule).unwrap();

    let queue = Arc::new(CheckpointAndChangeQueue::new(
        "wiki",
        store.clone(),
        store.clone(),
    ));
    queue.start().unwrap();

    // One monitor cycle discovers three documents, then shuts down
    let shutdown = ShutdownCoordinator::shared();
    let repository = Arc::new(FixedRepository {
        docs: vec![("alpha", 1), ("beta", 1), ("gamma", 1)],
    });
    let monitor = RepositoryMonitor::new("wiki", repository, queue.clone(), shutdown.clone())
        .with_interval(Duration::from_millis(10));
    let monitor_task = tokio::spawn(async move { monitor.run().await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.request_shutdown();
    monitor_task.await.unwrap();

    // Traverse the queued changes under the host load budget
    let load_manager = Arc::new(HostLoadManager::new(store.clone()));
    let hint = load_manager.determine_batch_hint("wiki").unwrap();
    assert_eq!(hint, 60);

    let pusher = Arc::new(CollectingPusher::default());
    let traverser = QueryTraverser::new(
        "wiki",
        queue.clone(),
        pusher.clone(),
        ShutdownCoordinator::shared(),
    );
    let result = traverser.run_batch(hint).await;

    assert_eq!(result.delay_policy(), DelayPolicy::Poll);
    assert_eq!(result.count_processed(), 3);
    assert_eq!(
        pusher.pushed.lock().unwrap().as_slice(),
        &["alpha".to_string(), "beta".to_string(), "gamma".to_string()]
    );

    // The batch checkpoint is durable
    let checkpoint = store.get_checkpoint("wiki").unwrap().unwrap();
    assert_eq!(checkpoint.within_snapshot_offset, 2);

    // Recording the result feeds the load budget and schedules the next poll
    let recorder = BatchResultRecorder::new(load_manager.clone(), store.clone());
    let wait = recorder.record_result("wiki", &result).unwrap();
    assert_eq!(wait, Duration::from_millis(schedule.retry_delay_millis as u64));
    assert_eq!(load_manager.determine_batch_hint("wiki").unwrap(), 57);
}

#[tokio::test]
async fn test_restarted_pipeline_does_not_redeliver_checkpointed_work() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = Arc::new(FileStore::new(dir.path()).unwrap());
    let schedule = Schedule::new("wiki", 60, vec![TimeInterval::new(0, 24).unwrap()]).unwrap();
    store.store_schedule(&schedule).unwrap();

    // First run: discover and fully traverse two documents
    {
        let queue = Arc::new(CheckpointAndChangeQueue::new(
            "wiki",
            store.clone(),
            store.clone(),
        ));
        queue.start().unwrap();

        let shutdown = ShutdownCoordinator::shared();
        let repository = Arc::new(FixedRepository {
            docs: vec![("alpha", 1), ("beta", 1)],
        });
        let monitor = RepositoryMonitor::new("wiki", repository, queue.clone(), shutdown.clone())
            .with_interval(Duration::from_millis(10));
        let monitor_task = tokio::spawn(async move { monitor.run().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.request_shutdown();
        monitor_task.await.unwrap();

        let pusher = Arc::new(CollectingPusher::default());
        let traverser =
            QueryTraverser::new("wiki", queue, pusher, ShutdownCoordinator::shared());
        let result = traverser.run_batch(10).await;
        assert_eq!(result.count_processed(), 2);
    }

    // Second run over the same durable state: nothing left to deliver
    let queue = Arc::new(CheckpointAndChangeQueue::new(
        "wiki",
        store.clone(),
        store.clone(),
    ));
    queue.start().unwrap();

    let pusher = Arc::new(CollectingPusher::default());
    let traverser = QueryTraverser::new("wiki", queue, pusher.clone(), ShutdownCoordinator::shared());
    let result = traverser.run_batch(10).await;

    assert_eq!(result.delay_policy(), DelayPolicy::Poll);
    assert_eq!(result.count_processed(), 0);
    assert!(pusher.pushed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_restarted_monitor_resumes_above_the_accepted_ordinal() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = Arc::new(FileStore::new(dir.path()).unwrap());
    let schedule = Schedule::new("wiki", 60, vec![TimeInterval::new(0, 24).unwrap()]).unwrap();
    store.store_schedule(&schedule).unwrap();

    // First life: discover one document, traverse it, checkpoint it
    {
        let queue = Arc::new(CheckpointAndChangeQueue::new(
            "wiki",
            store.clone(),
            store.clone(),
        ));
        queue.start().unwrap();

        let shutdown = ShutdownCoordinator::shared();
        let repository = Arc::new(FixedRepository {
            docs: vec![("alpha", 1)],
        });
        let monitor = RepositoryMonitor::new("wiki", repository, queue.clone(), shutdown.clone())
            .with_interval(Duration::from_millis(10));
        let monitor_task = tokio::spawn(async move { monitor.run().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.request_shutdown();
        monitor_task.await.unwrap();

        let pusher = Arc::new(CollectingPusher::default());
        let traverser =
            QueryTraverser::new("wiki", queue, pusher, ShutdownCoordinator::shared());
        assert_eq!(traverser.run_batch(10).await.count_processed(), 1);
    }

    // Second life: the repository gained a document; the monitor itself runs
    // again, seeded above everything the queue already accepted
    let queue = Arc::new(CheckpointAndChangeQueue::new(
        "wiki",
        store.clone(),
        store.clone(),
    ));
    queue.start().unwrap();
    let resume_ordinal = queue
        .last_accepted()
        .map(|cp| cp.snapshot_ordinal)
        .unwrap_or(0);

    let shutdown = ShutdownCoordinator::shared();
    let repository = Arc::new(FixedRepository {
        docs: vec![("alpha", 1), ("beta", 1)],
    });
    let monitor = RepositoryMonitor::new("wiki", repository, queue.clone(), shutdown.clone())
        .with_interval(Duration::from_millis(10))
        .with_initial_ordinal(resume_ordinal);
    let monitor_task = tokio::spawn(async move { monitor.run().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.request_shutdown();
    monitor_task.await.unwrap();

    // The new document arrives instead of every emission being rejected as
    // stale; alpha is re-delivered because the restarted monitor has no
    // previous snapshot (at-least-once)
    let pusher = Arc::new(CollectingPusher::default());
    let traverser =
        QueryTraverser::new("wiki", queue, pusher.clone(), ShutdownCoordinator::shared());
    let result = traverser.run_batch(10).await;

    assert_eq!(result.count_processed(), 2);
    assert!(pusher.pushed.lock().unwrap().contains(&"beta".to_string()));
    let checkpoint = store.get_checkpoint("wiki").unwrap().unwrap();
    assert!(checkpoint.snapshot_ordinal > resume_ordinal);
}
