//! Bounded FIFO change buffer
//!
//! Capacity is tracked with owned semaphore permits: a producer acquires one
//! permit per queued change (waiting up to a timeout when the queue is full)
//! and the consumer returns the permit when it drains an entry. The queue is
//! safe under one producer task and one consumer task calling concurrently;
//! FIFO order holds under arbitrary interleaving.

use super::QueueError;
use crate::{metrics, Change};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A reserved queue slot, held until a change is pushed into it.
///
/// Dropping the permit without pushing releases the slot again, so a failed
/// durable write between reservation and push never leaks capacity.
pub struct ProducePermit {
    permit: OwnedSemaphorePermit,
}

/// Bounded FIFO buffer of [`Change`] values.
pub struct ChangeQueue {
    capacity: usize,
    slots: Arc<Semaphore>,
    items: Mutex<VecDeque<Change>>,
}

impl ChangeQueue {
    /// Create a queue bounded at `capacity` entries.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "change queue capacity must be positive");
        Self {
            capacity,
            slots: Arc::new(Semaphore::new(capacity)),
            items: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Configured capacity bound.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of changes currently buffered.
    pub fn len(&self) -> usize {
        self.items.lock().expect("change queue poisoned").len()
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait up to `timeout` for a free slot.
    ///
    /// Used by the durable wrapper to reserve capacity before committing a
    /// change to the pending log; the permit is redeemed with
    /// [`produce_with`](Self::produce_with) once the log write succeeded.
    pub async fn reserve(&self, timeout: Duration) -> Result<ProducePermit, QueueError> {
        let acquire = self.slots.clone().acquire_owned();
        match tokio::time::timeout(timeout, acquire).await {
            Ok(Ok(permit)) => Ok(ProducePermit { permit }),
            // The semaphore is never closed while the queue is alive.
            Ok(Err(_)) => Err(QueueError::Stopped),
            Err(_) => Err(QueueError::Timeout(timeout)),
        }
    }

    /// Push a change into a previously reserved slot. Never blocks.
    pub fn produce_with(&self, slot: ProducePermit, change: Change) {
        // The permit is consumed by the queued entry; try_consume returns it.
        slot.permit.forget();
        let mut items = self.items.lock().expect("change queue poisoned");
        items.push_back(change);
        metrics::set_queue_depth(items.len());
    }

    /// Enqueue a change, waiting up to `timeout` when the queue is full.
    pub async fn produce(&self, change: Change, timeout: Duration) -> Result<(), QueueError> {
        let slot = self.reserve(timeout).await?;
        self.produce_with(slot, change);
        Ok(())
    }

    /// Drain the oldest change, or `None` when the queue is empty.
    ///
    /// Never blocks, so the scheduler loop can poll and decide independently
    /// whether to wait or move on to other sources.
    pub fn try_consume(&self) -> Option<Change> {
        let change = {
            let mut items = self.items.lock().expect("change queue poisoned");
            let change = items.pop_front()?;
            metrics::set_queue_depth(items.len());
            change
        };
        self.slots.add_permits(1);
        Some(change)
    }
}
