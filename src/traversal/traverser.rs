//! Bounded batch runner
//!
//! [`QueryTraverser::run_batch`] executes one pull-and-push cycle against a
//! [`ChangeFeed`]. Whatever way the batch ends - hint exhausted, end of data,
//! push failure, upstream fault, or cooperative cancellation - control flows
//! through a single guaranteed checkpoint step before the [`BatchResult`] is
//! built, so progress already pushed downstream is never lost.

use super::{BatchResult, ChangeFeed, DelayPolicy, PushError};
use crate::metrics;
use crate::shutdown::SharedShutdown;
use crate::{Checkpoint, DocumentHandle};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

/// Downstream consumer of document handles, one push per change.
#[async_trait]
pub trait Pusher: Send + Sync {
    /// Deliver one document handle downstream.
    async fn push(&self, handle: &DocumentHandle) -> Result<(), PushError>;
}

/// Runs bounded traversal batches for one source.
pub struct QueryTraverser {
    source_id: String,
    feed: Arc<dyn ChangeFeed>,
    pusher: Arc<dyn Pusher>,
    shutdown: SharedShutdown,
}

impl QueryTraverser {
    /// Create a traverser pulling from `feed` and pushing to `pusher`.
    pub fn new(
        source_id: impl Into<String>,
        feed: Arc<dyn ChangeFeed>,
        pusher: Arc<dyn Pusher>,
        shutdown: SharedShutdown,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            feed,
            pusher,
            shutdown,
        }
    }

    /// Source this traverser is bound to.
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Run one batch of up to `batch_hint` changes.
    ///
    /// # Panics
    /// Panics if `batch_hint` is zero - the scheduler must skip the batch
    /// entirely when the host load manager reports no remaining budget.
    pub async fn run_batch(&self, batch_hint: u32) -> BatchResult {
        assert!(batch_hint > 0, "batch hint must be positive");

        let span = tracing::info_span!(
            "run_batch",
            source = %self.source_id,
            batch_hint
        );
        self.batch_cycle(batch_hint).instrument(span).await
    }

    async fn batch_cycle(&self, batch_hint: u32) -> BatchResult {
        let start_millis = chrono::Utc::now().timestamp_millis();
        let mut processed: u32 = 0;
        let mut last_pushed: Option<Checkpoint> = None;

        let mut policy = loop {
            if processed == batch_hint {
                // Budget exhausted with more work likely behind it
                break DelayPolicy::Immediate;
            }
            // Cooperative cancellation check between items, never mid-item
            if self.shutdown.is_shutdown_requested() {
                info!(processed, "Batch cancelled by shutdown request");
                break DelayPolicy::Poll;
            }

            let change = match self.feed.next_change().await {
                Ok(Some(change)) => change,
                Ok(None) => break DelayPolicy::Poll,
                Err(e) => {
                    error!(error = %e, "Upstream fault while pulling changes");
                    break DelayPolicy::Error;
                }
            };

            match self.pusher.push(&change.handle).await {
                Ok(()) => {
                    processed += 1;
                    last_pushed = Some(change.checkpoint);
                }
                Err(PushError::Retryable(reason)) => {
                    // Keep everything processed so far; the change stays in
                    // the durable log and is re-delivered after a restart
                    warn!(reason = %reason, "Retryable push failure; stopping batch");
                    break DelayPolicy::Error;
                }
                Err(PushError::Fatal(reason)) => {
                    error!(reason = %reason, "Fatal push failure; stopping batch");
                    break DelayPolicy::Error;
                }
            }
        };

        // Guaranteed checkpoint step: every exit path above lands here, so
        // partial progress survives faults and cancellation alike.
        if let Some(checkpoint) = last_pushed {
            if let Err(e) = self.feed.record_checkpoint(checkpoint).await {
                error!(error = %e, processed, "Failed to record batch checkpoint");
                policy = DelayPolicy::Error;
            }
        }

        let end_millis = chrono::Utc::now().timestamp_millis();
        let result = BatchResult::new(policy, processed, start_millis, end_millis);
        debug!(
            policy = result.delay_policy().as_str(),
            processed = result.count_processed(),
            elapsed_ms = result.elapsed_millis(),
            "Batch finished"
        );
        metrics::record_batch(result.delay_policy().as_str(), result.count_processed());
        result
    }
}
