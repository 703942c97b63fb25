//! Outreach stage — delivers the sales message with bounded retries.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channels::{MessageTransport, OutboundEmail};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::leads::{LeadUpdate, ProcessingStatus};
use crate::pipeline::idle;
use crate::pipeline::queue::TaskQueue;
use crate::pipeline::retry::{RetryBuffer, RetryDisposition, RetryEntry};
use crate::pipeline::types::{LeadTask, OutreachOutcome};
use crate::store::LeadStore;

/// Consumes the outreach lane and owns the retry buffer.
pub struct OutreachWorker {
    store: Arc<dyn LeadStore>,
    transport: Arc<dyn MessageTransport>,
    queue: Arc<TaskQueue>,
    retries: RetryBuffer,
    poll_interval: Duration,
    subject: String,
    body: String,
}

impl OutreachWorker {
    pub fn new(
        store: Arc<dyn LeadStore>,
        transport: Arc<dyn MessageTransport>,
        queue: Arc<TaskQueue>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            store,
            transport,
            queue,
            retries: RetryBuffer::new(config.max_delivery_attempts, config.retry_delay),
            poll_interval: config.outreach_poll_interval,
            subject: config.outreach_subject.clone(),
            body: config.outreach_body.clone(),
        }
    }

    /// Entries waiting for another delivery attempt.
    pub fn pending_retries(&self) -> usize {
        self.retries.len()
    }

    /// Mark the lead `Outreach` and make the first delivery attempt.
    pub async fn process_lead(&mut self, task: LeadTask) -> OutreachOutcome {
        let index = task.index();

        if let Err(e) = self
            .store
            .update_fields(index, &LeadUpdate::status(ProcessingStatus::Outreach))
            .await
        {
            return self
                .mark_error(&task, PipelineError::Outreach(e.to_string()))
                .await;
        }

        let Some(email) = self.outbound_for(&task) else {
            return self
                .mark_error(&task, PipelineError::Outreach("lead has no email address".into()))
                .await;
        };

        match self.transport.send(&email).await {
            Ok(()) => self.complete(&task).await,
            Err(e) => {
                warn!(lead_index = index, attempt = 1, error = %e, "Delivery failed");
                match self.retries.defer(task, Instant::now()) {
                    RetryDisposition::Requeued { attempt } => OutreachOutcome::Deferred { attempt },
                    RetryDisposition::Exhausted(entry) => self.exhaust(entry).await,
                }
            }
        }
    }

    /// One attempt for every retry whose delay has elapsed.
    ///
    /// Returns how many entries were attempted.
    pub async fn drain_retries(&mut self) -> usize {
        let due = self.retries.take_due(Instant::now());
        let count = due.len();

        for entry in due {
            let index = entry.task.index();
            let attempt = entry.attempt + 1;

            let Some(email) = self.outbound_for(&entry.task) else {
                self.mark_error(&entry.task, PipelineError::Outreach("lead has no email address".into()))
                    .await;
                continue;
            };

            match self.transport.send(&email).await {
                Ok(()) => {
                    info!(lead_index = index, attempt, "Retry delivered");
                    self.complete(&entry.task).await;
                }
                Err(e) => {
                    warn!(lead_index = index, attempt, error = %e, "Retry delivery failed");
                    if let RetryDisposition::Exhausted(entry) =
                        self.retries.record_failure(entry, Instant::now())
                    {
                        self.exhaust(entry).await;
                    }
                }
            }
        }

        count
    }

    fn outbound_for(&self, task: &LeadTask) -> Option<OutboundEmail> {
        let to = task.lead.email.as_deref()?.trim();
        if to.is_empty() {
            return None;
        }
        Some(OutboundEmail::new(to, &self.subject, &self.body))
    }

    async fn complete(&self, task: &LeadTask) -> OutreachOutcome {
        let index = task.index();
        match self
            .store
            .update_fields(index, &LeadUpdate::completed(Utc::now()))
            .await
        {
            Ok(()) => {
                info!(lead_index = index, "Outreach email sent");
                OutreachOutcome::Delivered
            }
            Err(e) => {
                self.mark_error(task, PipelineError::Outreach(e.to_string()))
                    .await
            }
        }
    }

    async fn exhaust(&self, entry: RetryEntry) -> OutreachOutcome {
        error!(
            lead_index = entry.task.index(),
            attempts = entry.attempt,
            "Giving up on delivery"
        );
        let cause = format!("delivery failed after {} attempts", entry.attempt);
        self.mark_error(&entry.task, PipelineError::Outreach(cause))
            .await
    }

    async fn mark_error(&self, task: &LeadTask, err: PipelineError) -> OutreachOutcome {
        let index = task.index();
        warn!(lead_index = index, error = %err, "Outreach error");
        if let Err(write_err) = self
            .store
            .update_fields(index, &LeadUpdate::error(err.to_string()))
            .await
        {
            error!(
                lead_index = index,
                error = %write_err,
                "Failed to record outreach error"
            );
        }
        OutreachOutcome::Failed
    }

    /// Retries first, then fresh work; sleep when the lane is empty.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            poll_ms = self.poll_interval.as_millis() as u64,
            max_attempts = self.retries.max_attempts(),
            "Outreach worker started"
        );

        while !shutdown.is_cancelled() {
            self.drain_retries().await;

            match self.queue.try_dequeue_outreach() {
                Some(task) => {
                    let outcome = self.process_lead(task).await;
                    debug!(?outcome, "Outreach task processed");
                }
                None => {
                    if !idle(&shutdown, self.poll_interval).await {
                        break;
                    }
                }
            }
        }

        if !self.retries.is_empty() {
            warn!(
                pending = self.retries.len(),
                "Dropping buffered retries on shutdown"
            );
        }
        info!("Outreach worker shutting down");
    }
}

/// Spawn the outreach loop.
pub fn spawn_outreach_worker(
    worker: OutreachWorker,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(worker.run(shutdown))
}
