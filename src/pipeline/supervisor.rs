//! Supervisor — discovers new leads and polls for inbound campaign tasks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channels::{InboundChannel, InboundEmail};
use crate::error::PipelineError;
use crate::leads::LeadIndex;
use crate::pipeline::MIN_TICK;
use crate::pipeline::queue::TaskQueue;
use crate::pipeline::types::LeadTask;
use crate::store::LeadStore;

/// Acts on a campaign task email.
#[async_trait]
pub trait InboundTaskHandler: Send + Sync {
    async fn handle(&self, email: &InboundEmail) -> Result<(), PipelineError>;
}

/// Logs the task and does nothing else.
pub struct NoopTaskHandler;

#[async_trait]
impl InboundTaskHandler for NoopTaskHandler {
    async fn handle(&self, email: &InboundEmail) -> Result<(), PipelineError> {
        info!(
            from = %email.from,
            subject = %email.subject,
            message_id = %email.message_id,
            "Inbound campaign task received"
        );
        Ok(())
    }
}

/// Periodic discovery and inbound polling.
pub struct Supervisor {
    store: Arc<dyn LeadStore>,
    queue: Arc<TaskQueue>,
    inbound: Option<Arc<dyn InboundChannel>>,
    task_handler: Arc<dyn InboundTaskHandler>,
    subject_filter: String,
    interval: Duration,
    /// Highest index ever enqueued. Never moves backwards.
    high_water_mark: Option<LeadIndex>,
}

impl Supervisor {
    pub fn new(
        store: Arc<dyn LeadStore>,
        queue: Arc<TaskQueue>,
        interval: Duration,
        subject_filter: impl Into<String>,
    ) -> Self {
        Self {
            store,
            queue,
            inbound: None,
            task_handler: Arc::new(NoopTaskHandler),
            subject_filter: subject_filter.into(),
            interval: interval.max(MIN_TICK),
            high_water_mark: None,
        }
    }

    /// Poll `inbound` for task emails each cycle.
    pub fn with_inbound(
        mut self,
        inbound: Arc<dyn InboundChannel>,
        handler: Arc<dyn InboundTaskHandler>,
    ) -> Self {
        self.inbound = Some(inbound);
        self.task_handler = handler;
        self
    }

    pub fn high_water_mark(&self) -> Option<LeadIndex> {
        self.high_water_mark
    }

    /// Enqueue every unprocessed lead past the mark, in index order.
    ///
    /// Returns how many leads were enqueued.
    pub async fn discover_new_leads(&mut self) -> Result<usize, PipelineError> {
        let mark = self.high_water_mark;
        let mut fresh: Vec<_> = self
            .store
            .fetch_unprocessed_since(mark)
            .await
            .map_err(|e| PipelineError::Discovery(e.to_string()))?
            .into_iter()
            .filter(|lead| mark.is_none_or(|m| lead.index > m) && lead.is_unprocessed())
            .collect();
        fresh.sort_by_key(|lead| lead.index);

        let count = fresh.len();
        for lead in fresh {
            let index = lead.index;
            self.queue.enqueue_verification(LeadTask::new(lead));
            self.high_water_mark = Some(self.high_water_mark.map_or(index, |m| m.max(index)));
            debug!(lead_index = index, "Lead queued for verification");
        }

        if count > 0 {
            info!(
                count,
                high_water_mark = ?self.high_water_mark,
                "Discovered new leads"
            );
        }
        Ok(count)
    }

    /// Hand every unread task email to the handler.
    ///
    /// Handler failures are logged per message. Returns how many messages
    /// were fetched.
    pub async fn poll_inbound_tasks(&self) -> Result<usize, PipelineError> {
        let Some(ref inbound) = self.inbound else {
            return Ok(0);
        };

        let messages = inbound
            .fetch_unread_matching(&self.subject_filter)
            .await
            .map_err(|e| PipelineError::Poll(e.to_string()))?;

        for message in &messages {
            if let Err(e) = self.task_handler.handle(message).await {
                warn!(
                    message_id = %message.message_id,
                    error = %e,
                    "Inbound task handler failed"
                );
            }
        }
        Ok(messages.len())
    }

    /// One supervision cycle. Failures are logged, never returned.
    pub async fn run_cycle(&mut self) {
        if let Err(e) = self.discover_new_leads().await {
            error!(error = %e, "Error monitoring leads");
        }
        if let Err(e) = self.poll_inbound_tasks().await {
            error!(error = %e, "Error monitoring inbound tasks");
        }
    }

    /// Run a cycle immediately, then once per interval until shutdown.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            inbound = self.inbound.as_ref().map(|i| i.name()),
            "Supervisor started"
        );

        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => self.run_cycle().await,
            }
        }

        info!("Supervisor shutting down");
    }
}

/// Spawn the supervision loop.
pub fn spawn_supervisor(supervisor: Supervisor, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(supervisor.run(shutdown))
}
