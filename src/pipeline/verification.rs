//! Verification stage — validates a lead and decides whether it gets outreach.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::PipelineError;
use crate::leads::{EmailVerified, LeadUpdate, ProcessingStatus};
use crate::pipeline::idle;
use crate::pipeline::queue::TaskQueue;
use crate::pipeline::rules::LeadRules;
use crate::pipeline::types::{LeadTask, VerificationOutcome};
use crate::store::LeadStore;
use crate::validation::AddressValidator;

/// Consumes the verification lane.
pub struct VerificationWorker {
    store: Arc<dyn LeadStore>,
    validator: Arc<dyn AddressValidator>,
    rules: LeadRules,
    queue: Arc<TaskQueue>,
    poll_interval: Duration,
}

impl VerificationWorker {
    pub fn new(
        store: Arc<dyn LeadStore>,
        validator: Arc<dyn AddressValidator>,
        rules: LeadRules,
        queue: Arc<TaskQueue>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            validator,
            rules,
            queue,
            poll_interval,
        }
    }

    /// Verify one lead and write the verdict.
    ///
    /// A `Y` verdict forwards the task to outreach. Any failure along the way
    /// marks the lead `Error` with a note; nothing is returned as an error.
    pub async fn process_lead(&self, task: LeadTask) -> VerificationOutcome {
        let index = task.index();

        match self.verify(&task).await {
            Ok(EmailVerified::Yes) => {
                info!(lead_index = index, "Lead verified, queued for outreach");
                self.queue.enqueue_outreach(task);
                VerificationOutcome::Passed
            }
            Ok(EmailVerified::No) => {
                info!(lead_index = index, "Lead failed verification");
                VerificationOutcome::Rejected
            }
            Err(e) => {
                warn!(lead_index = index, error = %e, "Verification error");
                if let Err(write_err) = self
                    .store
                    .update_fields(index, &LeadUpdate::error(e.to_string()))
                    .await
                {
                    error!(
                        lead_index = index,
                        error = %write_err,
                        "Failed to record verification error"
                    );
                }
                VerificationOutcome::Failed
            }
        }
    }

    async fn verify(&self, task: &LeadTask) -> Result<EmailVerified, PipelineError> {
        let index = task.index();
        let lead = &task.lead;

        self.store
            .update_fields(index, &LeadUpdate::status(ProcessingStatus::Verifying))
            .await
            .map_err(|e| PipelineError::Verification(e.to_string()))?;

        let address_ok = match lead.email.as_deref() {
            Some(email) => self.validator.validate(email.trim()).await,
            None => false,
        };
        let rules = self.rules.evaluate(lead);

        debug!(
            lead_index = index,
            address_ok,
            rules_ok = rules.passed(),
            violations = %rules.reasons(),
            "Verification checks complete"
        );

        let verdict = EmailVerified::from_passed(address_ok && rules.passed());
        self.store
            .update_fields(index, &LeadUpdate::verified(verdict, Utc::now()))
            .await
            .map_err(|e| PipelineError::Verification(e.to_string()))?;

        Ok(verdict)
    }

    /// Drain the lane until shutdown, sleeping only when it is empty.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            poll_ms = self.poll_interval.as_millis() as u64,
            "Verification worker started"
        );

        while !shutdown.is_cancelled() {
            match self.queue.try_dequeue_verification() {
                Some(task) => {
                    self.process_lead(task).await;
                }
                None => {
                    if !idle(&shutdown, self.poll_interval).await {
                        break;
                    }
                }
            }
        }

        info!("Verification worker shutting down");
    }
}

/// Spawn the verification loop.
pub fn spawn_verification_worker(
    worker: VerificationWorker,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(worker.run(shutdown))
}
