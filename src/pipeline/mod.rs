//! Concurrent lead-processing pipeline.
//!
//! Leads flow through:
//! 1. `Supervisor::discover_new_leads()` — finds unprocessed records in the store
//! 2. `VerificationWorker` — address validation + business rules
//! 3. `OutreachWorker` — delivery with bounded retries
//!
//! Stages talk only through the `TaskQueue` and the `LeadStore`. Per-lead
//! failures are written to the lead, never propagated out of a worker loop.

pub mod outreach;
pub mod queue;
pub mod report;
pub mod retry;
pub mod rules;
pub mod runner;
pub mod supervisor;
pub mod types;
pub mod verification;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

pub use outreach::{OutreachWorker, spawn_outreach_worker};
pub use queue::TaskQueue;
pub use report::{CampaignReport, ReportScheduler, generate_report, spawn_report_scheduler};
pub use retry::{RetryBuffer, RetryDisposition, RetryEntry};
pub use rules::LeadRules;
pub use runner::{Pipeline, PipelineDeps};
pub use supervisor::{InboundTaskHandler, NoopTaskHandler, Supervisor, spawn_supervisor};
pub use types::{LeadTask, OutreachOutcome, VerificationOutcome};
pub use verification::{VerificationWorker, spawn_verification_worker};

/// Shortest period accepted for an interval timer.
pub(crate) const MIN_TICK: Duration = Duration::from_millis(1);

/// Sleep for `period` unless shutdown is requested first.
///
/// Returns `false` when the token was cancelled.
pub(crate) async fn idle(shutdown: &CancellationToken, period: Duration) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(period) => true,
    }
}
