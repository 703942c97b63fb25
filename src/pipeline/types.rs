//! Shared types for the lead pipeline.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::leads::{LeadIndex, LeadRecord};

/// A unit of work handed between pipeline stages.
///
/// Carries a snapshot of the lead taken when the task was created. Stages
/// read the snapshot and write back only through the store.
#[derive(Debug, Clone)]
pub struct LeadTask {
    pub id: Uuid,
    pub lead: LeadRecord,
    pub enqueued_at: DateTime<Utc>,
}

impl LeadTask {
    pub fn new(lead: LeadRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            lead,
            enqueued_at: Utc::now(),
        }
    }

    pub fn index(&self) -> LeadIndex {
        self.lead.index
    }
}

/// Result of one verification pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// Verified `Y` and forwarded to outreach.
    Passed,
    /// Verified `N`; the lead stops here.
    Rejected,
    /// Marked `Error`.
    Failed,
}

/// Result of one outreach attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutreachOutcome {
    /// Delivered and marked `Completed`.
    Delivered,
    /// Delivery failed; buffered for retry after `attempt` sends.
    Deferred { attempt: u32 },
    /// Marked `Error`.
    Failed,
}
