//! `LeadStore` trait — the narrow store interface every pipeline role holds.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::leads::{LeadIndex, LeadRecord, LeadUpdate};

/// Backend-agnostic access to lead records.
///
/// Implementations serialize individual updates but make no promise across
/// calls: two updates to the same lead are not transactional.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Every record, ordered by index.
    async fn fetch_all(&self) -> Result<Vec<LeadRecord>, DatabaseError>;

    /// Records with no processing status whose index is strictly greater
    /// than `after`. `None` means no record has been seen yet.
    async fn fetch_unprocessed_since(
        &self,
        after: Option<LeadIndex>,
    ) -> Result<Vec<LeadRecord>, DatabaseError>;

    /// Apply a set of column writes to one lead.
    ///
    /// Columns the store does not have are logged and skipped; the remaining
    /// columns are still written.
    async fn update_fields(&self, index: LeadIndex, update: &LeadUpdate)
    -> Result<(), DatabaseError>;
}
