//! In-memory lead store with sheet-like column semantics.
//!
//! Used by tests and dry runs. The header set is fixed when records are
//! inserted, so updates that name an unknown column are skipped the same way
//! a spreadsheet backend would skip them.

use std::collections::BTreeSet;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::DatabaseError;
use crate::leads::{LeadIndex, LeadRecord, LeadUpdate};
use crate::store::traits::LeadStore;

/// Thread-safe in-memory `LeadStore`.
pub struct MemoryLeadStore {
    records: RwLock<Vec<LeadRecord>>,
    extra_columns: RwLock<BTreeSet<String>>,
    history: RwLock<Vec<(LeadIndex, LeadUpdate)>>,
}

impl MemoryLeadStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            extra_columns: RwLock::new(BTreeSet::new()),
            history: RwLock::new(Vec::new()),
        }
    }

    /// Append a record and return its assigned index.
    ///
    /// The record's `index` is overwritten; its extra columns join the header set.
    pub async fn insert(&self, mut record: LeadRecord) -> LeadIndex {
        let mut records = self.records.write().await;
        let index = records.len();
        record.index = index;

        self.extra_columns
            .write()
            .await
            .extend(record.extra.keys().cloned());

        records.push(record);
        debug!(lead_index = index, "Lead inserted");
        index
    }

    /// Add a deployment-specific column to the header set.
    pub async fn add_column(&self, column: impl Into<String>) {
        self.extra_columns.write().await.insert(column.into());
    }

    /// Snapshot of one record.
    pub async fn get(&self, index: LeadIndex) -> Option<LeadRecord> {
        self.records.read().await.get(index).cloned()
    }

    /// Every update applied to `index`, oldest first.
    pub async fn history(&self, index: LeadIndex) -> Vec<LeadUpdate> {
        self.history
            .read()
            .await
            .iter()
            .filter(|(i, _)| *i == index)
            .map(|(_, update)| update.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl Default for MemoryLeadStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LeadStore for MemoryLeadStore {
    async fn fetch_all(&self) -> Result<Vec<LeadRecord>, DatabaseError> {
        Ok(self.records.read().await.clone())
    }

    async fn fetch_unprocessed_since(
        &self,
        after: Option<LeadIndex>,
    ) -> Result<Vec<LeadRecord>, DatabaseError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| after.is_none_or(|mark| r.index > mark))
            .filter(|r| r.is_unprocessed())
            .cloned()
            .collect())
    }

    async fn update_fields(
        &self,
        index: LeadIndex,
        update: &LeadUpdate,
    ) -> Result<(), DatabaseError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(index)
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "lead".into(),
                id: index.to_string(),
            })?;

        record.apply(update);

        let columns = self.extra_columns.read().await;
        for (column, value) in &update.extra {
            if columns.contains(column) {
                record.extra.insert(column.clone(), value.clone());
            } else {
                warn!(lead_index = index, column = %column, "Column not found in headers, skipping");
            }
        }
        drop(columns);
        drop(records);

        self.history.write().await.push((index, update.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leads::ProcessingStatus;

    #[tokio::test]
    async fn insert_assigns_sequential_indices() {
        let store = MemoryLeadStore::new();
        assert!(store.is_empty().await);
        assert_eq!(store.insert(LeadRecord::new(99)).await, 0);
        assert_eq!(store.insert(LeadRecord::new(99)).await, 1);
        assert_eq!(store.get(1).await.unwrap().index, 1);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn unprocessed_since_respects_mark_and_status() {
        let store = MemoryLeadStore::new();
        for _ in 0..4 {
            store.insert(LeadRecord::new(0)).await;
        }
        store
            .update_fields(2, &LeadUpdate::status(ProcessingStatus::Verifying))
            .await
            .unwrap();

        let all: Vec<_> = store
            .fetch_unprocessed_since(None)
            .await
            .unwrap()
            .iter()
            .map(|r| r.index)
            .collect();
        assert_eq!(all, vec![0, 1, 3]);

        let after: Vec<_> = store
            .fetch_unprocessed_since(Some(1))
            .await
            .unwrap()
            .iter()
            .map(|r| r.index)
            .collect();
        assert_eq!(after, vec![3]);
    }

    #[tokio::test]
    async fn unknown_columns_are_skipped() {
        let store = MemoryLeadStore::new();
        store
            .insert(LeadRecord::new(0).with_extra("Owner", "kim"))
            .await;

        let update = LeadUpdate::error("Outreach failed: x")
            .with_extra("Owner", "lee")
            .with_extra("Nonexistent", "1");
        store.update_fields(0, &update).await.unwrap();

        let record = store.get(0).await.unwrap();
        assert_eq!(record.processing_status, Some(ProcessingStatus::Error));
        assert_eq!(record.extra.get("Owner").map(String::as_str), Some("lee"));
        assert!(!record.extra.contains_key("Nonexistent"));
    }

    #[tokio::test]
    async fn terminal_status_is_kept() {
        let store = MemoryLeadStore::new();
        store.insert(LeadRecord::new(0)).await;
        store
            .update_fields(0, &LeadUpdate::error("Verification failed: dns"))
            .await
            .unwrap();
        store
            .update_fields(0, &LeadUpdate::status(ProcessingStatus::Verifying))
            .await
            .unwrap();

        let record = store.get(0).await.unwrap();
        assert_eq!(record.processing_status, Some(ProcessingStatus::Error));
        assert_eq!(store.history(0).await.len(), 2);
    }

    #[tokio::test]
    async fn update_missing_lead_is_not_found() {
        let store = MemoryLeadStore::new();
        let err = store
            .update_fields(5, &LeadUpdate::status(ProcessingStatus::Verifying))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[tokio::test]
    async fn history_is_recorded_per_lead() {
        let store = MemoryLeadStore::new();
        store.insert(LeadRecord::new(0)).await;
        store.insert(LeadRecord::new(0)).await;
        store
            .update_fields(1, &LeadUpdate::status(ProcessingStatus::Verifying))
            .await
            .unwrap();

        assert!(store.history(0).await.is_empty());
        assert_eq!(store.history(1).await.len(), 1);
    }
}
