//! Tracking store trait and errors.

use thiserror::Error;

use super::{FailureStreak, ItemRecord};

/// Errors from the tracking store.
///
/// Any of these is fatal for a run: the store is the only memory the
/// pipeline has between runs.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database error.
    #[error("database error: {0}")]
    Database(String),

    /// A persisted row could not be interpreted.
    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Durable mapping from item identity to item record.
///
/// Every `upsert` is committed on its own, so an interrupted run leaves all
/// previously written records intact.
pub trait TrackingStore: Send + Sync {
    /// All records, in first-seen order.
    fn load(&self) -> Result<Vec<ItemRecord>, StoreError>;

    /// Get a record by id.
    fn get(&self, id: &str) -> Result<Option<ItemRecord>, StoreError>;

    /// Replace the record with the same id, or insert it if absent.
    fn upsert(&self, record: &ItemRecord) -> Result<(), StoreError>;

    /// Whether a record with this id exists.
    fn exists(&self, id: &str) -> Result<bool, StoreError>;

    /// Run-level failure streak (empty if never written).
    fn run_health(&self) -> Result<FailureStreak, StoreError>;

    /// Persist the run-level failure streak.
    fn save_run_health(&self, health: &FailureStreak) -> Result<(), StoreError>;
}
