//! Mock recording source for testing.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::acquisition::{AcquisitionError, RecordingSource};
use crate::item::{Asset, SourceItem};

/// A recorded download for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedFetch {
    /// Kind of the asset that was fetched.
    pub asset_kind: String,
    /// Where it was written.
    pub destination: PathBuf,
    /// Whether the fetch succeeded.
    pub success: bool,
}

/// Mock implementation of the RecordingSource trait.
///
/// Lists whatever items were configured (newest first, bounded by the
/// requested limit) and writes a small placeholder file on fetch.
/// Errors are queued and consumed one call at a time.
#[derive(Debug, Default)]
pub struct MockSource {
    items: Arc<RwLock<Vec<SourceItem>>>,
    list_calls: Arc<RwLock<usize>>,
    fetches: Arc<RwLock<Vec<RecordedFetch>>>,
    list_errors: Arc<RwLock<VecDeque<AcquisitionError>>>,
    fetch_errors: Arc<RwLock<VecDeque<AcquisitionError>>>,
}

impl MockSource {
    /// Create a new mock source with no items.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the listed items.
    pub async fn set_items(&self, items: Vec<SourceItem>) {
        *self.items.write().await = items;
    }

    /// Fail the next listing with this error.
    pub async fn queue_list_error(&self, error: AcquisitionError) {
        self.list_errors.write().await.push_back(error);
    }

    /// Fail the next fetch with this error.
    pub async fn queue_fetch_error(&self, error: AcquisitionError) {
        self.fetch_errors.write().await.push_back(error);
    }

    /// Number of listing calls.
    pub async fn list_count(&self) -> usize {
        *self.list_calls.read().await
    }

    /// All recorded fetches, failed ones included.
    pub async fn recorded_fetches(&self) -> Vec<RecordedFetch> {
        self.fetches.read().await.clone()
    }

    /// Number of fetch calls.
    pub async fn fetch_count(&self) -> usize {
        self.fetches.read().await.len()
    }
}

#[async_trait]
impl RecordingSource for MockSource {
    fn name(&self) -> &str {
        "mock-source"
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<SourceItem>, AcquisitionError> {
        *self.list_calls.write().await += 1;

        if let Some(error) = self.list_errors.write().await.pop_front() {
            return Err(error);
        }

        let mut items = self.items.read().await.clone();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items.truncate(limit);
        Ok(items)
    }

    async fn fetch(&self, asset: &Asset, destination: &Path) -> Result<u64, AcquisitionError> {
        let mut record = RecordedFetch {
            asset_kind: asset.kind.clone(),
            destination: destination.to_path_buf(),
            success: false,
        };

        if let Some(error) = self.fetch_errors.write().await.pop_front() {
            self.fetches.write().await.push(record);
            return Err(error);
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = format!("mock recording from {}", asset.download_url);
        tokio::fs::write(destination, content.as_bytes()).await?;

        record.success = true;
        self.fetches.write().await.push(record);
        Ok(content.len() as u64)
    }
}
