//! Acquisition service: lists recent recordings and downloads their files.

mod selection;
mod zoom;

pub use selection::{
    artifact_path, display_name, is_video_asset, recording_duration_secs, sanitize_filename,
    select_best_asset, ASSET_PREFERENCE,
};
pub use zoom::{ZoomClient, ZoomConfig};

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::item::{Asset, SourceItem};

/// Errors from the acquisition service.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Credentials are missing or were rejected.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// API returned an error.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Local file error while storing a download.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other failure, described verbatim.
    #[error("{0}")]
    Failed(String),
}

impl AcquisitionError {
    /// Whether the service is unusable for the whole run.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

/// A source of recordings.
#[async_trait]
pub trait RecordingSource: Send + Sync {
    /// Returns the name of this source.
    fn name(&self) -> &str;

    /// Most recent items, newest first, at most `limit` of them.
    async fn list_recent(&self, limit: usize) -> Result<Vec<SourceItem>, AcquisitionError>;

    /// Download `asset` to `destination`. Returns the number of bytes written.
    ///
    /// Nothing is left at `destination` if the download fails.
    async fn fetch(&self, asset: &Asset, destination: &Path) -> Result<u64, AcquisitionError>;
}
