//! Publishing service: uploads a local artifact and returns its public reference.

mod youtube;

pub use youtube::{YouTubeClient, YouTubeConfig};

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from the publishing service.
#[derive(Debug, Error)]
pub enum PublishError {
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

    /// The local artifact could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other failure, described verbatim.
    #[error("{0}")]
    Failed(String),
}

impl PublishError {
    /// Whether the service is unusable for the whole run.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

/// What to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub local_path: PathBuf,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

/// A destination that makes artifacts public.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Returns the name of this publisher.
    fn name(&self) -> &str;

    /// Publish the artifact. Returns the public reference (e.g. a URL).
    async fn publish(&self, request: &PublishRequest) -> Result<String, PublishError>;
}
