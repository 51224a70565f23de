//! Announcement channel: tells people a new recording is available.

mod discord;

pub use discord::{DiscordConfig, DiscordWebhook};

use async_trait::async_trait;
use thiserror::Error;

/// Errors from the announcement channel.
#[derive(Debug, Error)]
pub enum AnnounceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The channel rejected our credentials or no longer exists.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Channel returned an error.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Any other failure, described verbatim.
    #[error("{0}")]
    Failed(String),
}

impl AnnounceError {
    /// Whether the channel is unusable for the whole run.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

/// Posts announcement messages.
#[async_trait]
pub trait Announcer: Send + Sync {
    /// Returns the name of this channel.
    fn name(&self) -> &str;

    async fn announce(&self, message: &str) -> Result<(), AnnounceError>;
}

/// Fill an announcement template. Supports `{title}` and `{reference}`.
pub fn render_announcement(template: &str, title: &str, reference: &str) -> String {
    template
        .replace("{title}", title)
        .replace("{reference}", reference)
}
