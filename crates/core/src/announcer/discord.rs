//! Discord webhook client. Serves as both announcer and alert channel.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::{AnnounceError, Announcer};
use crate::alert::{Alert, AlertError, Alerter};

/// Discord rejects messages longer than this.
const MAX_MESSAGE_CHARS: usize = 2000;

/// Discord webhook configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Webhook for announcements.
    pub webhook_url: String,
    /// Webhook for operator alerts. Falls back to `webhook_url`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_webhook_url: Option<String>,
    /// Override the webhook's display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Discord webhook client.
pub struct DiscordWebhook {
    client: Client,
    config: DiscordConfig,
}

impl DiscordWebhook {
    pub fn new(config: DiscordConfig) -> Result<Self, AnnounceError> {
        if config.webhook_url.trim().is_empty() {
            return Err(AnnounceError::Unauthorized(
                "Discord webhook URL is required".to_string(),
            ));
        }

        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self { client, config })
    }

    fn alert_url(&self) -> &str {
        self.config
            .alert_webhook_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(&self.config.webhook_url)
    }

    async fn post(&self, url: &str, content: &str) -> Result<(), AnnounceError> {
        let mut body = json!({ "content": truncate(content, MAX_MESSAGE_CHARS) });
        if let Some(username) = &self.config.username {
            body["username"] = json!(username);
        }

        let response = self.client.post(url).json(&body).send().await?;
        let status = response.status();

        if matches!(
            status,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
        ) {
            return Err(AnnounceError::Unauthorized(format!(
                "Discord webhook rejected the request ({})",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AnnounceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        debug!("Discord webhook accepted message ({})", status.as_u16());
        Ok(())
    }
}

/// Cut `text` to at most `max` characters, marking the cut with an ellipsis.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

#[async_trait]
impl Announcer for DiscordWebhook {
    fn name(&self) -> &str {
        "discord"
    }

    async fn announce(&self, message: &str) -> Result<(), AnnounceError> {
        self.post(&self.config.webhook_url, message).await?;
        info!("Discord announcement sent: {}", message);
        Ok(())
    }
}

#[async_trait]
impl Alerter for DiscordWebhook {
    async fn send_alert(&self, alert: &Alert) -> Result<(), AlertError> {
        self.post(self.alert_url(), &alert.render())
            .await
            .map_err(|e| match e {
                AnnounceError::Http(e) => AlertError::Http(e),
                AnnounceError::Unauthorized(m) => AlertError::Unauthorized(m),
                other => AlertError::Failed(other.to_string()),
            })?;
        info!("Discord alert sent: {}", alert.headline());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        let long = "é".repeat(2500);
        let cut = truncate(&long, MAX_MESSAGE_CHARS);
        assert_eq!(cut.chars().count(), MAX_MESSAGE_CHARS);
        assert!(cut.ends_with('…'));
    }

    #[test]
    fn test_empty_webhook_rejected() {
        let result = DiscordWebhook::new(DiscordConfig {
            webhook_url: "  ".to_string(),
            alert_webhook_url: None,
            username: None,
        });
        assert!(matches!(result, Err(AnnounceError::Unauthorized(_))));
    }

    #[test]
    fn test_alert_url_fallback() {
        let hook = DiscordWebhook::new(DiscordConfig {
            webhook_url: "https://discord.example/main".to_string(),
            alert_webhook_url: None,
            username: None,
        })
        .unwrap();
        assert_eq!(hook.alert_url(), "https://discord.example/main");

        let hook = DiscordWebhook::new(DiscordConfig {
            webhook_url: "https://discord.example/main".to_string(),
            alert_webhook_url: Some("https://discord.example/ops".to_string()),
            username: None,
        })
        .unwrap();
        assert_eq!(hook.alert_url(), "https://discord.example/ops");
    }
}
