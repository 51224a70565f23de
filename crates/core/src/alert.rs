//! Operator alerts.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::item::{short_id, Stage};

/// What an alert reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    /// An item crossed the failure threshold.
    ItemFailure,
    /// A previously alerted item recovered.
    ItemResolved,
    /// The run itself failed (collaborator unusable, listing failed).
    RunFailure,
    /// A previously alerted run failure recovered.
    RunResolved,
}

impl AlertKind {
    pub fn is_resolution(&self) -> bool {
        matches!(self, Self::ItemResolved | Self::RunResolved)
    }
}

/// A single alert for the operator channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub kind: AlertKind,
    pub item_id: Option<String>,
    pub title: String,
    pub error: Option<String>,
    pub failure_count: u32,
    pub stage: Option<Stage>,
}

impl Alert {
    /// Item crossed the failure threshold.
    pub fn item_failure(
        item_id: &str,
        title: &str,
        stage: Stage,
        error: &str,
        failure_count: u32,
    ) -> Self {
        Self {
            kind: AlertKind::ItemFailure,
            item_id: Some(item_id.to_string()),
            title: title.to_string(),
            error: Some(error.to_string()),
            failure_count,
            stage: Some(stage),
        }
    }

    /// Item recovered after an alert.
    pub fn item_resolved(
        item_id: &str,
        title: &str,
        stage: Stage,
        resolved_error: Option<String>,
        failures: u32,
    ) -> Self {
        Self {
            kind: AlertKind::ItemResolved,
            item_id: Some(item_id.to_string()),
            title: title.to_string(),
            error: resolved_error,
            failure_count: failures,
            stage: Some(stage),
        }
    }

    pub fn run_failure(error: &str, failure_count: u32) -> Self {
        Self {
            kind: AlertKind::RunFailure,
            item_id: None,
            title: "Pipeline run".to_string(),
            error: Some(error.to_string()),
            failure_count,
            stage: None,
        }
    }

    pub fn run_resolved(resolved_error: Option<String>, failures: u32) -> Self {
        Self {
            kind: AlertKind::RunResolved,
            item_id: None,
            title: "Pipeline run".to_string(),
            error: resolved_error,
            failure_count: failures,
            stage: None,
        }
    }

    /// One-line summary.
    pub fn headline(&self) -> String {
        match self.kind {
            AlertKind::ItemFailure => format!(
                "Recording failed after {} attempts: {}",
                self.failure_count, self.title
            ),
            AlertKind::ItemResolved => format!("✅ Error resolved: {}", self.title),
            AlertKind::RunFailure => format!(
                "Pipeline run failed ({} consecutive)",
                self.failure_count
            ),
            AlertKind::RunResolved => "✅ Pipeline run recovered".to_string(),
        }
    }

    /// Full message: headline plus details, one per line.
    pub fn render(&self) -> String {
        let mut lines = vec![format!("**{}**", self.headline())];
        if let Some(id) = &self.item_id {
            lines.push(format!("UUID: {}", short_id(id)));
        }
        if let Some(stage) = self.stage {
            lines.push(format!("Stage: {}", stage));
        }
        match (&self.error, self.kind.is_resolution()) {
            (Some(error), false) => lines.push(format!("Error: {}", error)),
            (Some(error), true) => lines.push(format!("Previous error: {}", error)),
            (None, _) => {}
        }
        if self.kind.is_resolution() {
            lines.push(format!(
                "Succeeded after {} failed attempts.",
                self.failure_count
            ));
        }
        lines.join("\n")
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.headline())
    }
}

/// Errors delivering an alert.
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("{0}")]
    Failed(String),
}

/// Operator alert channel.
#[async_trait]
pub trait Alerter: Send + Sync {
    async fn send_alert(&self, alert: &Alert) -> Result<(), AlertError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_failure_render() {
        let alert = Alert::item_failure(
            "abcdefghijkl",
            "Weekly sync",
            Stage::Publish,
            "publish failed: quota exceeded",
            3,
        );
        assert_eq!(
            alert.headline(),
            "Recording failed after 3 attempts: Weekly sync"
        );
        let text = alert.render();
        assert!(text.contains("UUID: abcdefgh..."));
        assert!(text.contains("Stage: publish"));
        assert!(text.contains("Error: publish failed: quota exceeded"));
    }

    #[test]
    fn test_resolution_render() {
        let alert = Alert::item_resolved(
            "abc",
            "Weekly sync",
            Stage::Announce,
            Some("announce failed: 500".to_string()),
            4,
        );
        assert_eq!(alert.headline(), "✅ Error resolved: Weekly sync");
        let text = alert.render();
        assert!(text.contains("UUID: abc"));
        assert!(text.contains("Previous error: announce failed: 500"));
        assert!(text.contains("Succeeded after 4 failed attempts."));
    }

    #[test]
    fn test_run_alerts_have_no_item() {
        let alert = Alert::run_failure("publisher unusable: token revoked", 1);
        assert!(alert.item_id.is_none());
        assert!(!alert.render().contains("UUID"));
        assert!(AlertKind::RunResolved.is_resolution());
        assert!(!AlertKind::RunFailure.is_resolution());
    }
}
