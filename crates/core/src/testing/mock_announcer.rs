//! Mock announcer and alert channel for testing.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::alert::{Alert, AlertError, AlertKind, Alerter};
use crate::announcer::{AnnounceError, Announcer};

/// Mock implementation of the Announcer trait.
#[derive(Debug, Default)]
pub struct MockAnnouncer {
    /// Messages that were delivered.
    messages: Arc<RwLock<Vec<String>>>,
    attempts: Arc<RwLock<usize>>,
    errors: Arc<RwLock<VecDeque<AnnounceError>>>,
}

impl MockAnnouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next announcement with this error.
    pub async fn queue_error(&self, error: AnnounceError) {
        self.errors.write().await.push_back(error);
    }

    /// Delivered messages, oldest first.
    pub async fn messages(&self) -> Vec<String> {
        self.messages.read().await.clone()
    }

    /// Number of announce calls, failed ones included.
    pub async fn announce_count(&self) -> usize {
        *self.attempts.read().await
    }
}

#[async_trait]
impl Announcer for MockAnnouncer {
    fn name(&self) -> &str {
        "mock-announcer"
    }

    async fn announce(&self, message: &str) -> Result<(), AnnounceError> {
        *self.attempts.write().await += 1;

        if let Some(error) = self.errors.write().await.pop_front() {
            return Err(error);
        }

        self.messages.write().await.push(message.to_string());
        Ok(())
    }
}

/// Mock implementation of the Alerter trait.
#[derive(Debug, Default)]
pub struct MockAlerter {
    /// Alerts that were delivered.
    alerts: Arc<RwLock<Vec<Alert>>>,
    errors: Arc<RwLock<VecDeque<AlertError>>>,
}

impl MockAlerter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next alert with this error.
    pub async fn queue_error(&self, error: AlertError) {
        self.errors.write().await.push_back(error);
    }

    /// Delivered alerts, oldest first.
    pub async fn alerts(&self) -> Vec<Alert> {
        self.alerts.read().await.clone()
    }

    /// Delivered alerts of one kind.
    pub async fn alerts_of(&self, kind: AlertKind) -> Vec<Alert> {
        self.alerts
            .read()
            .await
            .iter()
            .filter(|a| a.kind == kind)
            .cloned()
            .collect()
    }

    /// Forget delivered alerts.
    pub async fn clear(&self) {
        self.alerts.write().await.clear();
    }
}

#[async_trait]
impl Alerter for MockAlerter {
    async fn send_alert(&self, alert: &Alert) -> Result<(), AlertError> {
        if let Some(error) = self.errors.write().await.pop_front() {
            return Err(error);
        }

        self.alerts.write().await.push(alert.clone());
        Ok(())
    }
}
