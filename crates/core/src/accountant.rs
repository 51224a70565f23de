//! Failure accountant: counts consecutive failures and debounces alerts.
//!
//! Alerts are edge-triggered on the error text. A streak raises at most one
//! alert per distinct error value once it reaches the threshold, and exactly
//! one resolution alert when an alerted streak ends in success.

use chrono::{DateTime, Utc};

use crate::item::FailureStreak;

/// What the caller must do after a failure or success was recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertDecision {
    /// Below threshold, or a success with nothing previously alerted.
    Silent,
    /// Same error as the one already alerted.
    Suppressed,
    /// Send an error alert, then call [`FailureAccountant::mark_alerted`].
    RaiseError { error: String, failure_count: u32 },
    /// Send a resolution alert for a previously alerted streak.
    Resolve {
        failures: u32,
        resolved_error: Option<String>,
    },
}

impl AlertDecision {
    pub fn needs_dispatch(&self) -> bool {
        matches!(
            self,
            AlertDecision::RaiseError { .. } | AlertDecision::Resolve { .. }
        )
    }
}

/// Applies the failure-counting and alert rules to a [`FailureStreak`].
#[derive(Debug, Clone, Copy)]
pub struct FailureAccountant {
    threshold: u32,
}

impl FailureAccountant {
    /// `threshold` is the minimum number of consecutive failures before any
    /// alert. Values below 1 are treated as 1.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Record a failed attempt and decide whether it warrants an alert.
    pub fn record_failure(&self, streak: &mut FailureStreak, error: &str) -> AlertDecision {
        streak.failure_count = streak.failure_count.saturating_add(1);
        streak.last_error = Some(error.to_string());

        if streak.failure_count < self.threshold {
            return AlertDecision::Silent;
        }

        if streak.last_alerted_error.as_deref() == Some(error) {
            return AlertDecision::Suppressed;
        }

        AlertDecision::RaiseError {
            error: error.to_string(),
            failure_count: streak.failure_count,
        }
    }

    /// Note that an error alert for the current error was delivered.
    pub fn mark_alerted(&self, streak: &mut FailureStreak, at: DateTime<Utc>) {
        streak.error_alert_sent_at = Some(at);
        streak.last_alerted_error = streak.last_error.clone();
    }

    /// Record a successful stage transition and reset the streak.
    pub fn record_success(&self, streak: &mut FailureStreak) -> AlertDecision {
        let failures = streak.failure_count;
        let was_alerted = streak.error_alert_sent_at.take().is_some();
        let resolved_error = streak.last_alerted_error.take();

        streak.failure_count = 0;
        streak.last_error = None;

        if was_alerted {
            AlertDecision::Resolve {
                failures,
                resolved_error,
            }
        } else {
            AlertDecision::Silent
        }
    }
}
