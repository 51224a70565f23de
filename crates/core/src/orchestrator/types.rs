//! Types for the run orchestrator.

use thiserror::Error;

use crate::item::{Stage, StoreError};
use crate::resolver::Action;
use crate::retention::SweepReport;

/// Errors that end a run early.
#[derive(Debug, Error)]
pub enum RunError {
    /// The tracking store failed. Nothing else can be trusted.
    #[error("tracking store error: {0}")]
    Store(#[from] StoreError),

    /// A collaborator is unusable for every item (e.g. rejected credentials).
    #[error("{collaborator} unusable: {message}")]
    Fatal {
        collaborator: String,
        message: String,
    },
}

/// An action a dry run would have taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAction {
    pub item_id: String,
    pub title: String,
    pub action: Action,
}

/// Summary of one run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub dry_run: bool,
    /// Items returned by the acquisition listing.
    pub listed: usize,
    /// Identities seen for the first time.
    pub new_items: usize,
    pub acquired: usize,
    pub published: usize,
    pub announced: usize,
    pub skipped: usize,
    /// Records needing acquisition whose item was not in the listing.
    pub deferred: usize,
    /// Failed stage attempts.
    pub failed: usize,
    /// Alerts the alert channel accepted.
    pub alerts_sent: usize,
    /// Alerts the alert channel rejected.
    pub alerts_failed: usize,
    pub planned: Vec<PlannedAction>,
    pub sweep: Option<SweepReport>,
    /// Run-level failure, if any. Set means the run was not healthy.
    pub run_failure: Option<String>,
    /// The run failure made a collaborator unusable (alerted immediately)
    /// rather than being a transient listing problem.
    pub run_failure_fatal: bool,
}

impl RunReport {
    pub fn is_healthy(&self) -> bool {
        self.run_failure.is_none()
    }

    pub(super) fn record_success(&mut self, stage: Stage) {
        match stage {
            Stage::Acquire => self.acquired += 1,
            Stage::Publish => self.published += 1,
            Stage::Announce => self.announced += 1,
        }
    }
}
