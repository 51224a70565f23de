//! Run orchestrator implementation.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::accountant::{AlertDecision, FailureAccountant};
use crate::acquisition::{artifact_path, display_name, select_best_asset, RecordingSource};
use crate::alert::{Alert, Alerter};
use crate::announcer::{render_announcement, Announcer};
use crate::item::{ItemRecord, SourceItem, Stage, TrackingStore};
use crate::publisher::{PublishRequest, Publisher};
use crate::resolver::{resolve, Action, ResolvePolicy};
use crate::retention::RetentionSweeper;

use super::config::RunConfig;
use super::types::{PlannedAction, RunError, RunReport};

/// What a completed stage produced.
enum StageDone {
    Acquired(PathBuf),
    Published(String),
    Announced,
}

/// Why a stage did not complete.
enum StepError {
    /// The collaborator is unusable for the rest of the run.
    Fatal(RunError),
    /// This item failed; the run continues.
    Failed(String),
}

fn step_error(collaborator: &str, auth_failure: bool, error: impl ToString) -> StepError {
    if auth_failure {
        StepError::Fatal(RunError::Fatal {
            collaborator: collaborator.to_string(),
            message: error.to_string(),
        })
    } else {
        StepError::Failed(error.to_string())
    }
}

/// A record considered this run, with its listing entry when the
/// acquisition service returned one.
struct Candidate {
    record: ItemRecord,
    source: Option<SourceItem>,
}

/// Drives one pass of acquire, publish and announce over candidate items.
pub struct RunOrchestrator {
    config: RunConfig,
    store: Arc<dyn TrackingStore>,
    source: Arc<dyn RecordingSource>,
    publisher: Arc<dyn Publisher>,
    announcer: Arc<dyn Announcer>,
    alerter: Arc<dyn Alerter>,
    retention: Option<RetentionSweeper>,
    accountant: FailureAccountant,
    policy: ResolvePolicy,
}

impl RunOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        config: RunConfig,
        store: Arc<dyn TrackingStore>,
        source: Arc<dyn RecordingSource>,
        publisher: Arc<dyn Publisher>,
        announcer: Arc<dyn Announcer>,
        alerter: Arc<dyn Alerter>,
    ) -> Self {
        let accountant = FailureAccountant::new(config.alert_threshold);
        let policy = ResolvePolicy {
            min_duration_secs: config.min_duration_secs,
        };

        Self {
            config,
            store,
            source,
            publisher,
            announcer,
            alerter,
            retention: None,
            accountant,
            policy,
        }
    }

    /// Sweep aged artifacts at the end of every run.
    pub fn with_retention(mut self, sweeper: RetentionSweeper) -> Self {
        self.retention = Some(sweeper);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Execute one run.
    ///
    /// Per-item failures are recorded and never end the run. Collaborator
    /// authentication failures abort the pass and are reported through
    /// `RunReport::run_failure`. Store failures are returned as errors.
    pub async fn run(&self) -> Result<RunReport, RunError> {
        let mut report = RunReport {
            dry_run: self.config.dry_run,
            ..Default::default()
        };

        if self.config.dry_run {
            info!("Dry run: nothing will be downloaded, uploaded, announced or stored");
        }

        match self.pass(&mut report).await {
            Ok(()) => {}
            Err(e @ RunError::Fatal { .. }) => {
                error!("Run aborted: {}", e);
                report.run_failure = Some(e.to_string());
                report.run_failure_fatal = true;
            }
            Err(e) => return Err(e),
        }

        self.settle_run_health(&mut report).await?;

        if let Some(sweeper) = &self.retention {
            let sweep = sweeper
                .sweep(self.store.as_ref(), Utc::now(), self.config.dry_run)
                .await?;
            report.sweep = Some(sweep);
        }

        info!(
            "Run complete: {} listed, {} new, {} acquired, {} published, {} announced, {} skipped, {} deferred, {} failed, {} alerts",
            report.listed,
            report.new_items,
            report.acquired,
            report.published,
            report.announced,
            report.skipped,
            report.deferred,
            report.failed,
            report.alerts_sent
        );

        Ok(report)
    }

    async fn pass(&self, report: &mut RunReport) -> Result<(), RunError> {
        let listing = match self.source.list_recent(self.config.max_items_per_run).await {
            Ok(items) => items,
            Err(e) if e.is_auth_failure() => {
                return Err(RunError::Fatal {
                    collaborator: self.source.name().to_string(),
                    message: e.to_string(),
                });
            }
            Err(e) => {
                let failure = format!("listing failed: {}", e);
                error!("{}; continuing with stored items only", failure);
                report.run_failure = Some(failure);
                Vec::new()
            }
        };
        report.listed = listing.len();

        let candidates = self.gather_candidates(listing, report)?;
        let mut actionable = 0;

        for Candidate { mut record, source } in candidates {
            if actionable >= self.config.max_items_per_run {
                debug!(
                    "Reached the limit of {} items for this run",
                    self.config.max_items_per_run
                );
                break;
            }

            let action = resolve(&record, source.as_ref(), &self.policy);
            match &action {
                Action::NoAction => {
                    debug!("Nothing to do for {} ({})", record.title, record.short_id());
                    continue;
                }
                Action::Acquire if source.is_none() => {
                    info!(
                        "Deferring {} ({}): not in the current listing",
                        record.title,
                        record.short_id()
                    );
                    report.deferred += 1;
                    continue;
                }
                _ => {}
            }

            if action.stage().is_some() {
                actionable += 1;
            }

            if self.config.dry_run {
                info!(
                    "[dry-run] {} ({}): {}",
                    record.title,
                    record.short_id(),
                    action
                );
                if matches!(action, Action::Skip { .. }) {
                    report.skipped += 1;
                }
                report.planned.push(PlannedAction {
                    item_id: record.id.clone(),
                    title: record.title.clone(),
                    action,
                });
                continue;
            }

            self.process_item(&mut record, source.as_ref(), report)
                .await?;
        }

        Ok(())
    }

    /// Listed items merged with stored records that still have work, newest first.
    fn gather_candidates(
        &self,
        listing: Vec<SourceItem>,
        report: &mut RunReport,
    ) -> Result<Vec<Candidate>, RunError> {
        let mut stored: HashMap<String, ItemRecord> = self
            .store
            .load()?
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for item in listing {
            if item.id.is_empty() || !seen.insert(item.id.clone()) {
                continue;
            }

            let record = match stored.remove(&item.id) {
                Some(record) => record,
                None => {
                    let record = ItemRecord::from_source(&item);
                    if !self.config.dry_run {
                        self.store.upsert(&record)?;
                    }
                    report.new_items += 1;
                    debug!("New item: {} ({})", record.title, record.short_id());
                    record
                }
            };
            candidates.push(Candidate {
                record,
                source: Some(item),
            });
        }

        candidates.extend(
            stored
                .into_values()
                .filter(|record| resolve(record, None, &self.policy).is_actionable())
                .map(|record| Candidate {
                    record,
                    source: None,
                }),
        );

        candidates.sort_by(|a, b| {
            b.record
                .created_at
                .cmp(&a.record.created_at)
                .then_with(|| a.record.id.cmp(&b.record.id))
        });

        Ok(candidates)
    }

    /// Run the item's pending stages until one fails, the item is done, or
    /// (without chaining) one stage succeeded.
    async fn process_item(
        &self,
        record: &mut ItemRecord,
        source: Option<&SourceItem>,
        report: &mut RunReport,
    ) -> Result<(), RunError> {
        loop {
            let stage = match resolve(record, source, &self.policy) {
                Action::NoAction => return Ok(()),
                Action::Skip { reason } => {
                    info!(
                        "Skipping {} ({}): {}",
                        record.title,
                        record.short_id(),
                        reason
                    );
                    record.skip_reason = Some(reason);
                    self.store.upsert(record)?;
                    report.skipped += 1;
                    return Ok(());
                }
                Action::Acquire => Stage::Acquire,
                Action::Publish => Stage::Publish,
                Action::Announce => Stage::Announce,
            };

            info!("Starting {} for {} ({})", stage, record.title, record.short_id());

            let result = match stage {
                Stage::Acquire => self.acquire(source).await,
                Stage::Publish => self.publish(record).await,
                Stage::Announce => self.announce(record).await,
            };

            match result {
                Ok(done) => {
                    let now = Utc::now();
                    match done {
                        StageDone::Acquired(path) => record.mark_acquired(path, now),
                        StageDone::Published(reference) => record.mark_published(reference, now),
                        StageDone::Announced => record.mark_announced(now),
                    }
                    let decision = self.accountant.record_success(&mut record.streak);
                    self.store.upsert(record)?;
                    report.record_success(stage);
                    info!("Finished {} for {} ({})", stage, record.title, record.short_id());

                    if let AlertDecision::Resolve {
                        failures,
                        resolved_error,
                    } = decision
                    {
                        let alert = Alert::item_resolved(
                            &record.id,
                            &record.title,
                            stage,
                            resolved_error,
                            failures,
                        );
                        self.dispatch(&alert, report).await;
                    }

                    if !self.config.chain_stages {
                        return Ok(());
                    }
                }
                Err(StepError::Fatal(e)) => return Err(e),
                Err(StepError::Failed(message)) => {
                    let error = format!("{} failed: {}", stage, message);
                    let decision = self.accountant.record_failure(&mut record.streak, &error);
                    self.store.upsert(record)?;
                    report.failed += 1;
                    warn!(
                        "{} ({}): {} (failure {})",
                        record.title,
                        record.short_id(),
                        error,
                        record.streak.failure_count
                    );

                    match decision {
                        AlertDecision::RaiseError {
                            error,
                            failure_count,
                        } => {
                            let alert = Alert::item_failure(
                                &record.id,
                                &record.title,
                                stage,
                                &error,
                                failure_count,
                            );
                            if self.dispatch(&alert, report).await {
                                self.accountant
                                    .mark_alerted(&mut record.streak, Utc::now());
                                self.store.upsert(record)?;
                            }
                        }
                        AlertDecision::Suppressed => {
                            debug!("Alert suppressed for {}: error unchanged", record.short_id());
                        }
                        AlertDecision::Silent | AlertDecision::Resolve { .. } => {}
                    }
                    return Ok(());
                }
            }
        }
    }

    async fn acquire(&self, source: Option<&SourceItem>) -> Result<StageDone, StepError> {
        let item = source
            .ok_or_else(|| StepError::Failed("item not in the current listing".to_string()))?;
        if item.assets.is_empty() {
            return Err(StepError::Failed("no recording files found".to_string()));
        }
        let asset = select_best_asset(&item.assets)
            .ok_or_else(|| StepError::Failed("no suitable video file found".to_string()))?;

        let destination = artifact_path(&self.config.download_dir, item, asset);
        let bytes = self
            .source
            .fetch(asset, &destination)
            .await
            .map_err(|e| step_error(self.source.name(), e.is_auth_failure(), e))?;

        debug!("Downloaded {} bytes to {}", bytes, destination.display());
        Ok(StageDone::Acquired(destination))
    }

    async fn publish(&self, record: &ItemRecord) -> Result<StageDone, StepError> {
        let path = record
            .local_path
            .clone()
            .ok_or_else(|| StepError::Failed("artifact missing: no local path".to_string()))?;
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StepError::Failed(format!(
                "artifact missing: {}",
                path.display()
            )));
        }

        let request = PublishRequest {
            local_path: path,
            title: display_name(&record.title, record.created_at),
            description: self.config.publish_description.clone(),
            tags: self.config.publish_tags.clone(),
        };
        let reference = self
            .publisher
            .publish(&request)
            .await
            .map_err(|e| step_error(self.publisher.name(), e.is_auth_failure(), e))?;

        if reference.trim().is_empty() {
            return Err(StepError::Failed(
                "publisher returned an empty reference".to_string(),
            ));
        }
        Ok(StageDone::Published(reference))
    }

    async fn announce(&self, record: &ItemRecord) -> Result<StageDone, StepError> {
        let reference = record
            .published_reference
            .as_deref()
            .ok_or_else(|| StepError::Failed("no published reference".to_string()))?;

        let message = render_announcement(&self.config.announce_template, &record.title, reference);
        self.announcer
            .announce(&message)
            .await
            .map_err(|e| step_error(self.announcer.name(), e.is_auth_failure(), e))?;

        Ok(StageDone::Announced)
    }

    /// Send an alert. Returns whether the channel accepted it.
    async fn dispatch(&self, alert: &Alert, report: &mut RunReport) -> bool {
        match self.alerter.send_alert(alert).await {
            Ok(()) => {
                report.alerts_sent += 1;
                true
            }
            Err(e) => {
                report.alerts_failed += 1;
                warn!("Failed to send alert \"{}\": {}", alert.headline(), e);
                false
            }
        }
    }

    /// Account the run itself. An unusable collaborator alerts on its first
    /// occurrence; a failed listing only once it reaches the alert threshold.
    /// A later healthy run resolves an alerted streak.
    async fn settle_run_health(&self, report: &mut RunReport) -> Result<(), RunError> {
        if self.config.dry_run {
            return Ok(());
        }

        let accountant = if report.run_failure_fatal {
            FailureAccountant::new(1)
        } else {
            self.accountant
        };
        let mut health = self.store.run_health()?;

        match report.run_failure.clone() {
            Some(failure) => {
                let decision = accountant.record_failure(&mut health, &failure);
                self.store.save_run_health(&health)?;

                match decision {
                    AlertDecision::RaiseError {
                        error,
                        failure_count,
                    } => {
                        if self
                            .dispatch(&Alert::run_failure(&error, failure_count), report)
                            .await
                        {
                            accountant.mark_alerted(&mut health, Utc::now());
                            self.store.save_run_health(&health)?;
                        }
                    }
                    AlertDecision::Suppressed => {
                        debug!("Run failure alert suppressed: error unchanged");
                    }
                    AlertDecision::Silent | AlertDecision::Resolve { .. } => {}
                }
            }
            None if health.is_failing() || health.is_alerted() => {
                let failed_runs = health.failure_count;
                let decision = accountant.record_success(&mut health);
                self.store.save_run_health(&health)?;
                info!("Run healthy again after {} failed runs", failed_runs);

                if let AlertDecision::Resolve {
                    failures,
                    resolved_error,
                } = decision
                {
                    self.dispatch(&Alert::run_resolved(resolved_error, failures), report)
                        .await;
                }
            }
            None => {}
        }

        Ok(())
    }
}
