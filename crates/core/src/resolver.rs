//! Stage resolver: maps an item record to the next action a run must take.
//!
//! Resolution is a pure function of the persisted record, so calling it again
//! on an unchanged record always gives the same answer. A run that crashed
//! between resolving and executing simply resolves again on the next run.

use std::fmt;

use crate::item::{ItemRecord, SourceItem, Stage};

/// The next thing to do for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Nothing to do: the item is complete or was skipped earlier.
    NoAction,
    Acquire,
    Publish,
    Announce,
    /// The item fails a precondition. Recorded once, never re-evaluated.
    Skip { reason: String },
}

impl Action {
    /// The stage this action executes, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Action::Acquire => Some(Stage::Acquire),
            Action::Publish => Some(Stage::Publish),
            Action::Announce => Some(Stage::Announce),
            Action::NoAction | Action::Skip { .. } => None,
        }
    }

    pub fn is_actionable(&self) -> bool {
        !matches!(self, Action::NoAction)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::NoAction => f.write_str("no_action"),
            Action::Acquire => f.write_str("acquire"),
            Action::Publish => f.write_str("publish"),
            Action::Announce => f.write_str("announce"),
            Action::Skip { reason } => write!(f, "skip ({})", reason),
        }
    }
}

/// Run configuration consulted by the resolver.
#[derive(Debug, Clone, Default)]
pub struct ResolvePolicy {
    /// Items shorter than this are skipped (0 disables the check).
    pub min_duration_secs: u64,
}

/// Decide the next action for `record`.
///
/// `source` is the listing entry for the item when the acquisition service
/// returned it this run. The duration precondition is only evaluated before
/// acquisition and only when the source reports a duration.
pub fn resolve(record: &ItemRecord, source: Option<&SourceItem>, policy: &ResolvePolicy) -> Action {
    if record.is_skipped() {
        return Action::NoAction;
    }

    match record.next_stage() {
        Some(Stage::Acquire) => {
            if let Some(duration) = source.and_then(|s| s.duration_secs) {
                if policy.min_duration_secs > 0 && duration < policy.min_duration_secs {
                    return Action::Skip {
                        reason: format!(
                            "recording too short: {}s < {}s",
                            duration, policy.min_duration_secs
                        ),
                    };
                }
            }
            Action::Acquire
        }
        Some(Stage::Publish) => Action::Publish,
        Some(Stage::Announce) => Action::Announce,
        None => Action::NoAction,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    fn policy() -> ResolvePolicy {
        ResolvePolicy {
            min_duration_secs: 60,
        }
    }

    fn source(duration_secs: Option<u64>) -> SourceItem {
        SourceItem {
            id: "A1".to_string(),
            title: "Weekly sync".to_string(),
            created_at: None,
            duration_secs,
            assets: vec![],
        }
    }

    #[test]
    fn test_fresh_record_resolves_to_acquire() {
        let record = ItemRecord::new("A1", "Weekly sync", None);
        assert_eq!(resolve(&record, None, &policy()), Action::Acquire);
        assert_eq!(
            resolve(&record, Some(&source(Some(3600))), &policy()),
            Action::Acquire
        );
    }

    #[test]
    fn test_stages_in_order() {
        let mut record = ItemRecord::new("A1", "Weekly sync", None);
        let now = Utc::now();

        record.mark_acquired(PathBuf::from("/v/a.mp4"), now);
        assert_eq!(resolve(&record, None, &policy()), Action::Publish);

        record.mark_published("https://youtu.be/abc".to_string(), now);
        assert_eq!(resolve(&record, None, &policy()), Action::Announce);

        record.mark_announced(now);
        assert_eq!(resolve(&record, None, &policy()), Action::NoAction);
    }

    #[test]
    fn test_failures_do_not_change_resolution() {
        let mut record = ItemRecord::new("A1", "Weekly sync", None);
        record.mark_acquired(PathBuf::from("/v/a.mp4"), Utc::now());
        record.streak.failure_count = 7;
        record.streak.last_error = Some("publish failed: quota exceeded".to_string());
        assert_eq!(resolve(&record, None, &policy()), Action::Publish);
    }

    #[test]
    fn test_resolution_is_repeatable() {
        let record = ItemRecord::new("A1", "Weekly sync", None);
        let src = source(Some(10));
        let first = resolve(&record, Some(&src), &policy());
        let second = resolve(&record, Some(&src), &policy());
        assert_eq!(first, second);
    }

    #[test]
    fn test_short_recording_is_skipped() {
        let record = ItemRecord::new("A1", "Weekly sync", None);
        let action = resolve(&record, Some(&source(Some(30))), &policy());
        assert!(matches!(action, Action::Skip { ref reason } if reason.contains("30s")));
        assert!(action.is_actionable());
        assert!(action.stage().is_none());
    }

    #[test]
    fn test_skipped_record_is_never_reevaluated() {
        let mut record = ItemRecord::new("A1", "Weekly sync", None);
        record.skip_reason = Some("recording too short: 30s < 60s".to_string());
        assert_eq!(
            resolve(&record, Some(&source(Some(7200))), &policy()),
            Action::NoAction
        );
    }

    #[test]
    fn test_unknown_duration_is_not_skipped() {
        let record = ItemRecord::new("A1", "Weekly sync", None);
        assert_eq!(
            resolve(&record, Some(&source(None)), &policy()),
            Action::Acquire
        );
    }

    #[test]
    fn test_zero_minimum_disables_check() {
        let record = ItemRecord::new("A1", "Weekly sync", None);
        let policy = ResolvePolicy::default();
        assert_eq!(
            resolve(&record, Some(&source(Some(1))), &policy),
            Action::Acquire
        );
    }

    #[test]
    fn test_duration_ignored_after_acquire() {
        let mut record = ItemRecord::new("A1", "Weekly sync", None);
        record.mark_acquired(PathBuf::from("/v/a.mp4"), Utc::now());
        assert_eq!(
            resolve(&record, Some(&source(Some(5))), &policy()),
            Action::Publish
        );
    }
}
