//! Item record and source item types.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the three ordered stages an item moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Acquire,
    Publish,
    Announce,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Acquire => "acquire",
            Stage::Publish => "publish",
            Stage::Announce => "announce",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consecutive-failure bookkeeping shared by item records and run health.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureStreak {
    /// Consecutive failures since the last success of any stage.
    pub failure_count: u32,
    /// Error text of the most recent failed attempt.
    pub last_error: Option<String>,
    /// When an error alert was last dispatched for this streak.
    pub error_alert_sent_at: Option<DateTime<Utc>>,
    /// The error text that triggered the most recent error alert.
    pub last_alerted_error: Option<String>,
}

impl FailureStreak {
    /// Whether the most recent attempt failed.
    pub fn is_failing(&self) -> bool {
        self.last_error.is_some()
    }

    /// Whether an error alert is outstanding for this streak.
    pub fn is_alerted(&self) -> bool {
        self.error_alert_sent_at.is_some()
    }
}

/// Persisted state for one source item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Identity token supplied by the acquisition service. Never generated locally.
    pub id: String,
    /// Display label.
    pub title: String,
    /// When the source item originated.
    pub created_at: Option<DateTime<Utc>>,
    /// Location of the retained artifact. Cleared by the retention sweeper.
    pub local_path: Option<PathBuf>,
    pub acquired_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    /// Public reference returned by the publishing service.
    pub published_reference: Option<String>,
    pub announced_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub streak: FailureStreak,
    /// Why the item was permanently skipped, if it was.
    pub skip_reason: Option<String>,
}

impl ItemRecord {
    /// A fresh record for an identity seen for the first time.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        created_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            created_at,
            local_path: None,
            acquired_at: None,
            published_at: None,
            published_reference: None,
            announced_at: None,
            streak: FailureStreak::default(),
            skip_reason: None,
        }
    }

    /// A fresh record built from a listed source item.
    pub fn from_source(item: &SourceItem) -> Self {
        Self::new(item.id.clone(), item.title.clone(), item.created_at)
    }

    /// The first stage whose completion marker is unset.
    pub fn next_stage(&self) -> Option<Stage> {
        if self.acquired_at.is_none() {
            Some(Stage::Acquire)
        } else if self.published_at.is_none() {
            Some(Stage::Publish)
        } else if self.announced_at.is_none() {
            Some(Stage::Announce)
        } else {
            None
        }
    }

    /// All three completion markers are set.
    pub fn is_complete(&self) -> bool {
        self.next_stage().is_none()
    }

    pub fn is_skipped(&self) -> bool {
        self.skip_reason.is_some()
    }

    pub fn mark_acquired(&mut self, path: PathBuf, at: DateTime<Utc>) {
        self.local_path = Some(path);
        self.acquired_at = Some(at);
    }

    pub fn mark_published(&mut self, reference: String, at: DateTime<Utc>) {
        self.published_reference = Some(reference);
        self.published_at = Some(at);
    }

    pub fn mark_announced(&mut self, at: DateTime<Utc>) {
        self.announced_at = Some(at);
    }

    /// Identity shortened for human-facing text.
    pub fn short_id(&self) -> String {
        short_id(&self.id)
    }

    /// Checks the stage-ordering and pairing invariants.
    ///
    /// `local_path` may be empty on an acquired record only once the item has
    /// been announced (the retention sweeper clears it).
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.published_at.is_some() && self.acquired_at.is_none() {
            return Err("published without being acquired".to_string());
        }
        if self.announced_at.is_some() && self.published_at.is_none() {
            return Err("announced without being published".to_string());
        }
        if self.local_path.is_some() && self.acquired_at.is_none() {
            return Err("local path set without acquisition".to_string());
        }
        if self.acquired_at.is_some() && self.local_path.is_none() && self.announced_at.is_none() {
            return Err("acquired but local path missing".to_string());
        }
        if self.published_at.is_some() != self.published_reference.is_some() {
            return Err("published marker and reference disagree".to_string());
        }
        if self.streak.is_failing() != (self.streak.failure_count > 0) {
            return Err("failure count and last error disagree".to_string());
        }
        Ok(())
    }
}

/// First eight characters of an identity, for logs and alerts.
pub fn short_id(id: &str) -> String {
    if id.chars().count() > 8 {
        format!("{}...", id.chars().take(8).collect::<String>())
    } else {
        id.to_string()
    }
}

/// One downloadable variant of a source item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Variant kind as reported by the source (e.g. `gallery_view`).
    pub kind: String,
    pub download_url: String,
    /// File extension without the dot (e.g. `mp4`).
    pub file_extension: String,
    pub recording_start: Option<DateTime<Utc>>,
    pub recording_end: Option<DateTime<Utc>>,
}

/// An item as listed by the acquisition service. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceItem {
    pub id: String,
    pub title: String,
    pub created_at: Option<DateTime<Utc>>,
    /// Length of the recording, when the source reports one.
    pub duration_secs: Option<u64>,
    pub assets: Vec<Asset>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ItemRecord {
        ItemRecord::new("A1", "Weekly sync", None)
    }

    #[test]
    fn test_new_record_is_empty() {
        let r = record();
        assert_eq!(r.streak.failure_count, 0);
        assert!(r.streak.last_error.is_none());
        assert!(r.local_path.is_none());
        assert_eq!(r.next_stage(), Some(Stage::Acquire));
        assert!(r.check_invariants().is_ok());
    }

    #[test]
    fn test_next_stage_follows_markers() {
        let mut r = record();
        let now = Utc::now();
        r.mark_acquired(PathBuf::from("/videos/a.mp4"), now);
        assert_eq!(r.next_stage(), Some(Stage::Publish));
        r.mark_published("https://youtu.be/x".to_string(), now);
        assert_eq!(r.next_stage(), Some(Stage::Announce));
        r.mark_announced(now);
        assert_eq!(r.next_stage(), None);
        assert!(r.is_complete());
        assert!(r.check_invariants().is_ok());
    }

    #[test]
    fn test_invariants_reject_out_of_order_markers() {
        let mut r = record();
        r.published_at = Some(Utc::now());
        r.published_reference = Some("ref".to_string());
        assert!(r.check_invariants().is_err());
    }

    #[test]
    fn test_swept_record_keeps_invariants() {
        let mut r = record();
        let now = Utc::now();
        r.mark_acquired(PathBuf::from("/videos/a.mp4"), now);
        r.mark_published("ref".to_string(), now);
        r.mark_announced(now);
        r.local_path = None;
        assert!(r.check_invariants().is_ok());
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("abc"), "abc");
        assert_eq!(short_id("abcdefghijkl"), "abcdefgh...");
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Publish.to_string(), "publish");
    }
}
