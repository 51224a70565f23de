//! Retention sweeper: removes local artifacts of items that finished the
//! pipeline long enough ago.
//!
//! Independent of the stage machine. Only records with `announced_at` set are
//! ever touched, so an artifact still needed for a publish or announce retry
//! is never deleted regardless of its age.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::item::{ItemRecord, StoreError, TrackingStore};

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records whose artifact was removed and `local_path` cleared.
    pub deleted: usize,
    /// Artifacts that would be removed (dry-run only).
    pub would_delete: Vec<PathBuf>,
    /// Deletions that failed; `local_path` was kept.
    pub failed: usize,
}

/// Deletes artifacts of announced items once the retention period elapsed.
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    retention: Duration,
    download_root: PathBuf,
}

impl RetentionSweeper {
    /// `download_root` itself is never removed, even when it ends up empty.
    pub fn new(retention: Duration, download_root: impl Into<PathBuf>) -> Self {
        Self {
            retention,
            download_root: download_root.into(),
        }
    }

    pub fn from_days(days: u32, download_root: impl Into<PathBuf>) -> Self {
        Self::new(Duration::days(i64::from(days)), download_root)
    }

    /// Whether `record`'s artifact is due for deletion at `now`.
    pub fn is_expired(&self, record: &ItemRecord, now: DateTime<Utc>) -> bool {
        match (&record.local_path, record.announced_at) {
            (Some(_), Some(announced_at)) => now - announced_at >= self.retention,
            _ => false,
        }
    }

    /// Sweep every record in `store`.
    ///
    /// Store errors abort the sweep; file-system errors are per record.
    pub async fn sweep(
        &self,
        store: &dyn TrackingStore,
        now: DateTime<Utc>,
        dry_run: bool,
    ) -> Result<SweepReport, StoreError> {
        let mut report = SweepReport::default();

        for mut record in store.load()? {
            if !self.is_expired(&record, now) {
                continue;
            }
            let Some(path) = record.local_path.clone() else {
                continue;
            };

            if dry_run {
                info!(
                    "[dry-run] Would delete {} ({})",
                    path.display(),
                    record.short_id()
                );
                report.would_delete.push(path);
                continue;
            }

            match remove_artifact(&path).await {
                Ok(()) => {
                    self.remove_empty_parent(&path).await;
                    record.local_path = None;
                    store.upsert(&record)?;
                    report.deleted += 1;
                    info!("Deleted old artifact: {}", path.display());
                }
                Err(e) => {
                    report.failed += 1;
                    warn!("Failed to delete {}: {}", path.display(), e);
                }
            }
        }

        if report.deleted > 0 || report.failed > 0 {
            info!(
                "Retention sweep: {} deleted, {} failed",
                report.deleted, report.failed
            );
        }
        Ok(report)
    }

    async fn remove_empty_parent(&self, path: &Path) {
        let Some(parent) = path.parent() else {
            return;
        };
        if parent.as_os_str().is_empty() || parent == self.download_root {
            return;
        }

        // remove_dir refuses non-empty directories, which is exactly the rule.
        match fs::remove_dir(parent).await {
            Ok(()) => debug!("Removed empty directory {}", parent.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => debug!("Kept directory {}: {}", parent.display(), e),
        }
    }
}

/// Delete a file. A file that is already gone counts as deleted.
async fn remove_artifact(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::SqliteTrackingStore;

    fn announced(id: &str, path: PathBuf, announced_at: DateTime<Utc>) -> ItemRecord {
        let mut record = ItemRecord::new(id, "Weekly sync", None);
        record.mark_acquired(path, announced_at - Duration::hours(2));
        record.mark_published("https://youtu.be/x".to_string(), announced_at - Duration::hours(1));
        record.mark_announced(announced_at);
        record
    }

    #[tokio::test]
    async fn test_deletes_expired_artifact_and_empty_dir() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("2025-01-01 10-00 - Weekly sync");
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("gallery_view.mp4");
        std::fs::write(&file, b"video").unwrap();

        let store = SqliteTrackingStore::in_memory().unwrap();
        let now = Utc::now();
        store
            .upsert(&announced("a1", file.clone(), now - Duration::days(11)))
            .unwrap();

        let sweeper = RetentionSweeper::from_days(10, root.path());
        let report = sweeper.sweep(&store, now, false).await.unwrap();

        assert_eq!(report.deleted, 1);
        assert!(!file.exists());
        assert!(!dir.exists());
        assert!(root.path().exists());

        let record = store.get("a1").unwrap().unwrap();
        assert!(record.local_path.is_none());
        assert!(record.acquired_at.is_some());
        assert!(record.announced_at.is_some());
        assert!(record.check_invariants().is_ok());
    }

    #[tokio::test]
    async fn test_never_deletes_unannounced() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("pending.mp4");
        std::fs::write(&file, b"video").unwrap();

        let store = SqliteTrackingStore::in_memory().unwrap();
        let long_ago = Utc::now() - Duration::days(400);
        let mut record = ItemRecord::new("p1", "Pending", Some(long_ago));
        record.mark_acquired(file.clone(), long_ago);
        record.mark_published("https://youtu.be/p".to_string(), long_ago);
        store.upsert(&record).unwrap();

        let sweeper = RetentionSweeper::from_days(10, root.path());
        let report = sweeper.sweep(&store, Utc::now(), false).await.unwrap();

        assert_eq!(report, SweepReport::default());
        assert!(file.exists());
        assert_eq!(store.get("p1").unwrap().unwrap().local_path, Some(file));
    }

    #[tokio::test]
    async fn test_keeps_recent_artifact() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("recent.mp4");
        std::fs::write(&file, b"video").unwrap();

        let store = SqliteTrackingStore::in_memory().unwrap();
        let now = Utc::now();
        store
            .upsert(&announced("r1", file.clone(), now - Duration::days(3)))
            .unwrap();

        let sweeper = RetentionSweeper::from_days(10, root.path());
        let report = sweeper.sweep(&store, now, false).await.unwrap();
        assert_eq!(report.deleted, 0);
        assert!(file.exists());
    }

    #[tokio::test]
    async fn test_missing_file_counts_as_deleted() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("gone").join("video.mp4");

        let store = SqliteTrackingStore::in_memory().unwrap();
        let now = Utc::now();
        store
            .upsert(&announced("g1", file, now - Duration::days(30)))
            .unwrap();

        let sweeper = RetentionSweeper::from_days(10, root.path());
        let report = sweeper.sweep(&store, now, false).await.unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(report.failed, 0);
        assert!(store.get("g1").unwrap().unwrap().local_path.is_none());
    }

    #[tokio::test]
    async fn test_keeps_non_empty_parent() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("shared");
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("video.mp4");
        std::fs::write(&file, b"video").unwrap();
        std::fs::write(dir.join("notes.txt"), b"keep me").unwrap();

        let store = SqliteTrackingStore::in_memory().unwrap();
        let now = Utc::now();
        store
            .upsert(&announced("s1", file.clone(), now - Duration::days(30)))
            .unwrap();

        let sweeper = RetentionSweeper::from_days(10, root.path());
        sweeper.sweep(&store, now, false).await.unwrap();
        assert!(!file.exists());
        assert!(dir.join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_dry_run_changes_nothing() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("old.mp4");
        std::fs::write(&file, b"video").unwrap();

        let store = SqliteTrackingStore::in_memory().unwrap();
        let now = Utc::now();
        let record = announced("d1", file.clone(), now - Duration::days(30));
        store.upsert(&record).unwrap();

        let sweeper = RetentionSweeper::from_days(10, root.path());
        let report = sweeper.sweep(&store, now, true).await.unwrap();

        assert_eq!(report.would_delete, vec![file.clone()]);
        assert_eq!(report.deleted, 0);
        assert!(file.exists());
        assert_eq!(store.get("d1").unwrap().unwrap(), record);
    }
}
