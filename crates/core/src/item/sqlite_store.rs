//! SQLite-backed tracking store implementation.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use super::{FailureStreak, ItemRecord, StoreError, TrackingStore};

const ITEM_COLUMNS: &str = "id, title, created_at, local_path, acquired_at, published_at, \
     published_reference, announced_at, failure_count, last_error, error_alert_sent_at, \
     last_alerted_error, skip_reason";

/// Columns that may be missing from a database written by an older version.
/// Appended in order; every one is optional or defaulted.
const ITEM_MIGRATIONS: &[(&str, &str)] = &[
    ("title", "TEXT NOT NULL DEFAULT ''"),
    ("created_at", "TEXT"),
    ("local_path", "TEXT"),
    ("acquired_at", "TEXT"),
    ("published_at", "TEXT"),
    ("published_reference", "TEXT"),
    ("announced_at", "TEXT"),
    ("failure_count", "INTEGER NOT NULL DEFAULT 0"),
    ("last_error", "TEXT"),
    ("error_alert_sent_at", "TEXT"),
    ("last_alerted_error", "TEXT"),
    ("skip_reason", "TEXT"),
];

const RUN_SCOPE: &str = "run";

/// SQLite-backed tracking store.
pub struct SqliteTrackingStore {
    conn: Mutex<Connection>,
    /// Select list for `items`; `None` when the table does not exist.
    item_select: Option<String>,
    has_run_health: bool,
}

/// A row as read from disk, before timestamps are interpreted.
struct RawItem {
    id: String,
    title: Option<String>,
    created_at: Option<String>,
    local_path: Option<String>,
    acquired_at: Option<String>,
    published_at: Option<String>,
    published_reference: Option<String>,
    announced_at: Option<String>,
    failure_count: Option<i64>,
    last_error: Option<String>,
    error_alert_sent_at: Option<String>,
    last_alerted_error: Option<String>,
    skip_reason: Option<String>,
}

impl SqliteTrackingStore {
    /// Open the store at `path`, creating the file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self::with_current_schema(conn))
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self::with_current_schema(conn))
    }

    /// Open the store at `path` without ever writing to it.
    ///
    /// No file is created and no schema migration runs. Columns missing from
    /// an older schema read as absent. A missing file behaves as an empty
    /// store. Every write fails.
    pub fn open_read_only(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            tracing::info!(
                "Tracking store {} does not exist; reading as empty",
                path.display()
            );
            let conn = Connection::open_in_memory()?;
            return Ok(Self {
                conn: Mutex::new(conn),
                item_select: None,
                has_run_health: false,
            });
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let existing = Self::column_names(&conn, "items")?;
        let item_select = if existing.is_empty() {
            None
        } else {
            let columns: Vec<String> = ITEM_COLUMNS
                .split(',')
                .map(str::trim)
                .map(|column| {
                    if existing.iter().any(|c| c == column) {
                        column.to_string()
                    } else {
                        format!("NULL AS {}", column)
                    }
                })
                .collect();
            Some(columns.join(", "))
        };
        let has_run_health = !Self::column_names(&conn, "run_health")?.is_empty();

        Ok(Self {
            conn: Mutex::new(conn),
            item_select,
            has_run_health,
        })
    }

    fn with_current_schema(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            item_select: Some(ITEM_COLUMNS.to_string()),
            has_run_health: true,
        }
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;

            CREATE TABLE IF NOT EXISTS items (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL DEFAULT '',
                created_at TEXT,
                local_path TEXT,
                acquired_at TEXT,
                published_at TEXT,
                published_reference TEXT,
                announced_at TEXT,
                failure_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                error_alert_sent_at TEXT,
                last_alerted_error TEXT,
                skip_reason TEXT
            );

            CREATE TABLE IF NOT EXISTS run_health (
                scope TEXT PRIMARY KEY,
                failure_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                error_alert_sent_at TEXT,
                last_alerted_error TEXT
            );
            "#,
        )?;

        let existing = Self::column_names(conn, "items")?;
        for (column, decl) in ITEM_MIGRATIONS {
            if !existing.iter().any(|c| c == column) {
                tracing::info!("Migrating tracking store: adding column {}", column);
                conn.execute(
                    &format!("ALTER TABLE items ADD COLUMN {} {}", column, decl),
                    [],
                )?;
            }
        }

        Ok(())
    }

    fn column_names(conn: &Connection, table: &str) -> Result<Vec<String>, StoreError> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("tracking store lock poisoned".to_string()))
    }

    fn row_to_raw(row: &rusqlite::Row) -> rusqlite::Result<RawItem> {
        Ok(RawItem {
            id: row.get(0)?,
            title: row.get(1)?,
            created_at: row.get(2)?,
            local_path: row.get(3)?,
            acquired_at: row.get(4)?,
            published_at: row.get(5)?,
            published_reference: row.get(6)?,
            announced_at: row.get(7)?,
            failure_count: row.get(8)?,
            last_error: row.get(9)?,
            error_alert_sent_at: row.get(10)?,
            last_alerted_error: row.get(11)?,
            skip_reason: row.get(12)?,
        })
    }
}

impl RawItem {
    fn into_record(self) -> Result<ItemRecord, StoreError> {
        let id = self.id;
        let streak = streak_from_columns(
            &id,
            self.failure_count,
            self.last_error,
            self.error_alert_sent_at,
            self.last_alerted_error,
        )?;

        Ok(ItemRecord {
            created_at: parse_timestamp(&id, "created_at", self.created_at)?,
            acquired_at: parse_timestamp(&id, "acquired_at", self.acquired_at)?,
            published_at: parse_timestamp(&id, "published_at", self.published_at)?,
            announced_at: parse_timestamp(&id, "announced_at", self.announced_at)?,
            title: self.title.unwrap_or_default(),
            local_path: non_empty(self.local_path).map(PathBuf::from),
            published_reference: non_empty(self.published_reference),
            streak,
            skip_reason: non_empty(self.skip_reason),
            id,
        })
    }
}

fn streak_from_columns(
    id: &str,
    failure_count: Option<i64>,
    last_error: Option<String>,
    error_alert_sent_at: Option<String>,
    last_alerted_error: Option<String>,
) -> Result<FailureStreak, StoreError> {
    let failure_count = u32::try_from(failure_count.unwrap_or(0)).map_err(|_| {
        StoreError::Corrupt {
            id: id.to_string(),
            reason: format!("invalid failure_count {:?}", failure_count),
        }
    })?;

    Ok(FailureStreak {
        failure_count,
        last_error: non_empty(last_error),
        error_alert_sent_at: parse_timestamp(id, "error_alert_sent_at", error_alert_sent_at)?,
        last_alerted_error: non_empty(last_alerted_error),
    })
}

/// Empty strings are treated the same as absent values.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn parse_timestamp(
    id: &str,
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    match non_empty(value) {
        None => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| StoreError::Corrupt {
                id: id.to_string(),
                reason: format!("{} is not a timestamp ({:?}): {}", column, s, e),
            }),
    }
}

fn format_timestamp(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(|dt| dt.to_rfc3339())
}

impl TrackingStore for SqliteTrackingStore {
    fn load(&self) -> Result<Vec<ItemRecord>, StoreError> {
        let Some(select) = &self.item_select else {
            return Ok(Vec::new());
        };
        let conn = self.lock()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM items ORDER BY rowid ASC",
            select
        ))?;

        let rows = stmt.query_map([], Self::row_to_raw)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        Ok(records)
    }

    fn get(&self, id: &str) -> Result<Option<ItemRecord>, StoreError> {
        let Some(select) = &self.item_select else {
            return Ok(None);
        };
        let conn = self.lock()?;

        let raw = conn
            .query_row(
                &format!("SELECT {} FROM items WHERE id = ?", select),
                params![id],
                Self::row_to_raw,
            )
            .optional()?;

        raw.map(RawItem::into_record).transpose()
    }

    fn upsert(&self, record: &ItemRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;

        // ON CONFLICT keeps the original rowid, which preserves first-seen order.
        conn.execute(
            &format!(
                "INSERT INTO items ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    created_at = excluded.created_at,
                    local_path = excluded.local_path,
                    acquired_at = excluded.acquired_at,
                    published_at = excluded.published_at,
                    published_reference = excluded.published_reference,
                    announced_at = excluded.announced_at,
                    failure_count = excluded.failure_count,
                    last_error = excluded.last_error,
                    error_alert_sent_at = excluded.error_alert_sent_at,
                    last_alerted_error = excluded.last_alerted_error,
                    skip_reason = excluded.skip_reason",
                ITEM_COLUMNS
            ),
            params![
                record.id,
                record.title,
                format_timestamp(record.created_at),
                record
                    .local_path
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned()),
                format_timestamp(record.acquired_at),
                format_timestamp(record.published_at),
                record.published_reference,
                format_timestamp(record.announced_at),
                record.streak.failure_count,
                record.streak.last_error,
                format_timestamp(record.streak.error_alert_sent_at),
                record.streak.last_alerted_error,
                record.skip_reason,
            ],
        )?;

        Ok(())
    }

    fn exists(&self, id: &str) -> Result<bool, StoreError> {
        if self.item_select.is_none() {
            return Ok(false);
        }
        let conn = self.lock()?;
        let found = conn
            .query_row("SELECT 1 FROM items WHERE id = ?", params![id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn run_health(&self) -> Result<FailureStreak, StoreError> {
        if !self.has_run_health {
            return Ok(FailureStreak::default());
        }
        let conn = self.lock()?;

        let raw = conn
            .query_row(
                "SELECT failure_count, last_error, error_alert_sent_at, last_alerted_error \
                 FROM run_health WHERE scope = ?",
                params![RUN_SCOPE],
                |row| {
                    Ok((
                        row.get::<_, Option<i64>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()?;

        match raw {
            None => Ok(FailureStreak::default()),
            Some((count, last_error, sent_at, alerted)) => {
                streak_from_columns(RUN_SCOPE, count, last_error, sent_at, alerted)
            }
        }
    }

    fn save_run_health(&self, health: &FailureStreak) -> Result<(), StoreError> {
        let conn = self.lock()?;

        conn.execute(
            "INSERT INTO run_health (scope, failure_count, last_error, error_alert_sent_at, last_alerted_error)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(scope) DO UPDATE SET
                failure_count = excluded.failure_count,
                last_error = excluded.last_error,
                error_alert_sent_at = excluded.error_alert_sent_at,
                last_alerted_error = excluded.last_alerted_error",
            params![
                RUN_SCOPE,
                health.failure_count,
                health.last_error,
                format_timestamp(health.error_alert_sent_at),
                health.last_alerted_error,
            ],
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> SqliteTrackingStore {
        SqliteTrackingStore::in_memory().unwrap()
    }

    fn sample_record(id: &str) -> ItemRecord {
        ItemRecord::new(id, format!("Meeting {}", id), Some(Utc::now()))
    }

    #[test]
    fn test_upsert_and_get() {
        let store = create_test_store();
        let record = sample_record("A1");

        store.upsert(&record).unwrap();

        let fetched = store.get("A1").unwrap().unwrap();
        assert_eq!(fetched, record);
    }

    #[test]
    fn test_get_nonexistent_record() {
        let store = create_test_store();
        assert!(store.get("missing").unwrap().is_none());
        assert!(!store.exists("missing").unwrap());
    }

    #[test]
    fn test_upsert_replaces_existing() {
        let store = create_test_store();
        let mut record = sample_record("A1");
        store.upsert(&record).unwrap();

        record.mark_acquired(PathBuf::from("/videos/A1/gallery_view.mp4"), Utc::now());
        record.streak.failure_count = 2;
        record.streak.last_error = Some("publish failed: quota exceeded".to_string());
        store.upsert(&record).unwrap();

        let all = store.load().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], record);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let store = create_test_store();
        let record = sample_record("A1");

        store.upsert(&record).unwrap();
        store.upsert(&record).unwrap();

        let all = store.load().unwrap();
        assert_eq!(all, vec![record]);
    }

    #[test]
    fn test_load_preserves_first_seen_order() {
        let store = create_test_store();
        for id in ["c", "a", "b"] {
            store.upsert(&sample_record(id)).unwrap();
        }

        // Updating the first record must not move it to the end.
        let mut first = store.get("c").unwrap().unwrap();
        first.title = "renamed".to_string();
        store.upsert(&first).unwrap();

        let ids: Vec<String> = store.load().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_exists() {
        let store = create_test_store();
        store.upsert(&sample_record("A1")).unwrap();
        assert!(store.exists("A1").unwrap());
    }

    #[test]
    fn test_opens_older_schema() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("tracker.db");

        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute_batch(
                r#"
                CREATE TABLE items (
                    id TEXT PRIMARY KEY,
                    title TEXT,
                    created_at TEXT,
                    local_path TEXT,
                    acquired_at TEXT
                );
                INSERT INTO items (id, title, created_at, local_path, acquired_at)
                VALUES ('old-1', 'Old meeting', '2025-01-02T10:00:00+00:00',
                        '/videos/old/gallery_view.mp4', '2025-01-02T11:00:00+00:00');
                "#,
            )
            .unwrap();
        }

        let store = SqliteTrackingStore::new(&db_path).unwrap();
        let records = store.load().unwrap();
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(record.title, "Old meeting");
        assert!(record.acquired_at.is_some());
        assert!(record.published_at.is_none());
        assert_eq!(record.streak.failure_count, 0);
        assert!(record.streak.last_error.is_none());
        assert!(record.skip_reason.is_none());
    }

    #[test]
    fn test_read_only_open_leaves_older_schema_untouched() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("tracker.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute_batch(
                r#"
                CREATE TABLE items (id TEXT PRIMARY KEY, title TEXT);
                INSERT INTO items (id, title) VALUES ('old-1', 'Old meeting');
                "#,
            )
            .unwrap();
        }
        let before = std::fs::read(&db_path).unwrap();

        let store = SqliteTrackingStore::open_read_only(&db_path).unwrap();
        let records = store.load().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Old meeting");
        assert!(records[0].acquired_at.is_none());
        assert!(store.exists("old-1").unwrap());
        assert_eq!(store.run_health().unwrap(), FailureStreak::default());
        assert!(store.upsert(&sample_record("new")).is_err());
        drop(store);

        assert_eq!(std::fs::read(&db_path).unwrap(), before);
        let conn = Connection::open(&db_path).unwrap();
        let columns = SqliteTrackingStore::column_names(&conn, "items").unwrap();
        assert_eq!(columns, vec!["id", "title"]);
    }

    #[test]
    fn test_read_only_open_of_missing_file_is_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("absent.db");

        let store = SqliteTrackingStore::open_read_only(&db_path).unwrap();
        assert!(store.load().unwrap().is_empty());
        assert!(store.get("x").unwrap().is_none());
        assert!(!db_path.exists());
    }

    #[test]
    fn test_corrupt_timestamp_is_reported() {
        let store = create_test_store();
        {
            let conn = store.lock().unwrap();
            conn.execute(
                "INSERT INTO items (id, title, acquired_at) VALUES ('bad', 't', 'yesterday')",
                [],
            )
            .unwrap();
        }

        let err = store.load().unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { ref id, .. } if id == "bad"));
    }

    #[test]
    fn test_empty_strings_load_as_absent() {
        let store = create_test_store();
        {
            let conn = store.lock().unwrap();
            conn.execute(
                "INSERT INTO items (id, title, local_path, last_error, acquired_at) \
                 VALUES ('e', 't', '', '', '')",
                [],
            )
            .unwrap();
        }

        let record = store.get("e").unwrap().unwrap();
        assert!(record.local_path.is_none());
        assert!(record.streak.last_error.is_none());
        assert!(record.acquired_at.is_none());
    }

    #[test]
    fn test_file_based_store_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("tracker.db");

        let record = sample_record("A1");
        {
            let store = SqliteTrackingStore::new(&db_path).unwrap();
            store.upsert(&record).unwrap();
        }

        assert!(db_path.exists());
        let store = SqliteTrackingStore::new(&db_path).unwrap();
        assert_eq!(store.get("A1").unwrap(), Some(record));
    }

    #[test]
    fn test_run_health_defaults_and_saves() {
        let store = create_test_store();
        assert_eq!(store.run_health().unwrap(), FailureStreak::default());

        let health = FailureStreak {
            failure_count: 1,
            last_error: Some("zoom: unauthorized".to_string()),
            error_alert_sent_at: Some(Utc::now()),
            last_alerted_error: Some("zoom: unauthorized".to_string()),
        };
        store.save_run_health(&health).unwrap();
        assert_eq!(store.run_health().unwrap(), health);

        store.save_run_health(&FailureStreak::default()).unwrap();
        assert_eq!(store.run_health().unwrap(), FailureStreak::default());
    }
}
