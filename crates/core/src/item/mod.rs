//! Item records and the tracking store that persists them between runs.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteTrackingStore;
pub use store::{StoreError, TrackingStore};
pub use types::{short_id, Asset, FailureStreak, ItemRecord, SourceItem, Stage};
