//! Testing utilities and mock implementations.
//!
//! Mock implementations of every collaborator trait, so a full run can be
//! exercised against a real store without any network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use reelay_core::testing::{fixtures, MockAlerter, MockAnnouncer, MockPublisher, MockSource};
//!
//! let source = MockSource::new();
//! source.set_items(vec![fixtures::recording("uuid-1", "Weekly sync")]).await;
//!
//! let publisher = MockPublisher::new();
//! publisher.queue_error(PublishError::Failed("quota exceeded".into())).await;
//!
//! // Wire into RunOrchestrator::new(...)
//! ```

mod mock_announcer;
mod mock_publisher;
mod mock_source;

pub use mock_announcer::{MockAlerter, MockAnnouncer};
pub use mock_publisher::MockPublisher;
pub use mock_source::{MockSource, RecordedFetch};

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::{TimeZone, Utc};

    use crate::item::{Asset, SourceItem};

    /// An asset of the given kind with a plausible download URL.
    pub fn asset(kind: &str) -> Asset {
        Asset {
            kind: kind.to_string(),
            download_url: format!("https://zoom.example/rec/{}", kind),
            file_extension: if kind == "audio_only" { "M4A" } else { "MP4" }.to_string(),
            recording_start: None,
            recording_end: None,
        }
    }

    /// A 45 minute recording from 2025-03-01 with a gallery view and an
    /// audio-only file.
    pub fn recording(id: &str, title: &str) -> SourceItem {
        recording_at(id, title, 2025, 3, 1)
    }

    /// Like [`recording`], created at 10:00 UTC on the given day.
    pub fn recording_at(id: &str, title: &str, year: i32, month: u32, day: u32) -> SourceItem {
        SourceItem {
            id: id.to_string(),
            title: title.to_string(),
            created_at: Utc.with_ymd_and_hms(year, month, day, 10, 0, 0).single(),
            duration_secs: Some(45 * 60),
            assets: vec![asset("gallery_view"), asset("audio_only")],
        }
    }
}
