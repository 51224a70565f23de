//! Run configuration.

use std::path::PathBuf;

use crate::config::Config;

/// Everything one run needs to know, passed in at construction.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Upper bound on actionable items processed in one run.
    pub max_items_per_run: usize,
    /// Recordings shorter than this are skipped (0 disables the check).
    pub min_duration_secs: u64,
    /// Consecutive failures before an item alert is sent.
    pub alert_threshold: u32,
    /// Continue an item with its next stage in the same run.
    pub chain_stages: bool,
    /// Resolve and report, but change nothing and call nothing.
    pub dry_run: bool,
    /// Where acquired artifacts are written.
    pub download_dir: PathBuf,
    /// Announcement text. `{title}` and `{reference}` are substituted.
    pub announce_template: String,
    pub publish_description: String,
    pub publish_tags: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_items_per_run: 3,
            min_duration_secs: 60,
            alert_threshold: 3,
            chain_stages: true,
            dry_run: false,
            download_dir: PathBuf::from("downloaded_videos"),
            announce_template: "{reference}".to_string(),
            publish_description: "Uploaded via automation".to_string(),
            publish_tags: Vec::new(),
        }
    }
}

impl RunConfig {
    /// Build from the application configuration.
    pub fn from_config(config: &Config) -> Self {
        let pipeline = &config.pipeline;
        Self {
            max_items_per_run: pipeline.max_items_per_run,
            min_duration_secs: pipeline.min_duration_secs,
            alert_threshold: pipeline.alert_threshold,
            chain_stages: pipeline.chain_stages,
            dry_run: false,
            download_dir: pipeline.download_dir.clone(),
            announce_template: pipeline.announce_template.clone(),
            publish_description: config.youtube.description.clone(),
            publish_tags: config.youtube.tags.clone(),
        }
    }
}
