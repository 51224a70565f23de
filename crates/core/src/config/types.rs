use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::acquisition::ZoomConfig;
use crate::announcer::DiscordConfig;
use crate::publisher::YouTubeConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub zoom: ZoomConfig,
    pub youtube: YouTubeConfig,
    pub discord: DiscordConfig,
}

/// Pipeline behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Upper bound on actionable items processed in one run.
    #[serde(default = "default_max_items")]
    pub max_items_per_run: usize,
    /// Recordings shorter than this are skipped for good (0 disables).
    #[serde(default = "default_min_duration")]
    pub min_duration_secs: u64,
    /// Consecutive failures before an item alert is sent.
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: u32,
    /// Days a fully announced artifact is kept on disk.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    /// Continue with the next stage of an item in the same run.
    #[serde(default = "default_chain_stages")]
    pub chain_stages: bool,
    /// Announcement text. `{title}` and `{reference}` are substituted.
    #[serde(default = "default_announce_template")]
    pub announce_template: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_items_per_run: default_max_items(),
            min_duration_secs: default_min_duration(),
            alert_threshold: default_alert_threshold(),
            retention_days: default_retention_days(),
            download_dir: default_download_dir(),
            chain_stages: default_chain_stages(),
            announce_template: default_announce_template(),
        }
    }
}

fn default_max_items() -> usize {
    3
}

fn default_min_duration() -> u64 {
    60
}

fn default_alert_threshold() -> u32 {
    3
}

fn default_retention_days() -> u32 {
    10
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloaded_videos")
}

fn default_chain_stages() -> bool {
    true
}

fn default_announce_template() -> String {
    "{reference}".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("reelay.db")
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Also append logs to this file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_defaults() {
        let pipeline = PipelineConfig::default();
        assert_eq!(pipeline.max_items_per_run, 3);
        assert_eq!(pipeline.min_duration_secs, 60);
        assert_eq!(pipeline.alert_threshold, 3);
        assert_eq!(pipeline.retention_days, 10);
        assert_eq!(pipeline.download_dir, PathBuf::from("downloaded_videos"));
        assert!(pipeline.chain_stages);
        assert_eq!(pipeline.announce_template, "{reference}");
    }

    #[test]
    fn test_deserialize_partial_pipeline() {
        let pipeline: PipelineConfig = toml::from_str(
            r#"
            alert_threshold = 5
            chain_stages = false
        "#,
        )
        .unwrap();
        assert_eq!(pipeline.alert_threshold, 5);
        assert!(!pipeline.chain_stages);
        assert_eq!(pipeline.max_items_per_run, 3);
    }

    #[test]
    fn test_logging_defaults() {
        let logging = LoggingConfig::default();
        assert!(logging.file.is_none());
        assert!(!logging.json);
    }
}
