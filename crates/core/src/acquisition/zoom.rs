//! Zoom cloud recordings client.
//!
//! Uses the OAuth refresh-token grant. The initial authorization is done
//! outside this process; when no usable refresh token exists every call fails
//! with [`AcquisitionError::Unauthorized`] instead of prompting.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::selection::{recording_duration_secs, select_best_asset};
use super::{AcquisitionError, RecordingSource};
use crate::item::{Asset, SourceItem};

/// Upper bound on listing pages fetched in one call.
const MAX_PAGES: usize = 100;

/// Zoom client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoomConfig {
    pub client_id: String,
    pub client_secret: String,
    /// User whose recordings are listed (`me` for the authorizing user).
    #[serde(default = "default_user_id")]
    pub user_id: String,
    /// File holding the current refresh token. Rewritten when Zoom rotates it.
    #[serde(default = "default_refresh_token_path")]
    pub refresh_token_path: PathBuf,
    /// How far back to list recordings.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Base URL (default: https://api.zoom.us/v2).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    /// OAuth base URL (default: https://zoom.us).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_base_url: Option<String>,
}

fn default_user_id() -> String {
    "me".to_string()
}

fn default_refresh_token_path() -> PathBuf {
    PathBuf::from(".zoom_refresh_token")
}

fn default_lookback_days() -> u32 {
    365
}

fn default_page_size() -> u32 {
    30
}

/// Zoom API client.
pub struct ZoomClient {
    client: Client,
    download_client: Client,
    config: ZoomConfig,
    api_base_url: String,
    oauth_base_url: String,
    access_token: Mutex<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecordingsPage {
    #[serde(default)]
    meetings: Vec<ZoomMeeting>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ZoomMeeting {
    #[serde(default)]
    uuid: String,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    start_time: Option<String>,
    /// Minutes.
    #[serde(default)]
    duration: Option<i64>,
    #[serde(default)]
    recording_files: Vec<ZoomRecordingFile>,
}

#[derive(Debug, Deserialize)]
struct ZoomRecordingFile {
    #[serde(default)]
    recording_type: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    file_extension: Option<String>,
    #[serde(default)]
    recording_start: Option<String>,
    #[serde(default)]
    recording_end: Option<String>,
}

impl ZoomClient {
    /// Create a new Zoom client.
    pub fn new(config: ZoomConfig) -> Result<Self, AcquisitionError> {
        if config.client_id.is_empty() || config.client_secret.is_empty() {
            return Err(AcquisitionError::Unauthorized(
                "Zoom client id and secret are required".to_string(),
            ));
        }

        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        // Recordings can be several gigabytes.
        let download_client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(60 * 60))
            .build()?;

        let api_base_url = config
            .api_base_url
            .clone()
            .unwrap_or_else(|| "https://api.zoom.us/v2".to_string());
        let oauth_base_url = config
            .oauth_base_url
            .clone()
            .unwrap_or_else(|| "https://zoom.us".to_string());

        Ok(Self {
            client,
            download_client,
            config,
            api_base_url,
            oauth_base_url,
            access_token: Mutex::new(None),
        })
    }

    /// Get an access token, refreshing it on first use.
    async fn access_token(&self) -> Result<String, AcquisitionError> {
        let mut cached = self.access_token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let token = self.refresh_access_token().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn refresh_access_token(&self) -> Result<String, AcquisitionError> {
        let path = &self.config.refresh_token_path;
        let refresh_token = match fs::read_to_string(path).await {
            Ok(token) if !token.trim().is_empty() => token.trim().to_string(),
            Ok(_) | Err(_) => {
                return Err(AcquisitionError::Unauthorized(format!(
                    "no Zoom refresh token at {}; authorize the app first",
                    path.display()
                )));
            }
        };

        debug!("Refreshing Zoom access token");

        let response = self
            .client
            .post(format!("{}/oauth/token", self.oauth_base_url))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            return Err(AcquisitionError::Unauthorized(format!(
                "Zoom refresh token rejected: {}",
                body
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AcquisitionError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            AcquisitionError::Parse(format!("Failed to parse token response: {}", e))
        })?;

        if let Some(rotated) = token.refresh_token.filter(|t| *t != refresh_token) {
            fs::write(path, rotated).await?;
            info!("Stored rotated Zoom refresh token");
        }

        Ok(token.access_token)
    }

    async fn fetch_page(
        &self,
        token: &str,
        from: &str,
        to: &str,
        next_page_token: Option<&str>,
    ) -> Result<RecordingsPage, AcquisitionError> {
        let url = format!(
            "{}/users/{}/recordings",
            self.api_base_url, self.config.user_id
        );

        let mut request = self.client.get(&url).bearer_auth(token).query(&[
            ("page_size", self.config.page_size.to_string()),
            ("from", from.to_string()),
            ("to", to.to_string()),
        ]);
        if let Some(page) = next_page_token {
            request = request.query(&[("next_page_token", page)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(AcquisitionError::Unauthorized(
                "Zoom rejected the access token".to_string(),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AcquisitionError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        response.json().await.map_err(|e| {
            AcquisitionError::Parse(format!("Failed to parse recordings response: {}", e))
        })
    }
}

fn parse_time(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

impl ZoomMeeting {
    fn into_source_item(self) -> SourceItem {
        let assets: Vec<Asset> = self
            .recording_files
            .into_iter()
            .filter_map(|f| {
                Some(Asset {
                    kind: f.recording_type?,
                    download_url: f.download_url?,
                    file_extension: f.file_extension.unwrap_or_default(),
                    recording_start: parse_time(f.recording_start.as_deref()),
                    recording_end: parse_time(f.recording_end.as_deref()),
                })
            })
            .collect();

        let duration_secs = recording_duration_secs(self.duration, select_best_asset(&assets));

        SourceItem {
            id: self.uuid,
            title: self
                .topic
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "Untitled Meeting".to_string()),
            created_at: parse_time(self.start_time.as_deref()),
            duration_secs,
            assets,
        }
    }
}

/// Decide whether to follow `token` after `pages` pages. Stops on an empty
/// token, a token already followed, or the page limit.
fn follow_page_token(
    token: Option<String>,
    followed: &mut HashSet<String>,
    pages: usize,
) -> Option<String> {
    let token = token.filter(|t| !t.is_empty())?;
    if pages >= MAX_PAGES {
        warn!("Zoom listing exceeded {} pages, stopping", MAX_PAGES);
        return None;
    }
    if !followed.insert(token.clone()) {
        warn!("Zoom repeated page token {:?}, stopping", token);
        return None;
    }
    Some(token)
}

/// Convert a listing into source items, newest first, dropping entries
/// without an identity.
fn collect_items(meetings: Vec<ZoomMeeting>, limit: usize) -> Vec<SourceItem> {
    let mut items: Vec<SourceItem> = meetings
        .into_iter()
        .filter_map(|m| {
            if m.uuid.is_empty() {
                warn!("Recording without UUID in Zoom listing, skipping");
                None
            } else {
                Some(m.into_source_item())
            }
        })
        .collect();

    // Stable sort: the API order breaks ties.
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    items.truncate(limit);
    items
}

#[async_trait]
impl RecordingSource for ZoomClient {
    fn name(&self) -> &str {
        "zoom"
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<SourceItem>, AcquisitionError> {
        let token = self.access_token().await?;

        let today = Utc::now().date_naive();
        let from = (today - chrono::Duration::days(i64::from(self.config.lookback_days)))
            .format("%Y-%m-%d")
            .to_string();
        let to = today.format("%Y-%m-%d").to_string();

        info!("Fetching recordings from Zoom ({} to {})", from, to);

        let mut meetings = Vec::new();
        let mut next_page: Option<String> = None;
        let mut followed = HashSet::new();
        let mut pages = 0;
        loop {
            let page = self
                .fetch_page(&token, &from, &to, next_page.as_deref())
                .await?;
            pages += 1;
            debug!("Zoom page {}: {} recordings", pages, page.meetings.len());
            meetings.extend(page.meetings);

            match follow_page_token(page.next_page_token, &mut followed, pages) {
                Some(token) => next_page = Some(token),
                None => break,
            }
        }

        info!("Found {} recordings across {} page(s)", meetings.len(), pages);
        Ok(collect_items(meetings, limit))
    }

    async fn fetch(&self, asset: &Asset, destination: &Path) -> Result<u64, AcquisitionError> {
        if asset.download_url.is_empty() {
            return Err(AcquisitionError::Failed(
                "no download URL for recording file".to_string(),
            ));
        }

        let token = self.access_token().await?;

        info!("Downloading {} to {}", asset.kind, destination.display());

        let mut response = self
            .download_client
            .get(&asset.download_url)
            .bearer_auth(&token)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(AcquisitionError::Unauthorized(
                "Zoom rejected the download token".to_string(),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AcquisitionError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }

        let partial = destination.with_extension("part");
        let written = async {
            let mut file = fs::File::create(&partial).await?;
            let mut written: u64 = 0;
            while let Some(chunk) = response.chunk().await? {
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            file.sync_all().await?;
            Ok::<u64, AcquisitionError>(written)
        }
        .await;

        let written = match written {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                return Err(e);
            }
        };

        fs::rename(&partial, destination).await?;
        info!(
            "Downloaded {:.2} MB",
            written as f64 / (1024.0 * 1024.0)
        );
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ZoomConfig {
        ZoomConfig {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            user_id: "me".to_string(),
            refresh_token_path: PathBuf::from("/nonexistent/.zoom_refresh_token"),
            lookback_days: 365,
            page_size: 30,
            api_base_url: None,
            oauth_base_url: None,
        }
    }

    const LISTING: &str = r#"{
        "next_page_token": "",
        "meetings": [
            {
                "uuid": "old==",
                "topic": "Monday sync",
                "start_time": "2025-03-03T09:00:00Z",
                "duration": 45,
                "recording_files": [
                    {"recording_type": "audio_only", "download_url": "https://z/a", "file_extension": "M4A"},
                    {"recording_type": "gallery_view", "download_url": "https://z/g", "file_extension": "MP4"}
                ]
            },
            {
                "uuid": "new==",
                "topic": "",
                "start_time": "2025-03-05T09:00:00Z",
                "duration": 0,
                "recording_files": [
                    {
                        "recording_type": "active_speaker",
                        "download_url": "https://z/s",
                        "file_extension": "MP4",
                        "recording_start": "2025-03-05T09:00:00Z",
                        "recording_end": "2025-03-05T09:00:40Z"
                    },
                    {"recording_type": "chat_file"}
                ]
            },
            {"topic": "no uuid"}
        ]
    }"#;

    #[test]
    fn test_parse_listing() {
        let page: RecordingsPage = serde_json::from_str(LISTING).unwrap();
        let items = collect_items(page.meetings, 10);

        assert_eq!(items.len(), 2);
        // Newest first.
        assert_eq!(items[0].id, "new==");
        assert_eq!(items[0].title, "Untitled Meeting");
        assert_eq!(items[0].duration_secs, Some(40));
        assert_eq!(items[0].assets.len(), 1);

        assert_eq!(items[1].id, "old==");
        assert_eq!(items[1].duration_secs, Some(2700));
        assert_eq!(items[1].assets.len(), 2);
    }

    #[test]
    fn test_listing_respects_limit() {
        let page: RecordingsPage = serde_json::from_str(LISTING).unwrap();
        let items = collect_items(page.meetings, 1);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "new==");
    }

    #[test]
    fn test_follow_page_token_stops_on_repeat() {
        let mut followed = HashSet::new();
        assert_eq!(
            follow_page_token(Some("p2".to_string()), &mut followed, 1),
            Some("p2".to_string())
        );
        assert_eq!(follow_page_token(Some("p2".to_string()), &mut followed, 2), None);
        assert_eq!(follow_page_token(Some(String::new()), &mut followed, 2), None);
        assert_eq!(follow_page_token(None, &mut followed, 2), None);
    }

    #[test]
    fn test_follow_page_token_stops_at_page_limit() {
        let mut followed = HashSet::new();
        assert!(follow_page_token(Some("a".to_string()), &mut followed, MAX_PAGES - 1).is_some());
        assert!(follow_page_token(Some("b".to_string()), &mut followed, MAX_PAGES).is_none());
    }

    #[test]
    fn test_new_requires_credentials() {
        let mut cfg = config();
        cfg.client_secret = String::new();
        assert!(matches!(
            ZoomClient::new(cfg),
            Err(AcquisitionError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_refresh_token_is_auth_failure() {
        let client = ZoomClient::new(config()).unwrap();
        let err = client.list_recent(3).await.unwrap_err();
        assert!(err.is_auth_failure());
    }

    #[test]
    fn test_deserialize_config_defaults() {
        let toml = r#"
client_id = "id"
client_secret = "secret"
user_id = "me"
"#;
        let cfg: ZoomConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.lookback_days, 365);
        assert_eq!(cfg.page_size, 30);
        assert_eq!(cfg.refresh_token_path, PathBuf::from(".zoom_refresh_token"));
    }
}
