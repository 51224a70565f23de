//! YouTube Data API upload client.
//!
//! Authenticates with a stored refresh token and uploads through a resumable
//! session in fixed-size chunks.

use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{PublishError, PublishRequest, Publisher};

/// Upload chunk size. Must be a multiple of 256 KiB.
const CHUNK_SIZE: u64 = 4 * 1024 * 1024;

/// HTTP status YouTube uses for "chunk received, send the next one".
const RESUME_INCOMPLETE: u16 = 308;

/// Consecutive chunk responses without progress before the upload is abandoned.
const MAX_STALLED_CHUNKS: u32 = 5;

/// YouTube client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YouTubeConfig {
    pub client_id: String,
    pub client_secret: String,
    /// File holding the OAuth refresh token.
    #[serde(default = "default_refresh_token_path")]
    pub refresh_token_path: PathBuf,
    #[serde(default = "default_description")]
    pub description: String,
    #[serde(default = "default_tags")]
    pub tags: Vec<String>,
    #[serde(default = "default_category_id")]
    pub category_id: String,
    /// `public`, `unlisted` or `private`.
    #[serde(default = "default_privacy_status")]
    pub privacy_status: String,
    /// Token endpoint (default: https://oauth2.googleapis.com/token).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
    /// Upload base URL (default: https://www.googleapis.com).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_base_url: Option<String>,
}

fn default_refresh_token_path() -> PathBuf {
    PathBuf::from(".youtube_refresh_token")
}

fn default_description() -> String {
    "Uploaded via automation".to_string()
}

fn default_tags() -> Vec<String> {
    vec![
        "zoom".to_string(),
        "meeting".to_string(),
        "recording".to_string(),
    ]
}

fn default_category_id() -> String {
    "22".to_string()
}

fn default_privacy_status() -> String {
    "unlisted".to_string()
}

/// YouTube upload client.
pub struct YouTubeClient {
    client: Client,
    config: YouTubeConfig,
    token_url: String,
    upload_base_url: String,
    access_token: Mutex<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UploadedVideo {
    id: String,
}

impl YouTubeClient {
    /// Create a new YouTube client.
    pub fn new(config: YouTubeConfig) -> Result<Self, PublishError> {
        if config.client_id.is_empty() || config.client_secret.is_empty() {
            return Err(PublishError::Unauthorized(
                "YouTube client id and secret are required".to_string(),
            ));
        }

        // Per-request timeout covers one chunk, not the whole upload.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(300))
            .build()?;

        let token_url = config
            .token_url
            .clone()
            .unwrap_or_else(|| "https://oauth2.googleapis.com/token".to_string());
        let upload_base_url = config
            .upload_base_url
            .clone()
            .unwrap_or_else(|| "https://www.googleapis.com".to_string());

        Ok(Self {
            client,
            config,
            token_url,
            upload_base_url,
            access_token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, PublishError> {
        let mut cached = self.access_token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let path = &self.config.refresh_token_path;
        let refresh_token = match fs::read_to_string(path).await {
            Ok(token) if !token.trim().is_empty() => token.trim().to_string(),
            Ok(_) | Err(_) => {
                return Err(PublishError::Unauthorized(format!(
                    "no YouTube refresh token at {}; authorize the app first",
                    path.display()
                )));
            }
        };

        debug!("Refreshing YouTube access token");

        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Unauthorized(format!(
                "YouTube refresh token rejected: {}",
                google_error_message(&body)
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Api {
                status: status.as_u16(),
                message: google_error_message(&body),
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            PublishError::Parse(format!("Failed to parse token response: {}", e))
        })?;

        *cached = Some(token.access_token.clone());
        Ok(token.access_token)
    }

    /// Open a resumable upload session and return its URL.
    async fn start_session(
        &self,
        token: &str,
        request: &PublishRequest,
        total: u64,
    ) -> Result<String, PublishError> {
        let mut snippet = json!({
            "title": request.title,
            "description": request.description,
            "categoryId": self.config.category_id,
        });
        if !request.tags.is_empty() {
            snippet["tags"] = json!(request.tags);
        }
        let body = json!({
            "snippet": snippet,
            "status": { "privacyStatus": self.config.privacy_status },
        });

        let response = self
            .client
            .post(format!("{}/upload/youtube/v3/videos", self.upload_base_url))
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(token)
            .header("X-Upload-Content-Type", "video/*")
            .header("X-Upload-Content-Length", total.to_string())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| PublishError::Parse("upload session has no Location header".to_string()))
    }
}

/// Map a non-success response to the matching error.
async fn error_from_response(response: Response) -> PublishError {
    let status = response.status();
    let message = google_error_message(&response.text().await.unwrap_or_default());
    if status == StatusCode::UNAUTHORIZED {
        return PublishError::Unauthorized(message);
    }
    PublishError::Api {
        status: status.as_u16(),
        message,
    }
}

/// Pull the human-readable message out of a Google API error body.
fn google_error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|v| {
        v.pointer("/error/message")
            .or_else(|| v.pointer("/error_description"))
            .or_else(|| v.get("error").filter(|e| e.is_string()))
            .and_then(|m| m.as_str())
            .map(str::to_string)
    });
    message.unwrap_or_else(|| body.trim().to_string())
}

/// Parse the `Range: bytes=0-N` header of a 308 response into the next offset.
fn next_offset(range: Option<&str>) -> u64 {
    range
        .and_then(|r| r.rsplit('-').next())
        .and_then(|end| end.trim().parse::<u64>().ok())
        .map(|end| end + 1)
        .unwrap_or(0)
}

/// Upload position, tracking chunks the server acknowledged without progress.
#[derive(Debug, Default)]
struct UploadProgress {
    offset: u64,
    stalled: u32,
}

impl UploadProgress {
    /// Move to the offset reported by a 308 response.
    fn advance(&mut self, next: u64) -> Result<(), PublishError> {
        if next > self.offset {
            self.stalled = 0;
        } else {
            self.stalled += 1;
            if self.stalled >= MAX_STALLED_CHUNKS {
                return Err(PublishError::Failed(format!(
                    "upload stalled at byte {} after {} chunks without progress",
                    self.offset, self.stalled
                )));
            }
        }
        self.offset = next;
        Ok(())
    }
}

#[async_trait]
impl Publisher for YouTubeClient {
    fn name(&self) -> &str {
        "youtube"
    }

    async fn publish(&self, request: &PublishRequest) -> Result<String, PublishError> {
        let total = fs::metadata(&request.local_path).await?.len();
        if total == 0 {
            return Err(PublishError::Failed(format!(
                "artifact is empty: {}",
                request.local_path.display()
            )));
        }

        info!(
            "Uploading {} ({:.2} MB) as \"{}\"",
            request.local_path.display(),
            total as f64 / (1024.0 * 1024.0),
            request.title
        );

        let token = self.access_token().await?;
        let session_url = self.start_session(&token, request, total).await?;

        let mut file = fs::File::open(&request.local_path).await?;
        let mut progress = UploadProgress::default();

        loop {
            let offset = progress.offset;
            file.seek(SeekFrom::Start(offset)).await?;
            let mut chunk = Vec::with_capacity(CHUNK_SIZE.min(total.saturating_sub(offset)) as usize);
            (&mut file).take(CHUNK_SIZE).read_to_end(&mut chunk).await?;
            if chunk.is_empty() {
                return Err(PublishError::Failed(format!(
                    "artifact shrank during upload: {}",
                    request.local_path.display()
                )));
            }
            let end = offset + chunk.len() as u64 - 1;

            let response = self
                .client
                .put(&session_url)
                .bearer_auth(&token)
                .header(header::CONTENT_LENGTH, chunk.len())
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", offset, end, total),
                )
                .body(chunk)
                .send()
                .await?;

            let status = response.status();
            if status.as_u16() == RESUME_INCOMPLETE {
                let range = response
                    .headers()
                    .get(header::RANGE)
                    .and_then(|v| v.to_str().ok());
                progress.advance(next_offset(range))?;
                debug!(
                    "Upload progress: {:.2}%",
                    progress.offset as f64 * 100.0 / total as f64
                );
                continue;
            }

            if !status.is_success() {
                return Err(error_from_response(response).await);
            }

            let video: UploadedVideo = response.json().await.map_err(|e| {
                PublishError::Parse(format!("Failed to parse upload response: {}", e))
            })?;

            let url = format!("https://youtu.be/{}", video.id);
            info!("Upload complete: {}", url);
            return Ok(url);
        }
    }
}
