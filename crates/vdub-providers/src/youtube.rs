//! YouTube Data API resumable upload.
//!
//! Authenticates with an OAuth refresh token, opens an upload session and
//! sends the file in fixed-size chunks. A `308 Resume Incomplete` reply
//! carries a `Range` header telling how much the server has stored.

use std::io::SeekFrom;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info};
use vdub_models::PublishedVideo;

use crate::credentials::{Credentials, YouTubeCredentials};
use crate::error::{ProviderError, ProviderResult};
use crate::reporter::{scaled_percent, ProgressReporter};
use crate::traits::{PublishRequest, PublishUploader};

const SERVICE: &str = "YouTube";
/// Chunks must be a multiple of 256 KiB except the last one.
const CHUNK_ALIGN: usize = 256 * 1024;
const MAX_STALLED_CHUNKS: u32 = 3;

/// Settings for [`YouTubeUploader`].
#[derive(Debug, Clone)]
pub struct YouTubeConfig {
    pub api_base: String,
    pub oauth_token_url: String,
    pub privacy_status: String,
    pub category_id: String,
    pub chunk_size: usize,
    pub request_timeout: Duration,
}

/// Publishes videos through the YouTube Data API v3.
pub struct YouTubeUploader {
    http: Client,
    config: YouTubeConfig,
    credentials: Credentials,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct VideoResource {
    id: String,
}

impl YouTubeUploader {
    pub fn new(http: Client, mut config: YouTubeConfig, credentials: Credentials) -> Self {
        config.api_base = config.api_base.trim_end_matches('/').to_string();
        config.chunk_size = (config.chunk_size / CHUNK_ALIGN).max(1) * CHUNK_ALIGN;
        Self {
            http,
            config,
            credentials,
        }
    }

    /// Exchange the refresh token for an access token.
    async fn access_token(&self, creds: &YouTubeCredentials) -> ProviderResult<String> {
        let response = self
            .http
            .post(&self.config.oauth_token_url)
            .timeout(self.config.request_timeout)
            .form(&[
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.as_str()),
                ("refresh_token", creds.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // invalid_grant and friends come back as 400
            if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
                return Err(ProviderError::config(format!(
                    "YouTube OAuth rejected the configured credentials: {}",
                    body.trim()
                )));
            }
            return Err(ProviderError::from_http_status("YouTube OAuth", status.as_u16(), &body));
        }

        Ok(response.json::<TokenResponse>().await?.access_token)
    }

    /// Open a resumable upload session and return its URL.
    async fn start_session(
        &self,
        token: &str,
        size: u64,
        request: &PublishRequest,
    ) -> ProviderResult<String> {
        let metadata = serde_json::json!({
            "snippet": {
                "title": request.title,
                "description": request.description,
                "categoryId": self.config.category_id,
            },
            "status": { "privacyStatus": self.config.privacy_status }
        });

        let response = self
            .http
            .post(format!("{}/upload/youtube/v3/videos", self.config.api_base))
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(token)
            .header("X-Upload-Content-Length", size)
            .header("X-Upload-Content-Type", "video/mp4")
            .timeout(self.config.request_timeout)
            .json(&metadata)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_http_status(SERVICE, status.as_u16(), &body));
        }

        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ProviderError::execution("YouTube did not return an upload session URL"))
    }

    async fn upload_chunks(
        &self,
        video: &Path,
        token: &str,
        upload_url: &str,
        size: u64,
        progress: &ProgressReporter,
    ) -> ProviderResult<String> {
        let mut file = tokio::fs::File::open(video).await?;
        let mut offset = 0u64;
        let mut stalled = 0u32;
        let mut buf = vec![0u8; self.config.chunk_size];

        while offset < size {
            let len = (size - offset).min(self.config.chunk_size as u64) as usize;
            file.seek(SeekFrom::Start(offset)).await?;
            file.read_exact(&mut buf[..len]).await?;
            let end = offset + len as u64 - 1;

            let response = self
                .http
                .put(upload_url)
                .bearer_auth(token)
                .header(header::CONTENT_RANGE, format!("bytes {}-{}/{}", offset, end, size))
                .header(header::CONTENT_LENGTH, len)
                .timeout(self.config.request_timeout)
                .body(buf[..len].to_vec())
                .send()
                .await?;

            match response.status().as_u16() {
                200 | 201 => {
                    let video: VideoResource = response.json().await?;
                    progress.progress(99, "Uploading to YouTube: 100% complete...");
                    return Ok(video.id);
                }
                308 => {
                    let next = response
                        .headers()
                        .get(header::RANGE)
                        .and_then(|v| v.to_str().ok())
                        .and_then(parse_range_end)
                        .map(|last| last + 1)
                        .unwrap_or(0);

                    if next <= offset {
                        stalled += 1;
                        if stalled >= MAX_STALLED_CHUNKS {
                            return Err(ProviderError::execution(
                                "YouTube upload made no progress after repeated attempts",
                            ));
                        }
                    } else {
                        stalled = 0;
                    }
                    offset = next;

                    let percent = (offset.min(size) * 100 / size) as u8;
                    debug!(offset, size, "YouTube chunk accepted");
                    progress.progress(
                        scaled_percent(offset, size, 5, 99),
                        format!("Uploading to YouTube: {}% complete...", percent),
                    );
                }
                status => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(ProviderError::from_http_status(SERVICE, status, &body));
                }
            }
        }

        Err(ProviderError::execution("YouTube upload finished without a video id"))
    }
}

#[async_trait]
impl PublishUploader for YouTubeUploader {
    fn name(&self) -> &'static str {
        "youtube"
    }

    async fn publish(
        &self,
        video: &Path,
        request: &PublishRequest,
        progress: &ProgressReporter,
    ) -> ProviderResult<PublishedVideo> {
        let creds = self.credentials.youtube().await?;

        let size = match tokio::fs::metadata(video).await {
            Ok(meta) => meta.len(),
            Err(_) => return Err(ProviderError::execution("Video file for upload not found.")),
        };
        if size == 0 {
            return Err(ProviderError::execution("Video file for upload is empty."));
        }

        progress.progress(0, "Authenticating with YouTube...");
        let token = self.access_token(&creds).await?;

        progress.progress(5, "Preparing upload...");
        let upload_url = self.start_session(&token, size, request).await?;

        let video_id = self
            .upload_chunks(video, &token, &upload_url, size, progress)
            .await?;

        info!(video_id = %video_id, bytes = size, "Published video to YouTube");
        Ok(PublishedVideo {
            url: format!("https://www.youtube.com/watch?v={}", video_id),
            video_id,
        })
    }
}

/// Parse the last byte index out of a `Range: bytes=0-NNN` header.
fn parse_range_end(value: &str) -> Option<u64> {
    value
        .trim()
        .strip_prefix("bytes=")?
        .split_once('-')?
        .1
        .parse()
        .ok()
}
