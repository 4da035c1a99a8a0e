//! Download through a Cobalt-compatible HTTP extraction API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use clipflow_models::LocalAsset;

use super::{AcquisitionRequest, AcquisitionStrategy};
use crate::error::{MediaError, MediaResult};

/// Bodies at or below this size are error pages, not media.
const MIN_MEDIA_BYTES: u64 = 1000;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtractRequest<'a> {
    url: &'a str,
    v_quality: &'a str,
    filename_pattern: &'a str,
    is_audio_only: bool,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    status: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

/// HTTP-API fetch: ask the service for a direct media URL, then stream it.
pub struct CobaltApiStrategy {
    client: reqwest::Client,
    endpoints: Vec<String>,
    quality: String,
    timeout: Duration,
}

impl CobaltApiStrategy {
    /// `timeout` bounds each HTTP request, including the media transfer.
    pub fn new(endpoints: Vec<String>, timeout: Duration) -> MediaResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoints,
            quality: "1080".to_string(),
            timeout,
        })
    }

    fn http_error(&self, err: reqwest::Error) -> MediaError {
        if err.is_timeout() {
            MediaError::Timeout(self.timeout.as_secs())
        } else if err.is_connect() {
            MediaError::download_failed(self.name(), format!("connection failed: {}", err))
        } else {
            MediaError::Http(err)
        }
    }

    fn status_error(&self, status: reqwest::StatusCode) -> MediaError {
        let hint = match status.as_u16() {
            429 => " (rate limit)",
            401 | 403 => " (permission denied)",
            503 => " (service unavailable)",
            _ => "",
        };
        MediaError::download_failed(self.name(), format!("HTTP {}{}", status.as_u16(), hint))
    }

    async fn extract(&self, endpoint: &str, url: &str) -> MediaResult<String> {
        let body = ExtractRequest {
            url,
            v_quality: &self.quality,
            filename_pattern: "basic",
            is_audio_only: false,
        };

        let resp = self
            .client
            .post(endpoint)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.http_error(e))?;

        if !resp.status().is_success() {
            return Err(self.status_error(resp.status()));
        }

        let parsed: ExtractResponse = resp.json().await.map_err(|e| self.http_error(e))?;
        match parsed.status.as_str() {
            "stream" | "redirect" | "tunnel" => parsed.url.ok_or_else(|| {
                MediaError::download_failed(self.name(), "invalid format: response without url")
            }),
            "error" => Err(MediaError::download_failed(
                self.name(),
                parsed.text.unwrap_or_else(|| "extraction error".to_string()),
            )),
            other => Err(MediaError::download_failed(
                self.name(),
                format!("invalid format: unexpected status {}", other),
            )),
        }
    }

    async fn fetch_to(&self, media_url: &str, output: &Path) -> MediaResult<u64> {
        let mut resp = self
            .client
            .get(media_url)
            .send()
            .await
            .map_err(|e| self.http_error(e))?;
        if !resp.status().is_success() {
            return Err(self.status_error(resp.status()));
        }

        let partial = output.with_extension("part");
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut written = 0u64;
        while let Some(chunk) = resp.chunk().await.map_err(|e| self.http_error(e))? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        if written <= MIN_MEDIA_BYTES {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(MediaError::download_failed(
                self.name(),
                format!("invalid format: response too small ({} bytes)", written),
            ));
        }

        tokio::fs::rename(&partial, output).await?;
        Ok(written)
    }
}

#[async_trait]
impl AcquisitionStrategy for CobaltApiStrategy {
    fn name(&self) -> &'static str {
        "http_api"
    }

    fn supports(&self, _request: &AcquisitionRequest) -> bool {
        !self.endpoints.is_empty()
    }

    async fn attempt(&self, request: &AcquisitionRequest) -> MediaResult<LocalAsset> {
        let mut last_error = None;

        for endpoint in &self.endpoints {
            debug!(endpoint = %endpoint, url = %request.url, "Requesting media URL");
            let result = match self.extract(endpoint, &request.url).await {
                Ok(media_url) => self.fetch_to(&media_url, &request.output_path).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(size) => {
                    info!(endpoint = %endpoint, size, "HTTP API download succeeded");
                    return Ok(LocalAsset::new(&request.output_path, size, self.name()));
                }
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "HTTP API endpoint failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            MediaError::strategy_unavailable(self.name(), "no API endpoints configured")
        }))
    }
}
