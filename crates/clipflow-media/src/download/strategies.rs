//! yt-dlp based strategies.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use clipflow_models::{LocalAsset, Platform};

use super::ytdlp::{YtDlpCommand, YtDlpSettings};
use super::{AcquisitionRequest, AcquisitionStrategy};
use crate::error::{MediaError, MediaResult};

/// Minimum size for a valid cookies file (bytes).
const MIN_COOKIES_FILE_SIZE: u64 = 50;

/// Desktop and mobile user agents rotated by [`HeaderRotationStrategy`].
pub const DEFAULT_USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1",
];

/// Validate that a cookies file appears to be in Netscape format.
fn is_valid_netscape_cookies(content: &str) -> bool {
    if content.starts_with("# Netscape HTTP Cookie File")
        || content.starts_with("# HTTP Cookie File")
    {
        return true;
    }

    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .any(|l| l.split('\t').count() >= 6)
}

/// Authenticated-session fetch using an exported browser cookie jar.
///
/// yt-dlp writes cookies back after use, so the (possibly read-only) source
/// file is copied to a writable location once per process.
pub struct CookieSessionStrategy {
    source: PathBuf,
    working_copy: PathBuf,
    copied: Mutex<bool>,
    settings: YtDlpSettings,
}

impl CookieSessionStrategy {
    pub fn new(
        source: impl Into<PathBuf>,
        working_copy: impl Into<PathBuf>,
        settings: YtDlpSettings,
    ) -> Self {
        Self {
            source: source.into(),
            working_copy: working_copy.into(),
            copied: Mutex::new(false),
            settings,
        }
    }

    /// Path to a writable, validated cookies file.
    async fn writable_cookies(&self) -> MediaResult<PathBuf> {
        let meta = tokio::fs::metadata(&self.source).await.map_err(|_| {
            MediaError::strategy_unavailable(self.name(), "cookies file not found")
        })?;
        if meta.len() < MIN_COOKIES_FILE_SIZE {
            return Err(MediaError::strategy_unavailable(
                self.name(),
                format!("cookies file too small ({} bytes)", meta.len()),
            ));
        }

        let content = tokio::fs::read_to_string(&self.source).await?;
        if !is_valid_netscape_cookies(&content) {
            return Err(MediaError::download_failed(
                self.name(),
                "cookies file has invalid format",
            ));
        }

        let mut copied = self.copied.lock().await;
        if !*copied || !self.working_copy.exists() {
            tokio::fs::copy(&self.source, &self.working_copy).await?;
            debug!(
                "Copied cookies file to writable location: {}",
                self.working_copy.display()
            );
            *copied = true;
        }
        Ok(self.working_copy.clone())
    }
}

#[async_trait]
impl AcquisitionStrategy for CookieSessionStrategy {
    fn name(&self) -> &'static str {
        "cookie_session"
    }

    fn supports(&self, _request: &AcquisitionRequest) -> bool {
        self.source.exists()
    }

    async fn attempt(&self, request: &AcquisitionRequest) -> MediaResult<LocalAsset> {
        let cookies = self.writable_cookies().await?;
        let size = YtDlpCommand::new(&request.url, &request.output_path, &self.settings)
            .cookies(&cookies)
            .run(self.name())
            .await?;
        Ok(LocalAsset::new(&request.output_path, size, self.name()))
    }
}

/// Browser-like fetch with a rotating user agent and realistic headers.
pub struct HeaderRotationStrategy {
    user_agents: Vec<String>,
    cursor: AtomicUsize,
    settings: YtDlpSettings,
}

impl HeaderRotationStrategy {
    pub fn new(user_agents: Vec<String>, settings: YtDlpSettings) -> Self {
        let user_agents = if user_agents.is_empty() {
            DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect()
        } else {
            user_agents
        };
        Self {
            user_agents,
            cursor: AtomicUsize::new(0),
            settings,
        }
    }

    /// Next user agent in rotation.
    pub fn next_user_agent(&self) -> &str {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed) % self.user_agents.len();
        &self.user_agents[i]
    }
}

#[async_trait]
impl AcquisitionStrategy for HeaderRotationStrategy {
    fn name(&self) -> &'static str {
        "header_rotation"
    }

    async fn attempt(&self, request: &AcquisitionRequest) -> MediaResult<LocalAsset> {
        let ua = self.next_user_agent().to_string();
        debug!(user_agent = %ua, "Rotating user agent");
        let size = YtDlpCommand::new(&request.url, &request.output_path, &self.settings)
            .user_agent(ua)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.5")
            .header("DNT", "1")
            .header("Connection", "keep-alive")
            .run(self.name())
            .await?;
        Ok(LocalAsset::new(&request.output_path, size, self.name()))
    }
}

/// Fetch through alternate front-end gateways (Invidious-style mirrors).
///
/// Each try shuffles the instance list and walks up to `per_attempt` of
/// them; the first instance that delivers wins.
pub struct GatewayStrategy {
    instances: Vec<String>,
    per_attempt: usize,
    settings: YtDlpSettings,
}

impl GatewayStrategy {
    pub fn new(instances: Vec<String>, settings: YtDlpSettings) -> Self {
        Self {
            instances,
            per_attempt: 3,
            settings,
        }
    }

    fn video_id(request: &AcquisitionRequest) -> Option<String> {
        youtube_video_id(&request.url).or_else(|| {
            (request.platform == Platform::Youtube && !request.external_id.is_empty())
                .then(|| request.external_id.clone())
        })
    }
}

#[async_trait]
impl AcquisitionStrategy for GatewayStrategy {
    fn name(&self) -> &'static str {
        "alternate_gateway"
    }

    fn supports(&self, request: &AcquisitionRequest) -> bool {
        !self.instances.is_empty() && Self::video_id(request).is_some()
    }

    async fn attempt(&self, request: &AcquisitionRequest) -> MediaResult<LocalAsset> {
        let video_id = Self::video_id(request).ok_or_else(|| {
            MediaError::strategy_unavailable(self.name(), "no video id for gateway")
        })?;

        let mut instances = self.instances.clone();
        instances.shuffle(&mut rand::rng());

        let mut last_error = None;
        for instance in instances.iter().take(self.per_attempt) {
            let url = format!("{}/watch?v={}", instance.trim_end_matches('/'), video_id);
            match YtDlpCommand::new(&url, &request.output_path, &self.settings)
                .run(self.name())
                .await
            {
                Ok(size) => {
                    info!(instance = %instance, "Gateway download succeeded");
                    return Ok(LocalAsset::new(&request.output_path, size, self.name()));
                }
                Err(e) => {
                    warn!(instance = %instance, error = %e, "Gateway instance failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            MediaError::strategy_unavailable(self.name(), "no gateway instances configured")
        }))
    }
}

/// Fetch through an outbound proxy. Skipped when no proxy is configured.
pub struct ProxyStrategy {
    proxy: Option<String>,
    settings: YtDlpSettings,
}

impl ProxyStrategy {
    pub fn new(proxy: Option<String>, settings: YtDlpSettings) -> Self {
        Self {
            proxy: proxy.filter(|p| !p.trim().is_empty()),
            settings,
        }
    }
}

#[async_trait]
impl AcquisitionStrategy for ProxyStrategy {
    fn name(&self) -> &'static str {
        "proxy"
    }

    fn supports(&self, _request: &AcquisitionRequest) -> bool {
        self.proxy.is_some()
    }

    async fn attempt(&self, request: &AcquisitionRequest) -> MediaResult<LocalAsset> {
        let proxy = self
            .proxy
            .as_deref()
            .ok_or_else(|| MediaError::strategy_unavailable(self.name(), "no proxy configured"))?;
        let size = YtDlpCommand::new(&request.url, &request.output_path, &self.settings)
            .proxy(proxy)
            .run(self.name())
            .await?;
        Ok(LocalAsset::new(&request.output_path, size, self.name()))
    }
}

/// Extract a YouTube video ID from watch, short-link and shorts URLs.
pub fn youtube_video_id(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?.trim_start_matches("www.").trim_start_matches("m.");

    let id = match host {
        "youtu.be" => url.path_segments()?.next().map(str::to_string),
        "youtube.com" | "music.youtube.com" => {
            if url.path() == "/watch" {
                url.query_pairs()
                    .find(|(k, _)| k == "v")
                    .map(|(_, v)| v.to_string())
            } else {
                let mut segments = url.path_segments()?;
                match segments.next() {
                    Some("shorts") | Some("embed") | Some("live") => {
                        segments.next().map(str::to_string)
                    }
                    _ => None,
                }
            }
        }
        _ => None,
    }?;

    let valid = id.len() == 11
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then_some(id)
}
