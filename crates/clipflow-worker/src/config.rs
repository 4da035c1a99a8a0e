//! Worker configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clipflow_media::{AnalyzerConfig, CandidateConfig, EffectProfile, YtDlpSettings};
use clipflow_models::{ErrorTier, Platform};
use clipflow_queue::QueueConfig;

use crate::retry::RetryConfig;

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|s| {
        s.split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect()
    })
}

/// Orchestrator loop and item pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Platforms passed to discovery
    pub platforms: Vec<Platform>,
    /// Keywords passed to discovery
    pub keywords: Vec<String>,
    /// Max items requested per discovery pass
    pub discovery_limit: usize,
    /// Intake cadence
    pub intake_interval: Duration,
    /// Items at or below this engagement score are not queued
    pub min_engagement: f64,
    /// Ranked clips produced per item
    pub top_k: usize,
    /// Effects applied to every produced clip
    pub effects: Vec<String>,
    /// Items processed concurrently by the processing loop
    pub max_in_flight: usize,
    /// Root for clips, effect outputs and logs
    pub work_dir: PathBuf,
    /// JSON feed read by the default discovery source
    pub feed_path: PathBuf,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            platforms: vec![Platform::Youtube, Platform::Tiktok],
            keywords: Vec::new(),
            discovery_limit: 20,
            intake_interval: Duration::from_secs(600),
            min_engagement: 0.1,
            top_k: 5,
            effects: vec![
                "hook_zoom".to_string(),
                "caption".to_string(),
                "energy_boost".to_string(),
                "audio_normalize".to_string(),
                "color_grade".to_string(),
            ],
            max_in_flight: 3,
            work_dir: PathBuf::from("data"),
            feed_path: PathBuf::from("data/feed.json"),
            shutdown_timeout: Duration::from_secs(60),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            platforms: env_list("PIPELINE_PLATFORMS")
                .map(|names| names.iter().filter_map(|n| n.parse().ok()).collect())
                .unwrap_or(d.platforms),
            keywords: env_list("PIPELINE_KEYWORDS").unwrap_or(d.keywords),
            discovery_limit: env_parse("PIPELINE_DISCOVERY_LIMIT").unwrap_or(d.discovery_limit),
            intake_interval: env_parse("PIPELINE_INTAKE_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(d.intake_interval),
            min_engagement: env_parse("PIPELINE_MIN_ENGAGEMENT").unwrap_or(d.min_engagement),
            top_k: env_parse("PIPELINE_TOP_K").unwrap_or(d.top_k),
            effects: env_list("PIPELINE_EFFECTS").unwrap_or(d.effects),
            max_in_flight: env_parse("PIPELINE_MAX_IN_FLIGHT").unwrap_or(d.max_in_flight),
            work_dir: std::env::var("PIPELINE_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.work_dir),
            feed_path: std::env::var("PIPELINE_FEED_PATH")
                .map(PathBuf::from)
                .unwrap_or(d.feed_path),
            shutdown_timeout: env_parse("PIPELINE_SHUTDOWN_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(d.shutdown_timeout),
        }
    }

    pub fn clips_dir(&self) -> PathBuf {
        self.work_dir.join("clips")
    }

    pub fn edited_dir(&self) -> PathBuf {
        self.work_dir.join("edited")
    }
}

/// Error classifier settings.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Tier assigned to errors no pattern matches
    pub default_tier: ErrorTier,
    /// Backoff for persistent-tier retries
    pub backoff: RetryConfig,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            default_tier: ErrorTier::Persistent,
            backoff: RetryConfig::default()
                .with_max_retries(ErrorTier::Persistent.max_retries())
                .with_base_delay(Duration::from_secs(1))
                .with_max_delay(Duration::from_secs(30)),
        }
    }
}

impl RecoveryConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            default_tier: env_parse("RECOVERY_DEFAULT_TIER").unwrap_or(d.default_tier),
            backoff: d.backoff.with_base_delay(
                env_parse("RECOVERY_BACKOFF_BASE_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(Duration::from_secs(1)),
            ),
        }
    }
}

/// Acquisition cascade settings.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Items acquired concurrently
    pub max_concurrent: usize,
    /// Where downloads land
    pub output_dir: PathBuf,
    /// Tries per strategy
    pub max_tries: u32,
    /// Backoff between tries of one strategy
    pub backoff: RetryConfig,
    /// Randomized pause between strategies, inclusive range
    pub strategy_delay_min: Duration,
    pub strategy_delay_max: Duration,
    /// Existing files at least this large are reused
    pub min_existing_bytes: u64,
    /// JSON-lines success-pattern log
    pub pattern_log: Option<PathBuf>,
    /// Browser cookie export for the session strategy
    pub cookies_file: PathBuf,
    /// Alternate front-end instances for the gateway strategy
    pub gateway_instances: Vec<String>,
    /// Extraction API endpoints for the HTTP strategy
    pub api_endpoints: Vec<String>,
    pub api_timeout: Duration,
    pub proxy: Option<String>,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            output_dir: PathBuf::from("data/downloads"),
            max_tries: 3,
            backoff: RetryConfig::default()
                .with_base_delay(Duration::from_secs(1))
                .with_max_delay(Duration::from_secs(8)),
            strategy_delay_min: Duration::from_secs(2),
            strategy_delay_max: Duration::from_secs(4),
            min_existing_bytes: 1024 * 1024,
            pattern_log: Some(PathBuf::from("data/success_patterns.jsonl")),
            cookies_file: PathBuf::from("config/youtube_cookies.txt"),
            gateway_instances: vec![
                "https://yewtu.be".to_string(),
                "https://inv.tux.pizza".to_string(),
                "https://invidious.fdn.fr".to_string(),
                "https://invidious.nerdvpn.de".to_string(),
            ],
            api_endpoints: vec![
                "https://api.cobalt.tools/api/json".to_string(),
                "https://co.wuk.sh/api/json".to_string(),
            ],
            api_timeout: Duration::from_secs(60),
            proxy: None,
        }
    }
}

impl DownloaderConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_concurrent: env_parse("DOWNLOAD_MAX_CONCURRENT").unwrap_or(d.max_concurrent),
            output_dir: std::env::var("DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.output_dir),
            max_tries: env_parse("DOWNLOAD_MAX_TRIES").unwrap_or(d.max_tries),
            backoff: d.backoff.with_base_delay(
                env_parse("DOWNLOAD_BACKOFF_BASE_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(Duration::from_secs(1)),
            ),
            strategy_delay_min: env_parse("DOWNLOAD_STRATEGY_DELAY_MIN_MS")
                .map(Duration::from_millis)
                .unwrap_or(d.strategy_delay_min),
            strategy_delay_max: env_parse("DOWNLOAD_STRATEGY_DELAY_MAX_MS")
                .map(Duration::from_millis)
                .unwrap_or(d.strategy_delay_max),
            min_existing_bytes: env_parse("DOWNLOAD_MIN_EXISTING_BYTES")
                .unwrap_or(d.min_existing_bytes),
            pattern_log: match std::env::var("DOWNLOAD_PATTERN_LOG") {
                Ok(p) if p.is_empty() => None,
                Ok(p) => Some(PathBuf::from(p)),
                Err(_) => d.pattern_log,
            },
            cookies_file: std::env::var("YOUTUBE_COOKIE_FILE")
                .map(PathBuf::from)
                .unwrap_or(d.cookies_file),
            gateway_instances: env_list("DOWNLOAD_GATEWAY_INSTANCES")
                .unwrap_or(d.gateway_instances),
            api_endpoints: env_list("DOWNLOAD_API_ENDPOINTS").unwrap_or(d.api_endpoints),
            api_timeout: env_parse("DOWNLOAD_API_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(d.api_timeout),
            proxy: std::env::var("YOUTUBE_PROXY").ok().filter(|p| !p.trim().is_empty()),
        }
    }
}

/// Publish loop settings.
#[derive(Debug, Clone)]
pub struct PublishConfig {
    pub interval: Duration,
    /// Offset of the audience's local time from UTC, in hours
    pub utc_offset_hours: i32,
    /// Clips handled per publish pass
    pub batch_limit: usize,
    /// JSON-lines log written by the log publisher
    pub log_path: PathBuf,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            utc_offset_hours: 0,
            batch_limit: 10,
            log_path: PathBuf::from("data/publish_log.jsonl"),
        }
    }
}

impl PublishConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            interval: env_parse("PUBLISH_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(d.interval),
            utc_offset_hours: env_parse("PUBLISH_UTC_OFFSET_HOURS").unwrap_or(d.utc_offset_hours),
            batch_limit: env_parse("PUBLISH_BATCH_LIMIT").unwrap_or(d.batch_limit),
            log_path: std::env::var("PUBLISH_LOG_PATH")
                .map(PathBuf::from)
                .unwrap_or(d.log_path),
        }
    }
}

/// Everything the binary needs to wire the worker.
#[derive(Debug, Clone, Default)]
pub struct WorkerConfig {
    pub pipeline: PipelineConfig,
    pub recovery: RecoveryConfig,
    pub downloader: DownloaderConfig,
    pub publish: PublishConfig,
    pub analyzer: AnalyzerConfig,
    pub candidates: CandidateConfig,
    pub effects: EffectProfile,
    pub ytdlp: YtDlpSettings,
    pub queue: QueueConfig,
    /// Prometheus listener; disabled when unset
    pub metrics_addr: Option<SocketAddr>,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        Self {
            pipeline: PipelineConfig::from_env(),
            recovery: RecoveryConfig::from_env(),
            downloader: DownloaderConfig::from_env(),
            publish: PublishConfig::from_env(),
            analyzer: AnalyzerConfig::from_env(),
            candidates: CandidateConfig::from_env(),
            effects: EffectProfile::from_env(),
            ytdlp: YtDlpSettings::from_env(),
            queue: QueueConfig::from_env(),
            metrics_addr: env_parse("METRICS_ADDR"),
        }
    }
}
