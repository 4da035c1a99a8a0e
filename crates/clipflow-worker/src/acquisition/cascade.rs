//! Ordered acquisition strategies with per-strategy retry policy.

use std::sync::Arc;
use std::time::Duration;

use clipflow_media::download::DEFAULT_USER_AGENTS;
use clipflow_media::{
    AcquisitionStrategy, CobaltApiStrategy, CookieSessionStrategy, GatewayStrategy,
    HeaderRotationStrategy, ProxyStrategy, YtDlpSettings,
};

use crate::config::DownloaderConfig;
use crate::error::WorkerResult;
use crate::retry::RetryConfig;

/// How many times a strategy is tried and how long to wait between tries.
#[derive(Debug, Clone)]
pub struct StrategyPolicy {
    pub max_tries: u32,
    pub backoff: RetryConfig,
}

impl Default for StrategyPolicy {
    fn default() -> Self {
        Self {
            max_tries: 3,
            backoff: RetryConfig::default()
                .with_base_delay(Duration::from_secs(1))
                .with_max_delay(Duration::from_secs(8)),
        }
    }
}

impl StrategyPolicy {
    pub fn new(max_tries: u32, backoff: RetryConfig) -> Self {
        Self {
            max_tries: max_tries.max(1),
            backoff,
        }
    }

    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = max_tries.max(1);
        self
    }
}

pub struct CascadeEntry {
    pub strategy: Arc<dyn AcquisitionStrategy>,
    pub policy: StrategyPolicy,
}

/// Strategies in fixed priority order.
pub struct StrategyCascade {
    entries: Vec<CascadeEntry>,
    default_policy: StrategyPolicy,
}

impl StrategyCascade {
    pub fn new(default_policy: StrategyPolicy) -> Self {
        Self {
            entries: Vec::new(),
            default_policy,
        }
    }

    /// Append a strategy using the default policy.
    pub fn push(mut self, strategy: Arc<dyn AcquisitionStrategy>) -> Self {
        let policy = self.default_policy.clone();
        self.entries.push(CascadeEntry { strategy, policy });
        self
    }

    pub fn push_with_policy(
        mut self,
        strategy: Arc<dyn AcquisitionStrategy>,
        policy: StrategyPolicy,
    ) -> Self {
        self.entries.push(CascadeEntry { strategy, policy });
        self
    }

    /// Session cookies, rotated headers, alternate gateway, HTTP API, proxy.
    pub fn standard(config: &DownloaderConfig, ytdlp: &YtDlpSettings) -> WorkerResult<Self> {
        let policy = StrategyPolicy::new(config.max_tries, config.backoff.clone());
        let user_agents = DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect();
        let cookie_copy = std::env::temp_dir().join("clipflow_cookies.txt");
        let api = CobaltApiStrategy::new(config.api_endpoints.clone(), config.api_timeout)?;

        Ok(Self::new(policy)
            .push(Arc::new(CookieSessionStrategy::new(
                &config.cookies_file,
                cookie_copy,
                ytdlp.clone(),
            )))
            .push(Arc::new(HeaderRotationStrategy::new(user_agents, ytdlp.clone())))
            .push(Arc::new(GatewayStrategy::new(
                config.gateway_instances.clone(),
                ytdlp.clone(),
            )))
            .push(Arc::new(api))
            .push(Arc::new(ProxyStrategy::new(config.proxy.clone(), ytdlp.clone()))))
    }

    pub fn entries(&self) -> &[CascadeEntry] {
        &self.entries
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.strategy.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
