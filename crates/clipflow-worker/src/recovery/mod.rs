//! Tiered error classification and recovery.
//!
//! Every stage boundary runs its work through [`ErrorClassifier::guard`].
//! A failure is classified by matching its lower-cased text against the
//! tier patterns in priority order, then handled per tier:
//!
//! | Tier       | Retries                 | When retries run out        |
//! |------------|-------------------------|-----------------------------|
//! | Transient  | 1, immediate            | caller fallback             |
//! | Persistent | 3, exponential backoff  | workaround                  |
//! | System     | 0                       | cached value                |
//! | Critical   | 0                       | recovery plan, degraded     |
//!
//! Recovery never returns an error: callers get a value or
//! [`RecoveryOutcome::Degraded`].

mod outcome;

use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use regex::RegexSet;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use clipflow_models::{ErrorRecord, ErrorTier, RecoveryPlan, Stage};
use clipflow_storage::AuditLog;

use crate::config::RecoveryConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

pub use outcome::{RecoveryContext, RecoveryOutcome};

const TRANSIENT_PATTERNS: &[&str] = &[
    r"timed?\s*out",
    r"timeout",
    r"connection (reset|refused|closed|aborted|failed)",
    r"reset by peer",
    r"broken pipe",
    r"temporar",
    r"try again",
];

const PERSISTENT_PATTERNS: &[&str] = &[
    r"permission",
    r"forbidden",
    r"denied",
    r"unauthori[sz]ed",
    r"\b40[13]\b",
    r"rate[\s_-]?limit",
    r"too many requests",
    r"\b429\b",
    r"sign in to confirm",
    r"invalid",
    r"\bformat\b",
    r"pars(e|ing)",
];

const SYSTEM_PATTERNS: &[&str] = &[
    r"resource",
    r"exhausted",
    r"memory",
    r"no space",
    r"disk",
    r"service unavailable",
    r"\b503\b",
    r"dependency missing",
    r"not found in path",
];

const CRITICAL_PATTERNS: &[&str] = &[r"corrupt", r"fatal", r"security", r"tamper"];

/// Remediation steps attached to every critical-tier recovery plan.
pub const RECOVERY_STEPS: [&str; 5] = [
    "Check system logs for root cause",
    "Verify all dependencies are installed",
    "Check database connectivity",
    "Restart the service",
    "Contact support if issue persists",
];

fn tier_index(tier: ErrorTier) -> usize {
    match tier {
        ErrorTier::Transient => 0,
        ErrorTier::Persistent => 1,
        ErrorTier::System => 2,
        ErrorTier::Critical => 3,
    }
}

/// Point-in-time view of the classifier's counters.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryStats {
    pub errors: BTreeMap<String, u64>,
    pub recovered: BTreeMap<String, u64>,
    pub total_errors: u64,
    pub total_recovered: u64,
    /// `total_recovered / total_errors`, 1.0 when nothing failed
    pub recovery_rate: f64,
}

/// Maps failures to tiers and applies the tier's recovery policy.
pub struct ErrorClassifier {
    config: RecoveryConfig,
    matchers: Vec<(ErrorTier, RegexSet)>,
    audit: Option<Arc<dyn AuditLog>>,
    errors: [AtomicU64; 4],
    recovered: [AtomicU64; 4],
}

impl ErrorClassifier {
    pub fn new(config: RecoveryConfig) -> WorkerResult<Self> {
        let build = |patterns: &[&str]| {
            RegexSet::new(patterns.iter().map(|p| format!("(?i){}", p)))
                .map_err(|e| WorkerError::config_error(format!("error pattern: {}", e)))
        };
        let matchers = vec![
            (ErrorTier::Transient, build(TRANSIENT_PATTERNS)?),
            (ErrorTier::Persistent, build(PERSISTENT_PATTERNS)?),
            (ErrorTier::System, build(SYSTEM_PATTERNS)?),
            (ErrorTier::Critical, build(CRITICAL_PATTERNS)?),
        ];
        Ok(Self {
            config,
            matchers,
            audit: None,
            errors: Default::default(),
            recovered: Default::default(),
        })
    }

    /// Persist every error record to `audit`.
    pub fn with_audit(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Tier for an error message. Pure: no counters move.
    pub fn classify(&self, error: &str) -> ErrorTier {
        let lower = error.to_lowercase();
        self.matchers
            .iter()
            .find(|(_, set)| set.is_match(&lower))
            .map(|(tier, _)| *tier)
            .unwrap_or(self.config.default_tier)
    }

    /// Run `op`; on failure classify it and apply [`Self::recover`].
    pub async fn guard<T, E, F, Fut>(
        &self,
        stage: Stage,
        ctx: RecoveryContext<T>,
        mut op: F,
    ) -> RecoveryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        match op().await {
            Ok(value) => RecoveryOutcome::Completed(value),
            Err(e) => {
                let message = e.to_string();
                let tier = self.classify(&message);
                self.recover(stage, &message, tier, ctx, op).await
            }
        }
    }

    /// Apply the recovery policy of `tier` to a failure of `op`.
    ///
    /// `op` is re-invoked for retryable tiers. Exactly one error record is
    /// written per call.
    pub async fn recover<T, E, F, Fut>(
        &self,
        stage: Stage,
        error: &str,
        tier: ErrorTier,
        ctx: RecoveryContext<T>,
        mut op: F,
    ) -> RecoveryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let RecoveryContext {
            detail,
            fallback,
            cached,
            workaround,
        } = ctx;

        self.errors[tier_index(tier)].fetch_add(1, Ordering::Relaxed);
        metrics::record_error(tier, stage);
        warn!(tier = tier.as_str(), stage = stage.as_str(), error = %error, "Stage failed");

        let outcome = match tier {
            ErrorTier::Transient => {
                match self.retry(&mut op, tier.max_retries(), false).await {
                    Ok((value, retries)) => RecoveryOutcome::Recovered {
                        value,
                        tier,
                        retries,
                    },
                    Err(last) => match fallback {
                        Some(value) => RecoveryOutcome::Fallback { value, tier },
                        None => self.degraded(tier, last, None),
                    },
                }
            }
            ErrorTier::Persistent => {
                match self.retry(&mut op, self.config.backoff.max_retries, true).await {
                    Ok((value, retries)) => RecoveryOutcome::Recovered {
                        value,
                        tier,
                        retries,
                    },
                    Err(last) => match (workaround, fallback) {
                        (Some(f), _) => RecoveryOutcome::Workaround { value: f(), tier },
                        (None, Some(value)) => RecoveryOutcome::Fallback { value, tier },
                        (None, None) => self.degraded(tier, last, None),
                    },
                }
            }
            ErrorTier::System => match cached {
                Some(value) => {
                    info!(stage = stage.as_str(), "Serving cached value after system error");
                    RecoveryOutcome::Cached { value, tier }
                }
                None => self.degraded(tier, error.to_string(), None),
            },
            ErrorTier::Critical => {
                let plan = RecoveryPlan {
                    error: error.to_string(),
                    stage,
                    context: detail.clone(),
                    steps: RECOVERY_STEPS.iter().map(|s| s.to_string()).collect(),
                    created_at: Utc::now(),
                };
                error!(
                    stage = stage.as_str(),
                    error = %error,
                    "Critical error, continuing in degraded mode"
                );
                self.degraded(tier, error.to_string(), Some(plan))
            }
        };

        let recovered = !outcome.is_degraded();
        if recovered {
            self.recovered[tier_index(tier)].fetch_add(1, Ordering::Relaxed);
            metrics::record_recovery(tier, stage);
        }

        let mut record = ErrorRecord::new(tier, stage, error, detail, recovered);
        if let RecoveryOutcome::Degraded {
            plan: Some(plan), ..
        } = &outcome
        {
            record = record.with_plan(plan.clone());
        }
        self.persist(&record).await;

        debug!(
            tier = tier.as_str(),
            stage = stage.as_str(),
            outcome = outcome.as_str(),
            "Recovery finished"
        );
        outcome
    }

    async fn retry<T, E, F, Fut>(
        &self,
        op: &mut F,
        retries: u32,
        backoff: bool,
    ) -> Result<(T, u32), String>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut last = String::new();
        for n in 0..retries {
            if backoff {
                tokio::time::sleep(self.config.backoff.delay_for_attempt(n)).await;
            }
            match op().await {
                Ok(value) => return Ok((value, n + 1)),
                Err(e) => {
                    last = e.to_string();
                    debug!(retry = n + 1, error = %last, "Retry failed");
                }
            }
        }
        Err(last)
    }

    fn degraded<T>(
        &self,
        tier: ErrorTier,
        error: String,
        plan: Option<RecoveryPlan>,
    ) -> RecoveryOutcome<T> {
        RecoveryOutcome::Degraded { tier, error, plan }
    }

    async fn persist(&self, record: &ErrorRecord) {
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.append_error(record).await {
                warn!(error = %e, "Failed to persist error record");
            }
        }
    }

    pub fn error_count(&self, tier: ErrorTier) -> u64 {
        self.errors[tier_index(tier)].load(Ordering::Relaxed)
    }

    pub fn recovered_count(&self, tier: ErrorTier) -> u64 {
        self.recovered[tier_index(tier)].load(Ordering::Relaxed)
    }

    pub fn recovery_rate(&self) -> f64 {
        let total: u64 = ErrorTier::ALL.iter().map(|t| self.error_count(*t)).sum();
        if total == 0 {
            return 1.0;
        }
        let recovered: u64 = ErrorTier::ALL.iter().map(|t| self.recovered_count(*t)).sum();
        recovered as f64 / total as f64
    }

    pub fn stats(&self) -> RecoveryStats {
        let mut errors = BTreeMap::new();
        let mut recovered = BTreeMap::new();
        for tier in ErrorTier::ALL {
            errors.insert(tier.as_str().to_string(), self.error_count(tier));
            recovered.insert(tier.as_str().to_string(), self.recovered_count(tier));
        }
        RecoveryStats {
            total_errors: errors.values().sum(),
            total_recovered: recovered.values().sum(),
            errors,
            recovered,
            recovery_rate: self.recovery_rate(),
        }
    }
}
