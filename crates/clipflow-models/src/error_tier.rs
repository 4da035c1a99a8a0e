//! Error tiers, error records and recovery plans.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Severity class that governs how a failure is recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorTier {
    /// Timeouts, resets, temporary glitches. Retried once.
    Transient,
    /// Permissions, rate limits, bad input. Retried with backoff.
    Persistent,
    /// Missing dependencies, exhausted resources. Served from cache.
    System,
    /// Corruption, fatal or security failures. Produces a recovery plan.
    Critical,
}

impl ErrorTier {
    pub const ALL: [ErrorTier; 4] = [
        ErrorTier::Transient,
        ErrorTier::Persistent,
        ErrorTier::System,
        ErrorTier::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorTier::Transient => "transient",
            ErrorTier::Persistent => "persistent",
            ErrorTier::System => "system",
            ErrorTier::Critical => "critical",
        }
    }

    /// Retries of the same operation allowed for this tier.
    pub fn max_retries(&self) -> u32 {
        match self {
            ErrorTier::Transient => 1,
            ErrorTier::Persistent => 3,
            ErrorTier::System | ErrorTier::Critical => 0,
        }
    }
}

impl fmt::Display for ErrorTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "transient" | "tier_1" | "1" => Ok(ErrorTier::Transient),
            "persistent" | "tier_2" | "2" => Ok(ErrorTier::Persistent),
            "system" | "tier_3" | "3" => Ok(ErrorTier::System),
            "critical" | "tier_4" | "4" => Ok(ErrorTier::Critical),
            other => Err(format!("unknown error tier: {}", other)),
        }
    }
}

/// Pipeline stage a failure originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discovery,
    Acquisition,
    Analysis,
    Selection,
    Effects,
    Captions,
    Publish,
    Persistence,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Discovery => "discovery",
            Stage::Acquisition => "acquisition",
            Stage::Analysis => "analysis",
            Stage::Selection => "selection",
            Stage::Effects => "effects",
            Stage::Captions => "captions",
            Stage::Publish => "publish",
            Stage::Persistence => "persistence",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remediation record emitted for critical failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RecoveryPlan {
    pub error: String,
    pub stage: Stage,
    pub context: serde_json::Value,
    /// Ordered remediation steps for an operator
    pub steps: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// One classified failure. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorRecord {
    pub id: String,
    pub tier: ErrorTier,
    pub stage: Stage,
    pub message: String,
    /// Free-form context supplied by the failing stage
    pub context: serde_json::Value,
    /// Whether the caller got a usable value back
    pub recovered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_plan: Option<RecoveryPlan>,
    pub at: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(
        tier: ErrorTier,
        stage: Stage,
        message: impl Into<String>,
        context: serde_json::Value,
        recovered: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tier,
            stage,
            message: message.into(),
            context,
            recovered,
            recovery_plan: None,
            at: Utc::now(),
        }
    }

    pub fn with_plan(mut self, plan: RecoveryPlan) -> Self {
        self.recovery_plan = Some(plan);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_parse() {
        assert_eq!("Persistent".parse::<ErrorTier>(), Ok(ErrorTier::Persistent));
        assert_eq!("tier_1".parse::<ErrorTier>(), Ok(ErrorTier::Transient));
        assert!("bogus".parse::<ErrorTier>().is_err());
    }

    #[test]
    fn test_tier_retry_budget() {
        assert_eq!(ErrorTier::Transient.max_retries(), 1);
        assert_eq!(ErrorTier::Persistent.max_retries(), 3);
        assert_eq!(ErrorTier::Critical.max_retries(), 0);
    }
}
