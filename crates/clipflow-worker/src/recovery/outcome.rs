//! Values handed to and returned from the recovery layer.

use clipflow_models::{ErrorTier, RecoveryPlan};

/// Optional substitutes the classifier may hand back instead of a fresh result.
pub struct RecoveryContext<T> {
    /// Recorded on the error record
    pub detail: serde_json::Value,
    /// Returned when transient retries run out
    pub fallback: Option<T>,
    /// Returned for system-tier failures
    pub cached: Option<T>,
    /// Invoked when persistent retries run out
    pub workaround: Option<Box<dyn FnOnce() -> T + Send>>,
}

impl<T> Default for RecoveryContext<T> {
    fn default() -> Self {
        Self {
            detail: serde_json::Value::Null,
            fallback: None,
            cached: None,
            workaround: None,
        }
    }
}

impl<T> RecoveryContext<T> {
    pub fn new(detail: serde_json::Value) -> Self {
        Self {
            detail,
            ..Default::default()
        }
    }

    pub fn with_fallback(mut self, value: T) -> Self {
        self.fallback = Some(value);
        self
    }

    pub fn with_cached(mut self, value: T) -> Self {
        self.cached = Some(value);
        self
    }

    pub fn with_workaround(mut self, f: impl FnOnce() -> T + Send + 'static) -> Self {
        self.workaround = Some(Box::new(f));
        self
    }
}

/// Result of running an operation through the classifier.
#[derive(Debug)]
pub enum RecoveryOutcome<T> {
    /// First try succeeded
    Completed(T),
    /// A retry succeeded
    Recovered {
        value: T,
        tier: ErrorTier,
        retries: u32,
    },
    /// Caller-supplied fallback after transient retries ran out
    Fallback { value: T, tier: ErrorTier },
    /// Workaround result after persistent retries ran out
    Workaround { value: T, tier: ErrorTier },
    /// Cached value for a system-tier failure
    Cached { value: T, tier: ErrorTier },
    /// Nothing usable; the caller continues in degraded mode
    Degraded {
        tier: ErrorTier,
        error: String,
        plan: Option<RecoveryPlan>,
    },
}

impl<T> RecoveryOutcome<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            RecoveryOutcome::Completed(v)
            | RecoveryOutcome::Recovered { value: v, .. }
            | RecoveryOutcome::Fallback { value: v, .. }
            | RecoveryOutcome::Workaround { value: v, .. }
            | RecoveryOutcome::Cached { value: v, .. } => Some(v),
            RecoveryOutcome::Degraded { .. } => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            RecoveryOutcome::Completed(v)
            | RecoveryOutcome::Recovered { value: v, .. }
            | RecoveryOutcome::Fallback { value: v, .. }
            | RecoveryOutcome::Workaround { value: v, .. }
            | RecoveryOutcome::Cached { value: v, .. } => Some(v),
            RecoveryOutcome::Degraded { .. } => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, RecoveryOutcome::Degraded { .. })
    }

    /// Tier of the failure, if there was one.
    pub fn tier(&self) -> Option<ErrorTier> {
        match self {
            RecoveryOutcome::Completed(_) => None,
            RecoveryOutcome::Recovered { tier, .. }
            | RecoveryOutcome::Fallback { tier, .. }
            | RecoveryOutcome::Workaround { tier, .. }
            | RecoveryOutcome::Cached { tier, .. }
            | RecoveryOutcome::Degraded { tier, .. } => Some(*tier),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryOutcome::Completed(_) => "completed",
            RecoveryOutcome::Recovered { .. } => "recovered",
            RecoveryOutcome::Fallback { .. } => "fallback",
            RecoveryOutcome::Workaround { .. } => "workaround",
            RecoveryOutcome::Cached { .. } => "cached",
            RecoveryOutcome::Degraded { .. } => "degraded",
        }
    }
}
