//! Rolling per-strategy success rates, logged on every success.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use tracing::warn;

use clipflow_models::SuccessPattern;
use clipflow_storage::append_json_line;

const RECENT_LIMIT: usize = 100;

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    successes: u64,
    tries: u64,
}

/// Tracks which strategy works for which URL family.
pub struct SuccessPatternLog {
    path: Option<PathBuf>,
    tallies: Mutex<HashMap<(String, String), Tally>>,
    recent: Mutex<VecDeque<SuccessPattern>>,
}

impl SuccessPatternLog {
    /// `path` is the JSON-lines file appended on success; `None` keeps it in memory.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            tallies: Mutex::new(HashMap::new()),
            recent: Mutex::new(VecDeque::with_capacity(RECENT_LIMIT)),
        }
    }

    pub fn record_failure(&self, strategy: &str, url_family: &str) {
        let mut tallies = self.tallies.lock().unwrap_or_else(PoisonError::into_inner);
        tallies
            .entry((strategy.to_string(), url_family.to_string()))
            .or_default()
            .tries += 1;
    }

    pub async fn record_success(&self, strategy: &str, url_family: &str) -> SuccessPattern {
        let success_rate = {
            let mut tallies = self.tallies.lock().unwrap_or_else(PoisonError::into_inner);
            let tally = tallies
                .entry((strategy.to_string(), url_family.to_string()))
                .or_default();
            tally.tries += 1;
            tally.successes += 1;
            tally.successes as f64 / tally.tries as f64
        };

        let pattern = SuccessPattern {
            strategy: strategy.to_string(),
            url_family: url_family.to_string(),
            success_rate,
            recorded_at: Utc::now(),
        };

        {
            let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
            if recent.len() == RECENT_LIMIT {
                recent.pop_front();
            }
            recent.push_back(pattern.clone());
        }

        if let Some(path) = &self.path {
            if let Err(e) = append_json_line(path, &pattern).await {
                warn!(path = %path.display(), error = %e, "Failed to append success pattern");
            }
        }
        pattern
    }

    pub fn success_rate(&self, strategy: &str, url_family: &str) -> Option<f64> {
        let tallies = self.tallies.lock().unwrap_or_else(PoisonError::into_inner);
        tallies
            .get(&(strategy.to_string(), url_family.to_string()))
            .filter(|t| t.tries > 0)
            .map(|t| t.successes as f64 / t.tries as f64)
    }

    /// Most recent successes, oldest first.
    pub fn recent(&self) -> Vec<SuccessPattern> {
        self.recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}
