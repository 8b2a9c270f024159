//! Configuration for the Reorder Coordinator

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Coordinator configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Re-computations after a store conflict before giving up
    pub max_retries: u32,
    /// Bound on lock wait plus retry backoff for one proposal; a started
    /// attempt always finishes (milliseconds)
    pub retry_budget_ms: u64,
    /// Base pause between attempts; grows linearly per attempt (milliseconds)
    pub retry_backoff_ms: u64,
    /// Rank length above which the parent is rebalanced after a commit
    pub rebalance_threshold: usize,
}

impl CoordinatorConfig {
    #[must_use]
    pub fn retry_budget(&self) -> Duration {
        Duration::from_millis(self.retry_budget_ms)
    }

    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_budget_ms: 2_000,
            retry_backoff_ms: 10,
            rebalance_threshold: 12,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_budget(), Duration::from_secs(2));
        assert_eq!(config.backoff_for(3), Duration::from_millis(30));
        assert_eq!(config.rebalance_threshold, 12);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: CoordinatorConfig =
            serde_json::from_str(r#"{"max_retries": 7}"#).unwrap();
        assert_eq!(config.max_retries, 7);
        assert_eq!(config.retry_budget_ms, 2_000);
    }
}
