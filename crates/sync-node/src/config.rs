//! # Node Configuration
//!
//! Runtime parameters for the in-process node. Every value has a default;
//! environment variables override individual fields.

use bs_03_reorder_coordinator::CoordinatorConfig;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Complete node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Coordinator retry and rebalance settings.
    pub coordinator: CoordinatorConfig,
    /// How often idle parent locks are released.
    pub maintenance_interval: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorConfig::default(),
            maintenance_interval: Duration::from_secs(30),
        }
    }
}

impl NodeConfig {
    /// Load configuration from the environment.
    ///
    /// # Environment Variables
    ///
    /// - `BS_MAX_RETRIES`: conflict retries per proposal (default: 3)
    /// - `BS_RETRY_BUDGET_MS`: time budget per proposal (default: 2000)
    /// - `BS_REBALANCE_THRESHOLD`: rank length that triggers a rebalance (default: 12)
    ///
    /// Unparsable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        override_from(&lookup, "BS_MAX_RETRIES", &mut config.coordinator.max_retries);
        override_from(&lookup, "BS_RETRY_BUDGET_MS", &mut config.coordinator.retry_budget_ms);
        override_from(
            &lookup,
            "BS_REBALANCE_THRESHOLD",
            &mut config.coordinator.rebalance_threshold,
        );
        config
    }
}

fn override_from<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, field: &mut T) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.parse() {
        Ok(value) => *field = value,
        Err(_) => warn!(key, value = %raw, "Ignoring unparsable configuration value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_environment() {
        let config = NodeConfig::from_lookup(|_| None);
        assert_eq!(config.coordinator.max_retries, 3);
        assert_eq!(config.coordinator.retry_budget_ms, 2_000);
        assert_eq!(config.coordinator.rebalance_threshold, 12);
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let config = NodeConfig::from_lookup(|key| match key {
            "BS_MAX_RETRIES" => Some("5".into()),
            "BS_RETRY_BUDGET_MS" => Some("soon".into()),
            "BS_REBALANCE_THRESHOLD" => Some("20".into()),
            _ => None,
        });
        assert_eq!(config.coordinator.max_retries, 5);
        assert_eq!(config.coordinator.retry_budget_ms, 2_000);
        assert_eq!(config.coordinator.rebalance_threshold, 20);
    }
}
