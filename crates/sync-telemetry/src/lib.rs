//! # Sync Telemetry
//!
//! Logging and metrics setup shared by every Board-Sync binary.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sync_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let telemetry = init_telemetry(&TelemetryConfig::from_env())?;
//! // ...
//! println!("{}", telemetry.metrics().render()?);
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `BS_SERVICE_NAME` | `board-sync` | Service name in logs |
//! | `BS_LOG_LEVEL` / `RUST_LOG` | `info` | Log filter |
//! | `BS_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `BS_JSON_LOGS` | `false` (`true` in containers) | JSON lines output |

mod config;
mod logging;
mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{register_metrics, MetricsHandle, UPTIME_SECONDS};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to install tracing subscriber: {0}")]
    SubscriberInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Keeps telemetry handles alive for the process lifetime.
pub struct TelemetryGuard {
    metrics: MetricsHandle,
}

impl TelemetryGuard {
    pub fn metrics(&self) -> MetricsHandle {
        self.metrics
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}

/// Register metrics, then install the global subscriber.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = register_metrics()?;
    init_logging(config)?;
    Ok(TelemetryGuard { metrics })
}
