//! Prometheus exposition.
//!
//! Components register their counters in the default registry (see each
//! crate's `metrics` feature); this module renders whatever is registered,
//! plus a process-level uptime gauge.

use crate::TelemetryError;
use lazy_static::lazy_static;
use prometheus::{Encoder, IntGauge, TextEncoder};
use std::time::Instant;

lazy_static! {
    static ref STARTED_AT: Instant = Instant::now();

    /// Seconds since telemetry was initialized
    pub static ref UPTIME_SECONDS: IntGauge = IntGauge::new(
        "board_sync_uptime_seconds",
        "Seconds since the process initialized telemetry"
    ).expect("metric creation failed");
}

/// Handle to the registered process metrics.
#[derive(Debug, Clone, Copy)]
pub struct MetricsHandle {
    _private: (),
}

impl MetricsHandle {
    /// Render every registered metric in the Prometheus text format.
    pub fn render(&self) -> Result<String, TelemetryError> {
        let elapsed = STARTED_AT.elapsed().as_secs();
        UPTIME_SECONDS.set(i64::try_from(elapsed).unwrap_or(i64::MAX));

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
    }
}

/// Register process metrics in the default registry. Idempotent.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    lazy_static::initialize(&STARTED_AT);
    match prometheus::register(Box::new(UPTIME_SECONDS.clone())) {
        Ok(()) | Err(prometheus::Error::AlreadyReg) => Ok(MetricsHandle { _private: () }),
        Err(e) => Err(TelemetryError::MetricsInit(e.to_string())),
    }
}
