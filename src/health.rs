//! Liveness probing.
//!
//! A probe is one lightweight backend-native call bounded by a timeout. Every
//! failure, including the timeout itself, is reported as "unhealthy".

use crate::adapter::BackendAdapter;
use crate::models::BackendFamily;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Outcome of one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub family: BackendFamily,
    pub healthy: bool,
    pub latency_ms: u64,
    pub timed_out: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct HealthChecker {
    timeout: Duration,
}

impl HealthChecker {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn is_healthy(&self, adapter: &dyn BackendAdapter) -> bool {
        self.report(adapter).await.healthy
    }

    pub async fn report(&self, adapter: &dyn BackendAdapter) -> HealthReport {
        let start = Instant::now();
        let (healthy, timed_out) = match tokio::time::timeout(self.timeout, adapter.is_healthy()).await {
            Ok(healthy) => (healthy, false),
            Err(_) => {
                warn!(
                    family = %adapter.family(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Health probe timed out"
                );
                (false, true)
            }
        };
        let latency_ms = start.elapsed().as_millis() as u64;
        debug!(family = %adapter.family(), healthy, latency_ms, "Health probe finished");
        HealthReport {
            family: adapter.family(),
            healthy,
            latency_ms,
            timed_out,
        }
    }
}
