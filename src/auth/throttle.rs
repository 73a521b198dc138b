//! Per-caller delay after repeated authentication failures.
//!
//! Counters are keyed by caller (remote address, or a credential fingerprint when the
//! address is unknown). The lock only guards the counter table; the delay itself is
//! awaited after the lock is released, so a throttled caller never holds up anyone else.

use crate::config::ThrottleConfig;
use chrono::{DateTime, Duration, Utc};
use log::warn;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Failures older than this no longer count.
const FAILURE_WINDOW_SECS: i64 = 600;

#[derive(Debug, Clone, Copy)]
struct FailureRecord {
    count: u32,
    last_failure: DateTime<Utc>,
}

#[derive(Debug)]
pub struct Throttle {
    threshold: u32,
    delay: std::time::Duration,
    failures: Mutex<HashMap<String, FailureRecord>>,
}

impl Throttle {
    pub fn new(threshold: u32, delay: std::time::Duration) -> Self {
        Self {
            threshold,
            delay,
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &ThrottleConfig) -> Self {
        Self::new(
            config.failure_threshold,
            std::time::Duration::from_millis(config.failure_delay_ms),
        )
    }

    /// Current failure count for a caller within the window.
    pub async fn failures(&self, caller: &str) -> u32 {
        let failures = self.failures.lock().await;
        failures
            .get(caller)
            .filter(|record| Utc::now() - record.last_failure < Duration::seconds(FAILURE_WINDOW_SECS))
            .map_or(0, |record| record.count)
    }

    pub async fn is_throttled(&self, caller: &str) -> bool {
        self.threshold > 0 && self.failures(caller).await >= self.threshold
    }

    /// Sleep when the caller has reached the failure threshold.
    pub async fn delay_if_throttled(&self, caller: &str) {
        if self.delay.is_zero() || !self.is_throttled(caller).await {
            return;
        }
        warn!(
            "Throttling caller {} for {} ms after repeated authentication failures",
            caller,
            self.delay.as_millis()
        );
        tokio::time::sleep(self.delay).await;
    }

    pub async fn record_failure(&self, caller: &str) {
        let now = Utc::now();
        let mut failures = self.failures.lock().await;
        failures.retain(|_, record| now - record.last_failure < Duration::seconds(FAILURE_WINDOW_SECS));
        let record = failures.entry(caller.to_string()).or_insert(FailureRecord {
            count: 0,
            last_failure: now,
        });
        record.count = record.count.saturating_add(1);
        record.last_failure = now;
    }

    pub async fn record_success(&self, caller: &str) {
        self.failures.lock().await.remove(caller);
    }
}
