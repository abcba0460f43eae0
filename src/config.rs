//! Runtime configuration for rmq connections

use std::time::Duration;

use crate::error::RmqError;

/// Tuning knobs for a connection and its workers
#[derive(Debug, Clone)]
pub struct RmqConfig {
    /// How often the heartbeat key is refreshed
    pub heartbeat_interval: Duration,
    /// TTL written with each heartbeat; must exceed the interval with
    /// enough slack to ride out store latency and short outages
    pub heartbeat_ttl: Duration,
    /// Poll slice for the fetcher's blocking pop; shutdown is observed
    /// at slice boundaries, so shorter slices stop faster
    pub fetch_poll_timeout: Duration,
}

impl Default for RmqConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(1),
            heartbeat_ttl: Duration::from_secs(60),
            fetch_poll_timeout: Duration::from_secs(1),
        }
    }
}

impl RmqConfig {
    /// Config with a custom heartbeat cadence, keeping the other defaults
    pub fn with_heartbeat(interval: Duration, ttl: Duration) -> Self {
        Self {
            heartbeat_interval: interval,
            heartbeat_ttl: ttl,
            ..Default::default()
        }
    }

    /// Validate invariants the protocol depends on
    pub(crate) fn validate(&self) -> Result<(), RmqError> {
        if self.heartbeat_ttl <= self.heartbeat_interval {
            return Err(RmqError::InvalidConfig(format!(
                "heartbeat TTL ({:?}) must exceed the heartbeat interval ({:?})",
                self.heartbeat_ttl, self.heartbeat_interval
            )));
        }
        if self.fetch_poll_timeout.is_zero() {
            return Err(RmqError::InvalidConfig(
                "fetch poll timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
