use crate::error::{RedstreamError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lease settings for a named lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Lease time to live; a holder that stops renewing loses the lock after this
    pub ttl: Duration,

    /// How often the holder renews its lease while the protected block runs
    pub renew_interval: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5),
            renew_interval: Duration::from_secs(3),
        }
    }
}

impl LockConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_renew_interval(mut self, interval: Duration) -> Self {
        self.renew_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.ttl.is_zero() {
            return Err(RedstreamError::InvalidConfig("lock ttl must be positive".into()));
        }
        if self.renew_interval.is_zero() || self.renew_interval >= self.ttl {
            return Err(RedstreamError::InvalidConfig(format!(
                "lock renew_interval {:?} must be positive and below ttl {:?}",
                self.renew_interval, self.ttl
            )));
        }
        Ok(())
    }
}
