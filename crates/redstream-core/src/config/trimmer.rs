use super::LockConfig;
use crate::error::{RedstreamError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which entries a trimmer may delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrimPolicy {
    /// Delete entries every listed consumer has committed
    ///
    /// A consumer without an offset blocks trimming entirely.
    Consumers(Vec<String>),

    /// Delete entries older than the given age
    Expiry(Duration),
}

/// Configuration for a trimmer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimmerConfig {
    pub policy: TrimPolicy,

    /// Sleep when there is nothing (more) to trim
    #[serde(default = "default_interval")]
    pub interval: Duration,

    /// Entries read and deleted per round trip
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// How long to wait for another trimmer to release the lock
    #[serde(default = "default_retry")]
    pub lock_retry: Duration,

    /// Sleep after an error before the loop retries
    #[serde(default = "default_retry")]
    pub error_backoff: Duration,

    #[serde(default)]
    pub lock: LockConfig,
}

fn default_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_batch_size() -> usize {
    1_000
}

fn default_retry() -> Duration {
    Duration::from_secs(5)
}

impl TrimmerConfig {
    pub fn new(policy: TrimPolicy) -> Self {
        Self {
            policy,
            interval: default_interval(),
            batch_size: default_batch_size(),
            lock_retry: default_retry(),
            error_backoff: default_retry(),
            lock: LockConfig::default(),
        }
    }

    /// Trim what all of `consumers` have committed
    pub fn consumers<I, S>(consumers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(TrimPolicy::Consumers(
            consumers.into_iter().map(Into::into).collect(),
        ))
    }

    /// Trim what is older than `expiry`
    pub fn expiry(expiry: Duration) -> Self {
        Self::new(TrimPolicy::Expiry(expiry))
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_lock_retry(mut self, lock_retry: Duration) -> Self {
        self.lock_retry = lock_retry;
        self
    }

    pub fn with_error_backoff(mut self, error_backoff: Duration) -> Self {
        self.error_backoff = error_backoff;
        self
    }

    pub fn with_lock(mut self, lock: LockConfig) -> Self {
        self.lock = lock;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(RedstreamError::InvalidConfig(
                "trimmer batch_size must be positive".into(),
            ));
        }
        if let TrimPolicy::Consumers(names) = &self.policy {
            if names.is_empty() {
                return Err(RedstreamError::InvalidConfig(
                    "trimmer needs at least one consumer name".into(),
                ));
            }
        }
        self.lock.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumers_policy() {
        let cfg = TrimmerConfig::consumers(["indexer", "cacher"]);
        assert_eq!(
            cfg.policy,
            TrimPolicy::Consumers(vec!["indexer".to_string(), "cacher".to_string()])
        );
        assert_eq!(cfg.batch_size, 1_000);
        cfg.validate().unwrap();
    }

    #[test]
    fn test_empty_consumer_set_rejected() {
        let cfg = TrimmerConfig::consumers(Vec::<String>::new());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_policy_storage_roundtrip() {
        let cfg = TrimmerConfig::expiry(Duration::from_secs(3600))
            .with_interval(Duration::from_secs(10));
        let json = serde_json::to_string(&cfg).unwrap();
        let back: TrimmerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }
}
