use super::LockConfig;
use crate::error::{RedstreamError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a consumer loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Maximum number of messages delivered per batch
    pub batch_size: usize,

    /// How long a single read blocks waiting for new entries
    pub block: Duration,

    /// How long to wait for the lock holder to release before retrying
    pub lock_retry: Duration,

    /// Sleep after an error before the loop retries
    pub error_backoff: Duration,

    /// Lease settings of the consumer's lock
    pub lock: LockConfig,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            batch_size: 1_000,
            block: Duration::from_secs(5),
            lock_retry: Duration::from_secs(5),
            error_backoff: Duration::from_secs(5),
            lock: LockConfig::default(),
        }
    }
}

impl ConsumerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_block(mut self, block: Duration) -> Self {
        self.block = block;
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
                "consumer batch_size must be positive".into(),
            ));
        }
        self.lock.validate()
    }
}

/// Configuration for a delayer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayerConfig {
    /// Minimum age of a delay entry before it is replayed
    pub delay: Duration,

    /// Extra sleep on top of the remaining delay when waiting for an entry
    pub ready_margin: Duration,

    /// Settings of the inner consumer reading the delay stream
    pub consumer: ConsumerConfig,
}

impl Default for DelayerConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(300),
            ready_margin: Duration::from_secs(1),
            consumer: ConsumerConfig::default(),
        }
    }
}

impl DelayerConfig {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn with_ready_margin(mut self, margin: Duration) -> Self {
        self.ready_margin = margin;
        self
    }

    pub fn with_consumer(mut self, consumer: ConsumerConfig) -> Self {
        self.consumer = consumer;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.consumer.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumer_defaults() {
        let cfg = ConsumerConfig::default();
        assert_eq!(cfg.batch_size, 1_000);
        assert_eq!(cfg.block, Duration::from_secs(5));
        assert_eq!(cfg.error_backoff, Duration::from_secs(5));
        cfg.validate().unwrap();
    }

    #[test]
    fn test_zero_batch_rejected() {
        let cfg = ConsumerConfig::new().with_batch_size(0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let cfg: ConsumerConfig = serde_json::from_str(r#"{"batch_size": 10}"#).unwrap();
        assert_eq!(cfg.batch_size, 10);
        assert_eq!(cfg.lock_retry, Duration::from_secs(5));
    }

    #[test]
    fn test_delayer_config() {
        let cfg = DelayerConfig::new(Duration::from_secs(60))
            .with_ready_margin(Duration::from_millis(50));
        assert_eq!(cfg.delay, Duration::from_secs(60));
        assert_eq!(cfg.ready_margin, Duration::from_millis(50));
        assert_eq!(cfg.consumer.batch_size, 1_000);
    }
}
