//! Outcomes of a single worker iteration and the retry policy applied to them
//!
//! `run_once` on a consumer, delayer or trimmer never sleeps on its own
//! behalf; it reports what happened and the `run` driver decides how long to
//! pause before the next iteration.

use crate::lock::Lock;
use redstream_core::{ConsumerConfig, Result, TrimmerConfig};
use std::time::Duration;
use tracing::{error, warn};

/// What one `run_once` iteration did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// A batch of this many entries was handled
    Processed(usize),

    /// Nothing arrived within the blocking read
    Idle,

    /// Another process holds the lock
    LockBusy,

    /// Nothing to do for the given duration
    Sleep(Duration),
}

/// Pause taken by a `run` driver between iterations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pause {
    None,

    /// Wait for the lock's release notification, at most this long
    WaitLock(Duration),

    Sleep(Duration),
}

/// Maps iteration results to pauses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPolicy {
    pub lock_retry: Duration,
    pub error_backoff: Duration,
}

impl RunPolicy {
    pub fn new(lock_retry: Duration, error_backoff: Duration) -> Self {
        Self {
            lock_retry,
            error_backoff,
        }
    }

    pub fn delay_after(&self, result: &Result<RunOutcome>) -> Pause {
        match result {
            Ok(RunOutcome::Processed(_)) | Ok(RunOutcome::Idle) => Pause::None,
            Ok(RunOutcome::LockBusy) => Pause::WaitLock(self.lock_retry),
            Ok(RunOutcome::Sleep(d)) => Pause::Sleep(*d),
            Err(_) => Pause::Sleep(self.error_backoff),
        }
    }
}

impl From<&ConsumerConfig> for RunPolicy {
    fn from(config: &ConsumerConfig) -> Self {
        Self::new(config.lock_retry, config.error_backoff)
    }
}

impl From<&TrimmerConfig> for RunPolicy {
    fn from(config: &TrimmerConfig) -> Self {
        Self::new(config.lock_retry, config.error_backoff)
    }
}

/// Log a failed iteration and take the pause `policy` prescribes
pub(crate) async fn settle(policy: &RunPolicy, lock: &Lock, result: &Result<RunOutcome>) {
    if let Err(e) = result {
        error!(
            lock = %lock.name(),
            error = %e,
            retryable = e.is_retryable(),
            "Iteration failed"
        );
    }

    match policy.delay_after(result) {
        Pause::None => {}
        Pause::WaitLock(timeout) => {
            if let Err(e) = lock.wait(timeout).await {
                warn!(lock = %lock.name(), error = %e, "Waiting for lock release failed");
                tokio::time::sleep(timeout).await;
            }
        }
        Pause::Sleep(duration) => tokio::time::sleep(duration).await,
    }
}
