//! Leased mutual exclusion across processes
//!
//! A lock is a key holding the holder's random token with a time to live.
//! While the protected block runs, a background task refreshes the lease;
//! on completion the key is deleted only if it still holds our token, and a
//! token is pushed to the paired notification list to wake waiters.

use redstream_core::{observe, KeySpace, LockConfig, LogStore, RedstreamError, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

tokio::task_local! {
    /// Tokens of the locks held by the current call chain
    static HELD_TOKENS: Vec<String>;
}

/// Named lease shared by every process using the same store
///
/// Each instance owns a random token, so two instances with the same name
/// exclude each other even within one process. Concurrent calls on one
/// instance exclude each other too; only a call nested inside the held
/// block re-enters.
pub struct Lock {
    store: Arc<dyn LogStore>,
    name: String,
    key: String,
    notify_key: String,
    token: String,
    config: LockConfig,
    gate: Mutex<()>,
}

impl Lock {
    pub fn new(
        store: Arc<dyn LogStore>,
        keys: &KeySpace,
        name: impl Into<String>,
        config: LockConfig,
    ) -> Result<Self> {
        config.validate()?;
        let name = name.into();

        Ok(Self {
            store,
            key: keys.lock(&name),
            notify_key: keys.lock_notify(&name),
            token: uuid::Uuid::new_v4().to_string(),
            name,
            config,
            gate: Mutex::new(()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// This instance's holder token
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Whether the calling task is running inside this lock's `acquire`
    ///
    /// Other tasks using the same instance see false while it is held.
    pub fn is_held(&self) -> bool {
        HELD_TOKENS
            .try_with(|held| held.contains(&self.token))
            .unwrap_or(false)
    }

    /// Run `block` while holding the lock
    ///
    /// Returns `Ok(None)` without running `block` if another holder owns the
    /// lock, including another task using this same instance. Store errors
    /// while releasing are logged, not returned, since the lease lapses on
    /// its own.
    pub async fn acquire<F, Fut, T>(&self, block: F) -> Result<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if self.is_held() {
            return Ok(Some(block().await));
        }

        let Ok(_gate) = self.gate.try_lock() else {
            trace!(lock = %self.name, "Lock busy in this process");
            observe::record_lock_attempt(false);
            return Ok(None);
        };

        let acquired = self
            .store
            .acquire_lease(&self.key, &self.token, self.config.ttl)
            .await?;
        observe::record_lock_attempt(acquired);

        if !acquired {
            trace!(lock = %self.name, "Lock busy");
            return Ok(None);
        }

        debug!(lock = %self.name, "Lock acquired");

        let (stop_tx, stop_rx) = oneshot::channel();
        let renewal = self.spawn_renewal(stop_rx);

        let mut held = HELD_TOKENS
            .try_with(|held| held.clone())
            .unwrap_or_default();
        held.push(self.token.clone());
        let value = HELD_TOKENS.scope(held, block()).await;

        let _ = stop_tx.send(());
        if let Err(e) = renewal.await {
            warn!(lock = %self.name, error = %e, "Lock renewal task failed");
        }

        if let Err(e) = self.release().await {
            warn!(lock = %self.name, error = %e, "Failed to release lock");
        }

        Ok(Some(value))
    }

    /// Wait until the lock is released or `timeout` elapses
    ///
    /// Returns true if woken by a release.
    pub async fn wait(&self, timeout: Duration) -> Result<bool> {
        let woken = self.store.blocking_pop(&self.notify_key, timeout).await?;
        Ok(woken.is_some())
    }

    fn spawn_renewal(&self, mut stop: oneshot::Receiver<()>) -> JoinHandle<()> {
        let store = self.store.clone();
        let name = self.name.clone();
        let key = self.key.clone();
        let token = self.token.clone();
        let ttl = self.config.ttl;
        let every = self.config.renew_interval;

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    // Also resolves when the sender is dropped by an unwinding block
                    _ = &mut stop => break,
                    _ = ticker.tick() => {
                        match store.acquire_lease(&key, &token, ttl).await {
                            Ok(true) => trace!(lock = %name, "Lock renewed"),
                            Ok(false) => {
                                warn!(lock = %name, "Lock taken over by another holder");
                                observe::record_lock_lost();
                                break;
                            }
                            Err(e) => warn!(lock = %name, error = %e, "Failed to renew lock"),
                        }
                    }
                }
            }
        })
    }

    async fn release(&self) -> Result<()> {
        if !self.store.release_lease(&self.key, &self.token).await? {
            let err = RedstreamError::LockLost(self.name.clone());
            warn!(lock = %self.name, error = %err, "Lease expired before release");
            observe::record_lock_lost();
        }

        self.store.list_push(&self.notify_key, &self.token).await?;
        self.store.list_trim(&self.notify_key, 1).await?;
        self.store.expire(&self.notify_key, self.config.ttl).await?;

        debug!(lock = %self.name, "Lock released");
        Ok(())
    }
}
