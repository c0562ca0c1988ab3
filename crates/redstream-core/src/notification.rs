//! Wake strategies for blocking store operations
//!
//! Blocking reads and pops are built from a non-blocking probe plus a way to
//! wait for "something changed". In-process backends wake waiters directly;
//! backends shared between processes have no such signal and poll.

use crate::error::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Strategy for waiting until a key may have changed
#[derive(Clone)]
pub enum WakeStrategy {
    /// Probe periodically
    Poll { interval: Duration },

    /// Wait for an explicit `notify_key` from the writer
    Notify(Arc<RwLock<HashMap<String, Arc<Notify>>>>),
}

impl WakeStrategy {
    /// Create a polling wake strategy with the given interval
    pub fn poll(interval: Duration) -> Self {
        Self::Poll { interval }
    }

    /// Create a notification-based wake strategy
    pub fn notify() -> Self {
        Self::Notify(Arc::new(RwLock::new(HashMap::new())))
    }

    /// Run `probe` until it yields a value or `timeout` elapses
    ///
    /// The probe runs at least once, so a zero timeout is a single attempt.
    /// With `Notify`, the waiter registers before probing, so a write landing
    /// between the probe and the wait is never missed.
    pub async fn wait_for<T, F, Fut>(&self, key: &str, timeout: Duration, mut probe: F) -> Result<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let deadline = Instant::now() + timeout;

        match self {
            WakeStrategy::Poll { interval } => loop {
                if let Some(value) = probe().await? {
                    return Ok(Some(value));
                }

                let now = Instant::now();
                if now >= deadline {
                    return Ok(None);
                }
                tokio::time::sleep((*interval).min(deadline - now)).await;
            },
            WakeStrategy::Notify(hub) => {
                let waiter = Waiter::register(hub, key);

                loop {
                    let notified = waiter.notify.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();

                    if let Some(value) = probe().await? {
                        return Ok(Some(value));
                    }

                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    let _ = tokio::time::timeout(deadline - now, notified).await;
                }
            }
        }
    }

    /// Wake everyone waiting on `key`
    ///
    /// This is a no-op for Poll strategy.
    pub fn notify_key(&self, key: &str) {
        if let WakeStrategy::Notify(hub) = self {
            if let Some(notify) = hub.read().get(key) {
                notify.notify_waiters();
            }
        }
    }
}

/// A registered interest in `key`; the hub entry goes away with the last one
struct Waiter<'a> {
    hub: &'a RwLock<HashMap<String, Arc<Notify>>>,
    key: &'a str,
    notify: Arc<Notify>,
}

impl<'a> Waiter<'a> {
    fn register(hub: &'a RwLock<HashMap<String, Arc<Notify>>>, key: &'a str) -> Self {
        let existing = hub.read().get(key).cloned();
        let notify = match existing {
            Some(notify) => notify,
            None => hub
                .write()
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Notify::new()))
                .clone(),
        };
        Self { hub, key, notify }
    }
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        let mut hub = self.hub.write();
        // The hub's reference plus ours
        let last = hub
            .get(self.key)
            .is_some_and(|n| Arc::ptr_eq(n, &self.notify) && Arc::strong_count(n) == 2);
        if last {
            hub.remove(self.key);
        }
    }
}

impl Default for WakeStrategy {
    fn default() -> Self {
        Self::Poll {
            interval: Duration::from_millis(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_poll_strategy_times_out() {
        let strategy = WakeStrategy::poll(Duration::from_millis(5));
        let probes = AtomicUsize::new(0);

        let start = std::time::Instant::now();
        let result: Option<()> = strategy
            .wait_for("test", Duration::from_millis(30), || {
                probes.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Ok(None))
            })
            .await
            .unwrap();

        assert!(result.is_none());
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(probes.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_zero_timeout_probes_once() {
        let strategy = WakeStrategy::notify();
        let probes = AtomicUsize::new(0);

        let result: Option<()> = strategy
            .wait_for("test", Duration::ZERO, || {
                probes.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Ok(None))
            })
            .await
            .unwrap();

        assert!(result.is_none());
        assert_eq!(probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_notify_strategy_wakes_waiter() {
        let strategy = WakeStrategy::notify();
        let ready = Arc::new(AtomicUsize::new(0));

        let waiter = {
            let strategy = strategy.clone();
            let ready = ready.clone();
            tokio::spawn(async move {
                strategy
                    .wait_for("test", Duration::from_secs(10), || {
                        let value = ready.load(Ordering::SeqCst);
                        std::future::ready(Ok((value > 0).then_some(value)))
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        ready.store(7, Ordering::SeqCst);
        strategy.notify_key("test");

        let value = tokio::time::timeout(Duration::from_millis(500), waiter)
            .await
            .expect("waiter should wake well before its timeout")
            .expect("task should not panic")
            .unwrap();
        assert_eq!(value, Some(7));
    }

    fn registered(strategy: &WakeStrategy) -> usize {
        match strategy {
            WakeStrategy::Notify(hub) => hub.read().len(),
            WakeStrategy::Poll { .. } => 0,
        }
    }

    #[tokio::test]
    async fn test_notify_hub_forgets_keys_without_waiters() {
        let strategy = WakeStrategy::notify();

        let first = strategy.wait_for("a", Duration::from_millis(200), || {
            std::future::ready(Ok(None::<()>))
        });
        let second = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let value = strategy
                .wait_for("a", Duration::from_millis(10), || {
                    std::future::ready(Ok(None::<()>))
                })
                .await;
            // The first waiter still holds the entry
            (value, registered(&strategy))
        };

        let (first, (second, during)) = tokio::join!(first, second);
        assert!(first.unwrap().is_none());
        assert!(second.unwrap().is_none());
        assert_eq!(during, 1);
        assert_eq!(registered(&strategy), 0);

        strategy
            .wait_for("b", Duration::ZERO, || std::future::ready(Ok(Some(1))))
            .await
            .unwrap();
        assert_eq!(registered(&strategy), 0);
    }

    #[tokio::test]
    async fn test_notify_other_key_does_not_wake() {
        let strategy = WakeStrategy::notify();

        let start = std::time::Instant::now();
        let waiter = {
            let strategy = strategy.clone();
            tokio::spawn(async move {
                strategy
                    .wait_for("a", Duration::from_millis(100), || {
                        std::future::ready(Ok(None::<()>))
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        strategy.notify_key("b");

        assert!(waiter.await.unwrap().unwrap().is_none());
        assert!(start.elapsed() >= Duration::from_millis(100));
    }
}
