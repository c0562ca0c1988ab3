use crate::lock::Lock;
use crate::runner::{self, RunOutcome, RunPolicy};
use redstream_core::{
    now_millis, observe, KeySpace, LogStore, Result, StreamId, TrimPolicy, TrimmerConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Deletes entries that are no longer needed
///
/// With [`TrimPolicy::Consumers`], entries up to the smallest offset
/// committed by the listed consumers are deleted; a consumer that has never
/// committed blocks trimming entirely. With [`TrimPolicy::Expiry`], entries
/// older than the expiry are deleted. Trimming runs under the lock
/// `trimmer:{stream}`.
pub struct Trimmer {
    store: Arc<dyn LogStore>,
    stream: String,
    stream_key: String,
    offset_keys: Vec<String>,
    lock: Lock,
    config: TrimmerConfig,
}

impl Trimmer {
    pub fn new(
        store: Arc<dyn LogStore>,
        keys: &KeySpace,
        stream: impl Into<String>,
        config: TrimmerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let stream = stream.into();

        let offset_keys = match &config.policy {
            TrimPolicy::Consumers(names) => names
                .iter()
                .map(|name| keys.offset(&stream, name))
                .collect(),
            TrimPolicy::Expiry(_) => Vec::new(),
        };

        let lock = Lock::new(
            store.clone(),
            keys,
            format!("trimmer:{}", stream),
            config.lock.clone(),
        )?;

        Ok(Self {
            stream_key: keys.stream(&stream),
            store,
            stream,
            offset_keys,
            lock,
            config,
        })
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Trim once, returning how long to sleep before the next pass
    pub async fn run_once(&self) -> Result<RunOutcome> {
        let trimmed = self
            .lock
            .acquire(|| async {
                match &self.config.policy {
                    TrimPolicy::Consumers(_) => self.trim_consumed().await,
                    TrimPolicy::Expiry(expiry) => self.trim_expired(*expiry).await,
                }
            })
            .await?;

        match trimmed {
            Some(result) => result,
            None => Ok(RunOutcome::LockBusy),
        }
    }

    /// Trim forever
    pub async fn run(&self) {
        info!(stream = %self.stream, policy = ?self.config.policy, "Starting trimmer");
        let policy = RunPolicy::from(&self.config);

        loop {
            let result = self.run_once().await;
            runner::settle(&policy, &self.lock, &result).await;
        }
    }

    async fn trim_consumed(&self) -> Result<RunOutcome> {
        let offsets = self.store.get_many(&self.offset_keys).await?;

        let mut min: Option<StreamId> = None;
        for raw in offsets {
            let Some(raw) = raw else {
                debug!(stream = %self.stream, "Not every consumer has committed yet");
                return Ok(RunOutcome::Sleep(self.config.interval));
            };
            let offset: StreamId = raw.parse()?;
            min = Some(min.map_or(offset, |m| m.min(offset)));
        }

        let Some(min) = min else {
            return Ok(RunOutcome::Sleep(self.config.interval));
        };

        let deleted = self.delete_through(min).await?;
        if deleted > 0 {
            debug!(stream = %self.stream, entries = deleted, through = %min, "Trimmed consumed entries");
        }
        Ok(RunOutcome::Sleep(self.config.interval))
    }

    async fn trim_expired(&self, expiry: Duration) -> Result<RunOutcome> {
        let now = now_millis();
        let cutoff = StreamId::last_at(now.saturating_sub(expiry.as_millis() as u64));

        let deleted = self.delete_through(cutoff).await?;
        if deleted > 0 {
            debug!(stream = %self.stream, entries = deleted, expiry = ?expiry, "Trimmed expired entries");
        }

        let oldest = self
            .store
            .range(&self.stream_key, StreamId::MIN, StreamId::MAX, 1)
            .await?;

        match oldest.first() {
            Some(entry) => {
                let remaining = expiry.saturating_sub(entry.id.age_at(now_millis()));
                Ok(RunOutcome::Sleep(remaining.max(Duration::from_millis(1))))
            }
            None => Ok(RunOutcome::Sleep(self.config.interval)),
        }
    }

    /// Delete every entry with an id at or below `through`, in batches
    async fn delete_through(&self, through: StreamId) -> Result<usize> {
        let mut total = 0;

        loop {
            let batch = self
                .store
                .range(&self.stream_key, StreamId::MIN, through, self.config.batch_size)
                .await?;
            if batch.is_empty() {
                break;
            }

            let ids: Vec<StreamId> = batch.iter().map(|entry| entry.id).collect();
            total += self.store.delete(&self.stream_key, &ids).await?;
        }

        observe::record_trimmed(total);
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redstream_core::payload_fields;
    use redstream_memory::MemoryStore;

    #[tokio::test]
    async fn test_missing_consumer_offset_blocks_trim() {
        let store: Arc<dyn LogStore> = Arc::new(MemoryStore::new());
        let config = TrimmerConfig::consumers(["indexer", "cacher"])
            .with_interval(Duration::from_millis(50));
        let trimmer = Trimmer::new(store.clone(), &KeySpace::root(), "users", config).unwrap();

        let id = store
            .append("redstream:stream:users", payload_fields("{}"))
            .await
            .unwrap();
        store
            .set("redstream:offset:users:indexer", &id.to_string())
            .await
            .unwrap();

        let outcome = trimmer.run_once().await.unwrap();
        assert_eq!(outcome, RunOutcome::Sleep(Duration::from_millis(50)));
        assert_eq!(store.length("redstream:stream:users").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expiry_keeps_fresh_entries() {
        let store: Arc<dyn LogStore> = Arc::new(MemoryStore::new());
        let config = TrimmerConfig::expiry(Duration::from_secs(60));
        let trimmer = Trimmer::new(store.clone(), &KeySpace::root(), "users", config).unwrap();

        store
            .append("redstream:stream:users", payload_fields("{}"))
            .await
            .unwrap();

        match trimmer.run_once().await.unwrap() {
            RunOutcome::Sleep(d) => {
                assert!(d <= Duration::from_secs(60));
                assert!(d > Duration::from_secs(50));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(store.length("redstream:stream:users").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expiry_deletes_old_entries() {
        let store: Arc<dyn LogStore> = Arc::new(MemoryStore::new());
        let config = TrimmerConfig::expiry(Duration::from_millis(30)).with_batch_size(2);
        let trimmer = Trimmer::new(store.clone(), &KeySpace::root(), "users", config).unwrap();

        for _ in 0..5 {
            store
                .append("redstream:stream:users", payload_fields("{}"))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        let fresh = store
            .append("redstream:stream:users", payload_fields("{}"))
            .await
            .unwrap();

        trimmer.run_once().await.unwrap();

        let left = store
            .range("redstream:stream:users", StreamId::MIN, StreamId::MAX, 10)
            .await
            .unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, fresh);
    }

    #[test]
    fn test_empty_consumer_set_rejected() {
        let store: Arc<dyn LogStore> = Arc::new(MemoryStore::new());
        let config = TrimmerConfig::consumers(Vec::<String>::new());
        assert!(Trimmer::new(store, &KeySpace::root(), "users", config).is_err());
    }
}
