use crate::{Consumer, Delayer, Lock, Producer, Trimmer};
use chrono::{DateTime, Utc};
use redstream_core::{
    ConsumerConfig, DelayerConfig, KeySpace, LockConfig, LogStore, ProducerConfig, Result,
    StreamId, TrimmerConfig,
};
use redstream_memory::MemoryStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Progress of a consumer on a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerInfo {
    /// Stream name
    pub stream: String,

    /// Consumer name
    pub name: String,

    /// Last committed offset
    pub offset: Option<StreamId>,

    /// Id of the stream's newest entry
    pub newest: Option<StreamId>,

    /// When the newest entry was appended
    pub newest_at: Option<DateTime<Utc>>,

    /// Entries in the stream after the committed offset
    pub pending: u64,
}

/// Handle to a store, shared by every component built from it
#[derive(Clone)]
pub struct Redstream {
    store: Arc<dyn LogStore>,
    keys: KeySpace,
}

impl Redstream {
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self {
            store,
            keys: KeySpace::root(),
        }
    }

    /// A handle backed by a fresh [`MemoryStore`]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// A handle backed by a SQLite database
    #[cfg(feature = "sqlite")]
    pub fn open_sqlite(config: redstream_sqlite::SqliteStoreConfig) -> Result<Self> {
        let store = redstream_sqlite::SqliteStore::open(config)?;
        Ok(Self::new(Arc::new(store)))
    }

    /// Prefix every key with `{namespace}:`
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.keys = KeySpace::new(namespace);
        self
    }

    pub fn store(&self) -> &Arc<dyn LogStore> {
        &self.store
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    pub fn lock(&self, name: impl Into<String>, config: LockConfig) -> Result<Lock> {
        Lock::new(self.store.clone(), &self.keys, name, config)
    }

    pub fn consumer(
        &self,
        stream: impl Into<String>,
        name: impl Into<String>,
        config: ConsumerConfig,
    ) -> Result<Consumer> {
        Consumer::new(self.store.clone(), &self.keys, stream, name, config)
    }

    pub fn producer(&self, config: ProducerConfig) -> Result<Producer> {
        Producer::new(self.store.clone(), self.keys.clone(), config)
    }

    pub fn delayer(&self, stream: impl Into<String>, config: DelayerConfig) -> Result<Delayer> {
        Delayer::new(self.store.clone(), &self.keys, stream, config)
    }

    pub fn trimmer(&self, stream: impl Into<String>, config: TrimmerConfig) -> Result<Trimmer> {
        Trimmer::new(self.store.clone(), &self.keys, stream, config)
    }

    /// Id of the newest entry in `stream`, `None` if it is empty
    pub async fn max_stream_id(&self, stream: &str) -> Result<Option<StreamId>> {
        let newest = self
            .store
            .rev_range(&self.keys.stream(stream), StreamId::MAX, StreamId::MIN, 1)
            .await?;
        Ok(newest.first().map(|entry| entry.id))
    }

    /// Offset committed by `consumer` on `stream`
    pub async fn consumer_offset(&self, stream: &str, consumer: &str) -> Result<Option<StreamId>> {
        self.store
            .get(&self.keys.offset(stream, consumer))
            .await?
            .map(|raw| raw.parse())
            .transpose()
    }

    pub async fn consumer_info(&self, stream: &str, consumer: &str) -> Result<ConsumerInfo> {
        let offset = self.consumer_offset(stream, consumer).await?;
        let newest = self.max_stream_id(stream).await?;

        let stream_key = self.keys.stream(stream);
        let pending = match offset {
            Some(offset) => self
                .store
                .range(&stream_key, offset.successor(), StreamId::MAX, usize::MAX)
                .await?
                .len() as u64,
            None => self.store.length(&stream_key).await?,
        };

        Ok(ConsumerInfo {
            stream: stream.to_string(),
            name: consumer.to_string(),
            offset,
            newest,
            newest_at: newest.map(|id| id.timestamp()),
            pending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redstream_core::payload_fields;

    #[tokio::test]
    async fn test_empty_stream_inspection() {
        let redstream = Redstream::in_memory();
        assert_eq!(redstream.max_stream_id("products").await.unwrap(), None);
        assert_eq!(
            redstream.consumer_offset("products", "indexer").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_consumer_info_counts_pending() {
        let redstream = Redstream::in_memory().with_namespace("shop");
        let key = "shop:redstream:stream:products";

        let mut ids = Vec::new();
        for i in 0..3 {
            ids.push(
                redstream
                    .store()
                    .append(key, payload_fields(i.to_string()))
                    .await
                    .unwrap(),
            );
        }

        let info = redstream.consumer_info("products", "indexer").await.unwrap();
        assert_eq!(info.pending, 3);
        assert_eq!(info.newest, Some(ids[2]));
        assert_eq!(info.newest_at, Some(ids[2].timestamp()));

        redstream
            .store()
            .set("shop:redstream:offset:products:indexer", &ids[0].to_string())
            .await
            .unwrap();

        let info = redstream.consumer_info("products", "indexer").await.unwrap();
        assert_eq!(info.offset, Some(ids[0]));
        assert_eq!(info.pending, 2);
    }
}
