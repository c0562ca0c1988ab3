//! Writing change entries for application records
//!
//! A change is written twice: once to the record's delay stream before the
//! change is committed, and once to the main stream afterwards. If the
//! process dies between the two writes, the delayer replays the delay entry,
//! so every committed change eventually reaches the main stream.

use crate::record::Record;
use parking_lot::Mutex;
use redstream_core::{
    delay_stream_name, observe, payload_fields, Fields, KeySpace, LogStore, ProducerConfig,
    RedstreamError, Result, StreamId,
};
use std::any::TypeId;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Appends queue and delay entries for [`Record`]s
pub struct Producer {
    store: Arc<dyn LogStore>,
    keys: KeySpace,
    config: ProducerConfig,
    stream_names: Mutex<HashMap<TypeId, String>>,
}

impl Producer {
    pub fn new(store: Arc<dyn LogStore>, keys: KeySpace, config: ProducerConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            store,
            keys,
            config,
            stream_names: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }

    /// Stream name of `R`, resolved once per producer
    pub fn stream_name<R: Record>(&self) -> String {
        self.stream_names
            .lock()
            .entry(TypeId::of::<R>())
            .or_insert_with(R::redstream_name)
            .clone()
    }

    /// Append one entry to the record's stream for immediate delivery
    pub async fn queue<R: Record>(&self, record: &R) -> Result<StreamId> {
        let stream = self.keys.stream(&self.stream_name::<R>());
        let id = self.store.append(&stream, encode(record)?).await?;
        observe::record_produced(false, 1);
        Ok(id)
    }

    /// Append one entry to the record's delay stream
    ///
    /// Waits for replication first when the producer is configured to.
    pub async fn delay<R: Record>(&self, record: &R) -> Result<StreamId> {
        let stream = self.keys.stream(&delay_stream_name(&self.stream_name::<R>()));
        let id = self.store.append(&stream, encode(record)?).await?;
        observe::record_produced(true, 1);
        self.wait_for_replicas().await?;
        Ok(id)
    }

    /// Queue entries for all `records`, in chunks
    pub async fn bulk_queue<R: Record>(&self, records: &[R]) -> Result<Vec<StreamId>> {
        let stream = self.keys.stream(&self.stream_name::<R>());
        let ids = self.append_chunked(&stream, records).await?;
        observe::record_produced(false, ids.len());
        Ok(ids)
    }

    /// Write delay entries for all `records`, in chunks
    pub async fn bulk_delay<R: Record>(&self, records: &[R]) -> Result<Vec<StreamId>> {
        let stream = self.keys.stream(&delay_stream_name(&self.stream_name::<R>()));
        let ids = self.append_chunked(&stream, records).await?;
        observe::record_produced(true, ids.len());
        self.wait_for_replicas().await?;
        Ok(ids)
    }

    /// Run `critical` between the delay and queue writes for `records`
    ///
    /// Use this around mutations that touch many records at once. If
    /// `critical` fails, nothing is queued; the delay entries remain and
    /// are replayed later, which is harmless for idempotent consumers.
    pub async fn bulk<R, F, Fut, T, E>(&self, records: &[R], critical: F) -> std::result::Result<T, E>
    where
        R: Record,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<RedstreamError>,
    {
        self.bulk_delay(records).await?;
        let value = critical().await?;
        self.bulk_queue(records).await?;
        Ok(value)
    }

    async fn append_chunked<R: Record>(&self, stream: &str, records: &[R]) -> Result<Vec<StreamId>> {
        let mut ids = Vec::with_capacity(records.len());

        for chunk in records.chunks(self.config.chunk_size) {
            let batch = chunk.iter().map(encode).collect::<Result<Vec<_>>>()?;
            ids.extend(self.store.append_many(stream, batch).await?);
        }

        debug!(stream = %stream, entries = ids.len(), "Appended entries");
        Ok(ids)
    }

    async fn wait_for_replicas(&self) -> Result<()> {
        let Some(wait) = self.config.wait else {
            return Ok(());
        };

        let acked = self.store.wait_replicas(wait.replicas, wait.timeout).await?;
        if acked < wait.replicas {
            warn!(
                acked,
                wanted = wait.replicas,
                timeout = ?wait.timeout,
                "Delay entries not replicated in time"
            );
        }
        Ok(())
    }
}

fn encode<R: Record>(record: &R) -> Result<Fields> {
    let payload = serde_json::to_string(&record.redstream_payload())?;
    Ok(payload_fields(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use redstream_memory::MemoryStore;
    use serde::Serialize;
    use std::time::Duration;

    #[derive(Serialize)]
    struct Payload {
        id: u64,
    }

    struct Product {
        id: u64,
    }

    impl Record for Product {
        type Payload = Payload;

        fn redstream_payload(&self) -> Payload {
            Payload { id: self.id }
        }
    }

    fn products(count: u64) -> Vec<Product> {
        (0..count).map(|id| Product { id }).collect()
    }

    fn producer(store: &Arc<dyn LogStore>, config: ProducerConfig) -> Producer {
        Producer::new(store.clone(), KeySpace::root(), config).unwrap()
    }

    async fn payloads(store: &Arc<dyn LogStore>, stream: &str) -> Vec<String> {
        store
            .range(stream, StreamId::MIN, StreamId::MAX, usize::MAX)
            .await
            .unwrap()
            .iter()
            .filter_map(|e| e.payload().map(str::to_string))
            .collect()
    }

    #[tokio::test]
    async fn test_queue_and_delay_streams() {
        let store: Arc<dyn LogStore> = Arc::new(MemoryStore::new());
        let producer = producer(&store, ProducerConfig::default());

        producer.queue(&Product { id: 1 }).await.unwrap();
        producer.delay(&Product { id: 2 }).await.unwrap();

        assert_eq!(
            payloads(&store, "redstream:stream:products").await,
            vec![r#"{"id":1}"#]
        );
        assert_eq!(
            payloads(&store, "redstream:stream:products.delay").await,
            vec![r#"{"id":2}"#]
        );
    }

    #[tokio::test]
    async fn test_bulk_queue_chunks_in_order() {
        let store: Arc<dyn LogStore> = Arc::new(MemoryStore::new());
        let producer = producer(&store, ProducerConfig::new().with_chunk_size(3));

        let ids = producer.bulk_queue(&products(8)).await.unwrap();
        assert_eq!(ids.len(), 8);

        let written = payloads(&store, "redstream:stream:products").await;
        let expected: Vec<String> = (0..8).map(|id| format!(r#"{{"id":{}}}"#, id)).collect();
        assert_eq!(written, expected);
    }

    #[tokio::test]
    async fn test_bulk_writes_delay_before_critical_section() {
        let store: Arc<dyn LogStore> = Arc::new(MemoryStore::new());
        let producer = producer(&store, ProducerConfig::default());
        let records = products(2);

        let seen = producer
            .bulk(&records, || async {
                let delayed = store.length("redstream:stream:products.delay").await?;
                let queued = store.length("redstream:stream:products").await?;
                Ok::<_, RedstreamError>((delayed, queued))
            })
            .await
            .unwrap();

        assert_eq!(seen, (2, 0));
        assert_eq!(store.length("redstream:stream:products").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_bulk_failure_skips_queue() {
        let store: Arc<dyn LogStore> = Arc::new(MemoryStore::new());
        let producer = producer(&store, ProducerConfig::default());

        let result: std::result::Result<(), RedstreamError> = producer
            .bulk(&products(3), || async {
                Err(RedstreamError::StoreUnavailable("update failed".into()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(store.length("redstream:stream:products.delay").await.unwrap(), 3);
        assert_eq!(store.length("redstream:stream:products").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_replica_shortfall_is_not_an_error() {
        let store: Arc<dyn LogStore> = Arc::new(MemoryStore::new());
        let producer = producer(
            &store,
            ProducerConfig::new().with_wait(1, Duration::from_millis(10)),
        );

        producer.delay(&Product { id: 1 }).await.unwrap();
    }

    #[tokio::test]
    async fn test_namespaced_keys() {
        let store: Arc<dyn LogStore> = Arc::new(MemoryStore::new());
        let producer =
            Producer::new(store.clone(), KeySpace::new("shop"), ProducerConfig::default()).unwrap();

        producer.queue(&Product { id: 1 }).await.unwrap();
        assert_eq!(
            store.length("shop:redstream:stream:products").await.unwrap(),
            1
        );
        assert_eq!(producer.stream_name::<Product>(), "products");
    }
}
