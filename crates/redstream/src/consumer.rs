use crate::lock::Lock;
use crate::message::Message;
use crate::runner::{self, RunOutcome, RunPolicy};
use redstream_core::{
    observe, ConsumerConfig, KeySpace, LogStore, RedstreamError, Result, StreamId,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Resumable batch reader over one stream
///
/// The committed offset is stored per (stream, consumer name), and every
/// batch is processed under the lock `consumer:{stream}:{name}`, so at most
/// one process delivers batches for a given consumer name at a time.
pub struct Consumer {
    store: Arc<dyn LogStore>,
    stream: String,
    name: String,
    stream_key: String,
    offset_key: String,
    lock: Lock,
    config: ConsumerConfig,
}

impl Consumer {
    pub fn new(
        store: Arc<dyn LogStore>,
        keys: &KeySpace,
        stream: impl Into<String>,
        name: impl Into<String>,
        config: ConsumerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let stream = stream.into();
        let name = name.into();

        let lock = Lock::new(
            store.clone(),
            keys,
            format!("consumer:{}:{}", stream, name),
            config.lock.clone(),
        )?;

        Ok(Self {
            stream_key: keys.stream(&stream),
            offset_key: keys.offset(&stream, &name),
            store,
            stream,
            name,
            lock,
            config,
        })
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    pub fn lock(&self) -> &Lock {
        &self.lock
    }

    /// The last committed offset, `None` before the first commit
    pub async fn offset(&self) -> Result<Option<StreamId>> {
        self.store
            .get(&self.offset_key)
            .await?
            .map(|raw| raw.parse())
            .transpose()
    }

    /// Commit `offset` as processed
    ///
    /// Offsets never move backwards: committing an id at or below the
    /// current offset is a no-op and returns false.
    pub async fn commit(&self, offset: StreamId) -> Result<bool> {
        if let Some(current) = self.offset().await? {
            if current >= offset {
                return Ok(false);
            }
        }

        self.store
            .set(&self.offset_key, &offset.to_string())
            .await?;
        debug!(stream = %self.stream, consumer = %self.name, %offset, "Committed offset");
        Ok(true)
    }

    /// Deliver at most one batch to `handler`
    ///
    /// The offset is committed only if the handler succeeds; otherwise the
    /// same batch is delivered again by a later call.
    pub async fn run_once<H, Fut>(&self, handler: H) -> Result<RunOutcome>
    where
        H: FnOnce(Vec<Message>) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        match self.lock.acquire(|| self.deliver(handler)).await? {
            Some(result) => result,
            None => Ok(RunOutcome::LockBusy),
        }
    }

    /// Deliver batches forever
    pub async fn run<H, Fut>(&self, mut handler: H)
    where
        H: FnMut(Vec<Message>) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        info!(stream = %self.stream, consumer = %self.name, "Starting consumer");
        let policy = RunPolicy::from(&self.config);

        loop {
            let result = self.run_once(&mut handler).await;
            runner::settle(&policy, &self.lock, &result).await;
        }
    }

    async fn deliver<H, Fut>(&self, handler: H) -> Result<RunOutcome>
    where
        H: FnOnce(Vec<Message>) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let offset = self.offset().await?.unwrap_or(StreamId::MIN);
        let entries = self
            .store
            .read_after(
                &self.stream_key,
                offset,
                self.config.batch_size,
                self.config.block,
            )
            .await?;

        let Some(last) = entries.last().map(|entry| entry.id) else {
            return Ok(RunOutcome::Idle);
        };

        let count = entries.len();
        let messages = entries.into_iter().map(Message::from).collect();

        let started = Instant::now();
        handler(messages).await.map_err(|e| match e.downcast::<RedstreamError>() {
            Ok(inner) => inner,
            Err(e) => RedstreamError::Handler(e),
        })?;
        observe::record_batch(&self.stream, count, started.elapsed());

        self.commit(last).await?;
        debug!(
            stream = %self.stream,
            consumer = %self.name,
            messages = count,
            "Processed batch"
        );
        Ok(RunOutcome::Processed(count))
    }
}
