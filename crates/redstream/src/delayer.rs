use crate::consumer::Consumer;
use crate::message::Message;
use crate::runner::{self, RunOutcome, RunPolicy};
use redstream_core::{
    delay_stream_name, now_millis, observe, DelayerConfig, KeySpace, LogStore, Result, StreamId,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Replays delay entries to their main stream once they are old enough
///
/// Reads `{stream}.delay` through a consumer named `delayer`. Entries are
/// replayed in the order they were written and deleted from the delay
/// stream once appended to the main stream.
pub struct Delayer {
    store: Arc<dyn LogStore>,
    stream: String,
    stream_key: String,
    delay_key: String,
    consumer: Consumer,
    config: DelayerConfig,
}

impl Delayer {
    pub fn new(
        store: Arc<dyn LogStore>,
        keys: &KeySpace,
        stream: impl Into<String>,
        config: DelayerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let stream = stream.into();
        let delay_stream = delay_stream_name(&stream);

        let consumer = Consumer::new(
            store.clone(),
            keys,
            delay_stream.as_str(),
            "delayer",
            config.consumer.clone(),
        )?;

        Ok(Self {
            stream_key: keys.stream(&stream),
            delay_key: keys.stream(&delay_stream),
            store,
            stream,
            consumer,
            config,
        })
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// The consumer reading the delay stream
    pub fn consumer(&self) -> &Consumer {
        &self.consumer
    }

    /// Replay at most one batch of delay entries
    ///
    /// Entries younger than the configured delay are waited for, flushing
    /// everything before them first.
    pub async fn run_once(&self) -> Result<RunOutcome> {
        self.consumer
            .run_once(|messages| async move {
                self.replay(messages).await?;
                Ok(())
            })
            .await
    }

    /// Replay delay entries forever
    pub async fn run(&self) {
        info!(stream = %self.stream, delay = ?self.config.delay, "Starting delayer");
        let policy = RunPolicy::from(&self.config.consumer);

        loop {
            let result = self.run_once().await;
            runner::settle(&policy, self.consumer.lock(), &result).await;
        }
    }

    async fn replay(&self, messages: Vec<Message>) -> Result<()> {
        let mut buffer: Vec<Message> = Vec::new();

        for message in messages {
            let age = message.id().age_at(now_millis());

            if age < self.config.delay {
                if let Some(last) = buffer.last().map(Message::id) {
                    self.flush(&mut buffer).await?;
                    self.consumer.commit(last).await?;
                }

                let remaining = self.config.delay - age;
                debug!(
                    stream = %self.stream,
                    id = %message.id(),
                    wait = ?remaining,
                    "Waiting for delay entry to mature"
                );
                tokio::time::sleep(remaining + self.config.ready_margin).await;
            }

            buffer.push(message);
        }

        self.flush(&mut buffer).await
    }

    async fn flush(&self, buffer: &mut Vec<Message>) -> Result<()> {
        if buffer.is_empty() {
            return Ok(());
        }

        let batch = buffer.iter().map(|m| m.fields().clone()).collect();
        self.store.append_many(&self.stream_key, batch).await?;

        let ids: Vec<StreamId> = buffer.iter().map(Message::id).collect();
        self.store.delete(&self.delay_key, &ids).await?;

        observe::record_replayed(ids.len());
        debug!(
            stream = %self.stream,
            entries = ids.len(),
            delay = ?self.config.delay,
            "Replayed delay entries"
        );

        buffer.clear();
        Ok(())
    }
}
