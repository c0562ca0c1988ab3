//! Log store trait
//!
//! Defines the primitive surface every storage backend provides. Stream
//! operations take fully qualified keys (see [`KeySpace`](crate::KeySpace)).

use crate::error::Result;
use crate::types::{Entry, Fields, StreamId};
use async_trait::async_trait;
use std::time::Duration;

/// Storage backend for streams, offsets, leases and notifications
///
/// Every single method must be atomic with respect to concurrent callers,
/// including callers in other processes when the backend is shared.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Append an entry, returning its newly assigned id
    ///
    /// Ids are strictly increasing per stream, even across deletions.
    async fn append(&self, stream: &str, fields: Fields) -> Result<StreamId>;

    /// Append several entries in order, in as few round trips as possible
    async fn append_many(&self, stream: &str, batch: Vec<Fields>) -> Result<Vec<StreamId>> {
        let mut ids = Vec::with_capacity(batch.len());
        for fields in batch {
            ids.push(self.append(stream, fields).await?);
        }
        Ok(ids)
    }

    /// Entries with `from <= id <= to` in ascending order, at most `count`
    ///
    /// `StreamId::MIN` and `StreamId::MAX` act as open-ended bounds.
    async fn range(
        &self,
        stream: &str,
        from: StreamId,
        to: StreamId,
        count: usize,
    ) -> Result<Vec<Entry>>;

    /// Entries with `low <= id <= high` in descending order, at most `count`
    async fn rev_range(
        &self,
        stream: &str,
        high: StreamId,
        low: StreamId,
        count: usize,
    ) -> Result<Vec<Entry>>;

    /// Entries with `id > after`, at most `count`, waiting up to `block`
    /// for at least one to appear
    ///
    /// Returns an empty vector on timeout.
    async fn read_after(
        &self,
        stream: &str,
        after: StreamId,
        count: usize,
        block: Duration,
    ) -> Result<Vec<Entry>>;

    /// Delete entries by id, returning how many existed
    async fn delete(&self, stream: &str, ids: &[StreamId]) -> Result<usize>;

    /// Number of entries currently in the stream
    async fn length(&self, stream: &str) -> Result<u64>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get(key).await?);
        }
        Ok(values)
    }

    /// Set a value, clearing any expiry
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Atomic get-or-set of a lease
    ///
    /// - no holder: store `token` with `ttl`, return true
    /// - holder equals `token`: refresh `ttl`, return true
    /// - otherwise: return false
    async fn acquire_lease(&self, key: &str, token: &str, ttl: Duration) -> Result<bool>;

    /// Delete `key` only if it still holds `token`
    async fn release_lease(&self, key: &str, token: &str) -> Result<bool>;

    /// Set a time to live on an existing key; false if the key is absent
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Push to the head of a list, returning the new length
    async fn list_push(&self, key: &str, value: &str) -> Result<u64>;

    /// Keep only the first `max_len` items of a list
    async fn list_trim(&self, key: &str, max_len: usize) -> Result<()>;

    /// Pop the head of a list, waiting up to `timeout` for an item
    async fn blocking_pop(&self, key: &str, timeout: Duration) -> Result<Option<String>>;

    /// Wait until previous writes reached `replicas` replicas or `timeout`
    /// elapsed, returning the number of replicas that acknowledged
    async fn wait_replicas(&self, replicas: u32, timeout: Duration) -> Result<u32>;
}
