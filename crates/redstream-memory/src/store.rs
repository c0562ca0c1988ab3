use async_trait::async_trait;
use parking_lot::Mutex;
use redstream_core::{
    now_millis, Entry, Fields, LogStore, RedstreamError, Result, StreamId, WakeStrategy,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Entries of one stream plus the last id ever assigned
///
/// `last_id` survives deletions so ids stay strictly increasing.
#[derive(Default)]
struct StreamLog {
    entries: BTreeMap<StreamId, Fields>,
    last_id: StreamId,
}

impl StreamLog {
    fn next_id(&mut self) -> StreamId {
        let now = now_millis();
        let id = if now > self.last_id.ms() {
            StreamId::new(now, 0)
        } else {
            self.last_id.successor()
        };
        self.last_id = id;
        id
    }
}

enum Value {
    Str(String),
    List(VecDeque<String>),
}

struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct State {
    streams: HashMap<String, StreamLog>,
    values: HashMap<String, Slot>,
}

impl State {
    /// Live slot for `key`, dropping it first if its ttl has passed
    fn slot(&mut self, key: &str) -> Option<&mut Slot> {
        let expired = self
            .values
            .get(key)
            .and_then(|slot| slot.expires_at)
            .is_some_and(|at| at <= Instant::now());
        if expired {
            self.values.remove(key);
        }
        self.values.get_mut(key)
    }

    /// Drop every slot whose ttl has passed
    fn purge_expired(&mut self) {
        let now = Instant::now();
        self.values
            .retain(|_, slot| slot.expires_at.map_or(true, |at| at > now));
    }

    fn string(&mut self, key: &str) -> Result<Option<String>> {
        match self.slot(key) {
            None => Ok(None),
            Some(Slot {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn list(&mut self, key: &str) -> Result<Option<&mut VecDeque<String>>> {
        match self.slot(key) {
            None => Ok(None),
            Some(Slot {
                value: Value::List(list),
                ..
            }) => Ok(Some(list)),
            Some(_) => Err(wrong_type(key)),
        }
    }
}

fn wrong_type(key: &str) -> RedstreamError {
    RedstreamError::StoreUnavailable(format!(
        "WRONGTYPE operation against key {} holding the wrong kind of value",
        key
    ))
}

/// In-memory [`LogStore`]
pub struct MemoryStore {
    state: Mutex<State>,
    wake: WakeStrategy,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            wake: WakeStrategy::notify(),
        }
    }

    fn try_read(&self, stream: &str, after: StreamId, count: usize) -> Option<Vec<Entry>> {
        let state = self.state.lock();
        let log = state.streams.get(stream)?;
        let entries: Vec<Entry> = log
            .entries
            .range(after.successor()..)
            .take(count)
            .map(|(id, fields)| Entry::new(*id, fields.clone()))
            .collect();
        (!entries.is_empty()).then_some(entries)
    }

    fn try_pop(&self, key: &str) -> Result<Option<String>> {
        let mut state = self.state.lock();
        let popped = match state.list(key)? {
            Some(list) => list.pop_front(),
            None => None,
        };
        if state.list(key)?.is_some_and(|list| list.is_empty()) {
            state.values.remove(key);
        }
        Ok(popped)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogStore for MemoryStore {
    async fn append(&self, stream: &str, fields: Fields) -> Result<StreamId> {
        let id = {
            let mut state = self.state.lock();
            let log = state.streams.entry(stream.to_string()).or_default();
            let id = log.next_id();
            log.entries.insert(id, fields);
            id
        };
        self.wake.notify_key(stream);
        Ok(id)
    }

    async fn append_many(&self, stream: &str, batch: Vec<Fields>) -> Result<Vec<StreamId>> {
        let ids = {
            let mut state = self.state.lock();
            let log = state.streams.entry(stream.to_string()).or_default();
            batch
                .into_iter()
                .map(|fields| {
                    let id = log.next_id();
                    log.entries.insert(id, fields);
                    id
                })
                .collect::<Vec<_>>()
        };
        if !ids.is_empty() {
            self.wake.notify_key(stream);
        }
        Ok(ids)
    }

    async fn range(
        &self,
        stream: &str,
        from: StreamId,
        to: StreamId,
        count: usize,
    ) -> Result<Vec<Entry>> {
        if from > to {
            return Ok(Vec::new());
        }
        let state = self.state.lock();
        Ok(state
            .streams
            .get(stream)
            .map(|log| {
                log.entries
                    .range(from..=to)
                    .take(count)
                    .map(|(id, fields)| Entry::new(*id, fields.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn rev_range(
        &self,
        stream: &str,
        high: StreamId,
        low: StreamId,
        count: usize,
    ) -> Result<Vec<Entry>> {
        if low > high {
            return Ok(Vec::new());
        }
        let state = self.state.lock();
        Ok(state
            .streams
            .get(stream)
            .map(|log| {
                log.entries
                    .range(low..=high)
                    .rev()
                    .take(count)
                    .map(|(id, fields)| Entry::new(*id, fields.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn read_after(
        &self,
        stream: &str,
        after: StreamId,
        count: usize,
        block: Duration,
    ) -> Result<Vec<Entry>> {
        let entries = self
            .wake
            .wait_for(stream, block, || {
                std::future::ready(Ok(self.try_read(stream, after, count)))
            })
            .await?;
        Ok(entries.unwrap_or_default())
    }

    async fn delete(&self, stream: &str, ids: &[StreamId]) -> Result<usize> {
        let mut state = self.state.lock();
        let Some(log) = state.streams.get_mut(stream) else {
            return Ok(0);
        };
        Ok(ids
            .iter()
            .filter(|id| log.entries.remove(*id).is_some())
            .count())
    }

    async fn length(&self, stream: &str) -> Result<u64> {
        let state = self.state.lock();
        Ok(state
            .streams
            .get(stream)
            .map(|log| log.entries.len() as u64)
            .unwrap_or(0))
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.state.lock().string(key)
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        let mut state = self.state.lock();
        keys.iter().map(|key| state.string(key)).collect()
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.state.lock().values.insert(
            key.to_string(),
            Slot {
                value: Value::Str(value.to_string()),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn acquire_lease(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        let mut state = self.state.lock();
        state.purge_expired();
        let expires_at = Some(Instant::now() + ttl);

        match state.slot(key) {
            None => {
                state.values.insert(
                    key.to_string(),
                    Slot {
                        value: Value::Str(token.to_string()),
                        expires_at,
                    },
                );
                Ok(true)
            }
            Some(slot) => match &slot.value {
                Value::Str(holder) if holder == token => {
                    slot.expires_at = expires_at;
                    Ok(true)
                }
                Value::Str(_) => Ok(false),
                Value::List(_) => Err(wrong_type(key)),
            },
        }
    }

    async fn release_lease(&self, key: &str, token: &str) -> Result<bool> {
        let mut state = self.state.lock();
        if state.string(key)?.as_deref() == Some(token) {
            state.values.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut state = self.state.lock();
        match state.slot(key) {
            Some(slot) => {
                slot.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<u64> {
        let len = {
            let mut state = self.state.lock();
            state.purge_expired();
            match state.list(key)? {
                Some(list) => {
                    list.push_front(value.to_string());
                    list.len() as u64
                }
                None => {
                    state.values.insert(
                        key.to_string(),
                        Slot {
                            value: Value::List(VecDeque::from([value.to_string()])),
                            expires_at: None,
                        },
                    );
                    1
                }
            }
        };
        self.wake.notify_key(key);
        Ok(len)
    }

    async fn list_trim(&self, key: &str, max_len: usize) -> Result<()> {
        let mut state = self.state.lock();
        let now_empty = match state.list(key)? {
            Some(list) => {
                list.truncate(max_len);
                list.is_empty()
            }
            None => false,
        };
        if now_empty {
            state.values.remove(key);
        }
        Ok(())
    }

    async fn blocking_pop(&self, key: &str, timeout: Duration) -> Result<Option<String>> {
        self.wake
            .wait_for(key, timeout, || std::future::ready(self.try_pop(key)))
            .await
    }

    async fn wait_replicas(&self, _replicas: u32, _timeout: Duration) -> Result<u32> {
        // Nothing replicates an in-process store.
        Ok(0)
    }
}
