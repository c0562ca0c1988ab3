use crate::config::SqliteStoreConfig;
use crate::schema;
use async_trait::async_trait;
use parking_lot::Mutex;
use redstream_core::{
    now_millis, Entry, Fields, LogStore, RedstreamError, Result, StreamId, WakeStrategy,
};
use rusqlite::{
    params, Connection, OpenFlags, OptionalExtension, Transaction, TransactionBehavior,
};
use std::sync::Arc;
use std::time::Duration;

fn db_err(e: rusqlite::Error) -> RedstreamError {
    RedstreamError::StoreUnavailable(e.to_string())
}

/// SQLite stores signed 64-bit integers; open-ended bounds are clamped.
fn sql_int(value: u64) -> i64 {
    value.min(i64::MAX as u64) as i64
}

fn ttl_deadline(ttl: Duration) -> i64 {
    sql_int(now_millis().saturating_add(ttl.as_millis() as u64))
}

/// SQLite-backed [`LogStore`]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    wake: WakeStrategy,
}

impl SqliteStore {
    /// Open or create the database described by `config`
    pub fn open(config: SqliteStoreConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    RedstreamError::StoreUnavailable(format!(
                        "Failed to create {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open_with_flags(
            &config.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(db_err)?;

        Self::configure_connection(&conn, &config)?;
        schema::init(&conn).map_err(db_err)?;

        tracing::debug!(path = %config.path.display(), "Opened sqlite log store");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            wake: WakeStrategy::poll(config.poll_interval),
        })
    }

    /// Open a private in-memory database, mostly useful for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        schema::init(&conn).map_err(db_err)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            wake: WakeStrategy::poll(Duration::from_millis(10)),
        })
    }

    fn configure_connection(conn: &Connection, cfg: &SqliteStoreConfig) -> Result<()> {
        if cfg.wal_mode {
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(|e| RedstreamError::InvalidConfig(e.to_string()))?;
        }
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| RedstreamError::InvalidConfig(e.to_string()))?;
        conn.busy_timeout(cfg.busy_timeout)
            .map_err(|e| RedstreamError::InvalidConfig(e.to_string()))?;
        Ok(())
    }

    /// Run `f` against the connection on the blocking thread pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock();
            f(&mut conn)
        })
        .await
        .map_err(|e| RedstreamError::StoreUnavailable(format!("sqlite task failed: {}", e)))?
    }

    /// Run `f` inside an `IMMEDIATE` transaction and commit it
    async fn with_txn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
    {
        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(db_err)?;
            let value = f(&tx)?;
            tx.commit().map_err(db_err)?;
            Ok(value)
        })
        .await
    }

    async fn try_read(
        &self,
        stream: &str,
        after: StreamId,
        count: usize,
    ) -> Result<Option<Vec<Entry>>> {
        let entries = self
            .range(stream, after.successor(), StreamId::MAX, count)
            .await?;
        Ok((!entries.is_empty()).then_some(entries))
    }

    async fn try_pop(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.with_txn(move |tx| {
            purge_expired(tx, &key)?;
            let head: Option<(i64, String)> = tx
                .query_row(
                    "SELECT id, value FROM list_items WHERE key = ?1 ORDER BY id DESC LIMIT 1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(db_err)?;

            let Some((id, value)) = head else {
                return Ok(None);
            };
            tx.execute("DELETE FROM list_items WHERE id = ?1", params![id])
                .map_err(db_err)?;
            drop_list_meta_if_empty(tx, &key)?;
            Ok(Some(value))
        })
        .await
    }
}

/// Drop `key`'s value and list items if their ttl has passed
fn purge_expired(tx: &Transaction<'_>, key: &str) -> Result<()> {
    let now = sql_int(now_millis());
    tx.execute(
        "DELETE FROM kv WHERE key = ?1 AND expires_at IS NOT NULL AND expires_at <= ?2",
        params![key, now],
    )
    .map_err(db_err)?;

    let list_expired = tx
        .execute(
            "DELETE FROM list_meta WHERE key = ?1 AND expires_at IS NOT NULL AND expires_at <= ?2",
            params![key, now],
        )
        .map_err(db_err)?;
    if list_expired > 0 {
        tx.execute("DELETE FROM list_items WHERE key = ?1", params![key])
            .map_err(db_err)?;
    }
    Ok(())
}

fn drop_list_meta_if_empty(tx: &Transaction<'_>, key: &str) -> Result<()> {
    tx.execute(
        "DELETE FROM list_meta WHERE key = ?1
         AND NOT EXISTS (SELECT 1 FROM list_items WHERE key = ?1)",
        params![key],
    )
    .map_err(db_err)?;
    Ok(())
}

fn next_id(tx: &Transaction<'_>, stream: &str) -> Result<StreamId> {
    let last: Option<(i64, i64)> = tx
        .query_row(
            "SELECT last_ms, last_seq FROM stream_meta WHERE stream = ?1",
            params![stream],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(db_err)?;

    let now = now_millis();
    let id = match last {
        Some((ms, seq)) if now <= ms as u64 => StreamId::new(ms as u64, seq as u64).successor(),
        _ => StreamId::new(now, 0),
    };

    tx.execute(
        "INSERT INTO stream_meta (stream, last_ms, last_seq) VALUES (?1, ?2, ?3)
         ON CONFLICT(stream) DO UPDATE SET last_ms = excluded.last_ms, last_seq = excluded.last_seq",
        params![stream, sql_int(id.ms()), sql_int(id.seq())],
    )
    .map_err(db_err)?;

    Ok(id)
}

fn insert_entry(tx: &Transaction<'_>, stream: &str, fields: &Fields) -> Result<StreamId> {
    let id = next_id(tx, stream)?;
    let encoded = serde_json::to_string(fields)?;
    tx.execute(
        "INSERT INTO stream_entries (stream, ms, seq, fields) VALUES (?1, ?2, ?3, ?4)",
        params![stream, sql_int(id.ms()), sql_int(id.seq()), encoded],
    )
    .map_err(db_err)?;
    Ok(id)
}

fn decode_rows(rows: Vec<(i64, i64, String)>) -> Result<Vec<Entry>> {
    rows.into_iter()
        .map(|(ms, seq, fields)| {
            let fields: Fields = serde_json::from_str(&fields)?;
            Ok(Entry::new(StreamId::new(ms as u64, seq as u64), fields))
        })
        .collect()
}

#[async_trait]
impl LogStore for SqliteStore {
    async fn append(&self, stream: &str, fields: Fields) -> Result<StreamId> {
        let stream = stream.to_string();
        self.with_txn(move |tx| insert_entry(tx, &stream, &fields)).await
    }

    async fn append_many(&self, stream: &str, batch: Vec<Fields>) -> Result<Vec<StreamId>> {
        let stream = stream.to_string();
        self.with_txn(move |tx| {
            batch
                .iter()
                .map(|fields| insert_entry(tx, &stream, fields))
                .collect()
        })
        .await
    }

    async fn range(
        &self,
        stream: &str,
        from: StreamId,
        to: StreamId,
        count: usize,
    ) -> Result<Vec<Entry>> {
        let stream = stream.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT ms, seq, fields FROM stream_entries
                     WHERE stream = ?1 AND (ms, seq) >= (?2, ?3) AND (ms, seq) <= (?4, ?5)
                     ORDER BY ms ASC, seq ASC LIMIT ?6",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(
                    params![
                        stream,
                        sql_int(from.ms()),
                        sql_int(from.seq()),
                        sql_int(to.ms()),
                        sql_int(to.seq()),
                        sql_int(count as u64)
                    ],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .map_err(db_err)?
                .collect::<rusqlite::Result<Vec<(i64, i64, String)>>>()
                .map_err(db_err)?;
            decode_rows(rows)
        })
        .await
    }

    async fn rev_range(
        &self,
        stream: &str,
        high: StreamId,
        low: StreamId,
        count: usize,
    ) -> Result<Vec<Entry>> {
        let stream = stream.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT ms, seq, fields FROM stream_entries
                     WHERE stream = ?1 AND (ms, seq) >= (?2, ?3) AND (ms, seq) <= (?4, ?5)
                     ORDER BY ms DESC, seq DESC LIMIT ?6",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(
                    params![
                        stream,
                        sql_int(low.ms()),
                        sql_int(low.seq()),
                        sql_int(high.ms()),
                        sql_int(high.seq()),
                        sql_int(count as u64)
                    ],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .map_err(db_err)?
                .collect::<rusqlite::Result<Vec<(i64, i64, String)>>>()
                .map_err(db_err)?;
            decode_rows(rows)
        })
        .await
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
            .wait_for(stream, block, move || self.try_read(stream, after, count))
            .await?;
        Ok(entries.unwrap_or_default())
    }

    async fn delete(&self, stream: &str, ids: &[StreamId]) -> Result<usize> {
        let stream = stream.to_string();
        let ids = ids.to_vec();
        self.with_txn(move |tx| {
            let mut stmt = tx
                .prepare_cached(
                    "DELETE FROM stream_entries WHERE stream = ?1 AND ms = ?2 AND seq = ?3",
                )
                .map_err(db_err)?;
            let mut deleted = 0;
            for id in &ids {
                deleted += stmt
                    .execute(params![stream, sql_int(id.ms()), sql_int(id.seq())])
                    .map_err(db_err)?;
            }
            Ok(deleted)
        })
        .await
    }

    async fn length(&self, stream: &str) -> Result<u64> {
        let stream = stream.to_string();
        self.with_conn(move |conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM stream_entries WHERE stream = ?1",
                    params![stream],
                    |row| row.get(0),
                )
                .map_err(db_err)?;
            Ok(count as u64)
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT value FROM kv WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                params![key, sql_int(now_millis())],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.with_txn(move |tx| {
            tx.execute(
                "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, NULL)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = NULL",
                params![key, value],
            )
            .map_err(db_err)?;
            Ok(())
        })
        .await
    }

    async fn acquire_lease(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        let key = key.to_string();
        let token = token.to_string();
        self.with_txn(move |tx| {
            purge_expired(tx, &key)?;
            let holder: Option<String> = tx
                .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                    row.get(0)
                })
                .optional()
                .map_err(db_err)?;

            match holder {
                None => {
                    tx.execute(
                        "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)",
                        params![key, token, ttl_deadline(ttl)],
                    )
                    .map_err(db_err)?;
                    Ok(true)
                }
                Some(holder) if holder == token => {
                    tx.execute(
                        "UPDATE kv SET expires_at = ?2 WHERE key = ?1",
                        params![key, ttl_deadline(ttl)],
                    )
                    .map_err(db_err)?;
                    Ok(true)
                }
                Some(_) => Ok(false),
            }
        })
        .await
    }

    async fn release_lease(&self, key: &str, token: &str) -> Result<bool> {
        let key = key.to_string();
        let token = token.to_string();
        self.with_txn(move |tx| {
            purge_expired(tx, &key)?;
            let deleted = tx
                .execute(
                    "DELETE FROM kv WHERE key = ?1 AND value = ?2",
                    params![key, token],
                )
                .map_err(db_err)?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let key = key.to_string();
        self.with_txn(move |tx| {
            purge_expired(tx, &key)?;
            let deadline = ttl_deadline(ttl);

            let updated = tx
                .execute(
                    "UPDATE kv SET expires_at = ?2 WHERE key = ?1",
                    params![key, deadline],
                )
                .map_err(db_err)?;
            if updated > 0 {
                return Ok(true);
            }

            let items: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM list_items WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .map_err(db_err)?;
            if items == 0 {
                return Ok(false);
            }
            tx.execute(
                "INSERT INTO list_meta (key, expires_at) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET expires_at = excluded.expires_at",
                params![key, deadline],
            )
            .map_err(db_err)?;
            Ok(true)
        })
        .await
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<u64> {
        let key = key.to_string();
        let value = value.to_string();
        self.with_txn(move |tx| {
            purge_expired(tx, &key)?;
            tx.execute(
                "INSERT INTO list_items (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(db_err)?;
            let len: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM list_items WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .map_err(db_err)?;
            Ok(len as u64)
        })
        .await
    }

    async fn list_trim(&self, key: &str, max_len: usize) -> Result<()> {
        let key = key.to_string();
        self.with_txn(move |tx| {
            tx.execute(
                "DELETE FROM list_items WHERE key = ?1 AND id NOT IN (
                    SELECT id FROM list_items WHERE key = ?1 ORDER BY id DESC LIMIT ?2
                 )",
                params![key, sql_int(max_len as u64)],
            )
            .map_err(db_err)?;
            drop_list_meta_if_empty(tx, &key)
        })
        .await
    }

    async fn blocking_pop(&self, key: &str, timeout: Duration) -> Result<Option<String>> {
        self.wake
            .wait_for(key, timeout, move || self.try_pop(key))
            .await
    }

    async fn wait_replicas(&self, _replicas: u32, _timeout: Duration) -> Result<u32> {
        // A single database file has no replicas to wait for.
        Ok(0)
    }
}
