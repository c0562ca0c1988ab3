use rusqlite::Connection;

/// Create all tables if they do not exist yet
///
/// Stream ids are stored as `(ms, seq)` integer pairs so range scans use the
/// primary key. `stream_meta` remembers the last assigned id per stream,
/// which keeps ids increasing after the newest entries were deleted.
pub fn init(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS stream_entries (
            stream TEXT NOT NULL,
            ms INTEGER NOT NULL,
            seq INTEGER NOT NULL,
            fields TEXT NOT NULL,
            PRIMARY KEY (stream, ms, seq)
        ) WITHOUT ROWID;

        CREATE TABLE IF NOT EXISTS stream_meta (
            stream TEXT PRIMARY KEY,
            last_ms INTEGER NOT NULL,
            last_seq INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            expires_at INTEGER
        );

        CREATE TABLE IF NOT EXISTS list_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key TEXT NOT NULL,
            value TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_list_items_key ON list_items(key, id);

        CREATE TABLE IF NOT EXISTS list_meta (
            key TEXT PRIMARY KEY,
            expires_at INTEGER
        );",
    )
}
