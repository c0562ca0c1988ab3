use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the SQLite log store
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// Database file, created with its parent directory if missing
    pub path: PathBuf,

    /// Interval between probes of blocking reads and pops
    pub poll_interval: Duration,

    /// How long a statement waits on a database locked by another process
    pub busy_timeout: Duration,

    /// Enable write-ahead logging (default: true)
    pub wal_mode: bool,
}

impl SqliteStoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll_interval: Duration::from_millis(25),
            busy_timeout: Duration::from_secs(5),
            wal_mode: true,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn with_wal_mode(mut self, enabled: bool) -> Self {
        self.wal_mode = enabled;
        self
    }
}
