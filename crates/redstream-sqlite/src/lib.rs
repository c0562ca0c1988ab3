//! SQLite-backed log store for redstream
//!
//! Provides a durable [`LogStore`](redstream_core::LogStore) that several
//! processes on one host can share through a single database file.
//!
//! Key features:
//! - WAL mode so readers never block the writer
//! - Every multi-statement operation runs in an `IMMEDIATE` transaction,
//!   which makes leases and id assignment atomic across processes
//! - Blocking reads and pops poll, since SQLite has no cross-process wakeups

pub mod config;
pub mod schema;
pub mod store;

pub use config::SqliteStoreConfig;
pub use store::SqliteStore;
