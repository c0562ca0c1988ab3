//! In-process log store for redstream
//!
//! Keeps streams, values, leases and lists in memory behind a single mutex.
//! Blocking reads and pops are woken directly by the writer, so waits end
//! as soon as data arrives instead of on a poll interval.
//!
//! Useful for tests, single-process deployments and as the reference
//! implementation of the [`LogStore`](redstream_core::LogStore) contract.

pub mod store;

pub use store::MemoryStore;
