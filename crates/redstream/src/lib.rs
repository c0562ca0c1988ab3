//! Redstream: reliable, ordered, at-least-once change streams
//!
//! Writers append change events to named streams; background workers read
//! them in order, exactly one active worker per (stream, consumer name)
//! across every process sharing the store.
//!
//! # Components
//!
//! - [`Lock`]: leased mutual exclusion with renewal and wake-on-release
//! - [`Consumer`]: resumable batch reader with a persisted offset
//! - [`Producer`]: writes queue and delay entries for [`Record`]s
//! - [`Delayer`]: replays aged delay entries to their main stream
//! - [`Trimmer`]: deletes entries every consumer has processed, or that expired
//!
//! # Example
//!
//! ```ignore
//! use redstream::{ConsumerConfig, Redstream};
//!
//! let redstream = Redstream::in_memory();
//! let consumer = redstream.consumer("products", "indexer", ConsumerConfig::default())?;
//!
//! consumer
//!     .run(|messages| async move {
//!         for message in messages {
//!             println!("{}: {}", message.id(), message.payload()?);
//!         }
//!         Ok(())
//!     })
//!     .await;
//! ```

pub mod client;
pub mod consumer;
pub mod delayer;
pub mod lock;
pub mod message;
pub mod producer;
pub mod record;
pub mod runner;
pub mod trimmer;

pub use client::{ConsumerInfo, Redstream};
pub use consumer::Consumer;
pub use delayer::Delayer;
pub use lock::Lock;
pub use message::Message;
pub use producer::Producer;
pub use record::Record;
pub use runner::{Pause, RunOutcome, RunPolicy};
pub use trimmer::Trimmer;

pub use redstream_core::{
    delay_stream_name, payload_fields, ConsumerConfig, DelayerConfig, Entry, Fields, KeySpace,
    LockConfig, LogStore, ProducerConfig, RedstreamError, ReplicaWait, Result, StreamId,
    TrimPolicy, TrimmerConfig,
};
pub use redstream_memory::MemoryStore;

#[cfg(feature = "sqlite")]
pub use redstream_sqlite::{SqliteStore, SqliteStoreConfig};
