//! Redstream Core: types and traits shared by the redstream crates
//!
//! This crate defines:
//! - `StreamId` / `Entry`: the append-only log's identifiers and records
//! - `LogStore`: the primitive surface a backend must offer (streams,
//!   blocking tail reads, KV with leases, notification lists)
//! - `KeySpace`: namespace-aware key naming shared by all components
//! - Runtime configuration for locks, consumers, producers, delayers and trimmers
//! - `WakeStrategy`: how a backend waits for new data to arrive

pub mod config;
pub mod error;
pub mod keys;
pub mod notification;
pub mod observe;
pub mod store;
pub mod types;

pub use config::{
    ConsumerConfig, DelayerConfig, LockConfig, ProducerConfig, ReplicaWait, TrimPolicy,
    TrimmerConfig,
};
pub use error::{RedstreamError, Result};
pub use keys::{delay_stream_name, KeySpace};
pub use notification::WakeStrategy;
pub use store::LogStore;
pub use types::{now_millis, payload_fields, Entry, Fields, StreamId, PAYLOAD_FIELD};
