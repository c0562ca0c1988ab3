pub mod consumer;
pub mod lock;
pub mod producer;
pub mod trimmer;

pub use consumer::{ConsumerConfig, DelayerConfig};
pub use lock::LockConfig;
pub use producer::{ProducerConfig, ReplicaWait};
pub use trimmer::{TrimPolicy, TrimmerConfig};
