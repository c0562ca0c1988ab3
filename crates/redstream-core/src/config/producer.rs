use crate::error::{RedstreamError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Replication wait applied after delay writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaWait {
    /// Number of replicas that must acknowledge the write
    pub replicas: u32,

    /// Upper bound on the wait; zero waits indefinitely
    pub timeout: Duration,
}

/// Configuration for a producer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Number of records written per pipelined round trip in bulk operations
    pub chunk_size: usize,

    /// Optional durability wait for delay writes
    pub wait: Option<ReplicaWait>,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 250,
            wait: None,
        }
    }
}

impl ProducerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_wait(mut self, replicas: u32, timeout: Duration) -> Self {
        self.wait = Some(ReplicaWait { replicas, timeout });
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RedstreamError::InvalidConfig(
                "producer chunk_size must be positive".into(),
            ));
        }
        Ok(())
    }
}
