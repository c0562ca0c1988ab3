//! Key naming shared by every component and backend
//!
//! All keys live under `{namespace}:redstream:` (or plain `redstream:`
//! without a namespace), so several applications can share one store.

use serde::{Deserialize, Serialize};

/// Namespace-aware key builder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySpace {
    namespace: Option<String>,
}

impl KeySpace {
    /// Keys prefixed with `{namespace}:`
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
        }
    }

    /// Keys without a namespace prefix
    pub fn root() -> Self {
        Self::default()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn prefix(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}:redstream", ns),
            None => "redstream".to_string(),
        }
    }

    /// Key of the stream named `name`
    pub fn stream(&self, name: &str) -> String {
        format!("{}:stream:{}", self.prefix(), name)
    }

    /// Key holding the committed offset of `consumer` on `stream`
    pub fn offset(&self, stream: &str, consumer: &str) -> String {
        format!("{}:offset:{}:{}", self.prefix(), stream, consumer)
    }

    /// Key holding the holder token of lock `name`
    pub fn lock(&self, name: &str) -> String {
        format!("{}:lock:{}", self.prefix(), name)
    }

    /// List woken when lock `name` is released
    pub fn lock_notify(&self, name: &str) -> String {
        format!("{}.notify", self.lock(name))
    }
}

/// Name of the delay stream paired with `stream`
pub fn delay_stream_name(stream: &str) -> String {
    format!("{}.delay", stream)
}
