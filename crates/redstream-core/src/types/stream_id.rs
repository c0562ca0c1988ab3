use crate::error::RedstreamError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Identifier of an entry within a stream
///
/// A `(milliseconds, sequence)` pair rendered as `"{ms}-{seq}"`. Ids are
/// strictly increasing within a stream and compare lexicographically by
/// `(ms, seq)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct StreamId {
    ms: u64,
    seq: u64,
}

impl StreamId {
    /// Smallest possible id, i.e. "start of stream"
    pub const MIN: StreamId = StreamId { ms: 0, seq: 0 };

    /// Largest possible id, i.e. "end of stream"
    pub const MAX: StreamId = StreamId {
        ms: u64::MAX,
        seq: u64::MAX,
    };

    pub const fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }

    /// Highest id that can exist at the given millisecond
    pub const fn last_at(ms: u64) -> Self {
        Self { ms, seq: u64::MAX }
    }

    pub fn ms(&self) -> u64 {
        self.ms
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// The id directly following this one
    pub fn successor(&self) -> StreamId {
        match self.seq.checked_add(1) {
            Some(seq) => StreamId::new(self.ms, seq),
            None => StreamId::new(self.ms.saturating_add(1), 0),
        }
    }

    /// Wall clock time the entry was appended at
    pub fn timestamp(&self) -> DateTime<Utc> {
        i64::try_from(self.ms)
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Age of the entry at `now_ms`; zero for ids from the future
    pub fn age_at(&self, now_ms: u64) -> Duration {
        Duration::from_millis(now_ms.saturating_sub(self.ms))
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

impl FromStr for StreamId {
    type Err = RedstreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RedstreamError::InvalidOffset(s.to_string());

        let (ms, seq) = match s.split_once('-') {
            Some((ms, seq)) => (ms, seq),
            None => (s, "0"),
        };

        let ms = ms.parse::<u64>().map_err(|_| invalid())?;
        let seq = seq.parse::<u64>().map_err(|_| invalid())?;

        Ok(StreamId::new(ms, seq))
    }
}

impl From<StreamId> for String {
    fn from(id: StreamId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for StreamId {
    type Error = RedstreamError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let id: StreamId = "1526919030474-55".parse().unwrap();
        assert_eq!(id.ms(), 1526919030474);
        assert_eq!(id.seq(), 55);
        assert_eq!(id.to_string(), "1526919030474-55");
    }

    #[test]
    fn test_parse_without_sequence() {
        let id: StreamId = "42".parse().unwrap();
        assert_eq!(id, StreamId::new(42, 0));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for raw in ["", "-", "abc", "1-x", "1-2-3", "-5"] {
            let err = raw.parse::<StreamId>().unwrap_err();
            assert!(matches!(err, RedstreamError::InvalidOffset(_)), "{raw}");
        }
    }

    #[test]
    fn test_ordering_is_numeric_not_textual() {
        let a = StreamId::new(9, 0);
        let b = StreamId::new(10, 0);
        let c = StreamId::new(10, 1);
        assert!(a < b);
        assert!(b < c);
        assert!(StreamId::MIN < a);
        assert!(c < StreamId::MAX);
    }

    #[test]
    fn test_successor() {
        assert_eq!(StreamId::new(5, 1).successor(), StreamId::new(5, 2));
        assert_eq!(
            StreamId::new(5, u64::MAX).successor(),
            StreamId::new(6, 0)
        );
    }

    #[test]
    fn test_age() {
        let id = StreamId::new(1_000, 0);
        assert_eq!(id.age_at(3_500), Duration::from_millis(2_500));
        assert_eq!(id.age_at(500), Duration::ZERO);
    }

    #[test]
    fn test_serde_as_string() {
        let id = StreamId::new(7, 3);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"7-3\"");
        let back: StreamId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
