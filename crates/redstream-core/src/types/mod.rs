mod entry;
mod stream_id;

pub use entry::{payload_fields, Entry, Fields, PAYLOAD_FIELD};
pub use stream_id::StreamId;

/// Current wall clock time in milliseconds since the unix epoch
///
/// Stream ids carry the same clock, so message age is `now_millis() - id.ms()`.
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
