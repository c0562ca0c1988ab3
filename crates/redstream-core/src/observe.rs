//! Optional metrics instrumentation for redstream.
//!
//! When the `observe` feature is enabled, key operations emit counters and
//! histograms via the [`metrics`] crate. A downstream application must
//! install a metrics recorder (e.g. `metrics-exporter-prometheus`) to collect
//! the data.
//!
//! When the feature is **not** enabled every function in this module is a
//! zero-cost no-op.

/// Record a delivered consumer batch.
///
/// - `redstream.consumer.batches_total` – counter with `stream` label
/// - `redstream.consumer.messages_total` – counter with `stream` label
/// - `redstream.consumer.handler_duration_seconds` – histogram
#[inline]
pub fn record_batch(stream: &str, messages: usize, duration: std::time::Duration) {
    #[cfg(feature = "observe")]
    {
        let stream = stream.to_string();
        metrics::counter!("redstream.consumer.batches_total", "stream" => stream.clone())
            .increment(1);
        metrics::counter!("redstream.consumer.messages_total", "stream" => stream)
            .increment(messages as u64);
        metrics::histogram!("redstream.consumer.handler_duration_seconds")
            .record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (stream, messages, duration);
    }
}

/// Record a lock acquisition attempt.
///
/// - `redstream.lock.acquisitions_total` – counter with `outcome` label
#[inline]
pub fn record_lock_attempt(acquired: bool) {
    #[cfg(feature = "observe")]
    {
        let outcome = if acquired { "acquired" } else { "busy" };
        metrics::counter!("redstream.lock.acquisitions_total", "outcome" => outcome).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = acquired;
    }
}

/// Record a lease that was lost while its block was still running.
///
/// - `redstream.lock.lost_total` – counter
#[inline]
pub fn record_lock_lost() {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("redstream.lock.lost_total").increment(1);
    }
}

/// Record entries appended by a producer.
///
/// - `redstream.producer.entries_total` – counter with `kind` label (`queue` / `delay`)
#[inline]
pub fn record_produced(delayed: bool, entries: usize) {
    #[cfg(feature = "observe")]
    {
        let kind = if delayed { "delay" } else { "queue" };
        metrics::counter!("redstream.producer.entries_total", "kind" => kind)
            .increment(entries as u64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (delayed, entries);
    }
}

/// Record delay entries replayed to their main stream.
///
/// - `redstream.delayer.replayed_total` – counter
#[inline]
pub fn record_replayed(entries: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("redstream.delayer.replayed_total").increment(entries as u64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = entries;
    }
}

/// Record entries deleted by a trimmer.
///
/// - `redstream.trimmer.deleted_total` – counter
#[inline]
pub fn record_trimmed(entries: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("redstream.trimmer.deleted_total").increment(entries as u64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = entries;
    }
}
