//! Counters describing channel traffic.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Traffic counters for a shared channel.
#[derive(Debug, Default)]
pub struct ChannelMetrics {
    /// Envelopes accepted by `send`, `try_send` or `forward`.
    sent: AtomicU64,
    /// Envelopes handed out by `receive` or `try_receive`.
    received: AtomicU64,
    /// Envelopes put back by `requeue`.
    requeued: AtomicU64,
    /// Operations started after teardown.
    after_close: AtomicU64,
    /// Highest observed queue length.
    peak_len: AtomicUsize,
}

impl ChannelMetrics {
    /// Records an accepted send and the resulting queue length.
    pub fn record_send(&self, len: usize) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        self.peak_len.fetch_max(len, Ordering::Relaxed);
    }

    /// Records a successful receive.
    pub fn record_receive(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a requeue and the resulting queue length.
    pub fn record_requeue(&self, len: usize) {
        self.requeued.fetch_add(1, Ordering::Relaxed);
        self.peak_len.fetch_max(len, Ordering::Relaxed);
    }

    /// Records an operation that started after the channel was closed.
    pub fn record_after_close(&self) {
        self.after_close.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> ChannelMetricsSnapshot {
        ChannelMetricsSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            after_close: self.after_close.load(Ordering::Relaxed),
            peak_len: self.peak_len.load(Ordering::Relaxed),
        }
    }

    /// Converts metrics to a dictionary.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or(serde_json::Value::Null)
    }
}

/// A copy of [`ChannelMetrics`] taken at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMetricsSnapshot {
    /// Envelopes accepted by `send`, `try_send` or `forward`.
    pub sent: u64,
    /// Envelopes handed out by `receive` or `try_receive`.
    pub received: u64,
    /// Envelopes put back by `requeue`.
    pub requeued: u64,
    /// Operations started after teardown.
    pub after_close: u64,
    /// Highest observed queue length.
    pub peak_len: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_default() {
        let metrics = ChannelMetrics::default();
        assert_eq!(metrics.snapshot(), ChannelMetricsSnapshot::default());
    }

    #[test]
    fn test_metrics_recording() {
        let metrics = ChannelMetrics::default();
        metrics.record_send(1);
        metrics.record_send(2);
        metrics.record_receive();
        metrics.record_requeue(2);
        metrics.record_after_close();

        let snap = metrics.snapshot();
        assert_eq!(snap.sent, 2);
        assert_eq!(snap.received, 1);
        assert_eq!(snap.requeued, 1);
        assert_eq!(snap.after_close, 1);
        assert_eq!(snap.peak_len, 2);
    }

    #[test]
    fn test_metrics_to_dict() {
        let metrics = ChannelMetrics::default();
        metrics.record_send(1);

        let dict = metrics.to_dict();
        assert_eq!(dict["sent"], 1);
        assert_eq!(dict["received"], 0);
    }
}
