//! Progress reporting seam shared by the pipeline phases.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Observer for updates on the unified 0 to 100 progress scale.
///
/// Implementations must tolerate being called from whatever task is driving
/// the transfer or poll loop, hence `Send + Sync`.
pub trait ProgressSink: Send + Sync {
    /// Receive one progress value.
    fn publish(&self, percent: u8);
}

/// Sink that discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn publish(&self, _percent: u8) {}
}

impl<F> ProgressSink for F
where
    F: Fn(u8) + Send + Sync,
{
    fn publish(&self, percent: u8) {
        self(percent);
    }
}

/// Monotonic wrapper around a sink.
///
/// Holds the high-watermark for a single run and forwards only values that
/// move it forward, so observers never see progress regress no matter which
/// phase is currently reporting.
pub(crate) struct ProgressGauge {
    watermark: AtomicU8,
    inner: Arc<dyn ProgressSink>,
}

impl ProgressGauge {
    pub(crate) fn new(inner: Arc<dyn ProgressSink>) -> Self {
        Self {
            watermark: AtomicU8::new(0),
            inner,
        }
    }

    /// Publish `percent` unless an equal or higher value was already seen.
    pub(crate) fn advance(&self, percent: u8) {
        let capped = percent.min(100);
        let previous = self.watermark.fetch_max(capped, Ordering::SeqCst);
        if capped > previous {
            self.inner.publish(capped);
        }
    }

    /// Highest value published so far.
    pub(crate) fn current(&self) -> u8 {
        self.watermark.load(Ordering::SeqCst)
    }
}

impl ProgressSink for ProgressGauge {
    fn publish(&self, percent: u8) {
        self.advance(percent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<u8>>);

    impl ProgressSink for Recorder {
        fn publish(&self, percent: u8) {
            self.0.lock().unwrap().push(percent);
        }
    }

    #[test]
    fn gauge_suppresses_regressions_and_repeats() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let gauge = ProgressGauge::new(recorder.clone());
        for value in [5, 5, 3, 12, 50, 48, 50, 100] {
            gauge.advance(value);
        }
        assert_eq!(*recorder.0.lock().unwrap(), vec![5, 12, 50, 100]);
        assert_eq!(gauge.current(), 100);
    }

    #[test]
    fn gauge_caps_at_one_hundred() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let gauge = ProgressGauge::new(recorder.clone());
        gauge.advance(250);
        assert_eq!(*recorder.0.lock().unwrap(), vec![100]);
    }

    #[test]
    fn closures_are_sinks() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = seen.clone();
        let sink: Arc<dyn ProgressSink> = Arc::new(move |percent: u8| {
            captured.lock().unwrap().push(percent);
        });
        sink.publish(42);
        assert_eq!(*seen.lock().unwrap(), vec![42]);
    }
}
