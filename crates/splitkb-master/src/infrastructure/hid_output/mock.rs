//! Recording HID sink for unit and integration tests.
//!
//! Stores every report it accepts so tests can assert on the exact byte
//! sequence the host would have seen.

use std::sync::Mutex;

use async_trait::async_trait;
use splitkb_core::report::SixKroReport;
use tokio::sync::Notify;

use crate::application::master_controller::{HidError, HidSink};

/// A [`HidSink`] that records reports in memory.
#[derive(Default)]
pub struct RecordingHidSink {
    reports: Mutex<Vec<SixKroReport>>,
    attempts: Mutex<usize>,
    should_fail: bool,
    notify: Notify,
}

impl RecordingHidSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every write fails with [`HidError::NotReady`].
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Reports accepted so far, oldest first.
    pub fn reports(&self) -> Vec<SixKroReport> {
        self.reports.lock().expect("lock poisoned").clone()
    }

    /// Number of `send_report` calls, including failed ones.
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().expect("lock poisoned")
    }

    /// Waits until at least `count` reports have been accepted.
    pub async fn wait_for(&self, count: usize) -> Vec<SixKroReport> {
        loop {
            let notified = self.notify.notified();
            let reports = self.reports();
            if reports.len() >= count {
                return reports;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl HidSink for RecordingHidSink {
    async fn send_report(&self, report: SixKroReport) -> Result<(), HidError> {
        *self.attempts.lock().expect("lock poisoned") += 1;
        if self.should_fail {
            return Err(HidError::NotReady);
        }
        self.reports.lock().expect("lock poisoned").push(report);
        self.notify.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_recording_sink_keeps_reports_in_order() {
        // Arrange
        let sink = RecordingHidSink::new();
        let first = SixKroReport::from_bytes([0, 0, 4, 0, 0, 0, 0, 0]);
        let second = SixKroReport::default();

        // Act
        assert_ok!(sink.send_report(first).await);
        assert_ok!(sink.send_report(second).await);

        // Assert
        assert_eq!(sink.reports(), vec![first, second]);
        assert_eq!(sink.attempts(), 2);
    }

    #[tokio::test]
    async fn test_failing_sink_counts_attempts_but_records_nothing() {
        let sink = RecordingHidSink::failing();
        assert!(sink.send_report(SixKroReport::default()).await.is_err());
        assert_eq!(sink.attempts(), 1);
        assert!(sink.reports().is_empty());
    }
}
