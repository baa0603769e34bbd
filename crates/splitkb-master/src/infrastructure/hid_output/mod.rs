//! HID output infrastructure for the master application.
//!
//! On the real board the report goes to the USB HID interrupt endpoint. The
//! host-side build has no endpoint, so [`LoggingHidSink`] prints each report
//! with key names instead.
//!
//! # Testability
//!
//! The [`HidSink`] trait lets tests substitute [`mock::RecordingHidSink`].

use async_trait::async_trait;
use splitkb_core::keymap::{HidKeyCode, MODIFIER_FIRST};
use splitkb_core::report::SixKroReport;
use tracing::info;

use crate::application::master_controller::{HidError, HidSink};

pub mod mock;

/// Writes every report to the log at `info` level.
#[derive(Debug, Default)]
pub struct LoggingHidSink;

impl LoggingHidSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HidSink for LoggingHidSink {
    async fn send_report(&self, report: SixKroReport) -> Result<(), HidError> {
        info!(
            bytes = ?report,
            keys = %describe(&report),
            "HID report"
        );
        Ok(())
    }
}

/// Renders held modifiers and keys as `ShiftLeft+KeyA`, or `(none)`.
pub fn describe(report: &SixKroReport) -> String {
    let modifiers = (0..8u8)
        .filter(|bit| report.modifiers() & (1 << bit) != 0)
        .map(|bit| MODIFIER_FIRST + bit);
    let keys = report.keys().iter().copied().filter(|code| *code != 0);

    let names: Vec<String> = modifiers
        .chain(keys)
        .map(|code| match HidKeyCode::from_u8(code) {
            Some(name) => name.to_string(),
            None => format!("{code:#04x}"),
        })
        .collect();

    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join("+")
    }
}
