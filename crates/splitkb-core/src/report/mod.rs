//! HID reports produced from the aggregate bitmap.

pub mod sixkro;

pub use sixkro::{SixKroEncoder, SixKroReport, KEY_SLOTS, REPORT_LEN};
