//! Infrastructure layer for the master application.
//!
//! Contains OS-facing adapters: the HID report sink and file-system storage.
//! The link transports live in `splitkb_core::transport`.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `splitkb_core`, but MUST NOT be imported by the `application` layer
//! outside of tests.

pub mod hid_output;
pub mod storage;
