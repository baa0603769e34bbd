//! Application layer use cases for the master half.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure rules, here `splitkb-core`) and the infrastructure (sockets, files,
//! the USB endpoint). Use cases in this layer depend on traits rather than
//! concrete implementations, so tests can swap the infrastructure out.
//!
//! # Sub-modules
//!
//! - **`master_controller`** – Receives frames from peripherals, keeps the
//!   aggregate HID bitmap, and emits a 6KRO report whenever it changes.
//!   It runs on every key transition.

pub mod master_controller;
