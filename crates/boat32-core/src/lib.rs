//! Hardware-independent core library for boat32
//!
//! This crate contains all platform-agnostic logic for the solar boat
//! telemetry companion: the shared telemetry store, per-task notification
//! mailboxes, connectivity and overlay bootstrap, the acquisition tasks and
//! their calibration math, serial command dispatch and telemetry framing.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32) and desktop hosts (for the simulator and tests).

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod acquisition;
pub mod app_state;
pub mod calibration;
pub mod commands;
pub mod config;
pub mod connectivity;
pub mod notify;
pub mod registry;
pub mod request;
pub mod sensors;
pub mod status;
pub mod status_pages;
pub mod storage;
pub mod transport;
