//! ESP32 firmware-specific modules for boat32
//!
//! This crate contains the hardware adapters that cannot compile on desktop
//! targets: GPIO, ADC, DAC and pulse-counter drivers behind the boat32-core
//! sensor traits, the station-mode radio, the embassy-net HTTP client and
//! status server with its mDNS responder, and preferences kept in flash.

#![no_std]

extern crate alloc;

pub mod analog;
pub mod flash;
pub mod http;
pub mod indicator;
pub mod mdns;
pub mod wifi;

use log::error;

/// Report why boot cannot continue on both the debug probe and the uplink,
/// then park the core.
pub fn halt(reason: &dyn core::fmt::Display) -> ! {
    rtt_target::rprintln!("Boot halted: {}", reason);
    error!("Boot halted: {}", reason);
    loop {
        core::hint::spin_loop();
    }
}
