//! Periodic sensor acquisition tasks
//!
//! Each task owns one sensor collaborator and the store writer for its field
//! group. Every cycle it samples, converts, publishes the latest value and
//! sends a telemetry frame; a successful transmission pulses the status LED.
//! The tasks never depend on connectivity and never on each other.

pub mod auxiliary;
pub mod control;
pub mod conversions;
pub mod filter;
pub mod instrumentation;
pub mod position;
pub mod temperature;

use log::warn;

use crate::app_state::{DebugFlags, DebugSwitch};
use crate::status::{StatusInbox, StatusSignal};
use crate::transport::SerialOutbox;
use crate::transport::frame::TelemetryMessage;

/// What every acquisition task needs to report a measurement.
#[derive(Clone, Copy)]
pub struct Uplink<'a> {
    pub outbox: &'a SerialOutbox,
    pub status: &'a StatusInbox,
    pub debug: &'a DebugSwitch,
}

impl Uplink<'_> {
    /// Queue a telemetry frame and pulse the LED once it is queued.
    pub async fn transmit(&self, message: TelemetryMessage) -> bool {
        match self.outbox.send_telemetry(message).await {
            Ok(()) => {
                self.status.send(StatusSignal::Pulse);
                true
            }
            Err(e) => {
                warn!(target: "serial", "Telemetry frame dropped: {}", e);
                false
            }
        }
    }

    pub fn verbose(&self, flag: DebugFlags) -> bool {
        self.debug.enabled(flag)
    }
}
