//! Serial uplink
//!
//! Every task that talks to the operator or the telemetry receiver goes
//! through one [`SerialOutbox`]. A single writer task drains it, so log lines
//! and telemetry frames interleave whole, never byte by byte.

pub mod frame;
mod logger;

pub use logger::{SerialLogger, format_line};

use core::sync::atomic::{AtomicU8, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embedded_io_async::Write;
use heapless::{String, Vec};
use log::warn;
use thiserror_no_std::Error;

use crate::config::TelemetryIds;
use crate::registry::Heartbeat;
use frame::{Envelope, FrameError, MAX_FRAME, TelemetryMessage};

pub const OUTBOX_DEPTH: usize = 16;
pub const MAX_LINE: usize = 160;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialError {
    #[error("serial write failed")]
    Write,
    #[error("frame encoding failed: {0}")]
    Frame(FrameError),
}

impl From<FrameError> for SerialError {
    fn from(value: FrameError) -> Self {
        Self::Frame(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Line(String<MAX_LINE>),
    Frame(Vec<u8, MAX_FRAME>),
}

pub struct SerialOutbox {
    queue: Channel<CriticalSectionRawMutex, Outbound, OUTBOX_DEPTH>,
    ids: TelemetryIds,
    sequence: AtomicU8,
}

impl SerialOutbox {
    pub const fn new(system_id: u8, component_id: u8) -> Self {
        Self {
            queue: Channel::new(),
            ids: TelemetryIds {
                system_id,
                component_id,
            },
            sequence: AtomicU8::new(0),
        }
    }

    /// Queue a text line without waiting. Returns `false` if the line was
    /// dropped because the outbox is full.
    pub fn try_line(&self, text: &str) -> bool {
        let mut line = String::new();
        for ch in text.chars() {
            if line.push(ch).is_err() {
                break;
            }
        }
        self.queue.try_send(Outbound::Line(line)).is_ok()
    }

    /// Wrap `message` in an envelope with the next sequence number and queue
    /// it, waiting for room if the outbox is full.
    pub async fn send_telemetry(&self, message: TelemetryMessage) -> Result<(), SerialError> {
        let envelope = Envelope {
            system_id: self.ids.system_id,
            component_id: self.ids.component_id,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            message,
        };
        let frame = frame::encode(&envelope)?;
        self.queue.send(Outbound::Frame(frame)).await;
        Ok(())
    }

    pub async fn receive(&self) -> Outbound {
        self.queue.receive().await
    }

    pub fn try_receive(&self) -> Option<Outbound> {
        self.queue.try_receive().ok()
    }
}

/// Write one queued item to the port. Lines get a trailing newline.
pub async fn write_outbound<W: Write>(port: &mut W, item: &Outbound) -> Result<(), SerialError> {
    match item {
        Outbound::Line(line) => {
            port.write_all(line.as_bytes())
                .await
                .map_err(|_| SerialError::Write)?;
            port.write_all(b"\n").await.map_err(|_| SerialError::Write)?;
        }
        Outbound::Frame(frame) => {
            port.write_all(frame).await.map_err(|_| SerialError::Write)?;
        }
    }
    port.flush().await.map_err(|_| SerialError::Write)
}

/// Drain the outbox into the serial port forever.
pub async fn run_writer<W: Write>(
    outbox: &SerialOutbox,
    mut port: W,
    heartbeat: Heartbeat<'_>,
) -> ! {
    loop {
        let item = outbox.receive().await;
        if let Err(e) = write_outbound(&mut port, &item).await {
            warn!(target: "serial", "Dropped outbound item: {}", e);
        }
        heartbeat.beat();
    }
}
