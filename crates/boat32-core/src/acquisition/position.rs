//! GPS position from the NMEA receiver

use embassy_time::{Duration, Instant, with_timeout};
use embedded_io_async::Read;
use heapless::String;
use log::{debug, info, warn};
use nmea0183::Parser;

use super::Uplink;
use crate::app_state::{DebugFlags, FixValidity, Position, PositionWriter};
use crate::notify::Notifier;
use crate::registry::Heartbeat;
use crate::sensors::nmea::{MAX_SENTENCE, PositionTracker};
use crate::transport::frame::TelemetryMessage;

/// How much of the receiver's output is echoed to the uplink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpsVerbosity {
    #[default]
    Off,
    /// Every sentence as received
    Raw,
    /// Decoded fixes only
    Parsed,
}

impl GpsVerbosity {
    /// Map the `G` command selector (`0`, `1`, `2`).
    pub fn from_selector(selector: u8) -> Option<Self> {
        match selector {
            b'0' => Some(Self::Off),
            b'1' => Some(Self::Raw),
            b'2' => Some(Self::Parsed),
            _ => None,
        }
    }
}

const READ_CHUNK: usize = 64;

pub struct PositionTask<'a, R> {
    source: R,
    parser: Parser,
    /// Sentence being echoed while verbosity is `Raw`
    raw_line: String<MAX_SENTENCE>,
    tracker: PositionTracker,
    verbosity: GpsVerbosity,
    writer: PositionWriter<'a>,
    uplink: Uplink<'a>,
    inbox: &'a Notifier<GpsVerbosity>,
    period: Duration,
    last_publish: Option<Instant>,
}

impl<'a, R: Read> PositionTask<'a, R> {
    pub fn new(
        source: R,
        writer: PositionWriter<'a>,
        uplink: Uplink<'a>,
        inbox: &'a Notifier<GpsVerbosity>,
        period: Duration,
    ) -> Self {
        Self {
            source,
            parser: Parser::new(),
            raw_line: String::new(),
            tracker: PositionTracker::new(),
            verbosity: GpsVerbosity::Off,
            writer,
            uplink,
            inbox,
            period,
            last_publish: None,
        }
    }

    pub fn verbosity(&self) -> GpsVerbosity {
        self.verbosity
    }

    /// Feed raw receiver bytes through the sentence parser.
    pub fn feed(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if self.verbosity == GpsVerbosity::Raw {
                self.echo(byte);
            }

            match self.parser.parse_from_byte(byte) {
                Some(Ok(result)) => {
                    if self.tracker.apply(&result) && self.verbosity == GpsVerbosity::Parsed {
                        log_position(&self.tracker.position());
                    }
                }
                Some(Err(e)) => debug!(target: "gps", "Dropped sentence: {}", e),
                None => {}
            }
        }
    }

    fn echo(&mut self, byte: u8) {
        match byte {
            b'\n' => {
                if !self.raw_line.is_empty() {
                    info!(target: "gps", "{}", self.raw_line);
                }
                self.raw_line.clear();
            }
            b'\r' => {}
            // Overlong lines are cut at the sentence limit.
            byte if byte.is_ascii() => {
                let _ = self.raw_line.push(byte as char);
            }
            _ => {}
        }
    }

    /// Publish and transmit a fix. A fix reporting zero satellites in use is
    /// no fix and is dropped without a frame; an unreported count is kept.
    pub async fn publish(&mut self, position: Position) -> bool {
        if position.validity.contains(FixValidity::SATELLITES) && position.satellites == 0 {
            debug!(target: "gps", "No satellites in view, fix discarded");
            return false;
        }

        self.writer.publish(position);
        if self.uplink.verbose(DebugFlags::GPS) && self.verbosity == GpsVerbosity::Off {
            log_position(&position);
        }
        self.uplink
            .transmit(TelemetryMessage::from(&position))
            .await
    }

    fn publish_due(&self) -> bool {
        self.last_publish
            .is_none_or(|last| last.elapsed() >= self.period)
    }

    /// Read whatever the receiver has sent, bounded by one period, and publish
    /// the merged fix at most once per period.
    pub async fn step(&mut self) {
        if let Some(verbosity) = self.inbox.try_receive() {
            info!(target: "gps", "Verbosity {:?}", verbosity);
            self.verbosity = verbosity;
        }

        let mut chunk = [0u8; READ_CHUNK];
        match with_timeout(self.period, self.source.read(&mut chunk)).await {
            Ok(Ok(count)) => self.feed(&chunk[..count]),
            Ok(Err(e)) => warn!(target: "gps", "Receiver read failed: {:?}", e),
            Err(_) => debug!(target: "gps", "Receiver silent for {} ms", self.period.as_millis()),
        }

        if self.publish_due() {
            if let Some(position) = self.tracker.take_update() {
                self.publish(position).await;
                self.last_publish = Some(Instant::now());
            }
        }
    }

    pub async fn run(mut self, heartbeat: Heartbeat<'_>) -> ! {
        loop {
            self.step().await;
            heartbeat.beat();
        }
    }
}

fn log_position(position: &Position) {
    info!(
        target: "gps",
        "Lat: {:.6} Lng: {:.6} Speed: {:.2} km/h Course: {:.1} Satellites: {}",
        position.wire_latitude(),
        position.wire_longitude(),
        position.wire_speed(),
        position.wire_course(),
        position.satellites
    );
}
