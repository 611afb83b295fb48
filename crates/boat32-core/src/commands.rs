//! Operator commands on the serial line
//!
//! A frame is `<TAG><PAYLOAD>` ended by CR or LF, at most [`FRAME_CAPACITY`]
//! bytes. A frame that fills the buffer is handled as-is and the rest of the
//! line is discarded up to the next terminator.
//!
//! | Tag | Payload              | Receiver           |
//! |-----|----------------------|--------------------|
//! | `B` | `0`/`1`/`2` cadence  | status indicator   |
//! | `R` | `http://` URL        | request forwarder  |
//! | `T` | none                 | temperature task   |
//! | `G` | `0`/`1`/`2` verbosity| position task      |
//! | `C` | amps, or empty       | auxiliary task     |
//! | `Q` | none                 | auxiliary task     |

use core::str::FromStr;

use embedded_io_async::Read;
use heapless::Vec;
use log::{info, warn};
use thiserror_no_std::Error;

use crate::acquisition::auxiliary::AuxiliaryCommand;
use crate::acquisition::position::GpsVerbosity;
use crate::acquisition::temperature::TemperatureCommand;
use crate::notify::Mailboxes;
use crate::registry::Heartbeat;
use crate::request::HttpRequest;
use crate::status::{BlinkRate, StatusSignal};

/// Tag byte plus the longest payload.
pub const FRAME_CAPACITY: usize = 32;

pub type CommandFrame = Vec<u8, FRAME_CAPACITY>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command tag {0:?}")]
    UnknownTag(char),
    #[error("command {0} needs a payload")]
    MissingPayload(char),
    #[error("invalid selector {value:?} for command {tag}")]
    InvalidSelector { tag: char, value: char },
    #[error("calibration value is not a number")]
    InvalidNumber,
    #[error("payload is not valid text")]
    NotText,
    #[error("payload too long")]
    PayloadTooLong,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Cadence(BlinkRate),
    HttpGet(HttpRequest),
    Rescan,
    GpsVerbosity(GpsVerbosity),
    /// Bare `C`
    Proceed,
    CalibrationValue(f32),
    StartCalibration,
}

impl Command {
    pub fn parse(frame: &[u8]) -> Result<Self, CommandError> {
        let Some((&tag, payload)) = frame.split_first() else {
            return Err(CommandError::Empty);
        };
        let tag_char = char::from(tag);

        match tag {
            b'B' => {
                let selector = selector(tag_char, payload)?;
                BlinkRate::from_selector(selector)
                    .map(Self::Cadence)
                    .ok_or(CommandError::InvalidSelector {
                        tag: tag_char,
                        value: char::from(selector),
                    })
            }
            b'G' => {
                let selector = selector(tag_char, payload)?;
                GpsVerbosity::from_selector(selector)
                    .map(Self::GpsVerbosity)
                    .ok_or(CommandError::InvalidSelector {
                        tag: tag_char,
                        value: char::from(selector),
                    })
            }
            b'R' => {
                let url = text(payload)?.trim();
                if url.is_empty() {
                    return Err(CommandError::MissingPayload(tag_char));
                }
                HttpRequest::new(url)
                    .map(Self::HttpGet)
                    .map_err(|_| CommandError::PayloadTooLong)
            }
            b'T' => Ok(Self::Rescan),
            b'Q' => Ok(Self::StartCalibration),
            b'C' => {
                let value = text(payload)?.trim();
                if value.is_empty() {
                    return Ok(Self::Proceed);
                }
                f32::from_str(value)
                    .ok()
                    .filter(|amps| amps.is_finite())
                    .map(Self::CalibrationValue)
                    .ok_or(CommandError::InvalidNumber)
            }
            _ => Err(CommandError::UnknownTag(tag_char)),
        }
    }

    /// Notify the task that owns this command.
    pub fn dispatch(self, mailboxes: &Mailboxes) {
        match self {
            Self::Cadence(rate) => mailboxes.status.send(StatusSignal::Cadence(rate)),
            Self::HttpGet(request) => mailboxes.requests.send(request),
            Self::Rescan => mailboxes.temperature.send(TemperatureCommand::Rescan),
            Self::GpsVerbosity(verbosity) => mailboxes.position.send(verbosity),
            Self::Proceed => mailboxes.auxiliary.send(AuxiliaryCommand::Proceed),
            Self::CalibrationValue(amps) => mailboxes
                .auxiliary
                .send(AuxiliaryCommand::CalibrationValue(amps)),
            Self::StartCalibration => mailboxes.auxiliary.send(AuxiliaryCommand::StartCalibration),
        }
    }
}

fn selector(tag: char, payload: &[u8]) -> Result<u8, CommandError> {
    payload
        .first()
        .copied()
        .ok_or(CommandError::MissingPayload(tag))
}

fn text(payload: &[u8]) -> Result<&str, CommandError> {
    core::str::from_utf8(payload).map_err(|_| CommandError::NotText)
}

/// Splits the inbound byte stream into frames.
#[derive(Default)]
pub struct CommandReader {
    frame: CommandFrame,
    discarding: bool,
}

impl CommandReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, byte: u8) -> Option<CommandFrame> {
        if byte == b'\r' || byte == b'\n' {
            if core::mem::replace(&mut self.discarding, false) || self.frame.is_empty() {
                return None;
            }
            return Some(core::mem::take(&mut self.frame));
        }

        if self.discarding {
            return None;
        }

        // Capacity is checked below, so the push always fits.
        let _ = self.frame.push(byte);
        if self.frame.is_full() {
            self.discarding = true;
            return Some(core::mem::take(&mut self.frame));
        }
        None
    }
}

/// Reads the serial line and routes each command to its mailbox.
pub struct CommandTask<'a, R> {
    port: R,
    reader: CommandReader,
    mailboxes: &'a Mailboxes,
}

impl<'a, R: Read> CommandTask<'a, R> {
    pub fn new(port: R, mailboxes: &'a Mailboxes) -> Self {
        Self {
            port,
            reader: CommandReader::new(),
            mailboxes,
        }
    }

    pub fn handle_frame(&self, frame: &[u8]) {
        match Command::parse(frame) {
            Ok(command) => {
                info!(target: "serial", "Command {:?}", command);
                command.dispatch(self.mailboxes);
            }
            Err(e) => warn!(target: "serial", "Dropped command: {}", e),
        }
    }

    pub async fn step(&mut self) {
        let mut chunk = [0u8; FRAME_CAPACITY];
        match self.port.read(&mut chunk).await {
            Ok(count) => {
                for &byte in &chunk[..count] {
                    if let Some(frame) = self.reader.push(byte) {
                        self.handle_frame(&frame);
                    }
                }
            }
            Err(e) => warn!(target: "serial", "Serial read failed: {:?}", e),
        }
    }

    pub async fn run(mut self, heartbeat: Heartbeat<'_>) -> ! {
        loop {
            self.step().await;
            heartbeat.beat();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusIndicator;
    use embassy_futures::block_on;
    use embassy_time::{Duration, Instant};

    fn frames(input: &[u8]) -> std::vec::Vec<std::vec::Vec<u8>> {
        let mut reader = CommandReader::new();
        input
            .iter()
            .filter_map(|&b| reader.push(b))
            .map(|frame| frame.to_vec())
            .collect()
    }

    #[test]
    fn test_frames_split_on_either_terminator() {
        assert_eq!(frames(b"B1\nT\r\n\nQ\r"), [b"B1".to_vec(), b"T".to_vec(), b"Q".to_vec()]);
    }

    #[test]
    fn test_overlong_frame_truncated_and_tail_discarded() {
        let mut input = b"R".to_vec();
        input.extend(std::iter::repeat_n(b'x', 40));
        input.extend_from_slice(b"\nT\n");

        let frames = frames(&input);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].len(), FRAME_CAPACITY);
        assert_eq!(frames[1], b"T");
    }

    #[test]
    fn test_parse_each_tag() {
        assert_eq!(Command::parse(b"B1"), Ok(Command::Cadence(BlinkRate::Medium)));
        assert_eq!(Command::parse(b"T"), Ok(Command::Rescan));
        assert_eq!(
            Command::parse(b"G2"),
            Ok(Command::GpsVerbosity(GpsVerbosity::Parsed))
        );
        assert_eq!(Command::parse(b"C12.5"), Ok(Command::CalibrationValue(12.5)));
        assert_eq!(Command::parse(b"C"), Ok(Command::Proceed));
        assert_eq!(Command::parse(b"Q"), Ok(Command::StartCalibration));
        assert_eq!(
            Command::parse(b"Rhttp://example.com/"),
            Ok(Command::HttpGet(HttpRequest::new("http://example.com/").unwrap()))
        );
    }

    #[test]
    fn test_malformed_commands_rejected() {
        assert_eq!(Command::parse(b"Z1"), Err(CommandError::UnknownTag('Z')));
        assert_eq!(Command::parse(b"B"), Err(CommandError::MissingPayload('B')));
        assert_eq!(
            Command::parse(b"B7"),
            Err(CommandError::InvalidSelector { tag: 'B', value: '7' })
        );
        assert_eq!(Command::parse(b"Cabc"), Err(CommandError::InvalidNumber));
        assert_eq!(Command::parse(b"R"), Err(CommandError::MissingPayload('R')));
        assert_eq!(Command::parse(b"C\xff"), Err(CommandError::NotText));
        assert_eq!(Command::parse(b""), Err(CommandError::Empty));
    }

    #[test]
    fn test_dispatch_reaches_owning_mailbox() {
        let mailboxes = Mailboxes::new();
        Command::CalibrationValue(12.5).dispatch(&mailboxes);
        Command::Rescan.dispatch(&mailboxes);

        assert_eq!(
            mailboxes.auxiliary.try_receive(),
            Some(AuxiliaryCommand::CalibrationValue(12.5))
        );
        assert_eq!(
            mailboxes.temperature.try_receive(),
            Some(TemperatureCommand::Rescan)
        );
        assert!(!mailboxes.status.is_pending());
    }

    struct Serial {
        data: &'static [u8],
    }

    impl embedded_io_async::ErrorType for Serial {
        type Error = core::convert::Infallible;
    }

    impl Read for Serial {
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            let count = buf.len().min(self.data.len());
            buf[..count].copy_from_slice(&self.data[..count]);
            self.data = &self.data[count..];
            Ok(count)
        }
    }

    struct Dark;

    impl crate::status::StatusOutput for Dark {
        fn set_led(&mut self, _on: bool) {}
        fn set_buzzer(&mut self, _on: bool) {}
    }

    #[test]
    fn test_b1_switches_indicator_to_medium_within_one_cycle() {
        let mailboxes = Mailboxes::new();
        let mut task = CommandTask::new(Serial { data: b"B1\n" }, &mailboxes);
        let mut indicator = StatusIndicator::new(Dark, &mailboxes.status);
        assert_eq!(indicator.cadence(), BlinkRate::Fast);

        block_on(task.step());
        let started = Instant::now();
        block_on(indicator.step());

        assert_eq!(indicator.cadence(), BlinkRate::Medium);
        assert!(started.elapsed() < Duration::from_millis(100));
    }
}
