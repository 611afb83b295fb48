//! Telemetry frame codec
//!
//! Wire layout: `0xFE`, payload length (one byte), postcard-encoded
//! [`Envelope`]. Frames and text lines share the serial uplink; the start
//! marker never occurs in the printable text the logger emits.

use heapless::Vec;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::app_state::{Instrumentation, Position, Temperatures};

pub const FRAME_START: u8 = 0xFE;
const HEADER_LEN: usize = 2;
pub const MAX_PAYLOAD: usize = 64;
pub const MAX_FRAME: usize = HEADER_LEN + MAX_PAYLOAD;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("payload does not fit in a frame")]
    Encode,
    #[error("frame does not start with the start marker")]
    MissingStart,
    #[error("frame truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error("payload could not be decoded")]
    Decode,
}

/// Measurements carried on the uplink. Invalid position fields are `-1.0`;
/// a disconnected probe keeps the `-127.0` sentinel.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub enum TelemetryMessage {
    Instrumentation {
        current_motor: f32,
        current_battery: f32,
        current_mppt: f32,
        voltage_battery: f32,
    },
    Position {
        latitude: f32,
        longitude: f32,
        speed: f32,
        course: f32,
        satellites: u8,
    },
    Temperatures {
        motor: f32,
        secondary: f32,
    },
}

impl From<&Instrumentation> for TelemetryMessage {
    fn from(value: &Instrumentation) -> Self {
        Self::Instrumentation {
            current_motor: value.current_motor,
            current_battery: value.current_battery,
            current_mppt: value.current_mppt,
            voltage_battery: value.voltage_battery,
        }
    }
}

impl From<&Position> for TelemetryMessage {
    fn from(value: &Position) -> Self {
        Self::Position {
            latitude: value.wire_latitude(),
            longitude: value.wire_longitude(),
            speed: value.wire_speed(),
            course: value.wire_course(),
            satellites: value.satellites,
        }
    }
}

impl From<&Temperatures> for TelemetryMessage {
    fn from(value: &Temperatures) -> Self {
        Self::Temperatures {
            motor: value.motor.to_wire(),
            secondary: value.secondary.to_wire(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub system_id: u8,
    pub component_id: u8,
    /// Wraps at 255
    pub sequence: u8,
    pub message: TelemetryMessage,
}

pub fn encode(envelope: &Envelope) -> Result<Vec<u8, MAX_FRAME>, FrameError> {
    let mut buffer = [0u8; MAX_FRAME];
    let payload_len = postcard::to_slice(envelope, &mut buffer[HEADER_LEN..])
        .map_err(|_| FrameError::Encode)?
        .len();

    buffer[0] = FRAME_START;
    buffer[1] = payload_len as u8;

    Vec::from_slice(&buffer[..HEADER_LEN + payload_len]).map_err(|_| FrameError::Encode)
}

/// Decode one frame from the start of `bytes`, returning the envelope and
/// the number of bytes consumed.
pub fn decode(bytes: &[u8]) -> Result<(Envelope, usize), FrameError> {
    match bytes.first() {
        Some(&FRAME_START) => {}
        Some(_) => return Err(FrameError::MissingStart),
        None => {
            return Err(FrameError::Truncated {
                needed: HEADER_LEN,
                available: 0,
            });
        }
    }

    let payload_len = *bytes.get(1).ok_or(FrameError::Truncated {
        needed: HEADER_LEN,
        available: bytes.len(),
    })? as usize;
    let end = HEADER_LEN + payload_len;
    let payload = bytes.get(HEADER_LEN..end).ok_or(FrameError::Truncated {
        needed: end,
        available: bytes.len(),
    })?;

    let envelope = postcard::from_bytes(payload).map_err(|_| FrameError::Decode)?;
    Ok((envelope, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::{DISCONNECTED_CELSIUS, TemperatureReading};

    fn envelope(message: TelemetryMessage) -> Envelope {
        Envelope {
            system_id: 1,
            component_id: 191,
            sequence: 42,
            message,
        }
    }

    #[test]
    fn test_frame_header() {
        let frame = encode(&envelope(TelemetryMessage::Temperatures {
            motor: 21.5,
            secondary: DISCONNECTED_CELSIUS,
        }))
        .unwrap();

        assert_eq!(frame[0], FRAME_START);
        assert_eq!(frame[1] as usize, frame.len() - HEADER_LEN);
    }

    #[test]
    fn test_decode_consumes_one_frame() {
        let first = encode(&envelope(TelemetryMessage::Instrumentation {
            current_motor: 12.0,
            current_battery: -3.5,
            current_mppt: 8.25,
            voltage_battery: 48.1,
        }))
        .unwrap();
        let second = encode(&envelope(TelemetryMessage::Temperatures {
            motor: 30.0,
            secondary: 31.0,
        }))
        .unwrap();

        let mut stream = std::vec::Vec::new();
        stream.extend_from_slice(&first);
        stream.extend_from_slice(&second);

        let (decoded, used) = decode(&stream).unwrap();
        assert_eq!(used, first.len());
        assert_eq!(decoded, envelope(TelemetryMessage::Instrumentation {
            current_motor: 12.0,
            current_battery: -3.5,
            current_mppt: 8.25,
            voltage_battery: 48.1,
        }));
    }

    #[test]
    fn test_truncated_frame_reported() {
        let frame = encode(&envelope(TelemetryMessage::Temperatures {
            motor: 30.0,
            secondary: 31.0,
        }))
        .unwrap();

        assert!(matches!(
            decode(&frame[..frame.len() - 1]),
            Err(FrameError::Truncated { .. })
        ));
        assert_eq!(decode(b"[INFO]"), Err(FrameError::MissingStart));
    }

    #[test]
    fn test_disconnected_probe_keeps_sentinel() {
        let message = TelemetryMessage::from(&Temperatures {
            motor: TemperatureReading::Celsius(40.0),
            secondary: TemperatureReading::Disconnected,
        });

        assert_eq!(
            message,
            TelemetryMessage::Temperatures {
                motor: 40.0,
                secondary: DISCONNECTED_CELSIUS
            }
        );
    }
}
