//! Synthetic sensors
//!
//! Every signal is a slow function of the embassy clock so the readings
//! drift the way they do on the water.

use embassy_time::{Instant, Timer};
use heapless::Vec;

use boat32_core::app_state::DISCONNECTED_CELSIUS;
use boat32_core::sensors::{
    AnalogFrontEnd, AuxChannel, DacOutput, MAX_PROBES, PositionEncoder, ProbeAddress, ProbeBus,
    RawAnalog, SensorError,
};

/// Address the simulated front end answers on.
const FRONT_END_ADDRESS: u8 = 0x48;

fn seconds() -> f32 {
    Instant::now().as_millis() as f32 / 1000.0
}

/// Pin voltage to 12-bit code behind a 4k7/1k divider at 3.3 V reference.
fn divided_raw(volts: f32) -> u16 {
    let pin = volts / 5.7;
    ((pin / 3.3) * 4095.0).clamp(0.0, 4095.0) as u16
}

/// One probe on the motor, nothing else on the bus.
pub struct MockProbes {
    motor: ProbeAddress,
}

impl MockProbes {
    pub fn new(motor: ProbeAddress) -> Self {
        Self { motor }
    }
}

impl ProbeBus for MockProbes {
    async fn request_temperatures(&mut self) -> Result<(), SensorError> {
        // 12-bit conversion time
        Timer::after_millis(750).await;
        Ok(())
    }

    async fn read_celsius(&mut self, address: &ProbeAddress) -> f32 {
        if *address == self.motor {
            let t = seconds();
            38.0 + 6.0 * (t / 90.0).sin() + 0.3 * (t / 7.0).cos()
        } else {
            DISCONNECTED_CELSIUS
        }
    }

    async fn scan(&mut self) -> Result<Vec<ProbeAddress, MAX_PROBES>, SensorError> {
        let mut found = Vec::new();
        let _ = found.push(self.motor);
        Ok(found)
    }
}

/// Four-channel front end: battery voltage, motor, battery and MPPT current.
#[derive(Default)]
pub struct MockFrontEnd {
    selected: Option<u8>,
}

impl AnalogFrontEnd for MockFrontEnd {
    async fn probe(&mut self, address: u8) -> Result<(), SensorError> {
        if address != FRONT_END_ADDRESS {
            return Err(SensorError::NotResponding {
                sensor: "ADS1115",
                address,
            });
        }
        self.selected = Some(address);
        Ok(())
    }

    async fn read_volts(&mut self, channel: u8) -> Result<f32, SensorError> {
        if self.selected.is_none() {
            return Err(SensorError::NotResponding {
                sensor: "ADS1115",
                address: FRONT_END_ADDRESS,
            });
        }

        let t = seconds();
        match channel {
            0 => Ok(0.50 + 0.02 * (t / 300.0).sin()),
            1 => Ok(0.25 + 0.15 * (t / 45.0).sin().abs()),
            2 => Ok(0.20 + 0.05 * (t / 60.0).cos()),
            3 => Ok(0.30 + 0.20 * (t / 120.0).sin().abs()),
            _ => Err(SensorError::InvalidChannel {
                sensor: "ADS1115",
                channel,
            }),
        }
    }
}

/// Auxiliary battery around 12.6 V; the port pump cycles every minute.
pub struct MockAuxiliary;

impl RawAnalog for MockAuxiliary {
    fn read_raw(&mut self, channel: AuxChannel) -> u16 {
        let t = seconds();
        match channel {
            AuxChannel::BatteryVoltage => divided_raw(12.6 + 0.2 * (t / 200.0).sin()),
            AuxChannel::BatteryCurrent => (1900.0 + 150.0 * (t / 30.0).sin()) as u16,
            AuxChannel::PortPump if (t as u32 / 30) % 2 == 1 => divided_raw(12.4),
            AuxChannel::PortPump | AuxChannel::StarboardPump => 0,
        }
    }
}

/// Control knob the operator slowly turns back and forth.
#[derive(Default)]
pub struct MockEncoder {
    offset: i32,
}

impl PositionEncoder for MockEncoder {
    fn count(&mut self) -> i32 {
        (30.0 * (seconds() / 20.0).sin()) as i32 + self.offset
    }

    fn set_count(&mut self, count: i32) {
        self.offset = count - (30.0 * (seconds() / 20.0).sin()) as i32;
    }
}

#[derive(Default)]
pub struct MockDac {
    code: u8,
}

impl DacOutput for MockDac {
    fn write(&mut self, code: u8) {
        if code != self.code {
            log::trace!(target: "control", "DAC code {}", code);
        }
        self.code = code;
    }
}

/// GPS receiver emitting one GGA and one RMC sentence per second while the
/// boat motors slowly north-east.
#[derive(Default)]
pub struct MockGps {
    pending: std::vec::Vec<u8>,
}

impl MockGps {
    fn next_burst(&mut self) {
        let t = seconds();
        let latitude = 52.370_2 + t * 1.0e-5;
        let longitude = 4.895_2 + t * 1.5e-5;
        let clock = t as u32;
        let time = format!(
            "{:02}{:02}{:02}.00",
            (clock / 3600) % 24,
            (clock / 60) % 60,
            clock % 60
        );
        let lat = format!(
            "{:02}{:07.4},N",
            latitude as u32,
            latitude.fract() * 60.0
        );
        let lon = format!(
            "{:03}{:07.4},E",
            longitude as u32,
            longitude.fract() * 60.0
        );

        push_sentence(
            &mut self.pending,
            &format!("GPGGA,{time},{lat},{lon},1,08,0.9,1.2,M,46.9,M,,"),
        );
        push_sentence(
            &mut self.pending,
            &format!("GPRMC,{time},A,{lat},{lon},4.2,45.0,191026,,,A"),
        );
    }
}

fn push_sentence(out: &mut std::vec::Vec<u8>, payload: &str) {
    let checksum = payload.bytes().fold(0u8, |acc, byte| acc ^ byte);
    out.extend_from_slice(format!("${payload}*{checksum:02X}\r\n").as_bytes());
}

impl embedded_io_async::ErrorType for MockGps {
    type Error = core::convert::Infallible;
}

impl embedded_io_async::Read for MockGps {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.pending.is_empty() {
            Timer::after_secs(1).await;
            self.next_burst();
        }

        let count = buf.len().min(self.pending.len());
        buf[..count].copy_from_slice(&self.pending[..count]);
        self.pending.drain(..count);
        Ok(count)
    }
}
