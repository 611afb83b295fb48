//! Sensor collaborators
//!
//! The acquisition tasks only see these traits. Bus protocols live behind
//! them: the firmware implements them on top of esp-hal peripherals, the
//! simulator with synthetic signals and the tests with scripted mocks.

mod ads1115;
mod ds18b20;
pub mod nmea;

pub use ads1115::{ADS1115_ADDRESSES, Ads1115};
pub use ds18b20::{CONVERSION_TIME, Ds18b20, OneWireIo, PinBus, crc8, scratchpad_celsius, search};

use heapless::Vec;
use thiserror_no_std::Error;

/// 64-bit ROM code of a one-wire temperature probe.
pub type ProbeAddress = [u8; 8];

/// Most probes a single bus scan reports.
pub const MAX_PROBES: usize = 8;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor} not responding at address {address:#04x}")]
    NotResponding { sensor: &'static str, address: u8 },
    #[error("{sensor} failed to {operation}: {details}")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
    #[error("{sensor} timed out during {operation}")]
    Timeout {
        sensor: &'static str,
        operation: &'static str,
    },
    #[error("{sensor} has no channel {channel}")]
    InvalidChannel { sensor: &'static str, channel: u8 },
}

/// One-wire temperature probe bus.
pub trait ProbeBus {
    /// Start a conversion on every probe.
    fn request_temperatures(&mut self) -> impl Future<Output = Result<(), SensorError>>;

    /// Read one probe in degrees Celsius. A probe that does not answer reads
    /// as [`crate::app_state::DISCONNECTED_CELSIUS`].
    fn read_celsius(&mut self, address: &ProbeAddress) -> impl Future<Output = f32>;

    /// Enumerate every probe on the bus.
    fn scan(&mut self)
    -> impl Future<Output = Result<Vec<ProbeAddress, MAX_PROBES>, SensorError>>;
}

/// Four-channel external ADC carrying the electrical instrumentation.
pub trait AnalogFrontEnd {
    /// Check whether the converter answers at `address` and select it.
    fn probe(&mut self, address: u8) -> impl Future<Output = Result<(), SensorError>>;

    /// Single-ended conversion on `channel`, in volts at the pin.
    fn read_volts(&mut self, channel: u8) -> impl Future<Output = Result<f32, SensorError>>;
}

/// Pins sampled by the auxiliary task through the on-chip ADC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxChannel {
    BatteryVoltage,
    BatteryCurrent,
    PortPump,
    StarboardPump,
}

/// On-chip 12-bit ADC.
pub trait RawAnalog {
    fn read_raw(&mut self, channel: AuxChannel) -> u16;
}

/// Quadrature encoder on the control knob.
pub trait PositionEncoder {
    fn count(&mut self) -> i32;
    fn set_count(&mut self, count: i32);
}

/// 8-bit DAC feeding the control-output amplifier.
pub trait DacOutput {
    fn write(&mut self, code: u8);
}

impl<T: ProbeBus> ProbeBus for &mut T {
    async fn request_temperatures(&mut self) -> Result<(), SensorError> {
        (**self).request_temperatures().await
    }

    async fn read_celsius(&mut self, address: &ProbeAddress) -> f32 {
        (**self).read_celsius(address).await
    }

    async fn scan(&mut self) -> Result<Vec<ProbeAddress, MAX_PROBES>, SensorError> {
        (**self).scan().await
    }
}

impl<T: AnalogFrontEnd> AnalogFrontEnd for &mut T {
    async fn probe(&mut self, address: u8) -> Result<(), SensorError> {
        (**self).probe(address).await
    }

    async fn read_volts(&mut self, channel: u8) -> Result<f32, SensorError> {
        (**self).read_volts(channel).await
    }
}
