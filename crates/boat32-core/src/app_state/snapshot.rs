//! Value types held by the telemetry store

use bitflags::bitflags;

/// Reading reported by a DS18B20 probe that did not answer the bus.
pub const DISCONNECTED_CELSIUS: f32 = -127.0;

/// Wire value for a position field the receiver did not provide.
pub const INVALID_FIELD: f32 = -1.0;

/// Electrical instrumentation readings from the external ADC.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Instrumentation {
    /// Motor current in amperes (T201 loop on channel 1)
    pub current_motor: f32,
    /// Battery current in amperes (T201 loop on channel 2)
    pub current_battery: f32,
    /// MPPT current in amperes (LA-55P on channel 3)
    pub current_mppt: f32,
    /// Battery bank voltage in volts (LV-20P on channel 0)
    pub voltage_battery: f32,
}

bitflags! {
    /// Which fields of a [`Position`] the receiver actually reported.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FixValidity: u8 {
        const LOCATION = 1 << 0;
        const SPEED = 1 << 1;
        const COURSE = 1 << 2;
        const SATELLITES = 1 << 3;
    }
}

/// Latest GPS fix.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub latitude: f32,
    pub longitude: f32,
    pub speed_kmh: f32,
    pub course_deg: f32,
    pub satellites: u8,
    pub validity: FixValidity,
}

impl Position {
    /// Latitude with invalid fields mapped to the `-1.0` wire marker.
    pub fn wire_latitude(&self) -> f32 {
        self.field(FixValidity::LOCATION, self.latitude)
    }

    pub fn wire_longitude(&self) -> f32 {
        self.field(FixValidity::LOCATION, self.longitude)
    }

    pub fn wire_speed(&self) -> f32 {
        self.field(FixValidity::SPEED, self.speed_kmh)
    }

    pub fn wire_course(&self) -> f32 {
        self.field(FixValidity::COURSE, self.course_deg)
    }

    fn field(&self, flag: FixValidity, value: f32) -> f32 {
        if self.validity.contains(flag) {
            value
        } else {
            INVALID_FIELD
        }
    }
}

/// A probe reading, keeping a missing probe distinct from any temperature.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TemperatureReading {
    Celsius(f32),
    #[default]
    Disconnected,
}

impl TemperatureReading {
    /// Classify a raw driver value, treating the bus sentinel as disconnected.
    pub fn from_raw(celsius: f32) -> Self {
        if celsius <= DISCONNECTED_CELSIUS {
            Self::Disconnected
        } else {
            Self::Celsius(celsius)
        }
    }

    pub fn celsius(self) -> Option<f32> {
        match self {
            Self::Celsius(value) => Some(value),
            Self::Disconnected => None,
        }
    }

    /// Value carried in telemetry frames; the sentinel survives unchanged.
    pub fn to_wire(self) -> f32 {
        self.celsius().unwrap_or(DISCONNECTED_CELSIUS)
    }

    pub fn is_connected(self) -> bool {
        matches!(self, Self::Celsius(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Temperatures {
    pub motor: TemperatureReading,
    pub secondary: TemperatureReading,
}

/// Pump sensing and control-input output.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlState {
    /// `port << 1 | starboard`
    pub pump_mask: u8,
    /// Amplified control output in millivolts
    pub commanded_output: f32,
}

impl ControlState {
    pub fn port_pump(&self) -> bool {
        self.pump_mask & 0b10 != 0
    }

    pub fn starboard_pump(&self) -> bool {
        self.pump_mask & 0b01 != 0
    }
}

/// Auxiliary lead-acid battery readings.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AuxiliaryReadings {
    pub battery_voltage: f32,
    pub battery_current: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Disconnected,
    /// Associating with the credential at this table index
    Connecting(usize),
    /// Associated using the credential at this table index
    Connected(usize),
}

impl LinkState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected(_))
    }
}

/// Everything the status pages and diagnostics read in one pass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TelemetrySnapshot {
    pub instrumentation: Instrumentation,
    pub position: Position,
    pub temperatures: Temperatures,
    pub control: ControlState,
    pub auxiliary: AuxiliaryReadings,
    pub link: LinkState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_is_disconnected() {
        assert_eq!(
            TemperatureReading::from_raw(DISCONNECTED_CELSIUS),
            TemperatureReading::Disconnected
        );
        assert_eq!(TemperatureReading::from_raw(-127.5), TemperatureReading::Disconnected);
        assert_eq!(TemperatureReading::from_raw(0.0), TemperatureReading::Celsius(0.0));
    }

    #[test]
    fn test_disconnected_keeps_sentinel_on_wire() {
        assert_eq!(TemperatureReading::Disconnected.to_wire(), DISCONNECTED_CELSIUS);
        assert_eq!(TemperatureReading::Disconnected.celsius(), None);
        assert!(!TemperatureReading::Disconnected.is_connected());
    }

    #[test]
    fn test_invalid_position_fields_use_marker() {
        let position = Position {
            latitude: 52.1,
            longitude: 4.3,
            speed_kmh: 9.0,
            course_deg: 90.0,
            satellites: 7,
            validity: FixValidity::LOCATION | FixValidity::SATELLITES,
        };

        assert_eq!(position.wire_latitude(), 52.1);
        assert_eq!(position.wire_speed(), INVALID_FIELD);
        assert_eq!(position.wire_course(), INVALID_FIELD);
    }

    #[test]
    fn test_pump_mask_bits() {
        let control = ControlState {
            pump_mask: 0b10,
            commanded_output: 0.0,
        };
        assert!(control.port_pump());
        assert!(!control.starboard_pump());
    }
}
