//! Transducer math
//!
//! Every function maps a voltage measured at an ADC pin to the physical
//! quantity on the primary side of the transducer.

/// LV-20P closed-loop voltage transducer as fitted on the instrumentation board.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lv20p {
    /// Secondary/primary current ratio. Nominally 2.50; 2.59081 was fitted
    /// against multimeter readings on the boat.
    pub conversion_ratio: f32,
    /// Resistor in series with the primary, ohms
    pub primary_resistance: f32,
    /// Primary coil resistance, ohms
    pub coil_resistance: f32,
    /// Secondary burden resistor, ohms
    pub burden_resistance: f32,
    pub correction: LinearCorrection,
}

impl Default for Lv20p {
    fn default() -> Self {
        Self {
            conversion_ratio: 2.59081,
            primary_resistance: 4700.0,
            coil_resistance: 250.0,
            burden_resistance: 33.0,
            correction: LinearCorrection {
                slope: 1.002_505_9,
                intercept: 0.0,
            },
        }
    }
}

impl Lv20p {
    /// Voltage drop across the primary series resistor.
    pub fn primary_drop(&self, pin_volts: f32) -> f32 {
        pin_volts * self.primary_resistance / (self.burden_resistance * self.conversion_ratio)
    }

    /// Input voltage before correction: the resistor drop plus the coil drop.
    pub fn input_voltage(&self, pin_volts: f32) -> f32 {
        let drop = self.primary_drop(pin_volts);
        drop + drop * (self.coil_resistance / self.primary_resistance)
    }

    pub fn volts(&self, pin_volts: f32) -> f32 {
        self.correction.apply(self.input_voltage(pin_volts))
    }
}

/// Regression fitted against a reference meter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearCorrection {
    pub slope: f32,
    pub intercept: f32,
}

impl LinearCorrection {
    pub fn apply(&self, value: f32) -> f32 {
        self.slope * value + self.intercept
    }
}

/// Seneca T201 4-20 mA loop current transducer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct T201 {
    /// Amperes at 20 mA
    pub full_scale: f32,
    pub burden_resistance: f32,
}

impl T201 {
    pub const fn new(full_scale: f32, burden_resistance: f32) -> Self {
        Self {
            full_scale,
            burden_resistance,
        }
    }

    pub fn amps(&self, pin_volts: f32) -> f32 {
        let zero_volts = 4.0 * self.burden_resistance * 0.001;
        let full_volts = 20.0 * self.burden_resistance * 0.001;
        let slope = self.full_scale / (full_volts - zero_volts);
        let intercept = -slope * zero_volts;
        slope * pin_volts + intercept
    }
}

/// LEM LA-55P Hall-effect current transducer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct La55p {
    /// Secondary/primary current ratio
    pub conversion_ratio: f32,
    pub burden_resistance: f32,
}

impl La55p {
    pub const fn new(conversion_ratio: f32, burden_resistance: f32) -> Self {
        Self {
            conversion_ratio,
            burden_resistance,
        }
    }

    pub fn amps(&self, pin_volts: f32) -> f32 {
        pin_volts / (self.burden_resistance * self.conversion_ratio)
    }
}

/// On-chip 12-bit ADC reading through the 4k7/1k divider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DividedInput {
    pub reference_volts: f32,
    pub full_scale_code: f32,
    pub divider_ratio: f32,
}

impl Default for DividedInput {
    fn default() -> Self {
        Self {
            reference_volts: 3.3,
            full_scale_code: 4095.0,
            divider_ratio: 1.0 / (4.7 + 1.0),
        }
    }
}

impl DividedInput {
    pub fn volts(&self, raw: u16) -> f32 {
        f32::from(raw) * self.reference_volts / (self.full_scale_code * self.divider_ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32, tolerance: f32) -> bool {
        (a - b).abs() < tolerance
    }

    #[test]
    fn test_t201_endpoints() {
        let sensor = T201::new(100.0, 22.0);
        // 4 mA and 20 mA through 22 ohm
        assert!(close(sensor.amps(0.088), 0.0, 1e-4));
        assert!(close(sensor.amps(0.440), 100.0, 1e-3));
        assert!(close(sensor.amps(0.264), 50.0, 1e-3));
    }

    #[test]
    fn test_la55p_ratio() {
        let sensor = La55p::new(0.001, 10.0);
        assert!(close(sensor.amps(0.25), 25.0, 1e-4));
    }

    #[test]
    fn test_lv20p_chain() {
        let sensor = Lv20p::default();
        let pin = 0.5;
        let drop = pin * 4700.0 / (33.0 * 2.59081);
        let expected = (drop + drop * (250.0 / 4700.0)) * 1.002_505_9;
        assert!(close(sensor.volts(pin), expected, 1e-3));
        assert!(close(sensor.volts(pin), 29.021, 0.01));
    }

    #[test]
    fn test_divided_input_full_scale() {
        let input = DividedInput::default();
        assert!(close(input.volts(4095), 3.3 * 5.7, 1e-3));
        assert_eq!(input.volts(0), 0.0);
    }
}
