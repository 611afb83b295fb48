//! On-chip analog and counter peripherals
//!
//! - [`AuxAdc`]: ADC1 one-shot reads for the battery and bilge pump pins
//! - [`ControlDac`]: DAC1 feeding the control-output amplifier
//! - [`PcntEncoder`]: quadrature knob counted in hardware by PCNT unit 0

use esp_hal::analog::adc::{Adc, AdcConfig, AdcPin, Attenuation};
use esp_hal::analog::dac::Dac;
use esp_hal::gpio::{Input, InputConfig, InputPin, Level, Output, OutputConfig, OutputPin, Pull};
use esp_hal::pcnt::channel::{CtrlMode, EdgeMode};
use esp_hal::pcnt::unit::Unit;
use esp_hal::peripherals::{ADC1, DAC1, GPIO34, GPIO35, GPIO36, GPIO39};
use esp_hal::Blocking;
use log::warn;

use boat32_core::sensors::{AuxChannel, DacOutput, PositionEncoder, RawAnalog};

pub struct AuxPins {
    pub battery_voltage: GPIO34<'static>,
    pub battery_current: GPIO35<'static>,
    pub port_pump: GPIO36<'static>,
    pub starboard_pump: GPIO39<'static>,
}

pub struct AuxAdc {
    adc: Adc<'static, ADC1<'static>, Blocking>,
    battery_voltage: AdcPin<GPIO34<'static>, ADC1<'static>>,
    battery_current: AdcPin<GPIO35<'static>, ADC1<'static>>,
    port_pump: AdcPin<GPIO36<'static>, ADC1<'static>>,
    starboard_pump: AdcPin<GPIO39<'static>, ADC1<'static>>,
}

impl AuxAdc {
    /// Full-scale 11 dB attenuation on every pin, so the 12-bit range spans
    /// roughly 0 to 3.3 V.
    pub fn new(adc1: ADC1<'static>, pins: AuxPins) -> Self {
        let mut config = AdcConfig::new();
        let battery_voltage = config.enable_pin(pins.battery_voltage, Attenuation::_11dB);
        let battery_current = config.enable_pin(pins.battery_current, Attenuation::_11dB);
        let port_pump = config.enable_pin(pins.port_pump, Attenuation::_11dB);
        let starboard_pump = config.enable_pin(pins.starboard_pump, Attenuation::_11dB);

        Self {
            adc: Adc::new(adc1, config),
            battery_voltage,
            battery_current,
            port_pump,
            starboard_pump,
        }
    }
}

impl RawAnalog for AuxAdc {
    fn read_raw(&mut self, channel: AuxChannel) -> u16 {
        let adc = &mut self.adc;
        let sample = match channel {
            AuxChannel::BatteryVoltage => nb::block!(adc.read_oneshot(&mut self.battery_voltage)),
            AuxChannel::BatteryCurrent => nb::block!(adc.read_oneshot(&mut self.battery_current)),
            AuxChannel::PortPump => nb::block!(adc.read_oneshot(&mut self.port_pump)),
            AuxChannel::StarboardPump => nb::block!(adc.read_oneshot(&mut self.starboard_pump)),
        };
        sample.unwrap_or_else(|()| {
            warn!(target: "adc", "Conversion failed on {:?}", channel);
            0
        })
    }
}

pub struct ControlDac {
    dac: Dac<'static, DAC1<'static>>,
}

impl ControlDac {
    pub fn new(dac: Dac<'static, DAC1<'static>>) -> Self {
        Self { dac }
    }
}

impl DacOutput for ControlDac {
    fn write(&mut self, code: u8) {
        self.dac.write(code);
    }
}

/// PCNT unit 0 in quadrature mode. The hardware counter is 16-bit; the
/// software offset lets [`PositionEncoder::set_count`] place the knob
/// anywhere in `i32` range.
pub struct PcntEncoder {
    unit: Unit<'static, 0>,
    offset: i32,
    // Held so the pins stay configured while the counter runs.
    _clock: Input<'static>,
    _data: Input<'static>,
    _power: Output<'static>,
}

impl PcntEncoder {
    pub fn new(
        unit: Unit<'static, 0>,
        clock: impl InputPin + 'static,
        data: impl InputPin + 'static,
        power: impl OutputPin + 'static,
    ) -> Self {
        let power = Output::new(power, Level::High, OutputConfig::default());
        let clock = Input::new(clock, InputConfig::default().with_pull(Pull::Up));
        let data = Input::new(data, InputConfig::default().with_pull(Pull::Up));

        // Count clock edges, with the data line selecting the direction.
        let channel = &unit.channel0;
        channel.set_edge_signal(clock.peripheral_input());
        channel.set_ctrl_signal(data.peripheral_input());
        channel.set_ctrl_mode(CtrlMode::Reverse, CtrlMode::Keep);
        channel.set_input_mode(EdgeMode::Hold, EdgeMode::Increment);

        unit.clear();
        unit.resume();

        Self {
            unit,
            offset: 0,
            _clock: clock,
            _data: data,
            _power: power,
        }
    }
}

impl PositionEncoder for PcntEncoder {
    fn count(&mut self) -> i32 {
        i32::from(self.unit.value()) + self.offset
    }

    fn set_count(&mut self, count: i32) {
        self.unit.clear();
        self.offset = count;
    }
}
