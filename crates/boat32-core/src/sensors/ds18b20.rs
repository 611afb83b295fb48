use embassy_time::{Duration, Timer};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use heapless::Vec;

use super::{MAX_PROBES, ProbeAddress, ProbeBus, SensorError};
use crate::app_state::DISCONNECTED_CELSIUS;

const SEARCH_ROM: u8 = 0xF0;
const MATCH_ROM: u8 = 0x55;
const SKIP_ROM: u8 = 0xCC;
const CONVERT_T: u8 = 0x44;
const READ_SCRATCHPAD: u8 = 0xBE;

/// Worst-case 12-bit conversion time.
pub const CONVERSION_TIME: Duration = Duration::from_millis(750);

/// Dallas/Maxim CRC-8 (x^8 + x^5 + x^4 + 1, reflected).
pub fn crc8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |mut crc, &byte| {
        let mut byte = byte;
        for _ in 0..8 {
            let mix = (crc ^ byte) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8C;
            }
            byte >>= 1;
        }
        crc
    })
}

/// Temperature from a 9-byte scratchpad, `None` if the CRC does not match.
pub fn scratchpad_celsius(scratchpad: &[u8; 9]) -> Option<f32> {
    if crc8(&scratchpad[..8]) != scratchpad[8] {
        return None;
    }
    let raw = i16::from_le_bytes([scratchpad[0], scratchpad[1]]);
    Some(f32::from(raw) / 16.0)
}

/// Bit-level access to a one-wire bus.
pub trait OneWireIo {
    /// Reset pulse. Returns `true` if any device answered with a presence pulse.
    fn reset(&mut self) -> bool;
    fn write_bit(&mut self, bit: bool);
    fn read_bit(&mut self) -> bool;

    fn write_byte(&mut self, byte: u8) {
        for shift in 0..8 {
            self.write_bit((byte >> shift) & 1 == 1);
        }
    }

    fn read_byte(&mut self) -> u8 {
        (0..8).fold(0u8, |byte, shift| byte | (u8::from(self.read_bit()) << shift))
    }
}

/// One-wire master bit-banged on an open-drain pin with an external pull-up.
///
/// Every slot runs inside a critical section; the longest, the reset pulse,
/// holds it for just under a millisecond.
pub struct PinBus<P, D> {
    pin: P,
    delay: D,
}

impl<P: InputPin + OutputPin, D: DelayNs> PinBus<P, D> {
    pub fn new(mut pin: P, delay: D) -> Self {
        let _ = pin.set_high();
        Self { pin, delay }
    }

    fn is_high(&mut self) -> bool {
        self.pin.is_high().unwrap_or(true)
    }
}

impl<P: InputPin + OutputPin, D: DelayNs> OneWireIo for PinBus<P, D> {
    fn reset(&mut self) -> bool {
        critical_section::with(|_| {
            let _ = self.pin.set_low();
            self.delay.delay_us(480);
            let _ = self.pin.set_high();
            self.delay.delay_us(70);
            let present = !self.is_high();
            self.delay.delay_us(410);
            present
        })
    }

    fn write_bit(&mut self, bit: bool) {
        let (low, recovery) = if bit { (6, 64) } else { (60, 10) };
        critical_section::with(|_| {
            let _ = self.pin.set_low();
            self.delay.delay_us(low);
            let _ = self.pin.set_high();
            self.delay.delay_us(recovery);
        });
    }

    fn read_bit(&mut self) -> bool {
        critical_section::with(|_| {
            let _ = self.pin.set_low();
            self.delay.delay_us(6);
            let _ = self.pin.set_high();
            self.delay.delay_us(9);
            let bit = self.is_high();
            self.delay.delay_us(55);
            bit
        })
    }
}

/// Enumerate every ROM code on the bus, lowest branch first.
pub fn search<W: OneWireIo>(
    wire: &mut W,
) -> Result<Vec<ProbeAddress, MAX_PROBES>, SensorError> {
    let mut found = Vec::new();
    let mut rom: ProbeAddress = [0; 8];
    // 1-based index of the branch to take the 1 path at next; 0 when done.
    let mut last_discrepancy = 0usize;

    loop {
        if !wire.reset() {
            return Ok(found);
        }
        wire.write_byte(SEARCH_ROM);

        let mut discrepancy = 0usize;
        for index in 1..=64usize {
            let bit = wire.read_bit();
            let complement = wire.read_bit();
            let (byte, mask) = ((index - 1) / 8, 1u8 << ((index - 1) % 8));

            let direction = match (bit, complement) {
                (true, true) => {
                    return Err(SensorError::ReadFailed {
                        sensor: "DS18B20",
                        operation: "search",
                        details: "device left the bus",
                    });
                }
                (true, false) => true,
                (false, true) => false,
                (false, false) => {
                    let take_one = match index.cmp(&last_discrepancy) {
                        core::cmp::Ordering::Equal => true,
                        core::cmp::Ordering::Greater => false,
                        core::cmp::Ordering::Less => rom[byte] & mask != 0,
                    };
                    if !take_one {
                        discrepancy = index;
                    }
                    take_one
                }
            };

            if direction {
                rom[byte] |= mask;
            } else {
                rom[byte] &= !mask;
            }
            wire.write_bit(direction);
        }

        if crc8(&rom[..7]) != rom[7] {
            return Err(SensorError::ReadFailed {
                sensor: "DS18B20",
                operation: "search",
                details: "ROM CRC mismatch",
            });
        }
        if found.push(rom).is_err() {
            return Ok(found);
        }

        last_discrepancy = discrepancy;
        if last_discrepancy == 0 {
            return Ok(found);
        }
    }
}

/// DS18B20 probes sharing one bus.
pub struct Ds18b20<W> {
    wire: W,
    conversion: Duration,
}

impl<W: OneWireIo> Ds18b20<W> {
    pub fn new(wire: W) -> Self {
        Self {
            wire,
            conversion: CONVERSION_TIME,
        }
    }

    pub fn with_conversion_time(mut self, conversion: Duration) -> Self {
        self.conversion = conversion;
        self
    }

    fn read_scratchpad(&mut self, address: &ProbeAddress) -> Option<[u8; 9]> {
        if !self.wire.reset() {
            return None;
        }
        self.wire.write_byte(MATCH_ROM);
        for &byte in address {
            self.wire.write_byte(byte);
        }
        self.wire.write_byte(READ_SCRATCHPAD);

        let mut scratchpad = [0u8; 9];
        for byte in &mut scratchpad {
            *byte = self.wire.read_byte();
        }
        Some(scratchpad)
    }
}

impl<W: OneWireIo> ProbeBus for Ds18b20<W> {
    async fn request_temperatures(&mut self) -> Result<(), SensorError> {
        if !self.wire.reset() {
            return Err(SensorError::ReadFailed {
                sensor: "DS18B20",
                operation: "start conversion",
                details: "no presence pulse",
            });
        }
        self.wire.write_byte(SKIP_ROM);
        self.wire.write_byte(CONVERT_T);
        Timer::after(self.conversion).await;
        Ok(())
    }

    async fn read_celsius(&mut self, address: &ProbeAddress) -> f32 {
        self.read_scratchpad(address)
            .as_ref()
            .and_then(scratchpad_celsius)
            .unwrap_or(DISCONNECTED_CELSIUS)
    }

    async fn scan(&mut self) -> Result<Vec<ProbeAddress, MAX_PROBES>, SensorError> {
        search(&mut self.wire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use std::collections::VecDeque;

    fn with_crc<const N: usize>(bytes: [u8; N]) -> std::vec::Vec<u8> {
        let mut out = bytes.to_vec();
        out.push(crc8(&bytes));
        out
    }

    fn rom(serial: [u8; 6]) -> ProbeAddress {
        let mut bytes = [0u8; 7];
        bytes[0] = 0x28;
        bytes[1..].copy_from_slice(&serial);
        with_crc(bytes).try_into().unwrap()
    }

    fn scratchpad(raw: i16) -> [u8; 9] {
        let [lsb, msb] = raw.to_le_bytes();
        with_crc([lsb, msb, 0x4B, 0x46, 0x7F, 0xFF, 0x0C, 0x10])
            .try_into()
            .unwrap()
    }

    enum Phase {
        Idle,
        Command,
        Search { index: usize, step: u8 },
        Match { bits: usize, address: u64 },
        Reading(VecDeque<bool>),
    }

    /// Devices on a simulated bus, modelled at the bit level.
    struct FakeWire {
        devices: std::vec::Vec<(ProbeAddress, [u8; 9])>,
        active: std::vec::Vec<bool>,
        phase: Phase,
        command: (u8, u8),
        conversions: usize,
    }

    impl FakeWire {
        fn new(devices: std::vec::Vec<(ProbeAddress, [u8; 9])>) -> Self {
            Self {
                active: std::vec![true; devices.len()],
                devices,
                phase: Phase::Idle,
                command: (0, 0),
                conversions: 0,
            }
        }

        fn rom_bit(address: &ProbeAddress, index: usize) -> bool {
            (address[index / 8] >> (index % 8)) & 1 == 1
        }

        fn active_roms(&self) -> impl Iterator<Item = &ProbeAddress> {
            self.devices
                .iter()
                .zip(&self.active)
                .filter(|(_, active)| **active)
                .map(|((address, _), _)| address)
        }

        fn run_command(&mut self, command: u8) {
            self.phase = match command {
                SEARCH_ROM => Phase::Search { index: 0, step: 0 },
                MATCH_ROM => Phase::Match {
                    bits: 0,
                    address: 0,
                },
                SKIP_ROM => Phase::Command,
                CONVERT_T => {
                    self.conversions += 1;
                    Phase::Idle
                }
                READ_SCRATCHPAD => {
                    let selected: std::vec::Vec<_> = self
                        .devices
                        .iter()
                        .zip(&self.active)
                        .filter(|(_, active)| **active)
                        .collect();
                    let bits = match selected.as_slice() {
                        [((_, pad), _)] => pad
                            .iter()
                            .flat_map(|byte| (0..8).map(move |shift| (byte >> shift) & 1 == 1))
                            .collect(),
                        _ => VecDeque::new(),
                    };
                    Phase::Reading(bits)
                }
                _ => Phase::Idle,
            };
        }
    }

    impl OneWireIo for FakeWire {
        fn reset(&mut self) -> bool {
            self.active = std::vec![true; self.devices.len()];
            self.phase = Phase::Command;
            self.command = (0, 0);
            !self.devices.is_empty()
        }

        fn write_bit(&mut self, bit: bool) {
            match &mut self.phase {
                Phase::Command => {
                    let (byte, count) = &mut self.command;
                    *byte |= u8::from(bit) << *count;
                    *count += 1;
                    if *count == 8 {
                        let command = *byte;
                        self.command = (0, 0);
                        self.run_command(command);
                    }
                }
                Phase::Search { index, step } if *step == 2 => {
                    let index_now = *index;
                    for (active, (address, _)) in self.active.iter_mut().zip(&self.devices) {
                        if Self::rom_bit(address, index_now) != bit {
                            *active = false;
                        }
                    }
                    *index += 1;
                    *step = 0;
                    if *index == 64 {
                        self.phase = Phase::Idle;
                    }
                }
                Phase::Match { bits, address } => {
                    *address |= u64::from(bit) << *bits;
                    *bits += 1;
                    if *bits == 64 {
                        let selected = address.to_le_bytes();
                        for (active, (rom, _)) in self.active.iter_mut().zip(&self.devices) {
                            *active = *rom == selected;
                        }
                        self.phase = Phase::Command;
                    }
                }
                _ => {}
            }
        }

        fn read_bit(&mut self) -> bool {
            match &mut self.phase {
                Phase::Search { index, step } if *step < 2 => {
                    let (index, first) = (*index, *step == 0);
                    *step += 1;
                    // Wired-AND: any device sending 0 pulls the line low.
                    self.active_roms()
                        .all(|address| Self::rom_bit(address, index) == first)
                }
                Phase::Reading(bits) => bits.pop_front().unwrap_or(true),
                _ => true,
            }
        }
    }

    #[test]
    fn test_crc_of_reference_rom() {
        assert_eq!(crc8(&[0x02, 0x1C, 0xB8, 0x01, 0x00, 0x00, 0x00]), 0xA2);
    }

    #[test]
    fn test_scratchpad_decoding() {
        assert_eq!(scratchpad_celsius(&scratchpad(0x0191)), Some(25.0625));
        assert_eq!(scratchpad_celsius(&scratchpad(-0x00A2)), Some(-10.125));

        let mut corrupt = scratchpad(0x0191);
        corrupt[0] ^= 0x01;
        assert_eq!(scratchpad_celsius(&corrupt), None);
    }

    #[test]
    fn test_search_finds_every_device() {
        let motor = rom([0x86, 0x1C, 0x07, 0xD6, 0x01, 0x3C]);
        let secondary = rom([0x87, 0x1C, 0x07, 0xD6, 0x01, 0x3C]);
        let mut wire = FakeWire::new(std::vec![
            (motor, scratchpad(0x0280)),
            (secondary, scratchpad(0x0190)),
        ]);

        let found = search(&mut wire).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.contains(&motor));
        assert!(found.contains(&secondary));
    }

    #[test]
    fn test_empty_bus_scans_empty() {
        let mut wire = FakeWire::new(std::vec::Vec::new());
        assert!(search(&mut wire).unwrap().is_empty());
    }

    #[test]
    fn test_probes_read_by_address() {
        let motor = rom([0x86, 0x1C, 0x07, 0xD6, 0x01, 0x3C]);
        let secondary = rom([0x87, 0x1C, 0x07, 0xD6, 0x01, 0x3C]);
        let absent = rom([0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        let mut probes = Ds18b20::new(FakeWire::new(std::vec![
            (motor, scratchpad(0x0280)),
            (secondary, scratchpad(0x0190)),
        ]))
        .with_conversion_time(Duration::from_millis(1));

        block_on(probes.request_temperatures()).unwrap();
        assert_eq!(probes.wire.conversions, 1);
        assert_eq!(block_on(probes.read_celsius(&motor)), 40.0);
        assert_eq!(block_on(probes.read_celsius(&secondary)), 25.0);
        assert_eq!(block_on(probes.read_celsius(&absent)), DISCONNECTED_CELSIUS);
    }

    #[test]
    fn test_conversion_needs_a_device() {
        let mut probes = Ds18b20::new(FakeWire::new(std::vec::Vec::new()))
            .with_conversion_time(Duration::from_millis(1));
        assert!(block_on(probes.request_temperatures()).is_err());
    }
}
