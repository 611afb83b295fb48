//! Auxiliary lead-acid battery and bilge pumps
//!
//! All four inputs come through the on-chip ADC behind 4k7/1k dividers. The
//! battery current sensor needs a calibration record; without one the task
//! runs the interactive calibration before it starts sampling.

use embassy_time::{Duration, Instant};
use log::{debug, info, warn};

use super::conversions::DividedInput;
use super::filter::MovingAverage;
use crate::app_state::{AuxiliaryReadings, AuxiliaryWriter, DebugFlags, DebugSwitch};
use crate::calibration::{Calibration, CalibrationRecord, CalibrationStore, CalibrationTiming};
use crate::notify::Notifier;
use crate::registry::Heartbeat;
use crate::sensors::{AuxChannel, RawAnalog};
use crate::status::StatusInbox;
use crate::storage::Preferences;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AuxiliaryCommand {
    /// Re-run the current-sensor calibration
    StartCalibration,
    /// Bare `C`: continue to the next calibration phase
    Proceed,
    /// `C<amps>`: reference current for the loaded phase
    CalibrationValue(f32),
}

const FILTER_WEIGHT: u16 = 4;
/// A pump input above this many volts means the pump is running.
const PUMP_THRESHOLD_VOLTS: f32 = 10.0;
const REPORT_INTERVAL: Duration = Duration::from_secs(3);

/// `port << 1 | starboard`
pub fn pump_mask(port_on: bool, starboard_on: bool) -> u8 {
    (u8::from(port_on) << 1) | u8::from(starboard_on)
}

pub struct AuxiliaryTask<'a, A, P> {
    adc: A,
    store: CalibrationStore<P>,
    record: Option<CalibrationRecord>,
    input: DividedInput,
    voltage: MovingAverage,
    current: MovingAverage,
    writer: AuxiliaryWriter<'a>,
    inbox: &'a Notifier<AuxiliaryCommand>,
    status: &'a StatusInbox,
    debug: &'a DebugSwitch,
    timing: CalibrationTiming,
    period: Duration,
    last_report: Option<Instant>,
}

impl<'a, A: RawAnalog, P: Preferences> AuxiliaryTask<'a, A, P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        adc: A,
        preferences: P,
        writer: AuxiliaryWriter<'a>,
        inbox: &'a Notifier<AuxiliaryCommand>,
        status: &'a StatusInbox,
        debug: &'a DebugSwitch,
        timing: CalibrationTiming,
        period: Duration,
    ) -> Self {
        Self {
            adc,
            store: CalibrationStore::new(preferences),
            record: None,
            input: DividedInput::default(),
            voltage: MovingAverage::new(FILTER_WEIGHT),
            current: MovingAverage::new(FILTER_WEIGHT),
            writer,
            inbox,
            status,
            debug,
            timing,
            period,
            last_report: None,
        }
    }

    pub fn record(&self) -> Option<CalibrationRecord> {
        self.record
    }

    /// Load the stored calibration, calibrating until one exists.
    pub async fn start(&mut self) {
        self.record = match self.store.load() {
            Ok(record) => record,
            Err(e) => {
                warn!(target: "aux", "Could not read calibration: {}", e);
                None
            }
        };

        while self.record.is_none() {
            self.calibrate().await;
        }
        if let Some(record) = self.record {
            info!(
                target: "aux",
                "Calibration offset {:.2} sensitivity {:.5}", record.offset, record.sensitivity
            );
        }
    }

    /// Run the procedure once. A failed run keeps the previous record.
    pub async fn calibrate(&mut self) {
        let calibration = Calibration {
            inbox: self.inbox,
            status: self.status,
            debug: self.debug,
            timing: self.timing,
        };
        let adc = &mut self.adc;
        let mut sample = || f32::from(adc.read_raw(AuxChannel::BatteryCurrent));

        match calibration.run(&mut sample).await {
            Ok(record) => {
                if let Err(e) = self.store.save(&record) {
                    warn!(target: "aux", "Calibration not persisted: {}", e);
                }
                self.record = Some(record);
            }
            Err(e) => warn!(target: "aux", "Calibration failed: {}", e),
        }
    }

    pub fn sample_once(&mut self) -> AuxiliaryReadings {
        let battery_voltage = self
            .voltage
            .update(self.input.volts(self.adc.read_raw(AuxChannel::BatteryVoltage)));

        let raw_current = f32::from(self.adc.read_raw(AuxChannel::BatteryCurrent));
        let battery_current = match self.record {
            Some(record) => self.current.update(record.current(raw_current)),
            None => self.current.value(),
        };

        let port_on = self.pump_running(AuxChannel::PortPump);
        let starboard_on = self.pump_running(AuxChannel::StarboardPump);

        let readings = AuxiliaryReadings {
            battery_voltage,
            battery_current,
        };
        self.writer.publish(readings);
        self.writer.set_pump_mask(pump_mask(port_on, starboard_on));

        let report_due = self
            .last_report
            .is_none_or(|last| last.elapsed() >= REPORT_INTERVAL);
        if report_due {
            self.last_report = Some(Instant::now());
            if self.debug.enabled(DebugFlags::AUXILIARY) {
                info!(target: "aux", "Battery voltage: {:.2} V", battery_voltage);
                info!(target: "aux", "Battery current: {:.2} A", battery_current);
                info!(target: "aux", "Port pump: {}", on_off(port_on));
                info!(target: "aux", "Starboard pump: {}", on_off(starboard_on));
            }
        }
        readings
    }

    fn pump_running(&mut self, channel: AuxChannel) -> bool {
        self.input.volts(self.adc.read_raw(channel)) > PUMP_THRESHOLD_VOLTS
    }

    /// One sample, then a short wait that doubles as the command poll.
    pub async fn step(&mut self) {
        self.sample_once();
        match self.inbox.receive(self.period).await {
            Some(AuxiliaryCommand::StartCalibration) => self.calibrate().await,
            Some(command) => debug!(target: "aux", "Ignored {:?} outside calibration", command),
            None => {}
        }
    }

    pub async fn run(mut self, heartbeat: Heartbeat<'_>) -> ! {
        self.start().await;
        loop {
            self.step().await;
            heartbeat.beat();
        }
    }
}

fn on_off(on: bool) -> &'static str {
    if on { "ON" } else { "OFF" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::TelemetryStore;
    use crate::calibration::{NAMESPACE, OFFSET_KEY, SENSITIVITY_KEY};
    use crate::storage::MemoryPreferences;
    use core::cell::Cell;
    use embassy_futures::{block_on, join::join};
    use embassy_time::Timer;

    /// Raw codes per channel; the battery current code can be changed from
    /// the operator side of a test.
    struct FakeAdc<'a> {
        voltage: u16,
        current: &'a Cell<u16>,
        port: u16,
        starboard: u16,
    }

    impl RawAnalog for FakeAdc<'_> {
        fn read_raw(&mut self, channel: AuxChannel) -> u16 {
            match channel {
                AuxChannel::BatteryVoltage => self.voltage,
                AuxChannel::BatteryCurrent => self.current.get(),
                AuxChannel::PortPump => self.port,
                AuxChannel::StarboardPump => self.starboard,
            }
        }
    }

    fn fast_timing() -> CalibrationTiming {
        CalibrationTiming {
            samples: 4,
            sample_interval: Duration::from_millis(1),
            prompt_timeout: Duration::from_millis(20),
        }
    }

    /// Raw code that reads as `volts` through the divider.
    fn code_for(volts: f32) -> u16 {
        let input = DividedInput::default();
        (volts * input.full_scale_code * input.divider_ratio / input.reference_volts) as u16
    }

    #[test]
    fn test_pump_mask_bits() {
        assert_eq!(pump_mask(false, false), 0b00);
        assert_eq!(pump_mask(false, true), 0b01);
        assert_eq!(pump_mask(true, false), 0b10);
        assert_eq!(pump_mask(true, true), 0b11);
    }

    #[test]
    fn test_stored_calibration_skips_procedure() {
        let store = TelemetryStore::new();
        let writers = store.writers().unwrap();
        let inbox = Notifier::new();
        let status = StatusInbox::new();
        let current = Cell::new(2300);
        let adc = FakeAdc {
            voltage: code_for(12.6),
            current: &current,
            port: code_for(12.0),
            starboard: code_for(2.0),
        };
        let mut preferences = MemoryPreferences::new();
        preferences.put_f32(NAMESPACE, OFFSET_KEY, 1800.0).unwrap();
        preferences.put_f32(NAMESPACE, SENSITIVITY_KEY, 0.025).unwrap();

        let mut task = AuxiliaryTask::new(
            adc,
            preferences,
            writers.auxiliary,
            &inbox,
            &status,
            store.debug(),
            fast_timing(),
            Duration::from_millis(5),
        );
        block_on(task.start());
        assert_eq!(status.try_receive(), None);

        // The filter converges on the true values.
        for _ in 0..200 {
            task.sample_once();
        }
        let readings = store.reader().auxiliary();
        assert!((readings.battery_voltage - 12.6).abs() < 0.05);
        assert!((readings.battery_current - 12.5).abs() < 1e-3);

        let control = store.reader().control();
        assert!(control.port_pump());
        assert!(!control.starboard_pump());
    }

    #[test]
    fn test_missing_calibration_runs_procedure_and_persists() {
        let store = TelemetryStore::new();
        let writers = store.writers().unwrap();
        let inbox = Notifier::new();
        let status = StatusInbox::new();
        let current = Cell::new(1800);
        let adc = FakeAdc {
            voltage: 0,
            current: &current,
            port: 0,
            starboard: 0,
        };
        let mut preferences = MemoryPreferences::new();

        {
            let mut task = AuxiliaryTask::new(
                adc,
                &mut preferences,
                writers.auxiliary,
                &inbox,
                &status,
                store.debug(),
                fast_timing(),
                Duration::from_millis(5),
            );

            let operator = async {
                Timer::after(Duration::from_millis(5)).await;
                inbox.send(AuxiliaryCommand::Proceed);
                Timer::after(Duration::from_millis(40)).await;
                current.set(2300);
                inbox.send(AuxiliaryCommand::CalibrationValue(12.5));
            };
            block_on(join(task.start(), operator));

            let record = task.record().unwrap();
            assert_eq!(record.offset, 1800.0);
            assert!((record.sensitivity - 0.025).abs() < 1e-6);
        }

        assert_eq!(preferences.get_f32(NAMESPACE, OFFSET_KEY).unwrap(), Some(1800.0));
    }

    #[test]
    fn test_stray_calibration_value_is_ignored() {
        let store = TelemetryStore::new();
        let writers = store.writers().unwrap();
        let inbox = Notifier::new();
        let status = StatusInbox::new();
        let current = Cell::new(1800);
        let adc = FakeAdc {
            voltage: 0,
            current: &current,
            port: 0,
            starboard: 0,
        };
        let mut preferences = MemoryPreferences::new();
        preferences.put_f32(NAMESPACE, OFFSET_KEY, 1800.0).unwrap();
        preferences.put_f32(NAMESPACE, SENSITIVITY_KEY, 0.025).unwrap();

        let mut task = AuxiliaryTask::new(
            adc,
            preferences,
            writers.auxiliary,
            &inbox,
            &status,
            store.debug(),
            fast_timing(),
            Duration::from_millis(5),
        );
        block_on(task.start());

        inbox.send(AuxiliaryCommand::CalibrationValue(3.0));
        block_on(task.step());
        assert_eq!(status.try_receive(), None);
        assert_eq!(task.record().unwrap().offset, 1800.0);
    }
}
