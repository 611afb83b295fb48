//! Control knob to DAC output
//!
//! The encoder position is clamped to `0..=MAX_STEPS` and mapped onto the
//! 8-bit DAC, whose 0-3.3 V output is amplified to 0-5 V downstream.

use embassy_time::{Duration, Instant, Timer};
use log::info;

use crate::app_state::{ControlWriter, DebugFlags, DebugSwitch};
use crate::registry::Heartbeat;
use crate::sensors::{DacOutput, PositionEncoder};

pub const MAX_STEPS: i32 = 50;
const DAC_FULL_SCALE: i32 = 255;
const DAC_MILLIVOLTS: i32 = 3300;
const AMPLIFIED_MILLIVOLTS: i32 = 5000;

/// Minimum spacing between position reports.
const REPORT_INTERVAL: Duration = Duration::from_millis(500);
/// Reports stop this long after the last position change.
const REPORT_WINDOW: Duration = Duration::from_secs(2);

pub fn dac_code(position: i32) -> u8 {
    (position.clamp(0, MAX_STEPS) * DAC_FULL_SCALE / MAX_STEPS) as u8
}

/// Amplified output in millivolts for a DAC code.
pub fn amplified_millivolts(code: u8) -> f32 {
    f32::from(code) * AMPLIFIED_MILLIVOLTS as f32 / DAC_FULL_SCALE as f32
}

pub struct ControlTask<'a, E, D> {
    encoder: E,
    dac: D,
    writer: ControlWriter<'a>,
    debug: &'a DebugSwitch,
    period: Duration,
    position: i32,
    last_change: Option<Instant>,
    last_report: Option<Instant>,
}

impl<'a, E: PositionEncoder, D: DacOutput> ControlTask<'a, E, D> {
    /// Zeroes the encoder; the output starts at 0 V.
    pub fn new(
        mut encoder: E,
        mut dac: D,
        mut writer: ControlWriter<'a>,
        debug: &'a DebugSwitch,
        period: Duration,
    ) -> Self {
        encoder.set_count(0);
        dac.write(0);
        writer.set_commanded_output(0.0);
        Self {
            encoder,
            dac,
            writer,
            debug,
            period,
            position: 0,
            last_change: None,
            last_report: None,
        }
    }

    pub fn position(&self) -> i32 {
        self.position
    }

    /// Read the knob and update the output if it moved.
    pub fn update(&mut self) {
        let position = self.encoder.count().clamp(0, MAX_STEPS);
        if position != self.position {
            self.position = position;
            self.last_change = Some(Instant::now());

            let code = dac_code(position);
            self.dac.write(code);
            self.writer.set_commanded_output(amplified_millivolts(code));
        }

        self.report();
    }

    fn report(&mut self) {
        let Some(changed) = self.last_change else {
            return;
        };
        if changed.elapsed() > REPORT_WINDOW {
            self.last_change = None;
            return;
        }

        let due = self
            .last_report
            .is_none_or(|last| last.elapsed() > REPORT_INTERVAL);
        if due && self.debug.enabled(DebugFlags::ENCODER) {
            self.last_report = Some(Instant::now());
            info!(
                target: "encoder",
                "Position: {}% Output: {} mV Amplified: {} mV",
                self.position * 100 / MAX_STEPS,
                self.position * DAC_MILLIVOLTS / MAX_STEPS,
                self.position * AMPLIFIED_MILLIVOLTS / MAX_STEPS
            );
        }
    }

    pub async fn step(&mut self) {
        self.update();
        Timer::after(self.period).await;
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
    use crate::app_state::TelemetryStore;

    struct Knob {
        count: i32,
    }

    impl PositionEncoder for &mut Knob {
        fn count(&mut self) -> i32 {
            self.count
        }

        fn set_count(&mut self, count: i32) {
            self.count = count;
        }
    }

    #[derive(Default)]
    struct Dac {
        writes: std::vec::Vec<u8>,
    }

    impl DacOutput for &mut Dac {
        fn write(&mut self, code: u8) {
            self.writes.push(code);
        }
    }

    #[test]
    fn test_dac_mapping() {
        assert_eq!(dac_code(0), 0);
        assert_eq!(dac_code(25), 127);
        assert_eq!(dac_code(50), 255);
        assert_eq!(dac_code(-3), 0);
        assert_eq!(dac_code(80), 255);
        assert_eq!(amplified_millivolts(255), 5000.0);
        assert!((amplified_millivolts(127) - 2490.196).abs() < 1e-2);
    }

    #[test]
    fn test_output_follows_knob_within_range() {
        let store = TelemetryStore::new();
        let writers = store.writers().unwrap();
        let mut knob = Knob { count: 17 };
        let mut dac = Dac::default();

        {
            let mut task = ControlTask::new(
                &mut knob,
                &mut dac,
                writers.control,
                store.debug(),
                Duration::from_millis(5),
            );
            task.update();
            assert_eq!(task.position(), 0);

            task.encoder.count = 60;
            task.update();
            assert_eq!(task.position(), MAX_STEPS);
            // No change, no extra write.
            task.update();
        }

        assert_eq!(dac.writes, [0, 255]);
        assert_eq!(store.reader().control().commanded_output, 5000.0);
    }
}
