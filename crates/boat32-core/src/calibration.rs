//! Current-sensor calibration
//!
//! The auxiliary current sensor reports `(raw - offset) * sensitivity`. Both
//! factors are measured on the boat with an interactive two-phase procedure
//! and persisted under the `aux` preferences namespace. A negative stored
//! value means the record was never written.

use embassy_time::{Duration, Timer};
use log::{info, warn};
use thiserror_no_std::Error;

use crate::acquisition::auxiliary::AuxiliaryCommand;
use crate::app_state::{DebugFlags, DebugSwitch};
use crate::notify::Notifier;
use crate::status::{BlinkRate, StatusInbox, StatusSignal};
use crate::storage::{Preferences, PreferencesError};

pub const NAMESPACE: &str = "aux";
pub const OFFSET_KEY: &str = "offset";
pub const SENSITIVITY_KEY: &str = "sensitivity";
/// Stored in place of a missing value.
pub const ABSENT: f32 = -1.0;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationError {
    #[error("preferences: {0}")]
    Preferences(PreferencesError),
    #[error("loaded reading equals the zero offset")]
    NoSpan,
    #[error("computed sensitivity is not positive")]
    NonPositiveSensitivity,
}

impl From<PreferencesError> for CalibrationError {
    fn from(value: PreferencesError) -> Self {
        Self::Preferences(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationRecord {
    /// Raw ADC code with no current flowing
    pub offset: f32,
    /// Amperes per ADC code
    pub sensitivity: f32,
}

impl CalibrationRecord {
    pub fn current(&self, raw: f32) -> f32 {
        (raw - self.offset) * self.sensitivity
    }

    /// `reference / (average - offset)` from the loaded phase.
    pub fn from_measurements(
        offset: f32,
        loaded_average: f32,
        reference: f32,
    ) -> Result<Self, CalibrationError> {
        let span = loaded_average - offset;
        if span == 0.0 {
            return Err(CalibrationError::NoSpan);
        }

        let sensitivity = reference / span;
        // A negative value would read back as "absent" on the next boot.
        if sensitivity <= 0.0 || sensitivity.is_nan() {
            return Err(CalibrationError::NonPositiveSensitivity);
        }

        Ok(Self {
            offset,
            sensitivity,
        })
    }
}

/// Persisted calibration for one channel.
pub struct CalibrationStore<P> {
    preferences: P,
}

impl<P: Preferences> CalibrationStore<P> {
    pub fn new(preferences: P) -> Self {
        Self { preferences }
    }

    /// The stored record, or `None` if either value is absent.
    pub fn load(&mut self) -> Result<Option<CalibrationRecord>, CalibrationError> {
        let offset = self
            .preferences
            .get_f32(NAMESPACE, OFFSET_KEY)?
            .unwrap_or(ABSENT);
        let sensitivity = self
            .preferences
            .get_f32(NAMESPACE, SENSITIVITY_KEY)?
            .unwrap_or(ABSENT);

        if offset < 0.0 || sensitivity < 0.0 {
            return Ok(None);
        }

        Ok(Some(CalibrationRecord {
            offset,
            sensitivity,
        }))
    }

    pub fn save(&mut self, record: &CalibrationRecord) -> Result<(), CalibrationError> {
        self.preferences.put_all(
            NAMESPACE,
            &[
                (OFFSET_KEY, record.offset),
                (SENSITIVITY_KEY, record.sensitivity),
            ],
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationTiming {
    pub samples: u32,
    pub sample_interval: Duration,
    /// Bounded wait for operator input; the prompt repeats after each one
    pub prompt_timeout: Duration,
}

impl Default for CalibrationTiming {
    fn default() -> Self {
        Self {
            samples: 50,
            sample_interval: Duration::from_millis(100),
            prompt_timeout: Duration::from_secs(8),
        }
    }
}

/// The interactive procedure. Owns nothing; borrows the auxiliary task's
/// mailbox and the shared status and debug switches for its duration.
pub struct Calibration<'a> {
    pub inbox: &'a Notifier<AuxiliaryCommand>,
    pub status: &'a StatusInbox,
    pub debug: &'a DebugSwitch,
    pub timing: CalibrationTiming,
}

impl Calibration<'_> {
    /// Run both phases and return the new record. The debug mask is narrowed
    /// to the auxiliary channel while prompting and restored afterwards.
    pub async fn run(
        &self,
        sample: &mut impl FnMut() -> f32,
    ) -> Result<CalibrationRecord, CalibrationError> {
        let previous = self.debug.replace(DebugFlags::AUXILIARY);
        self.status.send(StatusSignal::Cadence(BlinkRate::Fast));

        let result = self.phases(sample).await;

        self.debug.replace(previous);
        self.status.send(StatusSignal::Cadence(BlinkRate::Slow));
        result
    }

    async fn phases(
        &self,
        sample: &mut impl FnMut() -> f32,
    ) -> Result<CalibrationRecord, CalibrationError> {
        info!(target: "aux", "Calibrating current sensor");
        info!(target: "aux", "Make sure that no current is flowing through the sensor");
        self.wait_for_proceed().await;

        let offset = self.average(sample).await;
        info!(target: "aux", "Offset adc: {:.2}", offset);

        let reference = self.wait_for_reference().await;
        info!(target: "aux", "Reference current: {:.3}", reference);

        let loaded = self.average(sample).await;
        info!(target: "aux", "Measured adc: {:.2}", loaded);

        let record = CalibrationRecord::from_measurements(offset, loaded, reference)?;
        info!(target: "aux", "Sensitivity: {:.5}", record.sensitivity);
        Ok(record)
    }

    async fn wait_for_proceed(&self) {
        loop {
            info!(target: "aux", "Press 'C' to continue");
            match self.inbox.receive(self.timing.prompt_timeout).await {
                Some(AuxiliaryCommand::Proceed | AuxiliaryCommand::CalibrationValue(_)) => return,
                Some(AuxiliaryCommand::StartCalibration) | None => {}
            }
        }
    }

    async fn wait_for_reference(&self) -> f32 {
        loop {
            info!(target: "aux", "Input the current flowing through the sensor starting with a 'C'");
            match self.inbox.receive(self.timing.prompt_timeout).await {
                Some(AuxiliaryCommand::CalibrationValue(amps)) => return amps,
                Some(AuxiliaryCommand::Proceed) => {
                    warn!(target: "aux", "A reference current is required, e.g. C12.5");
                }
                Some(AuxiliaryCommand::StartCalibration) | None => {}
            }
        }
    }

    async fn average(&self, sample: &mut impl FnMut() -> f32) -> f32 {
        let mut sum = 0.0;
        for _ in 0..self.timing.samples {
            sum += sample();
            Timer::after(self.timing.sample_interval).await;
        }
        sum / self.timing.samples.max(1) as f32
    }
}
