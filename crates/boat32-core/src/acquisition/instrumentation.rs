//! Electrical instrumentation through the external ADC
//!
//! Channel 0 carries the LV-20P battery voltage transducer, channels 1 and 2
//! the T201 motor and battery current loops, channel 3 the LA-55P on the MPPT
//! output.

use embassy_time::{Duration, Timer};
use log::{info, warn};

use super::Uplink;
use super::conversions::{La55p, Lv20p, T201};
use crate::app_state::{DebugFlags, Instrumentation, InstrumentationWriter};
use crate::registry::Heartbeat;
use crate::sensors::{ADS1115_ADDRESSES, AnalogFrontEnd, SensorError};
use crate::status::{BlinkRate, StatusSignal};
use crate::transport::frame::TelemetryMessage;

/// Transducers fitted on the instrumentation board.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstrumentationChannels {
    pub battery_voltage: Lv20p,
    pub motor_current: T201,
    pub battery_current: T201,
    pub mppt_current: La55p,
}

impl Default for InstrumentationChannels {
    fn default() -> Self {
        Self {
            battery_voltage: Lv20p::default(),
            motor_current: T201::new(100.0, 22.0),
            battery_current: T201::new(100.0, 22.0),
            mppt_current: La55p::new(0.001, 10.0),
        }
    }
}

impl InstrumentationChannels {
    /// Convert the four pin voltages, in channel order.
    pub fn convert(&self, pins: [f32; 4]) -> Instrumentation {
        Instrumentation {
            voltage_battery: self.battery_voltage.volts(pins[0]),
            current_motor: self.motor_current.amps(pins[1]),
            current_battery: self.battery_current.amps(pins[2]),
            current_mppt: self.mppt_current.amps(pins[3]),
        }
    }
}

pub struct InstrumentationTask<'a, A> {
    adc: A,
    channels: InstrumentationChannels,
    writer: InstrumentationWriter<'a>,
    uplink: Uplink<'a>,
    period: Duration,
    retry_delay: Duration,
}

impl<'a, A: AnalogFrontEnd> InstrumentationTask<'a, A> {
    pub fn new(
        adc: A,
        writer: InstrumentationWriter<'a>,
        uplink: Uplink<'a>,
        period: Duration,
    ) -> Self {
        Self {
            adc,
            channels: InstrumentationChannels::default(),
            writer,
            uplink,
            period,
            retry_delay: Duration::from_secs(1),
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Probe every known converter address until one answers. The LED blinks
    /// fast for as long as no converter is found; only this task is held up.
    pub async fn bring_up(&mut self) -> u8 {
        loop {
            self.uplink
                .status
                .send(StatusSignal::Cadence(BlinkRate::Fast));
            for address in ADS1115_ADDRESSES {
                info!(
                    target: "instrumentation",
                    "Trying to initialize ADS1115 at address {:#04x}", address
                );
                match self.adc.probe(address).await {
                    Ok(()) => {
                        info!(
                            target: "instrumentation",
                            "ADS1115 initialized at address {:#04x}", address
                        );
                        self.uplink
                            .status
                            .send(StatusSignal::Cadence(BlinkRate::Slow));
                        return address;
                    }
                    Err(e) => warn!(target: "instrumentation", "{}", e),
                }
                Timer::after(self.retry_delay).await;
            }
        }
    }

    pub async fn sample_once(&mut self) -> Result<Instrumentation, SensorError> {
        let mut pins = [0.0; 4];
        for (channel, pin) in (0u8..).zip(pins.iter_mut()) {
            *pin = self.adc.read_volts(channel).await?;
        }

        let readings = self.channels.convert(pins);
        if self.uplink.verbose(DebugFlags::INSTRUMENTATION) {
            info!(
                target: "instrumentation",
                "Primary resistor drop: {:.3} V",
                self.channels.battery_voltage.primary_drop(pins[0])
            );
            info!(
                target: "instrumentation",
                "Battery: {:.2} V Motor: {:.2} A Battery: {:.2} A MPPT: {:.2} A",
                readings.voltage_battery,
                readings.current_motor,
                readings.current_battery,
                readings.current_mppt
            );
        }

        self.writer.publish(readings);
        self.uplink
            .transmit(TelemetryMessage::from(&readings))
            .await;
        Ok(readings)
    }

    pub async fn step(&mut self) {
        if let Err(e) = self.sample_once().await {
            warn!(target: "instrumentation", "Sample skipped: {}", e);
        }
        Timer::after(self.period).await;
    }

    pub async fn run(mut self, heartbeat: Heartbeat<'_>) -> ! {
        self.bring_up().await;
        loop {
            self.step().await;
            heartbeat.beat();
        }
    }
}
