//! Motor and secondary probe temperatures

use core::fmt;

use embassy_time::Duration;
use log::{info, warn};

use super::Uplink;
use crate::app_state::{DebugFlags, TemperatureReading, TemperatureWriter, Temperatures};
use crate::config::ProbeAddresses;
use crate::notify::Notifier;
use crate::registry::Heartbeat;
use crate::sensors::{ProbeAddress, ProbeBus};
use crate::transport::frame::TelemetryMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureCommand {
    /// Enumerate the probe bus and log every address found
    Rescan,
}

/// Renders a probe ROM code as sixteen hex digits.
pub struct ProbeHex<'a>(pub &'a ProbeAddress);

impl fmt::Display for ProbeHex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

pub struct TemperatureTask<'a, B> {
    bus: B,
    probes: ProbeAddresses,
    writer: TemperatureWriter<'a>,
    uplink: Uplink<'a>,
    inbox: &'a Notifier<TemperatureCommand>,
    period: Duration,
}

impl<'a, B: ProbeBus> TemperatureTask<'a, B> {
    pub fn new(
        bus: B,
        probes: ProbeAddresses,
        writer: TemperatureWriter<'a>,
        uplink: Uplink<'a>,
        inbox: &'a Notifier<TemperatureCommand>,
        period: Duration,
    ) -> Self {
        Self {
            bus,
            probes,
            writer,
            uplink,
            inbox,
            period,
        }
    }

    /// Read both probes, publish and transmit. A failed conversion request
    /// reports both probes as disconnected rather than repeating stale values.
    pub async fn sample_once(&mut self) -> Temperatures {
        let temperatures = match self.bus.request_temperatures().await {
            Ok(()) => Temperatures {
                motor: TemperatureReading::from_raw(
                    self.bus.read_celsius(&self.probes.motor).await,
                ),
                secondary: TemperatureReading::from_raw(
                    self.bus.read_celsius(&self.probes.secondary).await,
                ),
            },
            Err(e) => {
                warn!(target: "temperature", "Conversion request failed: {}", e);
                Temperatures::default()
            }
        };

        self.writer.publish(temperatures);
        if self.uplink.verbose(DebugFlags::TEMPERATURE) {
            info!(
                target: "temperature",
                "Motor: {} Secondary: {}",
                Celsius(temperatures.motor),
                Celsius(temperatures.secondary)
            );
        }

        self.uplink
            .transmit(TelemetryMessage::from(&temperatures))
            .await;
        temperatures
    }

    pub async fn rescan(&mut self) {
        match self.bus.scan().await {
            Ok(found) => {
                info!(target: "temperature", "Found {} devices", found.len());
                for (index, address) in found.iter().enumerate() {
                    info!(target: "temperature", "Device {} Address: {}", index, ProbeHex(address));
                }
            }
            Err(e) => warn!(target: "temperature", "Probe scan failed: {}", e),
        }
    }

    /// One sample, then wait out the period unless a rescan arrives first.
    pub async fn step(&mut self) {
        self.sample_once().await;
        if let Some(TemperatureCommand::Rescan) = self.inbox.receive(self.period).await {
            self.rescan().await;
        }
    }

    pub async fn run(mut self, heartbeat: Heartbeat<'_>) -> ! {
        loop {
            self.step().await;
            heartbeat.beat();
        }
    }
}

struct Celsius(TemperatureReading);

impl fmt::Display for Celsius {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.celsius() {
            Some(value) => write!(f, "{:.2} C", value),
            None => f.write_str("disconnected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::{DISCONNECTED_CELSIUS, TelemetryStore};
    use crate::sensors::{MAX_PROBES, SensorError};
    use crate::status::{StatusInbox, StatusSignal};
    use crate::transport::frame;
    use crate::transport::{Outbound, SerialOutbox};
    use embassy_futures::block_on;
    use heapless::Vec;

    const MOTOR: ProbeAddress = [0x28, 0x86, 0x1C, 0x07, 0xD6, 0x01, 0x3C, 0x8C];
    const SECONDARY: ProbeAddress = [0x28, 0xFF, 0x64, 0x1E, 0x0F, 0x73, 0x2C, 0x11];

    struct FakeProbes {
        motor: f32,
        secondary: Option<f32>,
        scans: usize,
    }

    impl ProbeBus for FakeProbes {
        async fn request_temperatures(&mut self) -> Result<(), SensorError> {
            Ok(())
        }

        async fn read_celsius(&mut self, address: &ProbeAddress) -> f32 {
            if *address == MOTOR {
                self.motor
            } else {
                self.secondary.unwrap_or(DISCONNECTED_CELSIUS)
            }
        }

        async fn scan(&mut self) -> Result<Vec<ProbeAddress, MAX_PROBES>, SensorError> {
            self.scans += 1;
            let mut found = Vec::new();
            let _ = found.push(MOTOR);
            Ok(found)
        }
    }

    fn decode_temperatures(outbox: &SerialOutbox) -> (f32, f32) {
        match outbox.try_receive() {
            Some(Outbound::Frame(bytes)) => match frame::decode(&bytes).unwrap().0.message {
                TelemetryMessage::Temperatures { motor, secondary } => (motor, secondary),
                other => panic!("unexpected message {other:?}"),
            },
            other => panic!("expected a frame, got {other:?}"),
        }
    }

    #[test]
    fn test_disconnected_probe_is_flagged() {
        let store = TelemetryStore::new();
        let writers = store.writers().unwrap();
        let outbox = SerialOutbox::new(1, 191);
        let status = StatusInbox::new();
        let inbox = Notifier::new();
        let uplink = Uplink {
            outbox: &outbox,
            status: &status,
            debug: store.debug(),
        };
        let probes = ProbeAddresses {
            motor: MOTOR,
            secondary: SECONDARY,
        };
        let bus = FakeProbes {
            motor: 41.5,
            secondary: None,
            scans: 0,
        };
        let mut task = TemperatureTask::new(
            bus,
            probes,
            writers.temperatures,
            uplink,
            &inbox,
            Duration::from_millis(10),
        );

        let temperatures = block_on(task.sample_once());
        assert_eq!(temperatures.motor, TemperatureReading::Celsius(41.5));
        assert_eq!(temperatures.secondary, TemperatureReading::Disconnected);
        assert!(!store.reader().temperatures().secondary.is_connected());

        // No logger is installed under test, so the frame is the only item.
        let (motor, secondary) = decode_temperatures(&outbox);
        assert_eq!(motor, 41.5);
        assert_eq!(secondary, DISCONNECTED_CELSIUS);
        assert_eq!(status.try_receive(), Some(StatusSignal::Pulse));
    }

    #[test]
    fn test_rescan_request_enumerates_bus() {
        let store = TelemetryStore::new();
        let writers = store.writers().unwrap();
        store.debug().replace(DebugFlags::empty());
        let outbox = SerialOutbox::new(1, 191);
        let status = StatusInbox::new();
        let inbox = Notifier::new();
        let uplink = Uplink {
            outbox: &outbox,
            status: &status,
            debug: store.debug(),
        };
        let mut bus = FakeProbes {
            motor: 20.0,
            secondary: Some(21.0),
            scans: 0,
        };

        {
            let mut task = TemperatureTask::new(
                &mut bus,
                ProbeAddresses {
                    motor: MOTOR,
                    secondary: SECONDARY,
                },
                writers.temperatures,
                uplink,
                &inbox,
                Duration::from_millis(10),
            );
            inbox.send(TemperatureCommand::Rescan);
            block_on(task.step());
        }

        assert_eq!(bus.scans, 1);
        assert_eq!(decode_temperatures(&outbox), (20.0, 21.0));
    }

    #[test]
    fn test_probe_hex() {
        use core::fmt::Write;

        let mut text = std::string::String::new();
        write!(text, "{}", ProbeHex(&MOTOR)).unwrap();
        assert_eq!(text, "28861C07D6013C8C");
    }
}
