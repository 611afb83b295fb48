use embassy_time::{Duration, Timer};
use embedded_hal_async::i2c::I2c;
use log::error;

use super::{AnalogFrontEnd, SensorError};

/// Addresses the instrumentation board may strap the converter to.
pub const ADS1115_ADDRESSES: [u8; 2] = [0x48, 0x49];

const REG_CONVERSION: u8 = 0x00;
const REG_CONFIG: u8 = 0x01;

const OS_START: u16 = 1 << 15;
const MUX_SINGLE_ENDED: u16 = 0b100 << 12;
/// Gain x4, +/-1.024 V full scale
const PGA_GAIN_FOUR: u16 = 0b011 << 9;
const MODE_SINGLE_SHOT: u16 = 1 << 8;
const DATA_RATE_16SPS: u16 = 0b001 << 5;
const COMPARATOR_DISABLED: u16 = 0b11;

const FULL_SCALE_VOLTS: f32 = 1.024;

/// A 16 SPS conversion takes 62.5 ms.
const CONVERSION_POLL: Duration = Duration::from_millis(10);
const CONVERSION_POLLS: usize = 20;

/// ADS1115 in single-shot, single-ended mode at gain x4 and 16 SPS.
pub struct Ads1115<I> {
    i2c: I,
    address: u8,
}

impl<I: I2c> Ads1115<I> {
    pub fn new(i2c: I) -> Self {
        Self {
            i2c,
            address: ADS1115_ADDRESSES[0],
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    fn config_word(channel: u8) -> u16 {
        OS_START
            | MUX_SINGLE_ENDED
            | (u16::from(channel) << 12)
            | PGA_GAIN_FOUR
            | MODE_SINGLE_SHOT
            | DATA_RATE_16SPS
            | COMPARATOR_DISABLED
    }

    async fn read_register(&mut self, register: u8) -> Result<u16, SensorError> {
        let mut buffer = [0u8; 2];
        self.i2c
            .write_read(self.address, &[register], &mut buffer)
            .await
            .map_err(|e| {
                error!("ADS1115 register {:#04x} read failed: {:?}", register, e);
                SensorError::ReadFailed {
                    sensor: "ADS1115",
                    operation: "read register",
                    details: "I2C communication error or converter not responding",
                }
            })?;
        Ok(u16::from_be_bytes(buffer))
    }

    async fn start_conversion(&mut self, channel: u8) -> Result<(), SensorError> {
        let [high, low] = Self::config_word(channel).to_be_bytes();
        self.i2c
            .write(self.address, &[REG_CONFIG, high, low])
            .await
            .map_err(|e| {
                error!("ADS1115 conversion start failed: {:?}", e);
                SensorError::ReadFailed {
                    sensor: "ADS1115",
                    operation: "start conversion",
                    details: "I2C communication error or converter not responding",
                }
            })
    }

    async fn convert(&mut self, channel: u8) -> Result<i16, SensorError> {
        self.start_conversion(channel).await?;

        for _ in 0..CONVERSION_POLLS {
            Timer::after(CONVERSION_POLL).await;
            if self.read_register(REG_CONFIG).await? & OS_START != 0 {
                let raw = self.read_register(REG_CONVERSION).await?;
                return Ok(raw as i16);
            }
        }

        Err(SensorError::Timeout {
            sensor: "ADS1115",
            operation: "single-shot conversion",
        })
    }
}

impl<I: I2c> AnalogFrontEnd for Ads1115<I> {
    async fn probe(&mut self, address: u8) -> Result<(), SensorError> {
        let previous = core::mem::replace(&mut self.address, address);
        match self.read_register(REG_CONFIG).await {
            Ok(_) => Ok(()),
            Err(_) => {
                self.address = previous;
                Err(SensorError::NotResponding {
                    sensor: "ADS1115",
                    address,
                })
            }
        }
    }

    async fn read_volts(&mut self, channel: u8) -> Result<f32, SensorError> {
        if channel > 3 {
            return Err(SensorError::InvalidChannel {
                sensor: "ADS1115",
                channel,
            });
        }

        let raw = self.convert(channel).await?;
        Ok(f32::from(raw) * FULL_SCALE_VOLTS / 32768.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embedded_hal_async::i2c::{ErrorKind, ErrorType, Operation};

    /// Register file of a single converter.
    struct FakeAdc {
        address: u8,
        config: u16,
        conversion: u16,
        writes: std::vec::Vec<std::vec::Vec<u8>>,
    }

    #[derive(Debug)]
    struct Nack;

    impl embedded_hal_async::i2c::Error for Nack {
        fn kind(&self) -> ErrorKind {
            ErrorKind::NoAcknowledge(embedded_hal_async::i2c::NoAcknowledgeSource::Address)
        }
    }

    impl ErrorType for FakeAdc {
        type Error = Nack;
    }

    impl I2c for FakeAdc {
        async fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Nack> {
            if address != self.address {
                return Err(Nack);
            }
            let mut pointer = REG_CONFIG;
            for operation in operations {
                match operation {
                    Operation::Write(bytes) => {
                        pointer = bytes[0];
                        self.writes.push(bytes.to_vec());
                        if bytes.len() == 3 {
                            // Conversion completes immediately.
                            self.config = u16::from_be_bytes([bytes[1], bytes[2]]) | OS_START;
                        }
                    }
                    Operation::Read(buffer) => {
                        let value = if pointer == REG_CONVERSION {
                            self.conversion
                        } else {
                            self.config
                        };
                        buffer.copy_from_slice(&value.to_be_bytes());
                    }
                }
            }
            Ok(())
        }
    }

    fn fake(address: u8, conversion: u16) -> FakeAdc {
        FakeAdc {
            address,
            config: 0,
            conversion,
            writes: std::vec::Vec::new(),
        }
    }

    #[test]
    fn test_config_word_for_channel_two() {
        // OS | MUX=110 | PGA=011 | single-shot | 16 SPS | comparator off
        assert_eq!(Ads1115::<FakeAdc>::config_word(2), 0xE723);
    }

    #[test]
    fn test_probe_switches_address_only_on_ack() {
        let mut adc = Ads1115::new(fake(0x49, 0));

        assert!(block_on(adc.probe(0x48)).is_err());
        assert_eq!(adc.address(), 0x48);
        assert!(block_on(adc.probe(0x49)).is_ok());
        assert_eq!(adc.address(), 0x49);
    }

    #[test]
    fn test_read_volts_scales_to_full_scale() {
        let mut adc = Ads1115::new(fake(0x48, 16384));
        let volts = block_on(adc.read_volts(1)).unwrap();
        assert!((volts - 0.512).abs() < 1e-6);
    }

    #[test]
    fn test_negative_codes_read_negative() {
        let mut adc = Ads1115::new(fake(0x48, 0xC000));
        let volts = block_on(adc.read_volts(0)).unwrap();
        assert!((volts + 0.512).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_channel_rejected() {
        let mut adc = Ads1115::new(fake(0x48, 0));
        assert_eq!(
            block_on(adc.read_volts(4)),
            Err(SensorError::InvalidChannel {
                sensor: "ADS1115",
                channel: 4
            })
        );
    }
}
