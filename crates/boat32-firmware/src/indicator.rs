//! Status LED and piezo buzzer

use esp_hal::analog::dac::Dac;
use esp_hal::gpio::Output;
use esp_hal::peripherals::DAC2;

use boat32_core::status::StatusOutput;

/// DAC code that drives the buzzer at a comfortable volume.
const BUZZER_LEVEL: u8 = 150;

pub struct BoardIndicator {
    led: Output<'static>,
    buzzer: Dac<'static, DAC2<'static>>,
}

impl BoardIndicator {
    pub fn new(led: Output<'static>, buzzer: Dac<'static, DAC2<'static>>) -> Self {
        Self { led, buzzer }
    }
}

impl StatusOutput for BoardIndicator {
    fn set_led(&mut self, on: bool) {
        if on {
            self.led.set_high();
        } else {
            self.led.set_low();
        }
    }

    fn set_buzzer(&mut self, on: bool) {
        self.buzzer.write(if on { BUZZER_LEVEL } else { 0 });
    }
}
