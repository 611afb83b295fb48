//! Status LED and buzzer
//!
//! The indicator blinks at a steady cadence that encodes the system state and
//! plays a short burst whenever a task reports a successful transmission.

use embassy_time::{Duration, Instant, Timer};

use crate::notify::Notifier;
use crate::registry::Heartbeat;

/// Steady blink cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlinkRate {
    /// Idle and connected
    Slow,
    Medium,
    /// Connecting or waiting for hardware
    Fast,
}

impl BlinkRate {
    pub const fn period(self) -> Duration {
        match self {
            Self::Slow => Duration::from_millis(2000),
            Self::Medium => Duration::from_millis(1000),
            Self::Fast => Duration::from_millis(300),
        }
    }

    /// Map the `B` command selector (`0`, `1`, `2`) to a cadence.
    pub fn from_selector(selector: u8) -> Option<Self> {
        match selector {
            b'0' => Some(Self::Slow),
            b'1' => Some(Self::Medium),
            b'2' => Some(Self::Fast),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSignal {
    /// Adopt a new steady cadence
    Cadence(BlinkRate),
    /// Play one event burst, then resume the current cadence
    Pulse,
}

/// Indicator mailbox. Cadence changes and bursts sit in separate slots, so
/// a burst never replaces a cadence the indicator has not applied yet.
pub struct StatusInbox {
    cadence: Notifier<BlinkRate>,
    pulse: Notifier<()>,
}

impl Default for StatusInbox {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusInbox {
    pub const fn new() -> Self {
        Self {
            cadence: Notifier::new(),
            pulse: Notifier::new(),
        }
    }

    pub fn send(&self, signal: StatusSignal) {
        match signal {
            StatusSignal::Cadence(rate) => self.cadence.send(rate),
            StatusSignal::Pulse => self.pulse.send(()),
        }
    }

    /// Pending cadence first, then a pending burst.
    pub fn try_receive(&self) -> Option<StatusSignal> {
        self.cadence
            .try_receive()
            .map(StatusSignal::Cadence)
            .or_else(|| self.pulse.try_receive().map(|()| StatusSignal::Pulse))
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self) -> bool {
        self.cadence.is_pending() || self.pulse.is_pending()
    }

    /// Take whatever is pending, otherwise wait up to `timeout` for a burst.
    pub async fn receive(&self, timeout: Duration) -> Option<StatusSignal> {
        if let Some(signal) = self.try_receive() {
            return Some(signal);
        }
        match self.pulse.receive(timeout).await {
            Some(()) => Some(StatusSignal::Pulse),
            None => self.cadence.try_receive().map(StatusSignal::Cadence),
        }
    }
}

/// The LED and buzzer pins driven by the indicator.
pub trait StatusOutput {
    fn set_led(&mut self, on: bool);
    fn set_buzzer(&mut self, on: bool);
}

const POLL_TIMEOUT: Duration = Duration::from_millis(100);
const PULSE_CYCLES: usize = 4;
const PULSE_HALF_PERIOD: Duration = Duration::from_millis(50);
/// Buzzer steps played on each toggle while the cadence is fast.
const BUZZER_PATTERN: [bool; 8] = [true, false, true, false, true, true, false, false];

pub struct StatusIndicator<'a, O> {
    output: O,
    inbox: &'a StatusInbox,
    cadence: BlinkRate,
    led_on: bool,
    pattern_step: usize,
    last_toggle: Instant,
}

impl<'a, O: StatusOutput> StatusIndicator<'a, O> {
    pub fn new(output: O, inbox: &'a StatusInbox) -> Self {
        Self {
            output,
            inbox,
            cadence: BlinkRate::Fast,
            led_on: false,
            pattern_step: 0,
            last_toggle: Instant::now(),
        }
    }

    pub fn cadence(&self) -> BlinkRate {
        self.cadence
    }

    /// Apply a message. Returns `true` when a burst should be played.
    pub fn apply(&mut self, signal: StatusSignal) -> bool {
        match signal {
            StatusSignal::Cadence(rate) => {
                if rate != self.cadence {
                    log::debug!(target: "status", "Cadence {:?} -> {:?}", self.cadence, rate);
                }
                self.cadence = rate;
                if rate != BlinkRate::Fast {
                    self.output.set_buzzer(false);
                }
                false
            }
            StatusSignal::Pulse => true,
        }
    }

    /// Flip the LED and advance the buzzer pattern.
    pub fn toggle(&mut self) {
        self.led_on = !self.led_on;
        self.output.set_led(self.led_on);

        let buzz = self.cadence == BlinkRate::Fast
            && BUZZER_PATTERN[self.pattern_step % BUZZER_PATTERN.len()];
        self.output.set_buzzer(buzz);
        self.pattern_step = self.pattern_step.wrapping_add(1);
        self.last_toggle = Instant::now();
    }

    /// Fixed on/off burst; the LED returns to its steady state afterwards.
    pub async fn pulse(&mut self) {
        for _ in 0..PULSE_CYCLES {
            self.output.set_led(true);
            Timer::after(PULSE_HALF_PERIOD).await;
            self.output.set_led(false);
            Timer::after(PULSE_HALF_PERIOD).await;
        }
        self.output.set_led(self.led_on);
    }

    /// Run one indicator cycle: wait briefly for a message, then toggle if
    /// the current period has elapsed.
    pub async fn step(&mut self) {
        if let Some(signal) = self.inbox.receive(POLL_TIMEOUT).await {
            if self.apply(signal) {
                self.pulse().await;
            }
        }

        if self.last_toggle.elapsed() >= self.cadence.period() {
            self.toggle();
        }
    }

    pub async fn run(mut self, heartbeat: Heartbeat<'_>) -> ! {
        loop {
            self.step().await;
            heartbeat.beat();
        }
    }

    pub fn into_output(self) -> O {
        self.output
    }
}
