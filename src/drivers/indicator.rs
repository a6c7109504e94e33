// StrikeTrigger - Strike Indicator
//
// Flashes an LED on every recognised strike. The pulse blocks the caller for
// its on-time; a pin that refuses to switch is logged and counted, never
// fatal.

use std::thread;
use std::time::Duration;

use crate::config::STRIKE_PULSE_MS;

pub trait StrikeIndicator {
    fn pulse(&mut self);
}

/// An output that can be driven on or off.
pub trait LedSwitch {
    fn set(&mut self, on: bool) -> anyhow::Result<()>;
}

pub struct PulseIndicator<S> {
    led: S,
    on_time: Duration,
    failures: u32,
}

impl<S: LedSwitch> PulseIndicator<S> {
    pub fn new(led: S) -> Self {
        Self {
            led,
            on_time: Duration::from_millis(STRIKE_PULSE_MS),
            failures: 0,
        }
    }

    pub fn with_on_time(mut self, on_time: Duration) -> Self {
        self.on_time = on_time;
        self
    }

    /// Switch failures seen so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn flash(&mut self, duration: Duration) {
        self.switch(true);
        thread::sleep(duration);
        // Always try to turn it off again, even if switching on failed.
        self.switch(false);
    }

    fn switch(&mut self, on: bool) {
        if let Err(e) = self.led.set(on) {
            self.failures += 1;
            log::warn!("strike LED {} failed: {:#}", if on { "on" } else { "off" }, e);
        }
    }
}

impl<S: LedSwitch> StrikeIndicator for PulseIndicator<S> {
    fn pulse(&mut self) {
        self.flash(self.on_time);
    }
}

#[cfg(target_os = "espidf")]
pub use self::led::LedIndicator;

#[cfg(target_os = "espidf")]
mod led {
    use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};

    use super::{LedSwitch, PulseIndicator};

    /// GPIO-driven strike LED.
    pub type LedIndicator<'d> = PulseIndicator<PinDriver<'d, AnyOutputPin, Output>>;

    impl LedSwitch for PinDriver<'_, AnyOutputPin, Output> {
        fn set(&mut self, on: bool) -> anyhow::Result<()> {
            if on {
                self.set_high()?;
            } else {
                self.set_low()?;
            }
            Ok(())
        }
    }
}
