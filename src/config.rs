// StrikeTrigger - Hardware & System Configuration
// Target: Seeed Studio Xiao ESP32-C3 (RISC-V) with an LSM6DSO-family IMU

use std::str::FromStr;
use std::time::Duration;

use crate::events::{Axis, Pad};
use crate::trigger::DetectorParams;

// ---------------------------------------------------------------------------
// GPIO Pin Definitions (Xiao ESP32-C3 pinout)
// ---------------------------------------------------------------------------
pub const PIN_I2C_SDA: i32 = 6;     // D4    - bit-banged bus data line
pub const PIN_I2C_SCL: i32 = 7;     // D5    - bit-banged bus clock line
pub const PIN_STRIKE_LED: i32 = 10; // D10   - strike indicator LED
pub const PIN_UPLINK_TX: i32 = 21;  // D6    - UART TX to the downstream receiver
pub const PIN_UPLINK_RX: i32 = 20;  // D7    - UART RX (unused, required by the driver)

// ---------------------------------------------------------------------------
// Two-wire bus
// ---------------------------------------------------------------------------
pub const I2C_ADDR_LSM6: u8 = 0x6B;
pub const I2C_ADDR_OLED: u8 = 0x3C;
/// Upper bound on busy-polls per bus phase before the transaction times out.
pub const TWI_MAX_WAIT_POLLS: u32 = 10_000;
/// Half of one SCL period for the bit-banged master (~100 kHz).
pub const TWI_HALF_PERIOD_US: u32 = 5;
/// How long a slave may stretch the clock before the phase is reported stuck.
pub const TWI_CLOCK_STRETCH_POLLS: u32 = 1_000;

// ---------------------------------------------------------------------------
// Display (SSD1306 OLED, shares the sensor bus)
// ---------------------------------------------------------------------------
pub const SCREEN_WIDTH: u32 = 128;
pub const SCREEN_HEIGHT: u32 = 64;
pub const DISPLAY_BUFFER_SIZE: usize = (SCREEN_WIDTH as usize * SCREEN_HEIGHT as usize) / 8; // 1024

// ---------------------------------------------------------------------------
// Uplink (serial link to the drum-kit receiver)
// ---------------------------------------------------------------------------
pub const UPLINK_BAUD: u32 = 9600;

// ---------------------------------------------------------------------------
// Timing (milliseconds)
// ---------------------------------------------------------------------------
pub const HAND_POLL_INTERVAL_MS: u64 = 20;   // 50 Hz
pub const KICK_POLL_INTERVAL_MS: u64 = 5;    // 200 Hz, the pedal is faster
pub const STRIKE_PULSE_MS: u64 = 50;         // LED on-time per strike
pub const IMU_POWER_UP_MS: u64 = 5;          // Before the identification read
pub const IMU_SETTLE_MS: u64 = 20;           // After the configuration writes
pub const HALT_RETRY_MS: u64 = 1000;         // Sleep period once init has failed

// ---------------------------------------------------------------------------
// LSM6 Sensor Scale Factors
// ---------------------------------------------------------------------------
pub const ACCEL_SCALE_8G: f32 = 4096.0; // LSB/g at ±8 g (0.244 mg/LSB)
pub const IMU_DATA_RATE_HZ: u64 = 104;  // CTRL1_XL = 0x4C

// ---------------------------------------------------------------------------
// Strike detection defaults
// ---------------------------------------------------------------------------
pub const STRIKE_THRESHOLD_G: f32 = 1.8;
pub const RECOVERY_THRESHOLD_G: f32 = -0.2;
pub const HIHAT_PEAK_THRESHOLD_G: f32 = -2.0;
pub const HIHAT_COOLDOWN_MS: u64 = 60;
pub const KICK_PEAK_THRESHOLD_G: f32 = 0.0;
pub const KICK_COOLDOWN_MS: u64 = 100;
pub const HIHAT_MIN_SAMPLES_BETWEEN: u16 = cooldown_samples(HIHAT_COOLDOWN_MS, HAND_POLL_INTERVAL_MS); // 3
pub const KICK_MIN_SAMPLES_BETWEEN: u16 = cooldown_samples(KICK_COOLDOWN_MS, KICK_POLL_INTERVAL_MS);  // 10
pub const PEAK_WINDOW_SIZE: usize = 3;
pub const AVG_WINDOW_SIZE: usize = 10;

/// Peak-detector cooldown in samples for a `window_ms` gap.
///
/// Only samples flagged ready by the sensor reach the detector, so the
/// effective rate is the slower of the poll rate and the output data rate.
pub const fn cooldown_samples(window_ms: u64, poll_interval_ms: u64) -> u16 {
    let poll_hz = 1000 / if poll_interval_ms == 0 { 1 } else { poll_interval_ms };
    let rate_hz = if poll_hz < IMU_DATA_RATE_HZ { poll_hz } else { IMU_DATA_RATE_HZ };
    let samples = window_ms * rate_hz / 1000;
    if samples > u16::MAX as u64 {
        u16::MAX
    } else {
        samples as u16
    }
}

// ---------------------------------------------------------------------------
// Host simulation
// ---------------------------------------------------------------------------
pub const SIM_HIT_PERIOD: u64 = 25;   // samples between simulated hits
pub const SIM_DEFAULT_POLLS: u64 = 200;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("bus address 0x{0:02x} does not fit in 7 bits")]
    AddressOutOfRange(u8),
    #[error("threshold {name} must be finite, got {value}")]
    NonFiniteThreshold { name: &'static str, value: f32 },
    #[error("recovery threshold {recovery} must be below strike threshold {strike}")]
    InvertedHysteresis { strike: f32, recovery: f32 },
    #[error("unknown pad '{0}' (expected snare, hihat or kick)")]
    UnknownPad(String),
    #[error("bus wait budget must allow at least one poll")]
    ZeroWaitBudget,
    #[error("invalid poll count '{0}'")]
    InvalidPollCount(String),
}

// ---------------------------------------------------------------------------
// Per-trigger configuration
// ---------------------------------------------------------------------------

/// Everything that differs between the snare, hi-hat and kick triggers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerConfig {
    pub pad: Pad,
    pub address: u8,
    pub axis: Axis,
    pub detector: DetectorParams,
    pub poll_interval: Duration,
}

impl TriggerConfig {
    /// Right-hand stick: hysteresis on Z so a ringing head cannot re-trigger.
    pub fn snare() -> Self {
        Self {
            pad: Pad::Snare,
            address: I2C_ADDR_LSM6,
            axis: Axis::Z,
            detector: DetectorParams::Hysteresis {
                strike_threshold: STRIKE_THRESHOLD_G,
                recovery_threshold: RECOVERY_THRESHOLD_G,
            },
            poll_interval: Duration::from_millis(HAND_POLL_INTERVAL_MS),
        }
    }

    /// Left-hand stick: the wrist taps sideways, so peaks are read on Y.
    pub fn hihat() -> Self {
        Self {
            pad: Pad::HiHat,
            address: I2C_ADDR_LSM6,
            axis: Axis::Y,
            detector: DetectorParams::Peak {
                peak_threshold: HIHAT_PEAK_THRESHOLD_G,
                min_samples_between: HIHAT_MIN_SAMPLES_BETWEEN,
            },
            poll_interval: Duration::from_millis(HAND_POLL_INTERVAL_MS),
        }
    }

    /// Foot pedal.
    pub fn kick() -> Self {
        Self {
            pad: Pad::Kick,
            address: I2C_ADDR_LSM6,
            axis: Axis::Z,
            detector: DetectorParams::Peak {
                peak_threshold: KICK_PEAK_THRESHOLD_G,
                min_samples_between: KICK_MIN_SAMPLES_BETWEEN,
            },
            poll_interval: Duration::from_millis(KICK_POLL_INTERVAL_MS),
        }
    }

    pub fn for_pad(pad: Pad) -> Self {
        match pad {
            Pad::Snare => Self::snare(),
            Pad::HiHat => Self::hihat(),
            Pad::Kick => Self::kick(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        crate::drivers::twi::BusAddress::new(self.address)?;
        self.detector.validate()
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self::snare()
    }
}

impl FromStr for TriggerConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Pad>().map(Self::for_pad)
    }
}

// ---------------------------------------------------------------------------
// Host simulation options
// ---------------------------------------------------------------------------

/// What the host binary runs: `[pad] [polls]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimOptions {
    pub config: TriggerConfig,
    pub polls: u64,
}

impl SimOptions {
    /// Parse the command line (program name already skipped). The pad falls
    /// back to `env_pad`, then to the snare preset.
    pub fn from_args<I>(args: I, env_pad: Option<String>) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let config = match args.next().or(env_pad) {
            Some(pad) => pad.parse::<TriggerConfig>()?,
            None => TriggerConfig::default(),
        };
        let polls = match args.next() {
            Some(n) => n.parse::<u64>().map_err(|_| ConfigError::InvalidPollCount(n))?,
            None => SIM_DEFAULT_POLLS,
        };
        Ok(Self { config, polls })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        for pad in [Pad::Snare, Pad::HiHat, Pad::Kick] {
            let config = TriggerConfig::for_pad(pad);
            assert_eq!(config.pad, pad);
            assert!(config.validate().is_ok(), "{pad:?} preset rejected");
        }
    }

    #[test]
    fn wide_address_is_rejected() {
        let config = TriggerConfig {
            address: 0x80,
            ..TriggerConfig::snare()
        };
        assert_eq!(config.validate(), Err(ConfigError::AddressOutOfRange(0x80)));
    }

    #[test]
    fn cooldown_counts_delivered_samples() {
        // 50 Hz polling is slower than the sensor: one sample per poll.
        assert_eq!(HIHAT_MIN_SAMPLES_BETWEEN, 3);
        // 200 Hz polling is faster: the 104 Hz data rate sets the pace.
        assert_eq!(KICK_MIN_SAMPLES_BETWEEN, 10);
        assert_eq!(cooldown_samples(100, 0), 10);
    }

    #[test]
    fn sim_options_default_to_snare() {
        let opts = SimOptions::from_args(Vec::<String>::new(), None).unwrap();
        assert_eq!(opts.config.pad, Pad::Snare);
        assert_eq!(opts.polls, SIM_DEFAULT_POLLS);
    }

    #[test]
    fn sim_options_read_pad_and_polls() {
        let args = ["kick".to_string(), "50".to_string()];
        let opts = SimOptions::from_args(args, Some("hihat".to_string())).unwrap();
        assert_eq!(opts.config.pad, Pad::Kick);
        assert_eq!(opts.polls, 50);

        let opts = SimOptions::from_args(Vec::<String>::new(), Some("lh".to_string())).unwrap();
        assert_eq!(opts.config.pad, Pad::HiHat);
    }

    #[test]
    fn sim_options_reject_bad_input() {
        assert_eq!(
            SimOptions::from_args(["ring".to_string()], None),
            Err(ConfigError::UnknownPad("ring".to_string()))
        );
        assert_eq!(
            SimOptions::from_args(["snare".to_string(), "many".to_string()], None),
            Err(ConfigError::InvalidPollCount("many".to_string()))
        );
    }

    #[test]
    fn parses_pad_names() {
        let config: TriggerConfig = "kick".parse().unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(KICK_POLL_INTERVAL_MS));
        assert!("cowbell".parse::<TriggerConfig>().is_err());
    }
}
