// StrikeTrigger - Samples, Strikes & Pads

use std::fmt;
use std::str::FromStr;

use crate::config::{ConfigError, ACCEL_SCALE_8G};

// ---------------------------------------------------------------------------
// Raw accelerometer sample (three little-endian i16 output registers)
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AxisSample {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl AxisSample {
    /// Decode the OUTX_L..OUTZ_H burst.
    pub fn from_le_bytes(raw: &[u8; 6]) -> Self {
        Self {
            x: i16::from_le_bytes([raw[0], raw[1]]),
            y: i16::from_le_bytes([raw[2], raw[3]]),
            z: i16::from_le_bytes([raw[4], raw[5]]),
        }
    }

    pub fn to_le_bytes(self) -> [u8; 6] {
        let [x0, x1] = self.x.to_le_bytes();
        let [y0, y1] = self.y.to_le_bytes();
        let [z0, z1] = self.z.to_le_bytes();
        [x0, x1, y0, y1, z0, z1]
    }

    /// Convert to g at the configured ±8 g full scale.
    pub fn to_g(self) -> Acceleration {
        Acceleration {
            x: self.x as f32 / ACCEL_SCALE_8G,
            y: self.y as f32 / ACCEL_SCALE_8G,
            z: self.z as f32 / ACCEL_SCALE_8G,
        }
    }
}

// ---------------------------------------------------------------------------
// Acceleration in g
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Acceleration {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Acceleration {
    pub fn axis(&self, axis: Axis) -> f32 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    pub fn as_tuple(&self) -> (f32, f32, f32) {
        (self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::X => "X",
            Self::Y => "Y",
            Self::Z => "Z",
        })
    }
}

// ---------------------------------------------------------------------------
// Strike events
// ---------------------------------------------------------------------------

/// One recognised percussive motion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrikeEvent {
    /// Strike force in g. Peak-detected strikes are reported sign-inverted.
    pub magnitude: f32,
    pub axis: Axis,
    /// Poll tick on which the strike was recognised.
    pub tick: u64,
}

// ---------------------------------------------------------------------------
// Pads
// ---------------------------------------------------------------------------

/// The drum voice a trigger plays on the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pad {
    Snare,
    HiHat,
    Kick,
}

impl Pad {
    /// Single-byte code the receiver maps to a drum voice.
    pub fn marker(self) -> u8 {
        match self {
            Self::Snare => b'1',
            Self::HiHat => b'2',
            Self::Kick => b'3',
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Snare => "SNARE",
            Self::HiHat => "HIHAT",
            Self::Kick => "KICK",
        }
    }
}

impl FromStr for Pad {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "snare" | "rh" => Ok(Self::Snare),
            "hihat" | "hi-hat" | "lh" => Ok(Self::HiHat),
            "kick" | "rf" => Ok(Self::Kick),
            _ => Err(ConfigError::UnknownPad(s.to_string())),
        }
    }
}
