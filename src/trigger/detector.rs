// StrikeTrigger - Strike Detection
//
// Two interchangeable detectors, each fed one single-axis sample (in g) per
// poll tick:
//   * Hysteresis: fire on an upward crossing of the strike threshold, then
//     stay armed until the signal falls below the recovery threshold.
//   * Peak: fire on a strict local minimum below the peak threshold, at most
//     once per cooldown. Detection lags one tick because the minimum is only
//     known once the following sample is in.
//
// Both are deterministic: the same input sequence gives the same strikes.

use crate::config::{ConfigError, PEAK_WINDOW_SIZE};
use crate::events::{Axis, StrikeEvent};
use crate::trigger::ring::RingBuffer;

/// Detector selection and tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DetectorParams {
    Hysteresis {
        strike_threshold: f32,
        recovery_threshold: f32,
    },
    Peak {
        peak_threshold: f32,
        min_samples_between: u16,
    },
}

impl DetectorParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            Self::Hysteresis {
                strike_threshold,
                recovery_threshold,
            } => {
                finite("strike_threshold", strike_threshold)?;
                finite("recovery_threshold", recovery_threshold)?;
                if recovery_threshold >= strike_threshold {
                    return Err(ConfigError::InvertedHysteresis {
                        strike: strike_threshold,
                        recovery: recovery_threshold,
                    });
                }
                Ok(())
            }
            Self::Peak { peak_threshold, .. } => finite("peak_threshold", peak_threshold),
        }
    }
}

fn finite(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonFiniteThreshold { name, value })
    }
}

// ---------------------------------------------------------------------------
// Algorithm A: hysteresis threshold
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrikeState {
    #[default]
    Idle,
    ArmedWaitingForRecovery,
}

#[derive(Debug, Clone)]
pub struct HysteresisDetector {
    strike_threshold: f32,
    recovery_threshold: f32,
    state: StrikeState,
}

impl HysteresisDetector {
    pub fn new(strike_threshold: f32, recovery_threshold: f32) -> Result<Self, ConfigError> {
        DetectorParams::Hysteresis {
            strike_threshold,
            recovery_threshold,
        }
        .validate()?;
        Ok(Self {
            strike_threshold,
            recovery_threshold,
            state: StrikeState::Idle,
        })
    }

    pub fn state(&self) -> StrikeState {
        self.state
    }

    /// Returns the strike force when this sample fires.
    pub fn update(&mut self, sample: f32) -> Option<f32> {
        match self.state {
            StrikeState::Idle if sample > self.strike_threshold => {
                self.state = StrikeState::ArmedWaitingForRecovery;
                Some(sample)
            }
            StrikeState::ArmedWaitingForRecovery if sample < self.recovery_threshold => {
                self.state = StrikeState::Idle;
                None
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Algorithm B: local peak with cooldown
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PeakDetector {
    peak_threshold: f32,
    min_samples_between: u16,
    window: RingBuffer<f32, PEAK_WINDOW_SIZE>,
    samples_since_strike: u16,
}

impl PeakDetector {
    pub fn new(peak_threshold: f32, min_samples_between: u16) -> Result<Self, ConfigError> {
        DetectorParams::Peak {
            peak_threshold,
            min_samples_between,
        }
        .validate()?;
        Ok(Self {
            peak_threshold,
            min_samples_between,
            window: RingBuffer::new(),
            // Seeded so the very first peak can fire.
            samples_since_strike: min_samples_between,
        })
    }

    pub fn is_cooling_down(&self) -> bool {
        self.samples_since_strike < self.min_samples_between
    }

    /// Returns the (positive) strike force when the previous sample turns
    /// out to be a peak.
    pub fn update(&mut self, sample: f32) -> Option<f32> {
        self.window.push(sample);
        self.samples_since_strike = self.samples_since_strike.saturating_add(1);

        if !self.window.is_full() || self.is_cooling_down() {
            return None;
        }

        let (next, curr, prev) = (self.window.recent(0)?, self.window.recent(1)?, self.window.recent(2)?);
        if curr < self.peak_threshold && curr < prev && curr < next {
            self.samples_since_strike = 0;
            Some(-curr)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Axis-bound detector
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Algorithm {
    Hysteresis(HysteresisDetector),
    Peak(PeakDetector),
}

/// One detector reading one axis, stamping strikes with the tick count.
#[derive(Debug, Clone)]
pub struct StrikeDetector {
    axis: Axis,
    algorithm: Algorithm,
    ticks: u64,
}

impl StrikeDetector {
    pub fn new(axis: Axis, params: DetectorParams) -> Result<Self, ConfigError> {
        let algorithm = match params {
            DetectorParams::Hysteresis {
                strike_threshold,
                recovery_threshold,
            } => Algorithm::Hysteresis(HysteresisDetector::new(strike_threshold, recovery_threshold)?),
            DetectorParams::Peak {
                peak_threshold,
                min_samples_between,
            } => Algorithm::Peak(PeakDetector::new(peak_threshold, min_samples_between)?),
        };
        Ok(Self {
            axis,
            algorithm,
            ticks: 0,
        })
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    /// Samples consumed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn update(&mut self, sample: f32) -> Option<StrikeEvent> {
        let tick = self.ticks;
        self.ticks += 1;

        let magnitude = match &mut self.algorithm {
            Algorithm::Hysteresis(d) => d.update(sample),
            Algorithm::Peak(d) => d.update(sample),
        }?;
        Some(StrikeEvent {
            magnitude,
            axis: self.axis,
            tick,
        })
    }

    /// Short label for the status display.
    pub fn state_label(&self) -> &'static str {
        match &self.algorithm {
            Algorithm::Hysteresis(d) => match d.state() {
                StrikeState::Idle => "IDLE",
                StrikeState::ArmedWaitingForRecovery => "ARMED",
            },
            Algorithm::Peak(d) if d.is_cooling_down() => "COOLDOWN",
            Algorithm::Peak(_) => "READY",
        }
    }
}
