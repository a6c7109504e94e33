pub mod detector;
pub mod metrics;
pub mod ring;

pub use detector::{DetectorParams, HysteresisDetector, PeakDetector, StrikeDetector, StrikeState};
pub use metrics::RollingAverage;
