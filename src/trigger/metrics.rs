// StrikeTrigger - Strike Force Rolling Average

use crate::trigger::ring::RingBuffer;

/// Mean of the last `N` strike magnitudes.
#[derive(Debug, Clone, Default)]
pub struct RollingAverage<const N: usize> {
    window: RingBuffer<f32, N>,
    last: Option<f32>,
}

impl<const N: usize> RollingAverage<N> {
    pub fn new() -> Self {
        Self {
            window: RingBuffer::new(),
            last: None,
        }
    }

    pub fn record(&mut self, magnitude: f32) {
        self.window.push(magnitude);
        self.last = Some(magnitude);
    }

    /// `0.0` until something has been recorded.
    pub fn current_average(&self) -> f32 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window.iter().sum::<f32>() / self.window.len() as f32
    }

    pub fn last(&self) -> Option<f32> {
        self.last
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}
