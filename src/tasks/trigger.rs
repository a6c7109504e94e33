// StrikeTrigger - Trigger Task
//
// Fixed-rate poll loop: one sample fetch, one detector step and at most one
// strike dispatch per tick, then sleep for the rest of the interval. Read
// failures skip the tick without telling the user.

use std::thread;
use std::time::Instant;

use anyhow::Context;

use crate::config::*;
use crate::drivers::display::{StatusDisplay, StatusField};
use crate::drivers::imu::Lsm6;
use crate::drivers::indicator::StrikeIndicator;
use crate::drivers::twi::{BusAddress, HardwareBus};
use crate::drivers::uplink::StrikeSink;
use crate::events::StrikeEvent;
use crate::trigger::{RollingAverage, StrikeDetector};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub polls: u64,
    /// Polls without a usable sample (no new data or a failed read).
    pub skipped: u64,
    pub strikes: u64,
}

pub struct TriggerPipeline<B> {
    imu: Lsm6<B>,
    detector: StrikeDetector,
    metrics: RollingAverage<AVG_WINDOW_SIZE>,
    config: TriggerConfig,
    sink: Option<Box<dyn StrikeSink>>,
    indicator: Option<Box<dyn StrikeIndicator>>,
    display: Option<Box<dyn StatusDisplay>>,
    shown_state: &'static str,
    stats: PipelineStats,
}

impl<B: HardwareBus> TriggerPipeline<B> {
    /// Validate `config` and bring the sensor up. An error here is fatal: the
    /// trigger cannot work without a configured sensor.
    pub fn start(mut imu: Lsm6<B>, config: TriggerConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let detector = StrikeDetector::new(config.axis, config.detector)?;
        let addr = BusAddress::new(config.address)?;
        imu.initialize(addr)
            .with_context(|| format!("IMU not found at {}", addr))?;

        log::info!(
            "{} trigger ready ({} axis, every {} ms)",
            config.pad.display_name(),
            config.axis,
            config.poll_interval.as_millis()
        );

        Ok(Self {
            imu,
            detector,
            metrics: RollingAverage::new(),
            config,
            sink: None,
            indicator: None,
            display: None,
            shown_state: "",
            stats: PipelineStats::default(),
        })
    }

    pub fn with_sink(mut self, sink: Box<dyn StrikeSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_indicator(mut self, indicator: Box<dyn StrikeIndicator>) -> Self {
        self.indicator = Some(indicator);
        self
    }

    pub fn with_display(mut self, display: Box<dyn StatusDisplay>) -> Self {
        self.display = Some(display);
        self.refresh_display();
        self
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn metrics(&self) -> &RollingAverage<AVG_WINDOW_SIZE> {
        &self.metrics
    }

    pub fn detector(&self) -> &StrikeDetector {
        &self.detector
    }

    pub fn imu_mut(&mut self) -> &mut Lsm6<B> {
        &mut self.imu
    }

    /// One loop iteration without the trailing sleep.
    pub fn poll_once(&mut self) -> Option<StrikeEvent> {
        self.stats.polls += 1;

        if !self.imu.has_new_sample() {
            self.stats.skipped += 1;
            return None;
        }
        let accel = match self.imu.fetch_sample_in_physical_units() {
            Ok(accel) => accel,
            Err(e) => {
                log::debug!("tick skipped: {}", e);
                self.stats.skipped += 1;
                return None;
            }
        };

        let event = self.detector.update(accel.axis(self.config.axis));
        if let Some(event) = event {
            self.dispatch(event);
        }
        if event.is_some() || self.detector.state_label() != self.shown_state {
            self.refresh_display();
        }
        event
    }

    /// Poll forever at the configured rate.
    pub fn run(&mut self) -> ! {
        log::info!("Trigger task started");
        loop {
            self.tick();
        }
    }

    /// Poll `count` times at the configured rate.
    pub fn run_for(&mut self, count: u64) {
        for _ in 0..count {
            self.tick();
        }
    }

    fn tick(&mut self) {
        let tick_start = Instant::now();
        self.poll_once();

        // Sleep for the remainder of the interval to hold the poll rate.
        let elapsed = tick_start.elapsed();
        if elapsed < self.config.poll_interval {
            thread::sleep(self.config.poll_interval - elapsed);
        }
    }

    fn dispatch(&mut self, event: StrikeEvent) {
        self.metrics.record(event.magnitude);
        self.stats.strikes += 1;
        log::info!(
            "{} strike: {:.2} g on {} (avg {:.2} g)",
            self.config.pad.display_name(),
            event.magnitude,
            event.axis,
            self.metrics.current_average()
        );

        let marker = self.config.pad.marker();
        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.notify(marker) {
                log::warn!("uplink send failed: {:#}", e);
            }
        }
        if let Some(indicator) = self.indicator.as_mut() {
            indicator.pulse();
        }
    }

    fn status_fields(&self) -> [StatusField; 4] {
        let last = match self.metrics.last() {
            Some(m) => format!("{:.2} g", m),
            None => "-".to_string(),
        };
        [
            ("PAD", self.config.pad.display_name().to_string()),
            ("STATE", self.detector.state_label().to_string()),
            ("LAST", last),
            ("AVG", format!("{:.2} g", self.metrics.current_average())),
        ]
    }

    fn refresh_display(&mut self) {
        self.shown_state = self.detector.state_label();
        let fields = self.status_fields();
        if let Some(display) = self.display.as_mut() {
            if let Err(e) = display.report(&fields) {
                log::warn!("display update failed: {:#}", e);
            }
        }
    }
}
