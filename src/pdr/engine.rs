//! Pedestrian dead reckoning engine.
//!
//! Combines the heading fusion and the step detector and merges in an
//! external pedometer. The pedometer is the fallback step source: its
//! deltas are suppressed whenever device motion produced a step recently,
//! so a phone that counts steps in both places does not double-count.

use crate::pdr::heading::HeadingFusion;
use crate::pdr::steps::StepDetector;
use crate::types::{DeviceMotionSample, MagSample, PedometerSample};

/// Window after a device-motion step during which pedometer deltas are
/// discarded.
const PEDOMETER_SUPPRESS_MS: f64 = 1800.0;

pub const STRIDE_SCALE_MIN: f64 = 0.6;
pub const STRIDE_SCALE_MAX: f64 = 1.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepSource {
    DeviceMotion,
    Pedometer,
}

/// One step emitted by the engine, already scaled to meters.
#[derive(Clone, Copy, Debug)]
pub struct PdrStep {
    pub timestamp_ms: f64,
    pub length_m: f64,
    pub heading_deg: f64,
    pub source: StepSource,
}

pub struct PdrEngine {
    heading: HeadingFusion,
    steps: StepDetector,
    stride_scale: f64,
    last_device_step_ms: Option<f64>,
    last_pedometer_count: Option<u64>,
}

impl PdrEngine {
    pub fn new() -> Self {
        PdrEngine {
            heading: HeadingFusion::new(0.0),
            steps: StepDetector::new(),
            stride_scale: 1.0,
            last_device_step_ms: None,
            last_pedometer_count: None,
        }
    }

    /// Reset all internals. Heading restarts at the supplied angle, or 0°.
    pub fn reset(&mut self, initial_heading_deg: Option<f64>) {
        self.heading.reset(initial_heading_deg.unwrap_or(0.0));
        self.steps.reset();
        self.last_device_step_ms = None;
        self.last_pedometer_count = None;
    }

    pub fn heading_deg(&self) -> f64 {
        self.heading.heading_deg()
    }

    pub fn mag_heading_deg(&self) -> f64 {
        self.heading.mag_heading_deg()
    }

    pub fn mag_reliability(&self) -> f64 {
        self.heading.mag_reliability()
    }

    pub fn yaw_rate_dps(&self) -> f64 {
        self.heading.yaw_rate_dps()
    }

    pub fn is_stationary(&self) -> bool {
        self.steps.is_stationary()
    }

    pub fn stride_scale(&self) -> f64 {
        self.stride_scale
    }

    pub fn last_device_step_ms(&self) -> Option<f64> {
        self.last_device_step_ms
    }

    pub fn set_stride_scale(&mut self, scale: f64) {
        self.stride_scale = scale.clamp(STRIDE_SCALE_MIN, STRIDE_SCALE_MAX);
        self.steps.set_stride_scale(self.stride_scale);
    }

    pub fn align_heading_to_mag(&mut self) {
        self.heading.align_to_mag();
    }

    pub fn feed_mag(&mut self, sample: &MagSample) {
        self.heading.feed_mag(sample);
    }

    /// Ingest a device-motion frame: heading first, then step detection,
    /// so an emitted step carries the heading it was walked on.
    pub fn feed_device_motion(&mut self, sample: &DeviceMotionSample) -> Vec<PdrStep> {
        self.heading.feed_motion(
            sample.rotation.map(|r| r.alpha),
            sample.rotation_rate.map(|r| r.alpha),
            sample.timestamp_ms,
        );

        let detected = self.steps.feed(
            sample.acceleration.as_ref(),
            sample.acceleration_including_gravity.as_ref(),
            sample.timestamp_ms,
        );

        match detected {
            Some(step) => {
                self.last_device_step_ms = Some(step.timestamp_ms);
                vec![PdrStep {
                    timestamp_ms: step.timestamp_ms,
                    length_m: step.length_m,
                    heading_deg: self.heading.heading_deg(),
                    source: StepSource::DeviceMotion,
                }]
            }
            None => Vec::new(),
        }
    }

    /// Ingest a cumulative pedometer count. Emits one step per counted
    /// delta unless device motion stepped within the suppression window.
    pub fn feed_pedometer(&mut self, sample: &PedometerSample) -> Vec<PdrStep> {
        let delta = match self.last_pedometer_count {
            None => 0,
            Some(prev) => sample.steps.saturating_sub(prev),
        };
        self.last_pedometer_count = Some(sample.steps);
        if delta == 0 {
            return Vec::new();
        }

        let suppressed = self
            .last_device_step_ms
            .map_or(false, |t| sample.timestamp_ms - t < PEDOMETER_SUPPRESS_MS);
        if suppressed {
            return Vec::new();
        }

        let length = self.steps.neutral_stride_m();
        let heading = self.heading.heading_deg();
        (0..delta)
            .map(|_| PdrStep {
                timestamp_ms: sample.timestamp_ms,
                length_m: length,
                heading_deg: heading,
                source: StepSource::Pedometer,
            })
            .collect()
    }
}

impl Default for PdrEngine {
    fn default() -> Self {
        Self::new()
    }
}
