//! Step detection: adaptive peak detector on linear acceleration.
//!
//! The threshold floats on a sliding window of recent acceleration
//! magnitudes so the same detector works for a phone in hand, in a pocket,
//! or on a cart handle. A refractory period and a stationarity latch keep
//! noise and fidgeting from producing phantom steps.

use std::collections::VecDeque;

use crate::types::Acceleration;

const WINDOW_LEN: usize = 35;
const GRAVITY_EMA_ALPHA: f64 = 0.08;
const THRESHOLD_SIGMA: f64 = 2.6;
const THRESHOLD_MIN: f64 = 0.06;
const THRESHOLD_MAX: f64 = 1.6;
const REFRACTORY_MS: f64 = 280.0;
const STATIONARY_AFTER_MS: f64 = 600.0;
const STRIDE_BASE_M: f64 = 0.62;
const STRIDE_GAIN: f64 = 0.18;
const STRIDE_MIN_M: f64 = 0.45;
const STRIDE_MAX_M: f64 = 1.05;

/// One detected step with its estimated length.
#[derive(Clone, Copy, Debug)]
pub struct DetectedStep {
    pub timestamp_ms: f64,
    pub length_m: f64,
    pub peak: f64,
    pub threshold: f64,
}

pub struct StepDetector {
    window: VecDeque<f64>,
    gravity: Option<[f64; 3]>,
    in_peak: bool,
    peak_max: f64,
    /// Threshold captured when the current peak was entered.
    peak_threshold: f64,
    last_step_ms: Option<f64>,
    low_since_ms: Option<f64>,
    stationary: bool,
    stride_scale: f64,
}

impl StepDetector {
    pub fn new() -> Self {
        StepDetector {
            window: VecDeque::with_capacity(WINDOW_LEN),
            gravity: None,
            in_peak: false,
            peak_max: 0.0,
            peak_threshold: 0.0,
            last_step_ms: None,
            low_since_ms: None,
            stationary: false,
            stride_scale: 1.0,
        }
    }

    pub fn reset(&mut self) {
        let scale = self.stride_scale;
        *self = StepDetector::new();
        self.stride_scale = scale;
    }

    /// Stride scale is clamped by the engine; stored as-is here.
    pub fn set_stride_scale(&mut self, scale: f64) {
        self.stride_scale = scale;
    }

    pub fn is_stationary(&self) -> bool {
        self.stationary
    }

    /// Neutral stride length for steps reported by an external pedometer,
    /// where no peak amplitude is available.
    pub fn neutral_stride_m(&self) -> f64 {
        STRIDE_BASE_M * self.stride_scale
    }

    /// Feed one device-motion frame. Prefers device-reported linear
    /// acceleration; falls back to gravity-EMA subtraction on the
    /// including-gravity signal. Returns a step on a qualifying peak exit.
    ///
    /// The mean/std window describes the samples *before* the current one,
    /// so a heel strike is compared against the quiet signal it interrupts.
    pub fn feed(
        &mut self,
        linear: Option<&Acceleration>,
        including_gravity: Option<&Acceleration>,
        timestamp_ms: f64,
    ) -> Option<DetectedStep> {
        let magnitude = match (linear, including_gravity) {
            (Some(a), _) => (a.x * a.x + a.y * a.y + a.z * a.z).sqrt(),
            (None, Some(g)) => self.high_pass_magnitude(g),
            (None, None) => return None,
        };
        if !magnitude.is_finite() {
            return None;
        }

        let (mean, std) = self.window_stats();
        let threshold = (mean + THRESHOLD_SIGMA * std).clamp(THRESHOLD_MIN, THRESHOLD_MAX);

        self.update_stationarity(magnitude, threshold, timestamp_ms);

        let step = self.detect(magnitude, mean, threshold, timestamp_ms);

        self.window.push_back(magnitude);
        if self.window.len() > WINDOW_LEN {
            self.window.pop_front();
        }

        step
    }

    fn detect(
        &mut self,
        magnitude: f64,
        mean: f64,
        threshold: f64,
        timestamp_ms: f64,
    ) -> Option<DetectedStep> {
        if !self.in_peak {
            if magnitude > threshold {
                self.in_peak = true;
                self.peak_max = magnitude;
                self.peak_threshold = threshold;
            }
            return None;
        }

        self.peak_max = self.peak_max.max(magnitude);
        if magnitude >= mean {
            return None;
        }
        self.in_peak = false;

        let refractory_ok = self
            .last_step_ms
            .map_or(true, |last| timestamp_ms - last > REFRACTORY_MS);
        if !refractory_ok || self.peak_max <= self.peak_threshold || self.stationary {
            return None;
        }

        self.last_step_ms = Some(timestamp_ms);
        let length = (STRIDE_BASE_M + STRIDE_GAIN * (self.peak_max - self.peak_threshold))
            .clamp(STRIDE_MIN_M, STRIDE_MAX_M)
            * self.stride_scale;
        Some(DetectedStep {
            timestamp_ms,
            length_m: length,
            peak: self.peak_max,
            threshold: self.peak_threshold,
        })
    }

    fn high_pass_magnitude(&mut self, g: &Acceleration) -> f64 {
        let gravity = self.gravity.get_or_insert([g.x, g.y, g.z]);
        gravity[0] += GRAVITY_EMA_ALPHA * (g.x - gravity[0]);
        gravity[1] += GRAVITY_EMA_ALPHA * (g.y - gravity[1]);
        gravity[2] += GRAVITY_EMA_ALPHA * (g.z - gravity[2]);
        let lx = g.x - gravity[0];
        let ly = g.y - gravity[1];
        let lz = g.z - gravity[2];
        (lx * lx + ly * ly + lz * lz).sqrt()
    }

    fn window_stats(&self) -> (f64, f64) {
        let n = self.window.len();
        if n == 0 {
            return (0.0, 0.0);
        }
        let mean = self.window.iter().sum::<f64>() / n as f64;
        if n < 2 {
            return (mean, 0.0);
        }
        let variance = self
            .window
            .iter()
            .map(|v| (v - mean) * (v - mean))
            .sum::<f64>()
            / (n - 1) as f64;
        (mean, variance.sqrt())
    }

    fn update_stationarity(&mut self, magnitude: f64, threshold: f64, timestamp_ms: f64) {
        if magnitude < (0.25 * threshold).max(0.02) {
            let since = *self.low_since_ms.get_or_insert(timestamp_ms);
            if timestamp_ms - since >= STATIONARY_AFTER_MS {
                self.stationary = true;
            }
        } else {
            self.low_since_ms = None;
            self.stationary = false;
        }
    }
}

impl Default for StepDetector {
    fn default() -> Self {
        Self::new()
    }
}
