//! Heading fusion: magnetometer direction blended into a gyro-driven yaw.
//!
//! The magnetometer is treated as a slow, unreliable absolute reference;
//! device-motion attitude and yaw rate carry the short-term dynamics. A
//! reliability score gates how hard the magnetic heading is allowed to
//! pull, and the pull is further reduced during fast turns where soft-iron
//! distortion is worst.

use crate::geometry::{heading_diff, low_pass_heading, wrap_heading};
use crate::types::MagSample;

const FIELD_EMA_ALPHA: f64 = 0.08;
const RELIABILITY_BLEND: f64 = 0.15;
const FIELD_BAND_LOW: f64 = 15.0;
const FIELD_BAND_HIGH: f64 = 80.0;
const ATTITUDE_NUDGE_LIMIT_DEG: f64 = 20.0;
const FAST_TURN_DPS: f64 = 140.0;

/// Interpret an attitude yaw value: radians when within `[-2π-0.5, 2π+0.5]`,
/// otherwise already degrees.
pub(crate) fn attitude_to_degrees(alpha: f64) -> f64 {
    if alpha.abs() <= std::f64::consts::TAU + 0.5 {
        alpha.to_degrees()
    } else {
        alpha
    }
}

pub struct HeadingFusion {
    heading: f64,
    gyro_heading: f64,
    mag_heading: f64,
    field_ema: Option<f64>,
    reliability: f64,
    yaw_rate_dps: f64,
    last_motion_ms: Option<f64>,
}

impl HeadingFusion {
    pub fn new(initial_heading_deg: f64) -> Self {
        let h = wrap_heading(initial_heading_deg);
        HeadingFusion {
            heading: h,
            gyro_heading: h,
            mag_heading: h,
            field_ema: None,
            reliability: 0.0,
            yaw_rate_dps: 0.0,
            last_motion_ms: None,
        }
    }

    pub fn reset(&mut self, initial_heading_deg: f64) {
        *self = HeadingFusion::new(initial_heading_deg);
    }

    /// Fused heading in degrees, `[0, 360)`.
    pub fn heading_deg(&self) -> f64 {
        self.heading
    }

    /// Smoothed magnetic heading in degrees, `[0, 360)`.
    pub fn mag_heading_deg(&self) -> f64 {
        self.mag_heading
    }

    /// Magnetic reliability in `[0, 1]`. Zero until the field magnitude
    /// settles into the plausible band.
    pub fn mag_reliability(&self) -> f64 {
        self.reliability
    }

    /// Most recent yaw rate in degrees per second.
    pub fn yaw_rate_dps(&self) -> f64 {
        self.yaw_rate_dps
    }

    /// Snap the fused heading onto the current magnetic heading.
    pub fn align_to_mag(&mut self) {
        self.heading = self.mag_heading;
        self.gyro_heading = self.mag_heading;
    }

    /// Ingest a magnetometer sample: update the field-magnitude EMA, the
    /// reliability score and the smoothed magnetic heading.
    pub fn feed_mag(&mut self, sample: &MagSample) {
        let magnitude = (sample.x * sample.x + sample.y * sample.y + sample.z * sample.z).sqrt();
        if !magnitude.is_finite() {
            return;
        }

        let ema = match self.field_ema {
            None => magnitude,
            Some(prev) => prev + FIELD_EMA_ALPHA * (magnitude - prev),
        };
        self.field_ema = Some(ema);

        let in_band = ema > FIELD_BAND_LOW && ema < FIELD_BAND_HIGH;
        let instant = if in_band {
            let deviation = (magnitude - ema).abs();
            (1.0 - deviation / (0.35 * ema.max(1.0))).clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.reliability =
            (1.0 - RELIABILITY_BLEND) * self.reliability + RELIABILITY_BLEND * instant;

        let candidate = wrap_heading(sample.y.atan2(sample.x).to_degrees());
        let alpha = 0.03 + 0.09 * self.reliability;
        self.mag_heading = low_pass_heading(self.mag_heading, candidate, alpha);
    }

    /// Ingest one device-motion frame. Attitude is applied before yaw-rate
    /// integration; the ordering is part of the contract because the two
    /// updates do not commute.
    pub fn feed_motion(
        &mut self,
        attitude_yaw: Option<f64>,
        yaw_rate_dps: Option<f64>,
        timestamp_ms: f64,
    ) {
        if let Some(alpha) = attitude_yaw {
            if alpha.is_finite() {
                self.gyro_heading = wrap_heading(attitude_to_degrees(alpha));
                let nudge = heading_diff(self.gyro_heading, self.heading)
                    .clamp(-ATTITUDE_NUDGE_LIMIT_DEG, ATTITUDE_NUDGE_LIMIT_DEG);
                self.heading = wrap_heading(self.heading + nudge);
            }
        }

        if let Some(rate) = yaw_rate_dps {
            if rate.is_finite() {
                self.yaw_rate_dps = rate;
                if let Some(prev_ms) = self.last_motion_ms {
                    let dt_s = ((timestamp_ms - prev_ms) / 1000.0).clamp(0.001, 0.2);
                    self.heading = wrap_heading(self.heading + rate * dt_s);
                }
            }
        }
        self.last_motion_ms = Some(timestamp_ms);

        // Slow magnetic correction, suppressed during fast turns
        let turn_factor = if self.yaw_rate_dps.abs() > FAST_TURN_DPS {
            0.2
        } else {
            1.0
        };
        let gain = (0.008 + 0.05 * self.reliability) * turn_factor;
        self.heading =
            wrap_heading(self.heading + heading_diff(self.mag_heading, self.heading) * gain);
    }
}
