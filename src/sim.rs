//! Simulated sensor source for the demo binary.
//!
//! Walks a scripted polyline and emits the sample streams a phone would
//! produce along the way: 20 Hz device motion with a heel-strike spike per
//! step, 5 Hz magnetometer aligned with the walk heading, a cumulative
//! pedometer and periodic Wi-Fi scans synthesized from anchor distances.
//! Lets the whole engine run end to end with no hardware attached.

use tokio::sync::mpsc::Sender;
use tokio::time::{sleep, Duration};

use crate::geometry::{bearing, heading_diff, wrap_heading, Point2};
use crate::store_map::StoreMapAnchor;
use crate::types::{
    Acceleration, Attitude, DeviceMotionSample, MagSample, PedometerSample, RotationRate,
    WifiReading, WifiScan, WifiScanStatus,
};

/// One queued input for the session loop, in the order it was generated.
#[derive(Clone, Debug)]
pub enum SensorEvent {
    Mag(MagSample),
    Motion(DeviceMotionSample),
    Pedometer(PedometerSample),
    Wifi(WifiScan),
    /// Walk finished; no more samples will follow.
    Done,
}

#[derive(Clone, Copy, Debug)]
pub struct WalkConfig {
    pub step_period_ms: f64,
    pub step_length_m: f64,
    pub motion_interval_ms: f64,
    pub mag_interval_ms: f64,
    pub pedometer_interval_ms: f64,
    pub wifi_interval_ms: f64,
    /// Max simulated turn rate at corners, deg/s.
    pub turn_rate_dps: f64,
    /// Magnetic field magnitude fed to the engine (in the trusted band).
    pub field_magnitude: f64,
    /// Wall-clock speedup: 10 means the walk plays at 10x real time.
    pub time_scale: f64,
}

impl Default for WalkConfig {
    fn default() -> Self {
        WalkConfig {
            step_period_ms: 650.0,
            step_length_m: 0.65,
            motion_interval_ms: 50.0,
            mag_interval_ms: 200.0,
            pedometer_interval_ms: 3000.0,
            wifi_interval_ms: 3500.0,
            turn_rate_dps: 120.0,
            field_magnitude: 45.0,
            time_scale: 10.0,
        }
    }
}

/// Position walking along a polyline.
struct Walker {
    waypoints: Vec<Point2>,
    segment: usize,
    along_m: f64,
}

impl Walker {
    fn new(waypoints: Vec<Point2>) -> Self {
        Walker {
            waypoints,
            segment: 0,
            along_m: 0.0,
        }
    }

    fn finished(&self) -> bool {
        self.waypoints.len() < 2 || self.segment >= self.waypoints.len() - 1
    }

    fn position(&self) -> Point2 {
        if self.waypoints.is_empty() {
            return Point2::new(0.0, 0.0);
        }
        if self.finished() {
            return *self.waypoints.last().unwrap();
        }
        let a = self.waypoints[self.segment];
        let b = self.waypoints[self.segment + 1];
        let len = a.distance_to(b);
        if len <= 0.0 {
            return a;
        }
        let t = (self.along_m / len).clamp(0.0, 1.0);
        Point2::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t)
    }

    fn segment_heading(&self) -> f64 {
        if self.waypoints.len() < 2 {
            return 0.0;
        }
        let i = self.segment.min(self.waypoints.len() - 2);
        bearing(self.waypoints[i], self.waypoints[i + 1])
    }

    fn advance(&mut self, mut distance_m: f64) {
        while distance_m > 0.0 && !self.finished() {
            let a = self.waypoints[self.segment];
            let b = self.waypoints[self.segment + 1];
            let remaining = a.distance_to(b) - self.along_m;
            if distance_m < remaining {
                self.along_m += distance_m;
                return;
            }
            distance_m -= remaining;
            self.segment += 1;
            self.along_m = 0.0;
        }
    }
}

fn rssi_for(anchor: &StoreMapAnchor, position: Point2) -> f64 {
    let d = position.distance_to(anchor.point());
    (-45.0 - 25.0 * (1.0 + d).log10()).max(-95.0)
}

/// Walk `waypoints` and stream samples into `tx` until the end of the
/// path, then a couple of quiet seconds, then `Done`.
pub async fn simulated_walk(
    tx: Sender<SensorEvent>,
    waypoints: Vec<Point2>,
    anchors: Vec<StoreMapAnchor>,
    config: WalkConfig,
) {
    let mut walker = Walker::new(waypoints);
    let mut device_heading = walker.segment_heading();

    let mut t_ms = 0.0;
    let mut next_step_ms = config.step_period_ms;
    let mut next_mag_ms = 0.0;
    let mut next_pedometer_ms = config.pedometer_interval_ms;
    let mut next_wifi_ms = config.wifi_interval_ms;
    let mut quiet_until_ms = f64::INFINITY;
    let mut pedometer_total: u64 = 0;

    loop {
        // Heading eases toward the current corridor at a bounded rate
        let target = walker.segment_heading();
        let dt_s = config.motion_interval_ms / 1000.0;
        let max_turn = config.turn_rate_dps * dt_s;
        let turn = heading_diff(target, device_heading).clamp(-max_turn, max_turn);
        device_heading = wrap_heading(device_heading + turn);
        let yaw_rate_dps = turn / dt_s;

        // Heel strike on step boundaries while still walking
        let striking = !walker.finished() && t_ms >= next_step_ms;
        if striking {
            next_step_ms += config.step_period_ms;
            walker.advance(config.step_length_m);
            pedometer_total += 1;
            if walker.finished() {
                quiet_until_ms = t_ms + 2000.0;
            }
        }

        let accel_mag = if striking { 1.2 } else { 0.05 };
        let motion = DeviceMotionSample {
            timestamp_ms: t_ms,
            rotation: Some(Attitude {
                alpha: device_heading.to_radians(),
            }),
            rotation_rate: Some(RotationRate { alpha: yaw_rate_dps }),
            acceleration: Some(Acceleration {
                x: accel_mag,
                y: 0.0,
                z: 0.0,
            }),
            acceleration_including_gravity: Some(Acceleration {
                x: accel_mag,
                y: 0.0,
                z: 9.81,
            }),
        };
        if tx.send(SensorEvent::Motion(motion)).await.is_err() {
            return;
        }

        if t_ms >= next_mag_ms {
            next_mag_ms += config.mag_interval_ms;
            let rad = device_heading.to_radians();
            let mag = MagSample {
                timestamp_ms: t_ms,
                x: config.field_magnitude * rad.cos(),
                y: config.field_magnitude * rad.sin(),
                z: 0.0,
            };
            if tx.send(SensorEvent::Mag(mag)).await.is_err() {
                return;
            }
        }

        if t_ms >= next_pedometer_ms {
            next_pedometer_ms += config.pedometer_interval_ms;
            let sample = PedometerSample {
                timestamp_ms: t_ms,
                steps: pedometer_total,
            };
            if tx.send(SensorEvent::Pedometer(sample)).await.is_err() {
                return;
            }
        }

        if t_ms >= next_wifi_ms {
            next_wifi_ms += config.wifi_interval_ms;
            let position = walker.position();
            let scan = WifiScan {
                timestamp_ms: t_ms,
                readings: anchors
                    .iter()
                    .map(|anchor| WifiReading {
                        bssid: anchor.bssid.clone(),
                        level: rssi_for(anchor, position),
                    })
                    .collect(),
                status: WifiScanStatus::Ok,
                message: None,
            };
            if tx.send(SensorEvent::Wifi(scan)).await.is_err() {
                return;
            }
        }

        if walker.finished() && t_ms >= quiet_until_ms {
            let _ = tx.send(SensorEvent::Done).await;
            return;
        }

        t_ms += config.motion_interval_ms;
        sleep(Duration::from_millis(
            (config.motion_interval_ms / config.time_scale).max(1.0) as u64,
        ))
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walker_advances_across_segments() {
        let mut walker = Walker::new(vec![
            Point2::new(0.0, 0.0),
            Point2::new(5.0, 0.0),
            Point2::new(5.0, 5.0),
        ]);
        walker.advance(7.0);
        assert!(!walker.finished());
        let p = walker.position();
        assert!((p.x - 5.0).abs() < 1e-9);
        assert!((p.y - 2.0).abs() < 1e-9);

        walker.advance(10.0);
        assert!(walker.finished());
        assert_eq!(walker.position(), Point2::new(5.0, 5.0));
    }

    #[test]
    fn test_walker_heading_follows_segment() {
        let mut walker = Walker::new(vec![
            Point2::new(0.0, 0.0),
            Point2::new(5.0, 0.0),
            Point2::new(5.0, 5.0),
        ]);
        assert!((walker.segment_heading() - 90.0).abs() < 1e-9);
        walker.advance(6.0);
        assert!((walker.segment_heading() - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_rssi_model_monotonic() {
        let anchor = StoreMapAnchor {
            bssid: "ap".to_string(),
            label: "AP".to_string(),
            x: 0.0,
            y: 0.0,
            floor: 0,
            source: crate::store_map::AnchorSource::Mock,
            confidence: None,
        };
        let near = rssi_for(&anchor, Point2::new(1.0, 0.0));
        let far = rssi_for(&anchor, Point2::new(25.0, 0.0));
        assert!(near > far);
        assert!(far >= -95.0);
    }
}
