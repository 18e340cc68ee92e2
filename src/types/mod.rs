use serde::{Deserialize, Serialize};

use crate::geometry::Point2;

/// Magnetometer sample in raw sensor units (~5 Hz).
///
/// Only the field magnitude band and the planar direction are used, so the
/// absolute scale does not matter as long as it is consistent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MagSample {
    pub timestamp_ms: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Device attitude, yaw only. `alpha` is radians when `|alpha| <= 2π + 0.5`,
/// otherwise already degrees (browser vs. native convention).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Attitude {
    pub alpha: f64,
}

/// Yaw rate in degrees per second.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RotationRate {
    pub alpha: f64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Acceleration {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Combined device-motion sample (~20 Hz). Every field is optional because
/// platforms differ in what they deliver per frame.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DeviceMotionSample {
    pub timestamp_ms: f64,
    #[serde(default)]
    pub rotation: Option<Attitude>,
    #[serde(default)]
    pub rotation_rate: Option<RotationRate>,
    #[serde(default)]
    pub acceleration: Option<Acceleration>,
    #[serde(default)]
    pub acceleration_including_gravity: Option<Acceleration>,
}

/// Cumulative pedometer reading. `steps` is monotonic for a given session.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PedometerSample {
    pub timestamp_ms: f64,
    pub steps: u64,
}

/// Single access-point observation from a Wi-Fi scan. `level` is dBm
/// (negative).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WifiReading {
    pub bssid: String,
    pub level: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WifiScanStatus {
    Ok,
    Unavailable,
    PermissionDenied,
    Error,
}

/// Result of one Wi-Fi scan. Anything other than `Ok` means "no fix this
/// interval"; the status and message are surfaced verbatim in the
/// observable state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WifiScan {
    pub timestamp_ms: f64,
    pub readings: Vec<WifiReading>,
    pub status: WifiScanStatus,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseSource {
    Pdr,
    PdrWifi,
}

/// Engine pose output. `snapped` is true iff the last snap distance was
/// within the configured maximum.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    pub heading_deg: f64,
    pub timestamp_ms: f64,
    pub source: PoseSource,
    pub snapped: bool,
}

impl Pose2D {
    pub fn position(&self) -> Point2 {
        Point2::new(self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_motion_optional_fields() {
        let json = r#"{"timestamp_ms": 100.0, "rotation_rate": {"alpha": 12.5}}"#;
        let sample: DeviceMotionSample = serde_json::from_str(json).unwrap();
        assert!(sample.rotation.is_none());
        assert!(sample.acceleration.is_none());
        assert_eq!(sample.rotation_rate.unwrap().alpha, 12.5);
    }

    #[test]
    fn test_wifi_status_wire_names() {
        let status: WifiScanStatus = serde_json::from_str(r#""permission_denied""#).unwrap();
        assert_eq!(status, WifiScanStatus::PermissionDenied);
        assert_eq!(
            serde_json::to_string(&PoseSource::PdrWifi).unwrap(),
            r#""pdr_wifi""#
        );
    }
}
