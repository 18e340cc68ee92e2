//! Per-source sensor health tracking.
//!
//! Each source records its last-seen timestamp; a source is reported
//! unavailable once it has been silent past its threshold. Wi-Fi carries
//! its scan status and message through verbatim. Time comes from the
//! caller, so replayed sessions produce the same health timeline as live
//! ones.

use serde::{Deserialize, Serialize};

use crate::types::WifiScanStatus;

/// Health of one sample source.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SourceHealth {
    pub available: bool,
    pub last_at_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<String>,
}

/// Aggregated snapshot handed to observers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SensorHealth {
    pub magnetometer: SourceHealth,
    pub device_motion: SourceHealth,
    pub pedometer: SourceHealth,
    pub wifi: SourceHealth,
    pub wifi_status: Option<WifiScanStatus>,
}

#[derive(Clone, Copy, Debug)]
pub struct SilenceThresholds {
    pub magnetometer_ms: f64,
    pub device_motion_ms: f64,
    pub pedometer_ms: f64,
    pub wifi_ms: f64,
}

impl Default for SilenceThresholds {
    fn default() -> Self {
        SilenceThresholds {
            magnetometer_ms: 3_000.0,
            device_motion_ms: 2_000.0,
            // Pedometers report sporadically; give them a long leash
            pedometer_ms: 30_000.0,
            wifi_ms: 10_000.0,
        }
    }
}

#[derive(Clone, Debug, Default)]
struct SourceState {
    last_at_ms: Option<f64>,
    error: Option<String>,
    permission: Option<String>,
}

impl SourceState {
    fn health(&self, now_ms: f64, threshold_ms: f64) -> SourceHealth {
        let available = self
            .last_at_ms
            .map_or(false, |t| now_ms - t <= threshold_ms)
            && self.error.is_none();
        SourceHealth {
            available,
            last_at_ms: self.last_at_ms,
            error: self.error.clone(),
            permission: self.permission.clone(),
        }
    }
}

pub struct SensorHealthTracker {
    thresholds: SilenceThresholds,
    magnetometer: SourceState,
    device_motion: SourceState,
    pedometer: SourceState,
    wifi: SourceState,
    wifi_status: Option<WifiScanStatus>,
}

impl SensorHealthTracker {
    pub fn new(thresholds: SilenceThresholds) -> Self {
        SensorHealthTracker {
            thresholds,
            magnetometer: SourceState::default(),
            device_motion: SourceState::default(),
            pedometer: SourceState::default(),
            wifi: SourceState::default(),
            wifi_status: None,
        }
    }

    pub fn note_magnetometer(&mut self, now_ms: f64) {
        self.magnetometer.last_at_ms = Some(now_ms);
        self.magnetometer.error = None;
    }

    pub fn note_device_motion(&mut self, now_ms: f64) {
        self.device_motion.last_at_ms = Some(now_ms);
        self.device_motion.error = None;
    }

    pub fn note_pedometer(&mut self, now_ms: f64) {
        self.pedometer.last_at_ms = Some(now_ms);
        self.pedometer.error = None;
    }

    /// Record a scan outcome. Non-`Ok` statuses keep the timestamp (the
    /// scanner did respond) but surface as errors or permission notes.
    pub fn note_wifi(&mut self, now_ms: f64, status: WifiScanStatus, message: Option<&str>) {
        self.wifi.last_at_ms = Some(now_ms);
        self.wifi_status = Some(status);
        match status {
            WifiScanStatus::Ok => {
                self.wifi.error = None;
                self.wifi.permission = None;
            }
            WifiScanStatus::PermissionDenied => {
                self.wifi.error = None;
                self.wifi.permission =
                    Some(message.unwrap_or("permission denied").to_string());
            }
            WifiScanStatus::Unavailable | WifiScanStatus::Error => {
                self.wifi.error = Some(message.unwrap_or("scan failed").to_string());
            }
        }
    }

    pub fn snapshot(&self, now_ms: f64) -> SensorHealth {
        SensorHealth {
            magnetometer: self
                .magnetometer
                .health(now_ms, self.thresholds.magnetometer_ms),
            device_motion: self
                .device_motion
                .health(now_ms, self.thresholds.device_motion_ms),
            pedometer: self.pedometer.health(now_ms, self.thresholds.pedometer_ms),
            wifi: self.wifi.health(now_ms, self.thresholds.wifi_ms),
            wifi_status: self.wifi_status,
        }
    }
}

impl Default for SensorHealthTracker {
    fn default() -> Self {
        Self::new(SilenceThresholds::default())
    }
}
