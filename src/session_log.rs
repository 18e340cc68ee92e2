//! Session recording and live status snapshots.
//!
//! The demo binary records every sample it feeds plus every pose and
//! instruction it gets back; the export can then be replayed offline with
//! different snapping or reroute parameters. The live status file is a
//! small JSON blob overwritten every few seconds for dashboards to poll.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::positioning::ConfidenceTier;
use crate::sensor_health::SensorHealth;
use crate::types::{DeviceMotionSample, MagSample, PedometerSample, Pose2D, WifiScan};

/// One recorded input event. Exactly one field is set per record.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RecordedSample {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mag: Option<MagSample>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_motion: Option<DeviceMotionSample>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pedometer: Option<PedometerSample>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wifi: Option<WifiScan>,
}

impl RecordedSample {
    pub fn timestamp_ms(&self) -> f64 {
        if let Some(s) = &self.mag {
            s.timestamp_ms
        } else if let Some(s) = &self.device_motion {
            s.timestamp_ms
        } else if let Some(s) = &self.pedometer {
            s.timestamp_ms
        } else if let Some(s) = &self.wifi {
            s.timestamp_ms
        } else {
            0.0
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstructionRecord {
    pub timestamp_ms: f64,
    pub text: String,
    pub distance_to_next: f64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionStats {
    pub steps: u64,
    pub wifi_fixes: u64,
    pub reroutes: u64,
    pub poses: u64,
    pub snapped_poses: u64,
    pub final_pose: Option<Pose2D>,
    pub route_length_meters: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionExport {
    pub map_id: String,
    pub started_at: String,
    pub samples: Vec<RecordedSample>,
    pub poses: Vec<Pose2D>,
    pub instructions: Vec<InstructionRecord>,
    pub stats: SessionStats,
}

impl SessionExport {
    pub fn new(map_id: &str, started_at: String) -> Self {
        SessionExport {
            map_id: map_id.to_string(),
            started_at,
            samples: Vec::new(),
            poses: Vec::new(),
            instructions: Vec::new(),
            stats: SessionStats::default(),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
    }

    /// Save gzip-compressed (`.json.gz`).
    pub fn save_gz(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_vec(self)?;
        let file = fs::File::create(path)?;
        let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        encoder.write_all(&json)?;
        encoder.finish()?;
        Ok(())
    }

    /// Drop the bulky per-sample data after an autosave so memory stays
    /// bounded on long sessions. Stats and counters survive.
    pub fn clear_buffers(&mut self) {
        self.samples.clear();
        self.poses.clear();
        self.instructions.clear();
    }
}

/// Small status blob periodically written for external dashboards.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LiveStatus {
    pub timestamp_ms: f64,
    pub uptime_seconds: u64,
    pub pose: Option<Pose2D>,
    pub tier: ConfidenceTier,
    pub step_count: u64,
    pub wifi_fix_count: u64,
    pub off_route: bool,
    pub next_instruction: String,
    pub route_length_meters: Option<f64>,
    pub health: Option<SensorHealth>,
}

impl LiveStatus {
    pub fn new() -> Self {
        LiveStatus {
            timestamp_ms: 0.0,
            uptime_seconds: 0,
            pose: None,
            tier: ConfidenceTier::Low,
            step_count: 0,
            wifi_fix_count: 0,
            off_route: false,
            next_instruction: "Select a destination".to_string(),
            route_length_meters: None,
            health: None,
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
    }
}

impl Default for LiveStatus {
    fn default() -> Self {
        Self::new()
    }
}
