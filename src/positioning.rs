//! Positioning service: PDR -> Kalman -> snap orchestration.
//!
//! Pure computation layer. Samples come in through `feed_*` methods,
//! pose and path events come out; no runtime, timers or I/O in here, so
//! the whole service can be driven from recorded data byte-for-byte the
//! same as from live sensors.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::filters::Kalman2D;
use crate::geometry::{low_pass_heading, Point2};
use crate::pdr::{PdrEngine, PdrStep};
use crate::sensor_health::{SensorHealth, SensorHealthTracker, SilenceThresholds};
use crate::store_map::{GraphSnapper, SnapConfig, SnapResult, StoreGraph};
use crate::types::{
    DeviceMotionSample, MagSample, PedometerSample, Pose2D, PoseSource, WifiScan, WifiScanStatus,
};
use crate::wifi_fix::compute_fix;

/// Upper bound on steps applied from a single sample event.
const MAX_STEPS_PER_EVENT: usize = 20;
/// Pose history kept for the breadcrumb trail.
const PATH_BUFFER_LEN: usize = 240;
/// Reported heading smoothing factor.
const HEADING_SMOOTHING: f64 = 0.18;
/// A Wi-Fi fix this far from the filter with high confidence relocates
/// instead of updating.
const HARD_RESET_DISTANCE_M: f64 = 10.0;
const HARD_RESET_CONFIDENCE: f64 = 0.75;
/// A step within this window counts as "recently walking" for the tier.
const RECENT_STEP_MS: f64 = 1800.0;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PositioningConfig {
    pub start: Point2,
    pub stride_scale: f64,
    pub wifi_enabled: bool,
    pub wifi_scan_interval_ms: f64,
    pub snap: SnapConfig,
}

impl Default for PositioningConfig {
    fn default() -> Self {
        PositioningConfig {
            start: Point2::new(0.0, 0.0),
            stride_scale: 1.0,
            wifi_enabled: true,
            wifi_scan_interval_ms: 3500.0,
            snap: SnapConfig::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    Good,
    Ok,
    Low,
}

#[derive(Clone, Debug)]
pub enum PositioningEvent {
    Pose(Pose2D),
    PathPoint(Point2),
    WifiFixApplied {
        position: Point2,
        confidence: f64,
        matched: usize,
        meas_sigma: f64,
    },
    WifiHardReset {
        position: Point2,
        confidence: f64,
        jump_meters: f64,
    },
    WifiScanIgnored {
        status: WifiScanStatus,
        message: Option<String>,
    },
}

pub struct PositioningService {
    graph: Arc<StoreGraph>,
    config: PositioningConfig,
    pdr: PdrEngine,
    kalman: Option<Kalman2D>,
    snapper: GraphSnapper,
    /// Raw (unsnapped) position estimate; mirrors the Kalman center when
    /// Wi-Fi is enabled.
    position: Point2,
    reported_heading: f64,
    last_pose: Option<Pose2D>,
    last_snap: Option<SnapResult>,
    path: VecDeque<Point2>,
    health: SensorHealthTracker,
    last_step_ms: Option<f64>,
    step_count: u64,
    wifi_fix_count: u64,
    stopped: bool,
}

impl PositioningService {
    pub fn new(graph: Arc<StoreGraph>, config: PositioningConfig) -> Self {
        let mut pdr = PdrEngine::new();
        pdr.set_stride_scale(config.stride_scale);
        let kalman = config
            .wifi_enabled
            .then(|| Kalman2D::new(config.start, Kalman2D::DEFAULT_POS_SIGMA));
        let snapper = GraphSnapper::new(graph.clone(), config.snap);
        let mut path = VecDeque::with_capacity(PATH_BUFFER_LEN);
        path.push_back(config.start);

        PositioningService {
            position: config.start,
            reported_heading: 0.0,
            last_pose: None,
            last_snap: None,
            path,
            pdr,
            kalman,
            snapper,
            graph,
            config,
            health: SensorHealthTracker::new(SilenceThresholds::default()),
            last_step_ms: None,
            step_count: 0,
            wifi_fix_count: 0,
            stopped: false,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn pose(&self) -> Option<Pose2D> {
        self.last_pose
    }

    pub fn position(&self) -> Point2 {
        self.position
    }

    pub fn heading_deg(&self) -> f64 {
        self.pdr.heading_deg()
    }

    pub fn mag_reliability(&self) -> f64 {
        self.pdr.mag_reliability()
    }

    pub fn path(&self) -> &VecDeque<Point2> {
        &self.path
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn wifi_fix_count(&self) -> u64 {
        self.wifi_fix_count
    }

    pub fn graph(&self) -> &Arc<StoreGraph> {
        &self.graph
    }

    pub fn config(&self) -> &PositioningConfig {
        &self.config
    }

    pub fn last_snap(&self) -> Option<&SnapResult> {
        self.last_snap.as_ref()
    }

    pub fn sensor_health(&self, now_ms: f64) -> SensorHealth {
        self.health.snapshot(now_ms)
    }

    /// Coarse quality tier for the current estimate.
    pub fn confidence_tier(&self, now_ms: f64) -> ConfidenceTier {
        let mut score = 0.35;
        if self
            .last_step_ms
            .map_or(false, |t| now_ms - t <= RECENT_STEP_MS)
        {
            score += 0.25;
        }
        if !self.pdr.is_stationary() {
            score += 0.10;
        }
        score += (self.pdr.mag_reliability() - 0.5) * 0.35;
        if self.pdr.yaw_rate_dps().abs() > 280.0 {
            score -= 0.08;
        }

        if score > 0.72 {
            ConfidenceTier::Good
        } else if score > 0.45 {
            ConfidenceTier::Ok
        } else {
            ConfidenceTier::Low
        }
    }

    // ── Commands ─────────────────────────────────────────────────────────

    /// Relocate to `p`: PDR restarts at heading 0, the path buffer is
    /// replaced and the Kalman filter is re-seeded.
    pub fn reset_to(&mut self, p: Point2, now_ms: f64) {
        self.pdr.reset(None);
        self.position = p;
        self.reported_heading = 0.0;
        if let Some(kalman) = self.kalman.as_mut() {
            kalman.reset(p, Kalman2D::DEFAULT_POS_SIGMA);
        }
        self.snapper.reset();
        self.path.clear();
        self.path.push_back(p);
        self.last_snap = None;
        self.last_step_ms = None;
        self.last_pose = Some(Pose2D {
            x: p.x,
            y: p.y,
            heading_deg: 0.0,
            timestamp_ms: now_ms,
            source: PoseSource::Pdr,
            snapped: false,
        });
    }

    pub fn align_heading_to_mag(&mut self) {
        self.pdr.align_heading_to_mag();
    }

    pub fn set_stride_scale(&mut self, scale: f64) {
        self.pdr.set_stride_scale(scale);
        self.config.stride_scale = self.pdr.stride_scale();
    }

    /// Toggle Wi-Fi integration. Disabling drops the Kalman filter;
    /// enabling re-seeds it at the current position. The graph, anchors
    /// and PDR heading are untouched either way.
    pub fn set_wifi_enabled(&mut self, enabled: bool) {
        if self.config.wifi_enabled == enabled {
            return;
        }
        self.config.wifi_enabled = enabled;
        self.kalman = enabled
            .then(|| Kalman2D::new(self.position, Kalman2D::DEFAULT_POS_SIGMA));
    }

    /// Stop the session: any callback arriving afterwards is discarded.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    // ── Sample feeds ─────────────────────────────────────────────────────

    pub fn feed_mag(&mut self, sample: &MagSample) {
        if self.stopped {
            return;
        }
        self.health.note_magnetometer(sample.timestamp_ms);
        self.pdr.feed_mag(sample);
    }

    pub fn feed_device_motion(&mut self, sample: &DeviceMotionSample) -> Vec<PositioningEvent> {
        if self.stopped {
            return Vec::new();
        }
        self.health.note_device_motion(sample.timestamp_ms);
        let steps = self.pdr.feed_device_motion(sample);
        self.apply_steps(&steps, sample.timestamp_ms)
    }

    pub fn feed_pedometer(&mut self, sample: &PedometerSample) -> Vec<PositioningEvent> {
        if self.stopped {
            return Vec::new();
        }
        self.health.note_pedometer(sample.timestamp_ms);
        let steps = self.pdr.feed_pedometer(sample);
        self.apply_steps(&steps, sample.timestamp_ms)
    }

    pub fn feed_wifi_scan(&mut self, scan: &WifiScan) -> Vec<PositioningEvent> {
        if self.stopped {
            return Vec::new();
        }
        self.health
            .note_wifi(scan.timestamp_ms, scan.status, scan.message.as_deref());

        if !self.config.wifi_enabled {
            return Vec::new();
        }
        if scan.status != WifiScanStatus::Ok {
            return vec![PositioningEvent::WifiScanIgnored {
                status: scan.status,
                message: scan.message.clone(),
            }];
        }
        let Some(fix) = compute_fix(&scan.readings, self.graph.anchors()) else {
            return Vec::new();
        };
        let Some(kalman) = self.kalman.as_mut() else {
            return Vec::new();
        };

        let mut events = Vec::new();
        let jump = kalman.center().distance_to(fix.position);
        if jump > HARD_RESET_DISTANCE_M && fix.confidence > HARD_RESET_CONFIDENCE {
            // Clearly elsewhere: relocalize instead of dragging the filter
            kalman.reset(fix.position, Kalman2D::DEFAULT_POS_SIGMA);
            events.push(PositioningEvent::WifiHardReset {
                position: fix.position,
                confidence: fix.confidence,
                jump_meters: jump,
            });
        } else {
            let meas_sigma = (6.0 - 5.2 * fix.confidence).clamp(1.2, 6.0);
            kalman.update(fix.position, meas_sigma);
            events.push(PositioningEvent::WifiFixApplied {
                position: fix.position,
                confidence: fix.confidence,
                matched: fix.matched,
                meas_sigma,
            });
        }

        self.position = self.kalman.as_ref().map(|k| k.center()).unwrap_or(self.position);
        self.wifi_fix_count += 1;
        let current = self.position;
        events.extend(self.emit_pose(current, scan.timestamp_ms, PoseSource::PdrWifi));
        events
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn apply_steps(&mut self, steps: &[PdrStep], timestamp_ms: f64) -> Vec<PositioningEvent> {
        if steps.is_empty() {
            return Vec::new();
        }
        let steps = &steps[..steps.len().min(MAX_STEPS_PER_EVENT)];

        let base = self
            .kalman
            .as_ref()
            .map(|k| k.center())
            .unwrap_or(self.position);
        let proc_sigma = 0.22 + 0.08 * (1.0 - self.pdr.mag_reliability());

        let mut displaced = base;
        for step in steps {
            let heading_rad = step.heading_deg.to_radians();
            let delta = Point2::new(
                heading_rad.sin() * step.length_m,
                -heading_rad.cos() * step.length_m,
            );
            displaced = Point2::new(displaced.x + delta.x, displaced.y + delta.y);
            if let Some(kalman) = self.kalman.as_mut() {
                kalman.predict(delta, proc_sigma);
            }
            self.last_step_ms = Some(step.timestamp_ms);
            self.step_count += 1;
        }

        let current = self
            .kalman
            .as_ref()
            .map(|k| k.center())
            .unwrap_or(displaced);
        self.position = current;
        self.emit_pose(current, timestamp_ms, PoseSource::Pdr)
    }

    fn emit_pose(
        &mut self,
        current: Point2,
        timestamp_ms: f64,
        source: PoseSource,
    ) -> Vec<PositioningEvent> {
        let snap = self.snapper.snap(current);
        let snapped = snap.distance <= self.config.snap.max_snap_meters;

        self.reported_heading = low_pass_heading(
            self.reported_heading,
            self.pdr.heading_deg(),
            HEADING_SMOOTHING,
        );

        let pose = Pose2D {
            x: snap.snapped.x,
            y: snap.snapped.y,
            heading_deg: self.reported_heading,
            timestamp_ms,
            source,
            snapped,
        };
        self.last_pose = Some(pose);
        self.path.push_back(snap.snapped);
        while self.path.len() > PATH_BUFFER_LEN {
            self.path.pop_front();
        }
        let point = snap.snapped;
        self.last_snap = Some(snap);

        vec![
            PositioningEvent::Pose(pose),
            PositioningEvent::PathPoint(point),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_map::map::{
        AnchorSource, NodeType, StoreMap, StoreMapAnchor, StoreMapEdge, StoreMapNode,
    };
    use crate::types::WifiReading;

    fn node(id: &str, x: f64, y: f64) -> StoreMapNode {
        StoreMapNode {
            id: id.to_string(),
            label: id.to_uppercase(),
            x,
            y,
            floor: 0,
            node_type: NodeType::Walkway,
            section_id: None,
        }
    }

    /// Corridor along x at y = 0, anchors at both ends.
    fn corridor_graph() -> Arc<StoreGraph> {
        StoreGraph::new(StoreMap {
            id: "c".to_string(),
            label: "Corridor".to_string(),
            grid_size: None,
            nodes: vec![node("a", 0.0, 0.0), node("b", 30.0, 0.0)],
            edges: vec![StoreMapEdge {
                from: "a".to_string(),
                to: "b".to_string(),
                distance: None,
                bidirectional: true,
            }],
            anchors: vec![
                StoreMapAnchor {
                    bssid: "ap-west".to_string(),
                    label: "West".to_string(),
                    x: 0.0,
                    y: 0.0,
                    floor: 0,
                    source: AnchorSource::Mock,
                    confidence: None,
                },
                StoreMapAnchor {
                    bssid: "ap-east".to_string(),
                    label: "East".to_string(),
                    x: 30.0,
                    y: 0.0,
                    floor: 0,
                    source: AnchorSource::Mock,
                    confidence: None,
                },
            ],
            dropped_edges: 0,
        })
    }

    fn service(start: Point2, wifi: bool) -> PositioningService {
        PositioningService::new(
            corridor_graph(),
            PositioningConfig {
                start,
                wifi_enabled: wifi,
                ..Default::default()
            },
        )
    }

    fn scan(timestamp_ms: f64, readings: Vec<(&str, f64)>) -> WifiScan {
        WifiScan {
            timestamp_ms,
            readings: readings
                .into_iter()
                .map(|(bssid, level)| WifiReading {
                    bssid: bssid.to_string(),
                    level,
                })
                .collect(),
            status: WifiScanStatus::Ok,
            message: None,
        }
    }

    /// Walk `n` pedometer steps, one per sample, spaced 2 s apart.
    fn pedometer_steps(service: &mut PositioningService, n: u64, start_ms: f64) {
        service.feed_pedometer(&PedometerSample {
            timestamp_ms: start_ms,
            steps: 0,
        });
        for i in 1..=n {
            service.feed_pedometer(&PedometerSample {
                timestamp_ms: start_ms + i as f64 * 2000.0,
                steps: i,
            });
        }
    }

    #[test]
    fn test_reset_then_zero_steps_holds_position() {
        let mut service = service(Point2::new(5.0, 5.0), true);
        pedometer_steps(&mut service, 3, 0.0);
        service.reset_to(Point2::new(2.0, 3.0), 10_000.0);

        let pose = service.pose().unwrap();
        assert_eq!(pose.position(), Point2::new(2.0, 3.0));
        assert_eq!(pose.heading_deg, 0.0);
        assert_eq!(service.path().len(), 1);
        assert_eq!(service.path()[0], Point2::new(2.0, 3.0));
    }

    #[test]
    fn test_steps_move_along_heading() {
        // Heading 0 points toward -y; start away from the corridor so the
        // snap stays unsnapped and the raw displacement is observable
        let mut service = service(Point2::new(15.0, 20.0), false);
        pedometer_steps(&mut service, 2, 0.0);

        let pose = service.pose().unwrap();
        assert!((pose.x - 15.0).abs() < 1e-9);
        assert!(
            (pose.y - (20.0 - 2.0 * 0.62)).abs() < 1e-9,
            "two neutral strides toward -y, got y = {}",
            pose.y
        );
        assert_eq!(pose.source, PoseSource::Pdr);
        assert!(!pose.snapped);
    }

    #[test]
    fn test_pose_snaps_near_corridor() {
        let mut service = service(Point2::new(15.0, 1.2), false);
        pedometer_steps(&mut service, 1, 0.0);

        let pose = service.pose().unwrap();
        // One 0.62 m stride toward -y from y=1.2 lands at 0.58: snapped to 0
        assert!(pose.snapped);
        assert!((pose.y - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_path_buffer_bounded() {
        let mut service = service(Point2::new(15.0, 1.0), false);
        pedometer_steps(&mut service, 300, 0.0);
        assert!(service.path().len() <= 240, "buffer must stay bounded");
        assert_eq!(service.step_count(), 300);
    }

    #[test]
    fn test_wifi_update_pulls_toward_fix() {
        let mut service = service(Point2::new(10.0, 0.0), true);
        // Weak-ish fix near the east anchor, within hard-reset distance of
        // nothing (jump is 20 m but confidence stays below the bar)
        let events = service.feed_wifi_scan(&scan(1000.0, vec![("ap-east", -80.0)]));
        assert!(events
            .iter()
            .any(|e| matches!(e, PositioningEvent::WifiFixApplied { .. })));
        let pose = service.pose().unwrap();
        assert_eq!(pose.source, PoseSource::PdrWifi);
        assert!(
            pose.x > 10.0 && pose.x < 30.0,
            "position should move toward the fix, got {}",
            pose.x
        );
    }

    #[test]
    fn test_wifi_hard_reset_on_confident_far_fix() {
        let mut service = service(Point2::new(0.0, 0.0), true);
        let events = service.feed_wifi_scan(&scan(1000.0, vec![("ap-east", -50.0)]));
        assert!(events
            .iter()
            .any(|e| matches!(e, PositioningEvent::WifiHardReset { .. })));
        let pose = service.pose().unwrap();
        assert!((pose.x - 30.0).abs() < 1e-9, "filter should jump to the fix");
    }

    #[test]
    fn test_wifi_failed_scan_ignored() {
        let mut service = service(Point2::new(10.0, 0.0), true);
        let before = service.pose().map(|p| p.position());
        let events = service.feed_wifi_scan(&WifiScan {
            timestamp_ms: 500.0,
            readings: vec![],
            status: WifiScanStatus::PermissionDenied,
            message: Some("denied".to_string()),
        });
        assert!(matches!(
            events.as_slice(),
            [PositioningEvent::WifiScanIgnored { .. }]
        ));
        assert_eq!(service.pose().map(|p| p.position()), before);
        let health = service.sensor_health(600.0);
        assert_eq!(health.wifi_status, Some(WifiScanStatus::PermissionDenied));
    }

    #[test]
    fn test_wifi_disabled_drops_fixes() {
        let mut service = service(Point2::new(10.0, 0.0), false);
        let events = service.feed_wifi_scan(&scan(1000.0, vec![("ap-east", -50.0)]));
        assert!(events.is_empty());
        assert_eq!(service.wifi_fix_count(), 0);
    }

    #[test]
    fn test_wifi_toggle_preserves_pdr_state() {
        let mut service = service(Point2::new(10.0, 0.0), true);
        pedometer_steps(&mut service, 2, 0.0);
        let heading = service.heading_deg();
        let position = service.position();

        service.set_wifi_enabled(false);
        service.set_wifi_enabled(true);

        assert_eq!(service.heading_deg(), heading);
        assert_eq!(service.position(), position);
        assert_eq!(service.graph().node_count(), 2);
        // And the re-seeded filter accepts fixes again
        let events = service.feed_wifi_scan(&scan(9000.0, vec![("ap-west", -60.0)]));
        assert!(!events.is_empty());
    }

    #[test]
    fn test_stopped_session_discards_callbacks() {
        let mut service = service(Point2::new(10.0, 0.0), true);
        service.stop();
        assert!(service
            .feed_wifi_scan(&scan(1000.0, vec![("ap-east", -50.0)]))
            .is_empty());
        assert!(service
            .feed_pedometer(&PedometerSample {
                timestamp_ms: 1000.0,
                steps: 5
            })
            .is_empty());
        assert!(service.pose().is_none());
    }

    #[test]
    fn test_confidence_tier_transitions() {
        let mut service = service(Point2::new(10.0, 0.0), false);
        // Never stepped, reliability 0: 0.35 + 0.10 - 0.175 = 0.275 -> low
        assert_eq!(service.confidence_tier(0.0), ConfidenceTier::Low);

        // Recent step lifts it into ok: 0.275 + 0.25 = 0.525
        pedometer_steps(&mut service, 1, 0.0);
        assert_eq!(service.confidence_tier(2500.0), ConfidenceTier::Ok);

        // Reliable magnetometer on top reaches good:
        // 0.35 + 0.25 + 0.10 + ~0.35 * 0.45 ≈ 0.86
        for i in 0..200 {
            service.feed_mag(&MagSample {
                timestamp_ms: i as f64 * 200.0,
                x: 45.0,
                y: 0.0,
                z: 0.0,
            });
        }
        pedometer_steps(&mut service, 1, 50_000.0);
        assert_eq!(service.confidence_tier(52_100.0), ConfidenceTier::Good);
    }

    #[test]
    fn test_stride_scale_clamped_and_applied() {
        let mut service = service(Point2::new(15.0, 20.0), false);
        service.set_stride_scale(3.0);
        assert_eq!(service.config().stride_scale, 1.5);
    }
}
