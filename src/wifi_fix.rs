//! Wi-Fi position fix: weighted centroid over matched anchors.
//!
//! Scan readings are matched to anchors by normalized BSSID. Each match
//! contributes its anchor position weighted by an exponential of the
//! (clamped) RSSI, so a -50 dBm access point dominates a -85 dBm one
//! without letting a single hot reading run away.

use crate::geometry::Point2;
use crate::store_map::StoreMapAnchor;
use crate::types::WifiReading;

const RSSI_CLAMP_LOW: f64 = -95.0;
const RSSI_CLAMP_HIGH: f64 = -35.0;
const WEIGHT_CLAMP_LOW: f64 = 1.0;
const WEIGHT_CLAMP_HIGH: f64 = 400.0;

/// Canonical BSSID form: trimmed and lower-cased. Idempotent.
pub fn normalize_bssid(bssid: &str) -> String {
    bssid.trim().to_ascii_lowercase()
}

/// A computed Wi-Fi fix with its confidence heuristic.
#[derive(Clone, Debug)]
pub struct WifiFix {
    pub position: Point2,
    /// Number of readings that matched an anchor.
    pub matched: usize,
    /// Strongest matched RSSI in dBm.
    pub best_rssi: f64,
    pub best_bssid: String,
    /// Heuristic confidence in `[0.15, 0.98]`.
    pub confidence: f64,
}

fn weight_for(rssi: f64) -> f64 {
    ((rssi.clamp(RSSI_CLAMP_LOW, RSSI_CLAMP_HIGH) + 100.0) / 10.0)
        .exp()
        .clamp(WEIGHT_CLAMP_LOW, WEIGHT_CLAMP_HIGH)
}

fn confidence_for(best_rssi: f64, matched: usize) -> f64 {
    let strength = ((best_rssi + 100.0) / 55.0).clamp(0.15, 0.95);
    let breadth = (0.08 * (matched as f64 - 1.0)).clamp(0.0, 0.2);
    (strength + breadth).clamp(0.15, 0.98)
}

/// Compute the weighted-centroid fix for a scan against an anchor set.
/// Returns `None` when no reading matches any anchor.
pub fn compute_fix(readings: &[WifiReading], anchors: &[StoreMapAnchor]) -> Option<WifiFix> {
    let mut weight_sum = 0.0;
    let mut x_sum = 0.0;
    let mut y_sum = 0.0;
    let mut matched = 0usize;
    let mut best: Option<&WifiReading> = None;

    for reading in readings {
        if !reading.level.is_finite() {
            continue;
        }
        let key = normalize_bssid(&reading.bssid);
        let anchor = anchors
            .iter()
            .find(|a| normalize_bssid(&a.bssid) == key);
        let Some(anchor) = anchor else {
            continue;
        };

        let weight = weight_for(reading.level);
        weight_sum += weight;
        x_sum += weight * anchor.x;
        y_sum += weight * anchor.y;
        matched += 1;
        if best.map_or(true, |b| reading.level > b.level) {
            best = Some(reading);
        }
    }

    let best = best?;
    if weight_sum <= 0.0 {
        return None;
    }

    Some(WifiFix {
        position: Point2::new(x_sum / weight_sum, y_sum / weight_sum),
        matched,
        best_rssi: best.level,
        best_bssid: normalize_bssid(&best.bssid),
        confidence: confidence_for(best.level, matched),
    })
}
