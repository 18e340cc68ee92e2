//! Maneuver extraction and progress tracking along a route polyline.

use serde::{Deserialize, Serialize};

use crate::geometry::{bearing, heading_diff, project_point_to_segment, Point2};

/// Bends shallower than this are walked through without an instruction.
const STRAIGHT_THRESHOLD_DEG: f64 = 28.0;
/// Bends sharper than this read as turning back on yourself.
const UTURN_THRESHOLD_DEG: f64 = 150.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManeuverType {
    Start,
    Arrive,
    Left,
    Right,
    Straight,
    Uturn,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Maneuver {
    #[serde(rename = "type")]
    pub maneuver_type: ManeuverType,
    pub at_index: usize,
    pub point: Point2,
    pub distance_from_start_meters: f64,
    pub instruction: String,
}

/// Classify a signed bend angle. `Straight` is returned for shallow bends
/// and suppressed by the caller.
fn classify(delta_deg: f64) -> ManeuverType {
    if delta_deg.abs() < STRAIGHT_THRESHOLD_DEG {
        ManeuverType::Straight
    } else if delta_deg.abs() > UTURN_THRESHOLD_DEG {
        ManeuverType::Uturn
    } else if delta_deg > 0.0 {
        ManeuverType::Right
    } else {
        ManeuverType::Left
    }
}

fn instruction_for(maneuver_type: ManeuverType) -> &'static str {
    match maneuver_type {
        ManeuverType::Start => "Start walking",
        ManeuverType::Arrive => "Arrive at destination",
        ManeuverType::Left => "turn left",
        ManeuverType::Right => "turn right",
        ManeuverType::Straight => "continue straight",
        ManeuverType::Uturn => "make a U-turn",
    }
}

/// Build the maneuver list for a polyline: `start` at the first vertex,
/// `arrive` at the last, and a turn instruction at every interior vertex
/// that bends past the straight threshold.
pub fn build_maneuvers(polyline: &[Point2]) -> Vec<Maneuver> {
    let mut maneuvers = Vec::new();
    if polyline.is_empty() {
        return maneuvers;
    }

    maneuvers.push(Maneuver {
        maneuver_type: ManeuverType::Start,
        at_index: 0,
        point: polyline[0],
        distance_from_start_meters: 0.0,
        instruction: instruction_for(ManeuverType::Start).to_string(),
    });

    let mut cumulative = 0.0;
    for i in 1..polyline.len() {
        cumulative += polyline[i - 1].distance_to(polyline[i]);
        if i == polyline.len() - 1 {
            break;
        }

        let inbound = bearing(polyline[i - 1], polyline[i]);
        let outbound = bearing(polyline[i], polyline[i + 1]);
        let delta = heading_diff(outbound, inbound);
        let maneuver_type = classify(delta);
        if maneuver_type == ManeuverType::Straight {
            continue;
        }
        maneuvers.push(Maneuver {
            maneuver_type,
            at_index: i,
            point: polyline[i],
            distance_from_start_meters: cumulative,
            instruction: instruction_for(maneuver_type).to_string(),
        });
    }

    let last = polyline.len() - 1;
    maneuvers.push(Maneuver {
        maneuver_type: ManeuverType::Arrive,
        at_index: last,
        point: polyline[last],
        distance_from_start_meters: cumulative,
        instruction: instruction_for(ManeuverType::Arrive).to_string(),
    });

    maneuvers
}

/// Where a position falls along a polyline.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RouteProgress {
    pub along_meters: f64,
    pub closest: Point2,
    pub distance_meters: f64,
    pub segment_index: usize,
    pub t: f64,
}

/// Project `p` onto every polyline segment and keep the closest hit.
pub fn route_progress(polyline: &[Point2], p: Point2) -> Option<RouteProgress> {
    if polyline.len() < 2 {
        return None;
    }

    let mut cumulative = 0.0;
    let mut best: Option<RouteProgress> = None;
    for (i, pair) in polyline.windows(2).enumerate() {
        let seg_len = pair[0].distance_to(pair[1]);
        let proj = project_point_to_segment(p, pair[0], pair[1]);
        if best
            .as_ref()
            .map_or(true, |b| proj.distance < b.distance_meters)
        {
            best = Some(RouteProgress {
                along_meters: cumulative + proj.t * seg_len,
                closest: proj.point,
                distance_meters: proj.distance,
                segment_index: i,
                t: proj.t,
            });
        }
        cumulative += seg_len;
    }
    best
}

/// Render the instruction line shown to the user.
pub fn format_next_instruction(maneuver: Option<&Maneuver>, distance_meters: f64) -> String {
    match maneuver {
        None => "Select a destination".to_string(),
        Some(m) => match m.maneuver_type {
            ManeuverType::Start => "Start walking".to_string(),
            ManeuverType::Arrive => {
                if distance_meters < 2.0 {
                    "Arrive".to_string()
                } else {
                    "Continue to destination".to_string()
                }
            }
            _ => format!("In {} m, {}", distance_meters.ceil() as i64, m.instruction),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64) -> Point2 {
        Point2::new(x, y)
    }

    #[test]
    fn test_start_and_arrive_bracket_route() {
        // Right-angle corridor: down +x, then down +y
        let polyline = [p(0.0, 0.0), p(10.0, 0.0), p(10.0, 8.0)];
        let maneuvers = build_maneuvers(&polyline);

        assert_eq!(maneuvers.first().unwrap().maneuver_type, ManeuverType::Start);
        assert_eq!(maneuvers.first().unwrap().at_index, 0);
        assert_eq!(maneuvers.last().unwrap().maneuver_type, ManeuverType::Arrive);
        assert_eq!(maneuvers.last().unwrap().at_index, 2);
        assert!((maneuvers.last().unwrap().distance_from_start_meters - 18.0).abs() < 1e-9);

        let starts = maneuvers
            .iter()
            .filter(|m| m.maneuver_type == ManeuverType::Start)
            .count();
        let arrives = maneuvers
            .iter()
            .filter(|m| m.maneuver_type == ManeuverType::Arrive)
            .count();
        assert_eq!((starts, arrives), (1, 1));
    }

    #[test]
    fn test_turn_classification() {
        // +x then +y: bearing 90 -> 180, delta +90 = right
        let maneuvers = build_maneuvers(&[p(0.0, 0.0), p(10.0, 0.0), p(10.0, 8.0)]);
        assert_eq!(maneuvers[1].maneuver_type, ManeuverType::Right);
        assert!((maneuvers[1].distance_from_start_meters - 10.0).abs() < 1e-9);

        // +x then -y: bearing 90 -> 0, delta -90 = left
        let maneuvers = build_maneuvers(&[p(0.0, 0.0), p(10.0, 0.0), p(10.0, -8.0)]);
        assert_eq!(maneuvers[1].maneuver_type, ManeuverType::Left);

        // Doubling back: delta 180 = U-turn
        let maneuvers = build_maneuvers(&[p(0.0, 0.0), p(10.0, 0.0), p(1.0, 0.0)]);
        assert_eq!(maneuvers[1].maneuver_type, ManeuverType::Uturn);
    }

    #[test]
    fn test_shallow_bends_suppressed() {
        // ~17° bend: below the straight threshold
        let maneuvers = build_maneuvers(&[p(0.0, 0.0), p(10.0, 0.0), p(20.0, 3.0)]);
        assert_eq!(maneuvers.len(), 2, "only start and arrive expected");
        // Every emitted interior maneuver bends at least the threshold
        let maneuvers = build_maneuvers(&[
            p(0.0, 0.0),
            p(10.0, 0.0),
            p(20.0, 3.0),
            p(20.0, 13.0),
            p(30.0, 13.0),
        ]);
        for m in &maneuvers {
            assert_ne!(m.maneuver_type, ManeuverType::Straight);
        }
    }

    #[test]
    fn test_progress_projection() {
        let polyline = [p(0.0, 0.0), p(10.0, 0.0), p(10.0, 8.0)];
        let progress = route_progress(&polyline, p(4.0, 1.5)).unwrap();
        assert_eq!(progress.segment_index, 0);
        assert!((progress.along_meters - 4.0).abs() < 1e-9);
        assert!((progress.distance_meters - 1.5).abs() < 1e-9);

        let progress = route_progress(&polyline, p(11.0, 5.0)).unwrap();
        assert_eq!(progress.segment_index, 1);
        assert!((progress.along_meters - 15.0).abs() < 1e-9);
        assert!((progress.distance_meters - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_progress_needs_a_segment() {
        assert!(route_progress(&[], p(0.0, 0.0)).is_none());
        assert!(route_progress(&[p(1.0, 1.0)], p(0.0, 0.0)).is_none());
    }

    #[test]
    fn test_instruction_formatting() {
        assert_eq!(format_next_instruction(None, 0.0), "Select a destination");

        let maneuvers = build_maneuvers(&[p(0.0, 0.0), p(10.0, 0.0), p(10.0, 8.0)]);
        assert_eq!(
            format_next_instruction(Some(&maneuvers[0]), 5.0),
            "Start walking"
        );
        assert_eq!(
            format_next_instruction(Some(&maneuvers[1]), 4.2),
            "In 5 m, turn right"
        );
        let arrive = maneuvers.last().unwrap();
        assert_eq!(
            format_next_instruction(Some(arrive), 6.0),
            "Continue to destination"
        );
        assert_eq!(format_next_instruction(Some(arrive), 1.2), "Arrive");
    }

    #[test]
    fn test_single_point_polyline() {
        let maneuvers = build_maneuvers(&[p(3.0, 3.0)]);
        assert_eq!(maneuvers.len(), 2);
        assert_eq!(maneuvers[0].maneuver_type, ManeuverType::Start);
        assert_eq!(maneuvers[1].maneuver_type, ManeuverType::Arrive);
        assert_eq!(maneuvers[1].distance_from_start_meters, 0.0);
    }
}
