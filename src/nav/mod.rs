//! Navigation service: destination tracking, progress, reroutes.
//!
//! Owns the active route. Position updates come from the positioning
//! service; everything here is synchronous and driven by the caller's
//! clock, so replays behave exactly like live sessions.

pub mod turn_by_turn;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::geometry::Point2;
use crate::store_map::routing::{shortest_path_from_point, PathResult};
use crate::store_map::StoreGraph;
use turn_by_turn::{
    build_maneuvers, format_next_instruction, route_progress, Maneuver, RouteProgress,
};

/// A maneuver is considered passed once progress moves within half a meter
/// of it.
const MANEUVER_PASSED_SLACK_M: f64 = 0.5;
/// Reroutes are never scheduled more often than this.
const RECALC_COOLDOWN_MS: f64 = 1500.0;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RerouteConfig {
    /// Distance from the route polyline that counts as off-route.
    pub off_route_meters: f64,
    /// How long the position must stay off-route before rerouting.
    pub persist_ms: f64,
}

impl Default for RerouteConfig {
    fn default() -> Self {
        RerouteConfig {
            off_route_meters: 4.0,
            persist_ms: 3000.0,
        }
    }
}

/// An active route: the path polyline plus its maneuvers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndoorRoute {
    pub destination_id: String,
    pub path: PathResult,
    pub maneuvers: Vec<Maneuver>,
}

#[derive(Clone, Debug)]
pub enum NavEvent {
    RouteChanged(Option<IndoorRoute>),
    Instruction {
        text: String,
        distance_to_next: f64,
        next_maneuver: Option<Maneuver>,
    },
    OffRoute(bool),
}

/// Observable snapshot of the navigation state.
#[derive(Clone, Debug)]
pub struct NavState {
    pub route: Option<IndoorRoute>,
    pub off_route: bool,
    pub next_maneuver: Option<Maneuver>,
    pub distance_to_next: f64,
    pub next_instruction: String,
    pub progress: Option<RouteProgress>,
}

pub struct NavigationService {
    graph: Arc<StoreGraph>,
    reroute: RerouteConfig,
    enabled: bool,
    destination_id: Option<String>,
    current: Option<Point2>,
    route: Option<IndoorRoute>,
    progress: Option<RouteProgress>,
    next_maneuver: Option<Maneuver>,
    distance_to_next: f64,
    next_instruction: String,
    off_route: bool,
    off_route_since_ms: Option<f64>,
    last_recalc_ms: Option<f64>,
    recalc_count: u64,
}

impl NavigationService {
    pub fn new(graph: Arc<StoreGraph>, reroute: RerouteConfig) -> Self {
        NavigationService {
            graph,
            reroute,
            enabled: false,
            destination_id: None,
            current: None,
            route: None,
            progress: None,
            next_maneuver: None,
            distance_to_next: 0.0,
            next_instruction: format_next_instruction(None, 0.0),
            off_route: false,
            off_route_since_ms: None,
            last_recalc_ms: None,
            recalc_count: 0,
        }
    }

    pub fn state(&self) -> NavState {
        NavState {
            route: self.route.clone(),
            off_route: self.off_route,
            next_maneuver: self.next_maneuver.clone(),
            distance_to_next: self.distance_to_next,
            next_instruction: self.next_instruction.clone(),
            progress: self.progress,
        }
    }

    pub fn route(&self) -> Option<&IndoorRoute> {
        self.route.as_ref()
    }

    pub fn recalc_count(&self) -> u64 {
        self.recalc_count
    }

    pub fn set_enabled(&mut self, enabled: bool, now_ms: f64) -> Vec<NavEvent> {
        if self.enabled == enabled {
            return Vec::new();
        }
        self.enabled = enabled;
        self.recalc(now_ms, true)
    }

    pub fn set_destination(
        &mut self,
        destination_id: Option<String>,
        now_ms: f64,
    ) -> Vec<NavEvent> {
        self.destination_id = destination_id;
        self.recalc(now_ms, true)
    }

    pub fn set_graph(&mut self, graph: Arc<StoreGraph>, now_ms: f64) -> Vec<NavEvent> {
        self.graph = graph;
        self.recalc(now_ms, true)
    }

    /// Feed the latest position. Recomputes progress and the upcoming
    /// instruction, runs the off-route detector, and schedules a reroute
    /// when the deviation persists.
    pub fn update_position(&mut self, p: Point2, now_ms: f64) -> Vec<NavEvent> {
        self.current = Some(p);
        let mut events = Vec::new();

        let Some(route) = self.route.as_ref() else {
            return events;
        };

        let progress = match route_progress(&route.path.points, p) {
            Some(progress) => progress,
            None => return events,
        };
        self.progress = Some(progress);

        // Next maneuver: first one meaningfully ahead of us
        let next = route
            .maneuvers
            .iter()
            .find(|m| m.distance_from_start_meters > progress.along_meters + MANEUVER_PASSED_SLACK_M)
            .or_else(|| route.maneuvers.last())
            .cloned();
        self.distance_to_next = next
            .as_ref()
            .map(|m| (m.distance_from_start_meters - progress.along_meters).max(0.0))
            .unwrap_or(0.0);
        self.next_maneuver = next;
        self.next_instruction =
            format_next_instruction(self.next_maneuver.as_ref(), self.distance_to_next);
        events.push(NavEvent::Instruction {
            text: self.next_instruction.clone(),
            distance_to_next: self.distance_to_next,
            next_maneuver: self.next_maneuver.clone(),
        });

        // Off-route detection with persistence
        if progress.distance_meters > self.reroute.off_route_meters {
            let since = *self.off_route_since_ms.get_or_insert(now_ms);
            if now_ms - since > self.reroute.persist_ms {
                if !self.off_route {
                    self.off_route = true;
                    events.push(NavEvent::OffRoute(true));
                }
                let cooled_down = self
                    .last_recalc_ms
                    .map_or(true, |t| now_ms - t >= RECALC_COOLDOWN_MS);
                if cooled_down {
                    events.extend(self.recalc(now_ms, false));
                }
            }
        } else {
            self.off_route_since_ms = None;
            if self.off_route {
                self.off_route = false;
                events.push(NavEvent::OffRoute(false));
            }
        }

        events
    }

    /// Recompute the route from the current position. `reset_deviation`
    /// clears the off-route latch (destination or map changes); reroutes
    /// triggered by the detector keep it so the timer governs re-arming.
    fn recalc(&mut self, now_ms: f64, reset_deviation: bool) -> Vec<NavEvent> {
        let mut events = Vec::new();

        let new_route = match (self.enabled, &self.destination_id, &self.current) {
            (true, Some(dest), Some(current)) => {
                shortest_path_from_point(&self.graph, *current, dest).map(|path| IndoorRoute {
                    destination_id: dest.clone(),
                    maneuvers: build_maneuvers(&path.points),
                    path,
                })
            }
            _ => None,
        };

        if new_route.is_some() {
            self.last_recalc_ms = Some(now_ms);
            self.recalc_count += 1;
        }
        if reset_deviation {
            self.off_route_since_ms = None;
            if self.off_route {
                self.off_route = false;
                events.push(NavEvent::OffRoute(false));
            }
        }

        let changed = match (&self.route, &new_route) {
            (None, None) => false,
            (Some(old), Some(new)) => {
                old.destination_id != new.destination_id
                    || old.path.node_ids != new.path.node_ids
                    || (old.path.length_meters - new.path.length_meters).abs() > 1e-9
            }
            _ => true,
        };
        self.route = new_route;
        if self.route.is_none() {
            self.progress = None;
            self.next_maneuver = None;
            self.distance_to_next = 0.0;
            self.next_instruction = format_next_instruction(None, 0.0);
        }
        if changed {
            events.push(NavEvent::RouteChanged(self.route.clone()));
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_map::map::{NodeType, StoreMap, StoreMapEdge, StoreMapNode};

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

    /// Straight corridor (0,0) -> (10,0) -> (20,0).
    fn corridor_graph() -> Arc<StoreGraph> {
        StoreGraph::new(StoreMap {
            id: "corridor".to_string(),
            label: "Corridor".to_string(),
            grid_size: None,
            nodes: vec![
                node("a", 0.0, 0.0),
                node("b", 10.0, 0.0),
                node("c", 20.0, 0.0),
            ],
            edges: vec![
                StoreMapEdge {
                    from: "a".to_string(),
                    to: "b".to_string(),
                    distance: None,
                    bidirectional: true,
                },
                StoreMapEdge {
                    from: "b".to_string(),
                    to: "c".to_string(),
                    distance: None,
                    bidirectional: true,
                },
            ],
            anchors: Vec::new(),
            dropped_edges: 0,
        })
    }

    fn started_nav(reroute: RerouteConfig) -> NavigationService {
        let mut nav = NavigationService::new(corridor_graph(), reroute);
        nav.update_position(Point2::new(0.0, 0.0), 0.0);
        nav.set_enabled(true, 0.0);
        nav.set_destination(Some("c".to_string()), 0.0);
        nav
    }

    #[test]
    fn test_route_computed_on_enable() {
        let nav = started_nav(RerouteConfig::default());
        let route = nav.route().expect("route should exist");
        assert_eq!(route.destination_id, "c");
        assert_eq!(route.path.node_ids.last().map(String::as_str), Some("c"));
        assert!(route.maneuvers.len() >= 2);
    }

    #[test]
    fn test_instruction_progresses_toward_arrive() {
        let mut nav = started_nav(RerouteConfig::default());
        let events = nav.update_position(Point2::new(12.0, 0.1), 1000.0);
        assert!(events
            .iter()
            .any(|e| matches!(e, NavEvent::Instruction { .. })));
        let state = nav.state();
        assert_eq!(state.next_instruction, "Continue to destination");
        assert!((state.distance_to_next - 8.0).abs() < 0.2);

        nav.update_position(Point2::new(19.5, 0.0), 2000.0);
        assert_eq!(nav.state().next_instruction, "Arrive");
    }

    #[test]
    fn test_reroute_fires_after_persistence() {
        let reroute = RerouteConfig {
            off_route_meters: 2.0,
            persist_ms: 3000.0,
        };
        let mut nav = started_nav(reroute);
        let base_recalcs = nav.recalc_count();

        // Clearly off the corridor at t=0: timer starts
        nav.update_position(Point2::new(5.0, 2.5), 0.0);
        assert_eq!(nav.recalc_count(), base_recalcs);

        // Just before the persistence window expires: nothing
        nav.update_position(Point2::new(5.0, 2.5), 2999.0);
        assert_eq!(nav.recalc_count(), base_recalcs);
        assert!(!nav.state().off_route);

        // Past the window: off-route flips and exactly one reroute fires
        let events = nav.update_position(Point2::new(5.0, 2.5), 3001.0);
        assert!(events.iter().any(|e| matches!(e, NavEvent::OffRoute(true))));
        assert_eq!(nav.recalc_count(), base_recalcs + 1);

        // The new route starts at the pose, so the next update is back
        // on-route and the latch clears without another reroute
        let events = nav.update_position(Point2::new(5.0, 2.5), 3100.0);
        assert!(events
            .iter()
            .any(|e| matches!(e, NavEvent::OffRoute(false))));
        assert_eq!(nav.recalc_count(), base_recalcs + 1);
    }

    #[test]
    fn test_reroute_cooldown_rate_limits() {
        let reroute = RerouteConfig {
            off_route_meters: 2.0,
            persist_ms: 100.0,
        };
        let mut nav = started_nav(reroute);
        let base_recalcs = nav.recalc_count();

        // Persistence expires quickly, but the cooldown since the initial
        // route calculation at t=0 holds the first reroute until t=1500
        nav.update_position(Point2::new(5.0, 2.5), 0.0);
        nav.update_position(Point2::new(5.0, 2.5), 500.0);
        assert_eq!(nav.recalc_count(), base_recalcs);
        nav.update_position(Point2::new(5.0, 2.5), 1601.0);
        assert_eq!(nav.recalc_count(), base_recalcs + 1);

        // Wander off the rerouted path too: persistence is exceeded again
        // but the cooldown since the last recalc blocks the reroute
        nav.update_position(Point2::new(0.0, 6.0), 1700.0);
        nav.update_position(Point2::new(0.0, 6.0), 1900.0);
        assert_eq!(nav.recalc_count(), base_recalcs + 1);

        // Cooldown elapsed and still off-route: reroute again
        nav.update_position(Point2::new(0.0, 6.0), 3101.0);
        assert_eq!(nav.recalc_count(), base_recalcs + 2);
    }

    #[test]
    fn test_off_route_clears_when_back_on_route() {
        let reroute = RerouteConfig {
            off_route_meters: 2.0,
            persist_ms: 3000.0,
        };
        let mut nav = started_nav(reroute);
        nav.update_position(Point2::new(5.0, 2.5), 0.0);
        nav.update_position(Point2::new(5.0, 2.5), 3001.0);
        assert!(nav.state().off_route);

        let events = nav.update_position(Point2::new(6.0, 0.2), 4000.0);
        assert!(events
            .iter()
            .any(|e| matches!(e, NavEvent::OffRoute(false))));
        assert!(!nav.state().off_route);
    }

    #[test]
    fn test_brief_excursion_does_not_reroute() {
        let reroute = RerouteConfig {
            off_route_meters: 2.0,
            persist_ms: 3000.0,
        };
        let mut nav = started_nav(reroute);
        let base_recalcs = nav.recalc_count();
        nav.update_position(Point2::new(5.0, 2.5), 0.0);
        nav.update_position(Point2::new(5.0, 0.5), 1000.0); // back on route
        nav.update_position(Point2::new(5.0, 2.5), 2000.0); // off again
        nav.update_position(Point2::new(5.0, 2.5), 4000.0); // 2 s: below persist
        assert_eq!(nav.recalc_count(), base_recalcs, "timer must re-arm on return");
    }

    #[test]
    fn test_unknown_destination_yields_no_route() {
        let mut nav = NavigationService::new(corridor_graph(), RerouteConfig::default());
        nav.update_position(Point2::new(0.0, 0.0), 0.0);
        nav.set_enabled(true, 0.0);
        let events = nav.set_destination(Some("nowhere".to_string()), 0.0);
        assert!(nav.route().is_none());
        assert_eq!(nav.state().next_instruction, "Select a destination");
        // No stale route to clear, no change event needed
        assert!(events
            .iter()
            .all(|e| !matches!(e, NavEvent::RouteChanged(Some(_)))));
    }

    #[test]
    fn test_disable_clears_route() {
        let mut nav = started_nav(RerouteConfig::default());
        assert!(nav.route().is_some());
        let events = nav.set_enabled(false, 5000.0);
        assert!(nav.route().is_none());
        assert!(events
            .iter()
            .any(|e| matches!(e, NavEvent::RouteChanged(None))));
    }
}
