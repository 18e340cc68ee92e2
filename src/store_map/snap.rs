//! Snap-to-graph with corridor stickiness.
//!
//! Projects a free position onto the nearest walkable edge. Candidates are
//! scored as projection distance plus a switch penalty, so the previously
//! matched corridor wins against a marginally closer parallel one and the
//! matched edge does not flicker between aisles.
//!
//! Hard clamp mode additionally restricts candidates to edges connected to
//! the previous one, allowing a jump across the graph only when the
//! position is clearly past a wall (relocalization).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::geometry::{project_point_to_segment, Point2};
use crate::store_map::graph::{EdgeRef, StoreGraph};

/// Penalty applied to candidates sharing one endpoint with the previous
/// edge: switching into an adjoining corridor is cheap but not free.
const ADJACENT_PENALTY_M: f64 = 0.08;
/// A connected candidate must be this many times past `max_snap_meters`
/// before relocalization is even considered.
const RELOCALIZE_DISTANCE_FACTOR: f64 = 2.25;
/// And the global candidate must beat it by this margin in meters.
const RELOCALIZE_MARGIN_M: f64 = 0.2;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SnapConfig {
    pub max_snap_meters: f64,
    pub switch_penalty_meters: f64,
    pub hard_clamp: bool,
}

impl Default for SnapConfig {
    fn default() -> Self {
        SnapConfig {
            max_snap_meters: 1.75,
            switch_penalty_meters: 0.35,
            hard_clamp: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SnapResult {
    pub snapped: Point2,
    pub distance: f64,
    pub edge: Option<EdgeRef>,
    /// Fraction along the chosen edge from `from` to `to`.
    pub t: f64,
}

impl SnapResult {
    fn unmatched(p: Point2) -> SnapResult {
        SnapResult {
            snapped: p,
            distance: f64::INFINITY,
            edge: None,
            t: 0.0,
        }
    }
}

#[derive(Clone, Debug)]
struct Candidate {
    edge: EdgeRef,
    point: Point2,
    distance: f64,
    t: f64,
    score: f64,
}

pub struct GraphSnapper {
    graph: Arc<StoreGraph>,
    config: SnapConfig,
    previous_edge: Option<EdgeRef>,
}

impl GraphSnapper {
    pub fn new(graph: Arc<StoreGraph>, config: SnapConfig) -> Self {
        GraphSnapper {
            graph,
            config,
            previous_edge: None,
        }
    }

    pub fn config(&self) -> &SnapConfig {
        &self.config
    }

    pub fn previous_edge(&self) -> Option<&EdgeRef> {
        self.previous_edge.as_ref()
    }

    /// Forget the matched corridor (after a reset or relocalization jump).
    pub fn reset(&mut self) {
        self.previous_edge = None;
    }

    pub fn set_graph(&mut self, graph: Arc<StoreGraph>) {
        self.graph = graph;
        self.previous_edge = None;
    }

    /// Snap `p` to the graph and remember the chosen edge for the next
    /// call's stickiness scoring.
    pub fn snap(&mut self, p: Point2) -> SnapResult {
        let mut best_global: Option<Candidate> = None;
        let mut best_connected: Option<Candidate> = None;

        for seg in self.graph.edges() {
            let proj = project_point_to_segment(p, seg.a, seg.b);
            let edge = self.graph.edge_ref(seg);

            let (penalty, connected) = match &self.previous_edge {
                None => (0.0, false),
                Some(prev) if edge.same_edge(prev) => (0.0, true),
                Some(prev) if edge.shares_endpoint(prev) => (ADJACENT_PENALTY_M, true),
                Some(_) => (self.config.switch_penalty_meters, false),
            };

            let candidate = Candidate {
                edge,
                point: proj.point,
                distance: proj.distance,
                t: proj.t,
                score: proj.distance + penalty,
            };

            if connected
                && best_connected
                    .as_ref()
                    .map_or(true, |b| candidate.score < b.score)
            {
                best_connected = Some(candidate.clone());
            }
            if best_global
                .as_ref()
                .map_or(true, |b| candidate.score < b.score)
            {
                best_global = Some(candidate);
            }
        }

        let chosen = if self.config.hard_clamp && self.previous_edge.is_some() {
            match (best_connected, best_global) {
                (Some(connected), Some(global)) => {
                    let clearly_across_a_wall = connected.distance
                        > RELOCALIZE_DISTANCE_FACTOR * self.config.max_snap_meters
                        && global.distance + RELOCALIZE_MARGIN_M < connected.distance;
                    if clearly_across_a_wall {
                        global
                    } else {
                        connected
                    }
                }
                (None, Some(global)) => global,
                _ => return SnapResult::unmatched(p),
            }
        } else {
            match best_global {
                Some(candidate) => candidate,
                None => return SnapResult::unmatched(p),
            }
        };

        self.previous_edge = Some(chosen.edge.clone());

        if !self.config.hard_clamp && chosen.distance > self.config.max_snap_meters {
            // Too far to snap: report the raw point but keep the edge
            // reference so stickiness survives brief excursions.
            return SnapResult {
                snapped: p,
                distance: chosen.distance,
                edge: Some(chosen.edge),
                t: chosen.t,
            };
        }

        SnapResult {
            snapped: chosen.point,
            distance: chosen.distance,
            edge: Some(chosen.edge),
            t: chosen.t,
        }
    }
}
