//! Precomputed walkable graph over a store map.
//!
//! Built once per map and shared read-only (behind an `Arc`) across
//! snapping, routing and the Wi-Fi fix. Precomputes the id lookup, the
//! adjacency list for Dijkstra and an R-tree over node positions for
//! nearest-node queries.

use std::collections::HashMap;
use std::sync::Arc;

use rstar::primitives::GeomWithData;
use rstar::RTree;
use serde::{Deserialize, Serialize};

use crate::geometry::Point2;
use crate::store_map::map::{NodeType, StoreMap, StoreMapAnchor, StoreMapNode};

/// A walkable edge identified by its endpoint node ids.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRef {
    pub from: String,
    pub to: String,
}

impl EdgeRef {
    /// True when both refer to the same edge in either orientation.
    pub fn same_edge(&self, other: &EdgeRef) -> bool {
        (self.from == other.from && self.to == other.to)
            || (self.from == other.to && self.to == other.from)
    }

    /// True when the two edges share at least one endpoint.
    pub fn shares_endpoint(&self, other: &EdgeRef) -> bool {
        self.from == other.from
            || self.from == other.to
            || self.to == other.from
            || self.to == other.to
    }
}

/// Resolved edge segment used for projection and scoring.
#[derive(Clone, Debug)]
pub struct EdgeSeg {
    pub from: usize,
    pub to: usize,
    pub a: Point2,
    pub b: Point2,
    pub weight: f64,
    pub bidirectional: bool,
}

type NodeGeom = GeomWithData<[f64; 2], usize>;

pub struct StoreGraph {
    map: StoreMap,
    id_to_index: HashMap<String, usize>,
    edges: Vec<EdgeSeg>,
    adjacency: Vec<Vec<(usize, f64)>>,
    tree: RTree<NodeGeom>,
}

impl StoreGraph {
    /// Build the graph. Edges referencing unknown nodes are skipped (the
    /// map loader already drops them, this just refuses to panic on a
    /// hand-built map).
    pub fn new(map: StoreMap) -> Arc<StoreGraph> {
        let id_to_index: HashMap<String, usize> = map
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();

        let mut edges = Vec::with_capacity(map.edges.len());
        let mut adjacency = vec![Vec::new(); map.nodes.len()];
        for edge in &map.edges {
            let (from, to) = match (id_to_index.get(&edge.from), id_to_index.get(&edge.to)) {
                (Some(&f), Some(&t)) => (f, t),
                _ => continue,
            };
            let a = map.nodes[from].point();
            let b = map.nodes[to].point();
            let weight = edge.distance.unwrap_or_else(|| a.distance_to(b));

            adjacency[from].push((to, weight));
            if edge.bidirectional {
                adjacency[to].push((from, weight));
            }
            // Only edges that can actually be walked are snap candidates
            if weight > 0.0 || edge.bidirectional {
                edges.push(EdgeSeg {
                    from,
                    to,
                    a,
                    b,
                    weight,
                    bidirectional: edge.bidirectional,
                });
            }
        }

        let tree = RTree::bulk_load(
            map.nodes
                .iter()
                .enumerate()
                .map(|(i, n)| NodeGeom::new([n.x, n.y], i))
                .collect(),
        );

        Arc::new(StoreGraph {
            map,
            id_to_index,
            edges,
            adjacency,
            tree,
        })
    }

    pub fn map(&self) -> &StoreMap {
        &self.map
    }

    pub fn anchors(&self) -> &[StoreMapAnchor] {
        &self.map.anchors
    }

    pub fn node_count(&self) -> usize {
        self.map.nodes.len()
    }

    pub fn node(&self, index: usize) -> &StoreMapNode {
        &self.map.nodes[index]
    }

    pub fn node_point(&self, index: usize) -> Point2 {
        self.map.nodes[index].point()
    }

    pub fn node_index(&self, id: &str) -> Option<usize> {
        self.id_to_index.get(id).copied()
    }

    pub fn edges(&self) -> &[EdgeSeg] {
        &self.edges
    }

    pub fn adjacency(&self) -> &[Vec<(usize, f64)>] {
        &self.adjacency
    }

    pub fn edge_ref(&self, seg: &EdgeSeg) -> EdgeRef {
        EdgeRef {
            from: self.map.nodes[seg.from].id.clone(),
            to: self.map.nodes[seg.to].id.clone(),
        }
    }

    /// Index of the closest node passing the optional type filter.
    pub fn nearest_node_index(
        &self,
        point: Point2,
        types: Option<&[NodeType]>,
    ) -> Option<usize> {
        self.tree
            .nearest_neighbor_iter(&[point.x, point.y])
            .map(|geom| geom.data)
            .find(|&idx| match types {
                None => true,
                Some(allowed) => allowed.contains(&self.map.nodes[idx].node_type),
            })
    }

    /// Id of the closest node passing the optional type filter.
    pub fn nearest_node_id(&self, point: Point2, types: Option<&[NodeType]>) -> Option<&str> {
        self.nearest_node_index(point, types)
            .map(|idx| self.map.nodes[idx].id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_map::map::StoreMapEdge;

    pub(crate) fn grid_map() -> StoreMap {
        // n0 --- n1 --- n2     (y = 0)
        //         |
        //        n3            (y = 6)
        let node = |id: &str, x: f64, y: f64, node_type: NodeType| StoreMapNode {
            id: id.to_string(),
            label: id.to_uppercase(),
            x,
            y,
            floor: 0,
            node_type,
            section_id: None,
        };
        StoreMap {
            id: "grid".to_string(),
            label: "Grid".to_string(),
            grid_size: None,
            nodes: vec![
                node("n0", 0.0, 0.0, NodeType::Entry),
                node("n1", 10.0, 0.0, NodeType::Walkway),
                node("n2", 20.0, 0.0, NodeType::Aisle),
                node("n3", 10.0, 6.0, NodeType::Poi),
            ],
            edges: vec![
                StoreMapEdge {
                    from: "n0".to_string(),
                    to: "n1".to_string(),
                    distance: None,
                    bidirectional: true,
                },
                StoreMapEdge {
                    from: "n1".to_string(),
                    to: "n2".to_string(),
                    distance: None,
                    bidirectional: true,
                },
                StoreMapEdge {
                    from: "n1".to_string(),
                    to: "n3".to_string(),
                    distance: None,
                    bidirectional: true,
                },
            ],
            anchors: Vec::new(),
            dropped_edges: 0,
        }
    }

    #[test]
    fn test_adjacency_construction() {
        let graph = StoreGraph::new(grid_map());
        let n1 = graph.node_index("n1").unwrap();
        let mut neighbors: Vec<&str> = graph.adjacency()[n1]
            .iter()
            .map(|&(idx, _)| graph.node(idx).id.as_str())
            .collect();
        neighbors.sort();
        assert_eq!(neighbors, vec!["n0", "n2", "n3"]);
    }

    #[test]
    fn test_one_way_edge_single_direction() {
        let mut map = grid_map();
        map.edges[0].bidirectional = false; // n0 -> n1 only
        let graph = StoreGraph::new(map);
        let n0 = graph.node_index("n0").unwrap();
        let n1 = graph.node_index("n1").unwrap();
        assert!(graph.adjacency()[n0].iter().any(|&(idx, _)| idx == n1));
        assert!(!graph.adjacency()[n1].iter().any(|&(idx, _)| idx == n0));
    }

    #[test]
    fn test_explicit_distance_overrides_euclidean() {
        let mut map = grid_map();
        map.edges[0].distance = Some(42.0);
        let graph = StoreGraph::new(map);
        let n0 = graph.node_index("n0").unwrap();
        let (_, w) = graph.adjacency()[n0][0];
        assert_eq!(w, 42.0);
    }

    #[test]
    fn test_nearest_node_with_filter() {
        let graph = StoreGraph::new(grid_map());
        let p = Point2::new(9.0, 1.0);
        assert_eq!(graph.nearest_node_id(p, None), Some("n1"));
        assert_eq!(
            graph.nearest_node_id(p, Some(&[NodeType::Poi])),
            Some("n3"),
            "filter should skip closer nodes of other types"
        );
        assert_eq!(graph.nearest_node_id(p, Some(&[NodeType::Exit])), None);
    }

    #[test]
    fn test_edge_ref_relations() {
        let e1 = EdgeRef {
            from: "a".to_string(),
            to: "b".to_string(),
        };
        let e1_rev = EdgeRef {
            from: "b".to_string(),
            to: "a".to_string(),
        };
        let e2 = EdgeRef {
            from: "b".to_string(),
            to: "c".to_string(),
        };
        let e3 = EdgeRef {
            from: "x".to_string(),
            to: "y".to_string(),
        };
        assert!(e1.same_edge(&e1_rev));
        assert!(!e1.same_edge(&e2));
        assert!(e1.shares_endpoint(&e2));
        assert!(!e1.shares_endpoint(&e3));
    }
}
