//! Store map asset: typed nodes, edges and Wi-Fi anchors.
//!
//! The asset is a JSON document in the plan frame (meters, origin at the
//! floorplan top-left). Nodes and anchors are immutable once loaded; the
//! positioning and navigation services only ever read them.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::Point2;

#[derive(Error, Debug)]
pub enum MapLoadError {
    #[error("failed to read map file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse map JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate node id: {0}")]
    DuplicateNode(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Entry,
    Exit,
    Aisle,
    Poi,
    Walkway,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorSource {
    Mock,
    Live,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreMapNode {
    pub id: String,
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub floor: i32,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
}

impl StoreMapNode {
    pub fn point(&self) -> Point2 {
        Point2::new(self.x, self.y)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreMapEdge {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    /// One-way from `from` to `to` when false.
    #[serde(default = "default_true")]
    pub bidirectional: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreMapAnchor {
    pub bssid: String,
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub floor: i32,
    pub source: AnchorSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl StoreMapAnchor {
    pub fn point(&self) -> Point2 {
        Point2::new(self.x, self.y)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreMap {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_size: Option<f64>,
    pub nodes: Vec<StoreMapNode>,
    #[serde(default)]
    pub edges: Vec<StoreMapEdge>,
    #[serde(default)]
    pub anchors: Vec<StoreMapAnchor>,
    /// Edges dropped at load because they referenced unknown nodes.
    #[serde(skip)]
    pub dropped_edges: usize,
}

impl StoreMap {
    /// Parse and validate a map document. Duplicate node ids are an error;
    /// edges referencing unknown nodes are dropped and counted.
    pub fn from_json(json: &str) -> Result<StoreMap, MapLoadError> {
        let mut map: StoreMap = serde_json::from_str(json)?;

        let mut seen = HashSet::with_capacity(map.nodes.len());
        for node in &map.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(MapLoadError::DuplicateNode(node.id.clone()));
            }
        }

        let before = map.edges.len();
        map.edges
            .retain(|edge| seen.contains(edge.from.as_str()) && seen.contains(edge.to.as_str()));
        map.dropped_edges = before - map.edges.len();

        Ok(map)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<StoreMap, MapLoadError> {
        let json = fs::read_to_string(path)?;
        StoreMap::from_json(&json)
    }

    pub fn node(&self, id: &str) -> Option<&StoreMapNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}
