pub mod graph;
pub mod map;
pub mod routing;
pub mod snap;

pub use graph::{EdgeRef, EdgeSeg, StoreGraph};
pub use map::{
    AnchorSource, MapLoadError, NodeType, StoreMap, StoreMapAnchor, StoreMapEdge, StoreMapNode,
};
pub use routing::{shortest_path_from_point, PathResult};
pub use snap::{GraphSnapper, SnapConfig, SnapResult};
