//! Indoor positioning and navigation engine for pedestrians.
//!
//! Converts a stream of inertial samples, pedometer counts and periodic
//! Wi-Fi scans into a continuously updated pose on a known floorplan,
//! matches the pose to a walkable graph, routes to a destination and emits
//! turn-by-turn instructions with off-route rerouting.
//!
//! # Architecture
//!
//! The core is a pure, synchronous computation layer: every service takes
//! samples (with caller-supplied timestamps) in and returns event vectors
//! out. Nothing in the library spawns tasks, reads clocks or touches the
//! network, which is what makes recorded sessions replay bit-for-bit.
//!
//! Data flow:
//!
//! ```text
//! sensors/Wi-Fi -> PdrEngine + wifi_fix -> Kalman2D -> GraphSnapper
//!               -> Pose2D events -> NavigationService -> instructions
//! ```
//!
//! # Example
//!
//! ```no_run
//! use indoor_nav_rs::geometry::Point2;
//! use indoor_nav_rs::positioning::{PositioningConfig, PositioningService};
//! use indoor_nav_rs::store_map::{StoreGraph, StoreMap};
//!
//! let map = StoreMap::load("store.json").unwrap();
//! let graph = StoreGraph::new(map);
//! let mut positioning = PositioningService::new(
//!     graph,
//!     PositioningConfig {
//!         start: Point2::new(2.0, 14.0),
//!         ..Default::default()
//!     },
//! );
//! // feed samples; poses come back as events
//! ```

pub mod filters;
pub mod geometry;
pub mod nav;
pub mod pdr;
pub mod positioning;
pub mod sensor_health;
pub mod session_log;
pub mod sim;
pub mod store_map;
pub mod types;
pub mod wifi_fix;


// Re-export the types most callers touch
pub use filters::{Kalman2D, Kalman2DState};
pub use geometry::{
    bearing, heading_diff, low_pass_heading, project_point_to_segment, wrap_heading, Point2,
};
pub use nav::turn_by_turn::{
    build_maneuvers, format_next_instruction, route_progress, Maneuver, ManeuverType,
    RouteProgress,
};
pub use nav::{IndoorRoute, NavEvent, NavState, NavigationService, RerouteConfig};
pub use pdr::{PdrEngine, PdrStep, StepSource};
pub use positioning::{ConfidenceTier, PositioningConfig, PositioningEvent, PositioningService};
pub use sensor_health::{SensorHealth, SensorHealthTracker, SilenceThresholds, SourceHealth};
pub use session_log::{LiveStatus, RecordedSample, SessionExport};
pub use store_map::{
    shortest_path_from_point, AnchorSource, EdgeRef, GraphSnapper, MapLoadError, NodeType,
    PathResult, SnapConfig, SnapResult, StoreGraph, StoreMap, StoreMapAnchor, StoreMapEdge,
    StoreMapNode,
};
pub use types::{
    Acceleration, Attitude, DeviceMotionSample, MagSample, PedometerSample, Pose2D, PoseSource,
    RotationRate, WifiReading, WifiScan, WifiScanStatus,
};
pub use wifi_fix::{compute_fix, normalize_bssid, WifiFix};
