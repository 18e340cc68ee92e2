use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::sync::mpsc;

use indoor_nav_rs::nav::{NavEvent, NavigationService, RerouteConfig};
use indoor_nav_rs::positioning::{PositioningConfig, PositioningService, PositioningEvent};
use indoor_nav_rs::session_log::{InstructionRecord, LiveStatus, RecordedSample, SessionExport};
use indoor_nav_rs::sim::{simulated_walk, SensorEvent, WalkConfig};
use indoor_nav_rs::store_map::{shortest_path_from_point, NodeType, SnapConfig, StoreGraph, StoreMap};

#[derive(Parser, Debug)]
#[command(name = "indoor_nav")]
#[command(about = "Indoor positioning demo - walks a simulated route through a store map", long_about = None)]
struct Args {
    /// Store map JSON asset
    #[arg(long)]
    map: PathBuf,

    /// Destination node id (default: first poi node)
    #[arg(long)]
    destination: Option<String>,

    /// Start node id (default: first entry node)
    #[arg(long)]
    start: Option<String>,

    /// Enable Wi-Fi fusion (default: true)
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    wifi: bool,

    /// Hard-clamp snapping to the current corridor
    #[arg(long)]
    hard_clamp: bool,

    /// Maximum snap distance in meters
    #[arg(long, default_value_t = 1.75)]
    max_snap: f64,

    /// User stride scale in [0.6, 1.5]
    #[arg(long, default_value_t = 1.0)]
    stride_scale: f64,

    /// Simulation speedup over real time
    #[arg(long, default_value_t = 10.0)]
    time_scale: f64,

    /// Stop after this many simulated seconds (0 = walk to the end)
    #[arg(long, default_value_t = 0)]
    duration: u64,

    /// Output directory for session exports and live status
    #[arg(long, default_value = "sessions")]
    output_dir: String,
}

fn pick_node(graph: &StoreGraph, wanted: &Option<String>, fallback: NodeType) -> Option<String> {
    if let Some(id) = wanted {
        return graph.node_index(id).map(|_| id.clone());
    }
    graph
        .map()
        .nodes
        .iter()
        .find(|n| n.node_type == fallback)
        .or_else(|| graph.map().nodes.last())
        .map(|n| n.id.clone())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    println!("[{}] Indoor Nav starting", ts_now());
    println!("  Map: {}", args.map.display());
    println!("  Wi-Fi fusion: {}", args.wifi);
    println!("  Output dir: {}", args.output_dir);

    std::fs::create_dir_all(&args.output_dir)?;

    let map = StoreMap::load(&args.map)
        .with_context(|| format!("loading map {}", args.map.display()))?;
    if map.dropped_edges > 0 {
        eprintln!(
            "[MAP] dropped {} edge(s) referencing unknown nodes",
            map.dropped_edges
        );
    }
    println!(
        "[{}] Loaded '{}': {} nodes, {} edges, {} anchors",
        ts_now(),
        map.label,
        map.nodes.len(),
        map.edges.len(),
        map.anchors.len()
    );
    let graph = StoreGraph::new(map);

    let start_id = pick_node(&graph, &args.start, NodeType::Entry)
        .context("map has no usable start node")?;
    let destination_id = pick_node(&graph, &args.destination, NodeType::Poi)
        .context("map has no usable destination node")?;
    let start_index = graph
        .node_index(&start_id)
        .context("start node vanished from the graph")?;
    let start = graph.node_point(start_index);
    println!(
        "[{}] Walking from '{}' to '{}'",
        ts_now(),
        start_id,
        destination_id
    );

    // The simulated pedestrian follows the true shortest path; the engine
    // has to rediscover it from the sensor stream alone.
    let truth = shortest_path_from_point(&graph, start, &destination_id)
        .context("destination unreachable from start")?;
    println!(
        "[{}] True route: {:.1} m over {} nodes",
        ts_now(),
        truth.length_meters,
        truth.node_ids.len()
    );

    let mut positioning = PositioningService::new(
        graph.clone(),
        PositioningConfig {
            start,
            stride_scale: args.stride_scale,
            wifi_enabled: args.wifi,
            snap: SnapConfig {
                max_snap_meters: args.max_snap,
                hard_clamp: args.hard_clamp,
                ..SnapConfig::default()
            },
            ..Default::default()
        },
    );
    let mut nav = NavigationService::new(graph.clone(), RerouteConfig::default());
    nav.update_position(start, 0.0);
    nav.set_enabled(true, 0.0);
    nav.set_destination(Some(destination_id.clone()), 0.0);
    let initial_recalcs = nav.recalc_count();

    let (tx, mut rx) = mpsc::channel::<SensorEvent>(512);
    let walk_config = WalkConfig {
        wifi_interval_ms: positioning.config().wifi_scan_interval_ms,
        time_scale: args.time_scale,
        ..WalkConfig::default()
    };
    let anchors = graph.anchors().to_vec();
    let sim_handle = tokio::spawn(simulated_walk(
        tx,
        truth.points.clone(),
        anchors,
        walk_config,
    ));

    let mut export = SessionExport::new(&graph.map().id, Utc::now().to_rfc3339());
    let started_wall = Utc::now();
    let mut sim_now_ms: f64 = 0.0;
    let mut last_status_ms: f64 = 0.0;
    let mut last_autosave_ms: f64 = 0.0;
    let mut last_instruction = String::new();
    let mut total_poses: u64 = 0;
    let mut snapped_poses: u64 = 0;

    while let Some(event) = rx.recv().await {
        let mut positioning_events = Vec::new();
        match event {
            SensorEvent::Mag(sample) => {
                sim_now_ms = sample.timestamp_ms;
                positioning.feed_mag(&sample);
                export.samples.push(RecordedSample {
                    mag: Some(sample),
                    ..Default::default()
                });
            }
            SensorEvent::Motion(sample) => {
                sim_now_ms = sample.timestamp_ms;
                positioning_events = positioning.feed_device_motion(&sample);
                export.samples.push(RecordedSample {
                    device_motion: Some(sample),
                    ..Default::default()
                });
            }
            SensorEvent::Pedometer(sample) => {
                sim_now_ms = sample.timestamp_ms;
                positioning_events = positioning.feed_pedometer(&sample);
                export.samples.push(RecordedSample {
                    pedometer: Some(sample),
                    ..Default::default()
                });
            }
            SensorEvent::Wifi(scan) => {
                sim_now_ms = scan.timestamp_ms;
                positioning_events = positioning.feed_wifi_scan(&scan);
                export.samples.push(RecordedSample {
                    wifi: Some(scan),
                    ..Default::default()
                });
            }
            SensorEvent::Done => break,
        }

        for event in positioning_events {
            match event {
                PositioningEvent::Pose(pose) => {
                    export.poses.push(pose);
                    total_poses += 1;
                    if pose.snapped {
                        snapped_poses += 1;
                    }
                    for nav_event in nav.update_position(pose.position(), pose.timestamp_ms) {
                        match nav_event {
                            NavEvent::Instruction {
                                text,
                                distance_to_next,
                                ..
                            } => {
                                if text != last_instruction {
                                    println!(
                                        "[{}] [NAV] {} ({:.1} m)",
                                        ts_now(),
                                        text,
                                        distance_to_next
                                    );
                                    last_instruction = text.clone();
                                }
                                export.instructions.push(InstructionRecord {
                                    timestamp_ms: pose.timestamp_ms,
                                    text,
                                    distance_to_next,
                                });
                            }
                            NavEvent::OffRoute(off) => {
                                eprintln!(
                                    "[{}] [NAV] off-route: {}",
                                    ts_now(),
                                    off
                                );
                            }
                            NavEvent::RouteChanged(route) => {
                                if let Some(route) = route {
                                    println!(
                                        "[{}] [NAV] route updated: {:.1} m",
                                        ts_now(),
                                        route.path.length_meters
                                    );
                                }
                            }
                        }
                    }
                }
                PositioningEvent::WifiHardReset { jump_meters, .. } => {
                    eprintln!(
                        "[{}] [WIFI] hard reset, jumped {:.1} m",
                        ts_now(),
                        jump_meters
                    );
                }
                _ => {}
            }
        }

        if args.duration > 0 && sim_now_ms >= args.duration as f64 * 1000.0 {
            println!("[{}] Duration reached, stopping...", ts_now());
            break;
        }

        // Live status every 2 simulated seconds
        if sim_now_ms - last_status_ms >= 2000.0 {
            last_status_ms = sim_now_ms;
            let nav_state = nav.state();
            let status = LiveStatus {
                timestamp_ms: sim_now_ms,
                uptime_seconds: (Utc::now() - started_wall).num_seconds().max(0) as u64,
                pose: positioning.pose(),
                tier: positioning.confidence_tier(sim_now_ms),
                step_count: positioning.step_count(),
                wifi_fix_count: positioning.wifi_fix_count(),
                off_route: nav_state.off_route,
                next_instruction: nav_state.next_instruction.clone(),
                route_length_meters: nav_state.route.as_ref().map(|r| r.path.length_meters),
                health: Some(positioning.sensor_health(sim_now_ms)),
            };
            let _ = status.save(format!("{}/live_status.json", args.output_dir));
        }

        // Autosave every 15 simulated seconds, then clear buffers so a
        // long session does not grow without bound
        if sim_now_ms - last_autosave_ms >= 15_000.0 {
            last_autosave_ms = sim_now_ms;
            update_stats(
                &mut export,
                &positioning,
                &nav,
                initial_recalcs,
                total_poses,
                snapped_poses,
            );
            let path = format!("{}/session_autosave.json.gz", args.output_dir);
            match export.save_gz(&path) {
                Ok(()) => {
                    println!(
                        "[{}] Auto-saved {} samples to {}",
                        ts_now(),
                        export.samples.len(),
                        path
                    );
                    export.clear_buffers();
                }
                Err(err) => eprintln!("[SAVE] autosave failed: {}", err),
            }
        }
    }

    sim_handle.abort();
    positioning.stop();

    update_stats(
        &mut export,
        &positioning,
        &nav,
        initial_recalcs,
        total_poses,
        snapped_poses,
    );
    let final_path = format!("{}/session_final.json", args.output_dir);
    export.save(&final_path)?;

    println!("\n=== Final Stats ===");
    println!("Steps: {}", positioning.step_count());
    println!("Wi-Fi fixes: {}", positioning.wifi_fix_count());
    println!("Reroutes: {}", nav.recalc_count().saturating_sub(initial_recalcs));
    if let Some(pose) = positioning.pose() {
        println!("Final pose: ({:.2}, {:.2}) snapped={}", pose.x, pose.y, pose.snapped);
        let goal = graph.node_point(
            graph
                .node_index(&destination_id)
                .context("destination vanished")?,
        );
        println!("Distance to destination: {:.2} m", pose.position().distance_to(goal));
    }
    println!("Session saved to {}", final_path);

    Ok(())
}

fn update_stats(
    export: &mut SessionExport,
    positioning: &PositioningService,
    nav: &NavigationService,
    initial_recalcs: u64,
    total_poses: u64,
    snapped_poses: u64,
) {
    export.stats.steps = positioning.step_count();
    export.stats.wifi_fixes = positioning.wifi_fix_count();
    export.stats.reroutes = nav.recalc_count().saturating_sub(initial_recalcs);
    export.stats.poses = total_poses;
    export.stats.snapped_poses = snapped_poses;
    export.stats.final_pose = positioning.pose();
    export.stats.route_length_meters = nav.route().map(|r| r.path.length_meters);
}
