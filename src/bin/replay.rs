//! Offline replay of recorded sessions.
//!
//! Re-feeds a session export through a fresh positioning + navigation
//! stack with snapping and reroute parameters overridable from the CLI,
//! for tuning against golden logs without walking the floor again.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use flate2::read::GzDecoder;

use indoor_nav_rs::geometry::Point2;
use indoor_nav_rs::nav::{NavigationService, RerouteConfig};
use indoor_nav_rs::positioning::{PositioningConfig, PositioningEvent, PositioningService};
use indoor_nav_rs::session_log::SessionExport;
use indoor_nav_rs::store_map::{SnapConfig, StoreGraph, StoreMap};

#[derive(Parser, Debug)]
#[command(name = "replay")]
#[command(about = "Replay a recorded session through the positioning engine", long_about = None)]
struct Args {
    /// Session export (.json or .json.gz)
    #[arg(long)]
    log: PathBuf,

    /// Store map JSON asset the session was recorded against
    #[arg(long)]
    map: PathBuf,

    /// Destination node id to navigate to during the replay
    #[arg(long)]
    destination: Option<String>,

    /// Start position as "x,y" in meters (default: first recorded pose)
    #[arg(long)]
    start: Option<String>,

    /// Maximum snap distance in meters
    #[arg(long, default_value_t = 1.75)]
    max_snap: f64,

    /// Corridor switch penalty in meters
    #[arg(long, default_value_t = 0.35)]
    switch_penalty: f64,

    /// Hard-clamp snapping to the current corridor
    #[arg(long)]
    hard_clamp: bool,

    /// Disable Wi-Fi fusion during the replay (A/B testing)
    #[arg(long)]
    no_wifi: bool,

    /// Off-route distance threshold in meters
    #[arg(long, default_value_t = 4.0)]
    off_route_meters: f64,

    /// Off-route persistence before rerouting, in milliseconds
    #[arg(long, default_value_t = 3000.0)]
    persist_ms: f64,
}

fn read_export(path: &Path) -> Result<SessionExport> {
    let mut raw = Vec::new();
    File::open(path)
        .with_context(|| format!("opening {}", path.display()))?
        .read_to_end(&mut raw)?;

    let json = if path.extension().map_or(false, |ext| ext == "gz") {
        let mut decoder = GzDecoder::new(raw.as_slice());
        let mut out = String::new();
        decoder.read_to_string(&mut out)?;
        out
    } else {
        String::from_utf8(raw).context("session log is not valid UTF-8")?
    };
    serde_json::from_str(&json).context("parsing session export")
}

fn parse_start(arg: &str) -> Result<Point2> {
    let (x, y) = arg
        .split_once(',')
        .context("start must be \"x,y\"")?;
    Ok(Point2::new(x.trim().parse()?, y.trim().parse()?))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let export = read_export(&args.log)?;
    let map = StoreMap::load(&args.map)
        .with_context(|| format!("loading map {}", args.map.display()))?;
    let graph = StoreGraph::new(map);

    let start = match &args.start {
        Some(arg) => parse_start(arg)?,
        None => export
            .poses
            .first()
            .map(|p| p.position())
            .or_else(|| export.stats.final_pose.map(|p| p.position()))
            .context("no start given and no poses in the log")?,
    };

    println!(
        "Replaying {} samples from {} (map '{}')",
        export.samples.len(),
        args.log.display(),
        graph.map().label
    );

    let mut positioning = PositioningService::new(
        graph.clone(),
        PositioningConfig {
            start,
            wifi_enabled: !args.no_wifi,
            snap: SnapConfig {
                max_snap_meters: args.max_snap,
                switch_penalty_meters: args.switch_penalty,
                hard_clamp: args.hard_clamp,
            },
            ..Default::default()
        },
    );
    let mut nav = NavigationService::new(
        graph.clone(),
        RerouteConfig {
            off_route_meters: args.off_route_meters,
            persist_ms: args.persist_ms,
        },
    );
    nav.update_position(start, 0.0);
    if let Some(destination) = &args.destination {
        nav.set_enabled(true, 0.0);
        nav.set_destination(Some(destination.clone()), 0.0);
    }
    let initial_recalcs = nav.recalc_count();

    let mut samples = export.samples.clone();
    samples.sort_by(|a, b| {
        a.timestamp_ms()
            .partial_cmp(&b.timestamp_ms())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut poses = 0u64;
    let mut snapped = 0u64;
    let mut hard_resets = 0u64;
    for sample in &samples {
        let mut events = Vec::new();
        if let Some(mag) = &sample.mag {
            positioning.feed_mag(mag);
        }
        if let Some(motion) = &sample.device_motion {
            events = positioning.feed_device_motion(motion);
        }
        if let Some(pedometer) = &sample.pedometer {
            events = positioning.feed_pedometer(pedometer);
        }
        if let Some(wifi) = &sample.wifi {
            events = positioning.feed_wifi_scan(wifi);
        }

        for event in events {
            match event {
                PositioningEvent::Pose(pose) => {
                    poses += 1;
                    if pose.snapped {
                        snapped += 1;
                    }
                    nav.update_position(pose.position(), pose.timestamp_ms);
                }
                PositioningEvent::WifiHardReset { .. } => hard_resets += 1,
                _ => {}
            }
        }
    }

    println!("\n=== Replay Summary ===");
    println!("Poses: {} ({} snapped)", poses, snapped);
    println!("Steps: {}", positioning.step_count());
    println!("Wi-Fi fixes: {} ({} hard resets)", positioning.wifi_fix_count(), hard_resets);
    if args.destination.is_some() {
        println!(
            "Reroutes: {}",
            nav.recalc_count().saturating_sub(initial_recalcs)
        );
        let state = nav.state();
        println!("Final instruction: {}", state.next_instruction);
    }
    if let Some(pose) = positioning.pose() {
        println!(
            "Final pose: ({:.2}, {:.2}) heading {:.0}° snapped={}",
            pose.x, pose.y, pose.heading_deg, pose.snapped
        );
    }
    if let Some(original) = export.stats.final_pose {
        if let Some(replayed) = positioning.pose() {
            println!(
                "Drift vs original run: {:.2} m",
                replayed.position().distance_to(original.position())
            );
        }
    }

    Ok(())
}
