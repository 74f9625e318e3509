//! Perimeter guard replay tool.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

#[macro_use]
extern crate log;

#[macro_use]
extern crate serde_derive;

use anyhow::Context;
use docopt::Docopt;
use perimeter_guard::logic::clock::{Clock, ManualClock};
use perimeter_guard::{LogAlarmAction, PerimeterConfig, PerimeterController, RawFrame};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const FRAME_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "pgm", "ppm"];

const USAGE: &str = "
Perimeter guard: replays a directory of frames through the motion detector and alarm controller.

Usage:
  perimeter-guard [--config=<file>] [--disarmed] [--telemetry=<dir>] [--fps=<n>] <frames-dir>
  perimeter-guard (--version | -v)
  perimeter-guard (--help | -h)

Options:
    --config=<file>     YAML configuration file
    --disarmed          Start with the system disarmed
    --telemetry=<dir>   Write JSON-lines telemetry under this directory
    --fps=<n>           Rate the frames were captured at [default: 10]
    --version, -v       Show version
    --help, -h          Show help
";

#[derive(Debug, Clone, Deserialize)]
struct Args {
    arg_frames_dir: String,
    flag_config: Option<String>,
    flag_disarmed: bool,
    flag_telemetry: Option<String>,
    flag_fps: f64,
}

fn main() -> anyhow::Result<()> {
    let version = env!("CARGO_PKG_NAME").to_string() + ", version: " + env!("CARGO_PKG_VERSION");
    env_logger::init();

    let args: Args = Docopt::new(USAGE)
        .map(|d| d.help(true))
        .map(|d| d.version(Some(version)))
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    let mut config = match &args.flag_config {
        Some(path) => PerimeterConfig::from_yaml_file(Path::new(path))?,
        None => PerimeterConfig::default(),
    };
    if let Some(dir) = &args.flag_telemetry {
        config.telemetry = Some(PathBuf::from(dir));
    }

    if !(args.flag_fps.is_finite() && args.flag_fps > 0.0) {
        anyhow::bail!("--fps must be a positive number, got {}", args.flag_fps);
    }
    let frame_interval = Duration::from_secs_f64(1.0 / args.flag_fps);

    let frames = list_frames(Path::new(&args.arg_frames_dir))?;
    info!("Replaying {} frames from {}", frames.len(), args.arg_frames_dir);

    // Replay time follows the capture rate, not the wall clock.
    let clock = ManualClock::new();
    let mut controller =
        PerimeterController::with_parts(config, Arc::new(clock.clone()), Arc::new(LogAlarmAction))?;
    if let Some(dir) = controller.telemetry_dir() {
        info!("Writing telemetry to {}", dir.display());
    }
    if args.flag_disarmed {
        controller.disarm();
    }
    controller.start();

    for path in &frames {
        let image = match image::open(path) {
            Ok(image) => image,
            Err(e) => {
                warn!("Skipping {}: {e}", path.display());
                continue;
            }
        };

        let report = controller
            .process_frame(RawFrame::from_dynamic(image).with_timestamp(clock.wall()), false)
            .with_context(|| format!("processing {}", path.display()))?;

        if !report.transitions.is_empty() || report.alarm.is_some() {
            println!("{}", serde_json::to_string(&report)?);
        }
        clock.advance(frame_interval);
    }

    controller.stop();
    controller.record_stats();
    println!("{}", serde_json::to_string_pretty(&controller.stats())?);
    Ok(())
}

/// Image files directly under `dir`, in name order.
fn list_frames(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut frames: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        })
        .collect();
    frames.sort();
    Ok(frames)
}
