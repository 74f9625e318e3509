//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::logic::intent::Intent;
use serde::Serialize;
use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

/// Structured record appended to the run's telemetry log, one JSON object
/// per line.
#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryPacket<'a> {
    // Outcome of one differenced frame
    Detection {
        ts: u128,
        frame_idx: u64,
        motion_present: bool,
        region_count: usize,
        stabilized_count: usize,
        accepted: bool,
        latency_us: u128,
    },
    // Committed state change
    FsmTransition {
        ts: u128,
        from: &'a str,
        to: &'a str,
        reason: &'a str,
        sequence: u64,
    },
    // Alarm let through by the cooldown timer
    AlarmTriggered {
        ts: u128,
        trigger_count: u64,
        motion: bool,
        unknown_identity: bool,
    },
    // Alarm blocked by the cooldown window or the enabled flag
    AlarmSuppressed {
        ts: u128,
        suppressed_count: u64,
    },
    // Periodic snapshot; payload is the controller's stats record
    Stats {
        ts: u128,
        stats: &'a serde_json::Value,
    },
    // Every intent executed by the controller
    IntentExecuted {
        ts: u128,
        intent: &'a Intent,
    },
}

/// Milliseconds since the epoch, 0 if the clock is before it.
pub fn epoch_millis(at: SystemTime) -> u128 {
    at.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

/// A telemetry session for one controller run.
/// Nothing is written unless the run was created with a directory.
pub struct TelemetryRun {
    pub run_id: String,
    log: Option<File>,
    dir: Option<PathBuf>,
}

impl TelemetryRun {
    /// Opens `<base>/<run-id>/telemetry.log` for appending when `base` is
    /// given; the run id is the UTC start time.
    pub fn new(base: Option<&Path>) -> Result<Self, anyhow::Error> {
        let run_id = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%SZ").to_string();

        match base {
            Some(base) => {
                let dir = base.join(&run_id);
                std::fs::create_dir_all(&dir)?;

                let log = OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(dir.join("telemetry.log"))?;

                Ok(Self {
                    run_id,
                    log: Some(log),
                    dir: Some(dir),
                })
            }
            None => Ok(Self::disabled()),
        }
    }

    pub fn disabled() -> Self {
        Self {
            run_id: String::new(),
            log: None,
            dir: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.log.is_some()
    }

    /// Directory holding this run's log, if active.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Serializes and writes a telemetry packet as a line to the log file.
    pub fn write(&mut self, pkt: &TelemetryPacket) -> Result<(), anyhow::Error> {
        if let Some(log) = &mut self.log {
            let line = serde_json::to_string(pkt)?;
            writeln!(log, "{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "perimeter-guard-{name}-{}-{}",
            std::process::id(),
            epoch_millis(SystemTime::now())
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn disabled_run_writes_nothing() {
        let mut run = TelemetryRun::new(None).unwrap();
        assert!(!run.is_active());
        run.write(&TelemetryPacket::AlarmSuppressed {
            ts: 1,
            suppressed_count: 1,
        })
        .unwrap();
    }

    #[test]
    fn packets_are_tagged_json_lines() {
        let base = scratch_dir("telemetry");
        let mut run = TelemetryRun::new(Some(&base)).unwrap();
        run.write(&TelemetryPacket::FsmTransition {
            ts: 5,
            from: "Monitoring",
            to: "Alert",
            reason: "threat detected",
            sequence: 2,
        })
        .unwrap();
        run.write(&TelemetryPacket::IntentExecuted {
            ts: 6,
            intent: &Intent::NoOp,
        })
        .unwrap();

        let path = run.dir().unwrap().join("telemetry.log");
        let content = std::fs::read_to_string(path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["kind"], "fsm_transition");
        assert_eq!(lines[0]["to"], "Alert");
        assert_eq!(lines[1]["kind"], "intent_executed");
        assert_eq!(lines[1]["intent"]["intent"], "no_op");

        let _ = std::fs::remove_dir_all(&base);
    }
}
