//! Flat controller configuration, loadable from YAML
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::error::ConfigError;
use crate::logic::timer::AlarmConfig;
use crate::motion::MotionConfig;
use crate::stabilizer::StabilizerConfig;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PerimeterConfig {
    pub threshold: u8,
    pub min_region_area: u32,
    pub blur_kernel_size: u32,
    pub dilation_iterations: u32,
    pub stabilizer_window: usize,
    pub stabilizer_min_confidence_frames: usize,
    pub alert_dwell_seconds: f64,
    pub cooldown_seconds: f64,
    pub ring_buffer_capacity: usize,
    pub cache_capacity: usize,
    pub alarm_enabled: bool,
    /// Directory for JSON-lines telemetry; none disables it.
    pub telemetry: Option<PathBuf>,
}

impl Default for PerimeterConfig {
    fn default() -> Self {
        let motion = MotionConfig::default();
        let stabilizer = StabilizerConfig::default();
        PerimeterConfig {
            threshold: motion.threshold,
            min_region_area: motion.min_region_area,
            blur_kernel_size: motion.blur_kernel_size,
            dilation_iterations: motion.dilation_iterations,
            stabilizer_window: stabilizer.window,
            stabilizer_min_confidence_frames: stabilizer.min_confidence_frames,
            alert_dwell_seconds: 2.0,
            cooldown_seconds: 10.0,
            ring_buffer_capacity: 30,
            cache_capacity: 100,
            alarm_enabled: true,
            telemetry: None,
        }
    }
}

impl PerimeterConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: PerimeterConfig =
            serde_yml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
        let config: PerimeterConfig =
            serde_yml::from_reader(file).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.motion().validate()?;
        self.stabilizer().validate()?;
        if self.ring_buffer_capacity == 0 {
            return Err(ConfigError::Zero("ring_buffer_capacity"));
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::Zero("cache_capacity"));
        }
        seconds(self.alert_dwell_seconds, "alert_dwell_seconds")?;
        seconds(self.cooldown_seconds, "cooldown_seconds")?;
        Ok(())
    }

    pub fn motion(&self) -> MotionConfig {
        MotionConfig {
            threshold: self.threshold,
            min_region_area: self.min_region_area,
            blur_kernel_size: self.blur_kernel_size,
            dilation_iterations: self.dilation_iterations,
        }
    }

    pub fn stabilizer(&self) -> StabilizerConfig {
        StabilizerConfig {
            window: self.stabilizer_window,
            min_confidence_frames: self.stabilizer_min_confidence_frames,
        }
    }

    /// Call after [`validate`](Self::validate); invalid durations fall back to zero.
    pub fn alarm(&self) -> AlarmConfig {
        AlarmConfig {
            enabled: self.alarm_enabled,
            cooldown: self.cooldown(),
        }
    }

    pub fn alert_dwell(&self) -> Duration {
        seconds(self.alert_dwell_seconds, "alert_dwell_seconds").unwrap_or_default()
    }

    pub fn cooldown(&self) -> Duration {
        seconds(self.cooldown_seconds, "cooldown_seconds").unwrap_or_default()
    }
}

fn seconds(value: f64, key: &'static str) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::Duration(key))
}
