//! Sliding-window voter that suppresses single-frame detection flicker
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::error::ConfigError;
use crate::motion::DetectionResult;
use crate::sync::lock;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Anything the voter can compare by size: number of regions, faces, boxes.
pub trait Countable {
    fn count(&self) -> usize;
}

impl Countable for DetectionResult {
    fn count(&self) -> usize {
        self.region_count
    }
}

impl<U> Countable for Vec<U> {
    fn count(&self) -> usize {
        self.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilizerConfig {
    pub window: usize,
    /// Window length below which raw values pass straight through.
    pub min_confidence_frames: usize,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        StabilizerConfig {
            window: 5,
            min_confidence_frames: 3,
        }
    }
}

impl StabilizerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window == 0 {
            return Err(ConfigError::Zero("stabilizer_window"));
        }
        if self.min_confidence_frames == 0 {
            return Err(ConfigError::Zero("stabilizer_min_confidence_frames"));
        }
        if self.min_confidence_frames > self.window {
            return Err(ConfigError::ConfidenceExceedsWindow {
                min: self.min_confidence_frames,
                window: self.window,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StabilizedDetection<T> {
    /// The value downstream consumers should act on.
    pub value: T,
    /// Whether the raw value of this call was accepted.
    pub accepted: bool,
    /// Window median, when voting was active.
    pub median_count: Option<usize>,
    pub window_len: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StabilizerStats {
    pub observations: u64,
    pub accepted: u64,
    pub suppressed: u64,
    pub window_len: usize,
}

struct StabilizerState<T> {
    history: VecDeque<T>,
    stable: Option<T>,
    observations: u64,
    accepted: u64,
    suppressed: u64,
}

pub struct TemporalStabilizer<T> {
    config: StabilizerConfig,
    state: Mutex<StabilizerState<T>>,
}

impl<T: Countable + Clone> TemporalStabilizer<T> {
    pub fn new(config: StabilizerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(TemporalStabilizer {
            state: Mutex::new(StabilizerState {
                history: VecDeque::with_capacity(config.window),
                stable: None,
                observations: 0,
                accepted: 0,
                suppressed: 0,
            }),
            config,
        })
    }

    pub fn config(&self) -> &StabilizerConfig {
        &self.config
    }

    /// Votes on `raw`. Once the window holds enough observations, a raw value
    /// whose count strays more than one from the window median is replaced by
    /// the last accepted value.
    pub fn stabilize(&self, raw: T) -> StabilizedDetection<T> {
        let mut state = lock(&self.state);
        state.observations += 1;

        let raw_count = raw.count();
        state.history.push_back(raw.clone());
        while state.history.len() > self.config.window {
            state.history.pop_front();
        }
        let window_len = state.history.len();

        if window_len < self.config.min_confidence_frames {
            state.accepted += 1;
            state.stable = Some(raw.clone());
            return StabilizedDetection {
                value: raw,
                accepted: true,
                median_count: None,
                window_len,
            };
        }

        let median = median_count(state.history.iter().map(Countable::count).collect());
        let accepted = raw_count.abs_diff(median) <= 1;

        // With voting active there is always a prior accepted value, since
        // min_confidence_frames >= 1 forces the first call down the path above.
        let value = match (accepted, state.stable.clone()) {
            (false, Some(stable)) => {
                state.suppressed += 1;
                debug!("Suppressed count {raw_count}, window median is {median}");
                stable
            }
            _ => {
                state.accepted += 1;
                state.stable = Some(raw.clone());
                raw
            }
        };

        StabilizedDetection {
            value,
            accepted,
            median_count: Some(median),
            window_len,
        }
    }

    pub fn stats(&self) -> StabilizerStats {
        let state = lock(&self.state);
        StabilizerStats {
            observations: state.observations,
            accepted: state.accepted,
            suppressed: state.suppressed,
            window_len: state.history.len(),
        }
    }

    /// Clears the window and the stable value; statistics are kept.
    pub fn reset(&self) {
        let mut state = lock(&self.state);
        state.history.clear();
        state.stable = None;
    }
}

/// Middle value, or the truncated mean of the two middle values.
fn median_count(mut counts: Vec<usize>) -> usize {
    counts.sort_unstable();
    let mid = counts.len() / 2;
    if counts.len() % 2 == 0 {
        (counts[mid - 1] + counts[mid]) / 2
    } else {
        counts[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxes(n: usize) -> Vec<u8> {
        vec![0; n]
    }

    #[test]
    fn rejects_bad_configs() {
        let zero = StabilizerConfig {
            window: 0,
            min_confidence_frames: 0,
        };
        assert!(TemporalStabilizer::<Vec<u8>>::new(zero).is_err());

        let too_many = StabilizerConfig {
            window: 3,
            min_confidence_frames: 4,
        };
        assert_eq!(
            too_many.validate(),
            Err(ConfigError::ConfidenceExceedsWindow { min: 4, window: 3 })
        );
    }

    #[test]
    fn single_spike_is_suppressed() {
        let stabilizer = TemporalStabilizer::new(StabilizerConfig::default()).unwrap();
        let mut out = Vec::new();
        for n in [0, 0, 0, 5, 0] {
            out.push(stabilizer.stabilize(boxes(n)));
        }

        assert!(out.iter().all(|s| s.value.len() == 0));
        assert!(!out[3].accepted);
        assert_eq!(out[3].median_count, Some(0));
        assert!(out[4].accepted);

        let stats = stabilizer.stats();
        assert_eq!(stats.observations, 5);
        assert_eq!(stats.suppressed, 1);
        assert_eq!(stats.accepted, 4);
    }

    #[test]
    fn short_window_passes_raw_through() {
        let stabilizer = TemporalStabilizer::new(StabilizerConfig::default()).unwrap();
        let first = stabilizer.stabilize(boxes(0));
        let second = stabilizer.stabilize(boxes(9));
        assert!(first.accepted && second.accepted);
        assert_eq!(second.value.len(), 9);
        assert_eq!(second.median_count, None);
    }

    #[test]
    fn sustained_change_is_eventually_accepted() {
        let stabilizer = TemporalStabilizer::new(StabilizerConfig::default()).unwrap();
        for _ in 0..5 {
            stabilizer.stabilize(boxes(0));
        }
        let results: Vec<_> = (0..3).map(|_| stabilizer.stabilize(boxes(4))).collect();
        assert!(!results[0].accepted);
        assert!(!results[1].accepted);
        // Window is now [0, 0, 4, 4, 4].
        assert!(results[2].accepted);
        assert_eq!(results[2].value.len(), 4);
    }

    #[test]
    fn even_window_median_truncates() {
        assert_eq!(median_count(vec![1, 2]), 1);
        assert_eq!(median_count(vec![0, 3, 4, 9]), 3);
        assert_eq!(median_count(vec![7]), 7);
    }

    #[test]
    fn window_is_bounded_and_reset_clears_it() {
        let stabilizer = TemporalStabilizer::new(StabilizerConfig {
            window: 3,
            min_confidence_frames: 2,
        })
        .unwrap();
        for n in 0..10 {
            stabilizer.stabilize(boxes(n));
        }
        assert_eq!(stabilizer.stats().window_len, 3);

        stabilizer.reset();
        assert_eq!(stabilizer.stats().window_len, 0);
        assert!(stabilizer.stabilize(boxes(42)).accepted);
    }
}
