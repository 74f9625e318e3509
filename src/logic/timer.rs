//! Alarm dispatch gated by a cooldown window
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::logic::clock::Clock;
use crate::sync::lock;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

/// Record of one alarm that was allowed through.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlarmEvent {
    pub timestamp: SystemTime,
    pub trigger_count: u64,
    pub motion: bool,
    pub unknown_identity: bool,
}

/// What happens when an alarm fires (siren, notification, ...). Runs on its
/// own thread, so it may block.
pub trait AlarmAction: Send + Sync {
    fn fire(&self, event: &AlarmEvent);
}

/// Default action: just logs the alarm.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlarmAction;

impl AlarmAction for LogAlarmAction {
    fn fire(&self, event: &AlarmEvent) {
        info!(
            "ALARM #{} (motion: {}, unknown identity: {})",
            event.trigger_count, event.motion, event.unknown_identity
        );
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmConfig {
    pub enabled: bool,
    pub cooldown: Duration,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        AlarmConfig {
            enabled: true,
            cooldown: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimerStats {
    pub enabled: bool,
    pub active: bool,
    pub trigger_count: u64,
    pub suppressed_count: u64,
    pub cooldown_s: f64,
    pub seconds_since_last_trigger: Option<f64>,
}

struct TimerState {
    enabled: bool,
    active: bool,
    last_trigger: Option<Instant>,
    trigger_count: u64,
    suppressed_count: u64,
    /// Bumped on every trigger and stop, so a finished action only clears
    /// the active flag it set.
    generation: u64,
}

/// Lets an alarm through at most once per cooldown window.
pub struct CooldownTimer {
    cooldown: Duration,
    clock: Arc<dyn Clock>,
    action: Arc<dyn AlarmAction>,
    state: Arc<Mutex<TimerState>>,
}

impl CooldownTimer {
    pub fn new(
        config: AlarmConfig,
        clock: Arc<dyn Clock>,
        action: Arc<dyn AlarmAction>,
    ) -> Self {
        CooldownTimer {
            cooldown: config.cooldown,
            clock,
            action,
            state: Arc::new(Mutex::new(TimerState {
                enabled: config.enabled,
                active: false,
                last_trigger: None,
                trigger_count: 0,
                suppressed_count: 0,
                generation: 0,
            })),
        }
    }

    pub fn can_trigger(&self) -> bool {
        let state = lock(&self.state);
        self.allowed(&state, self.clock.now())
    }

    fn allowed(&self, state: &TimerState, now: Instant) -> bool {
        state.enabled
            && state
                .last_trigger
                .map_or(true, |last| now.saturating_duration_since(last) >= self.cooldown)
    }

    /// Fires the alarm action unless disabled or still cooling down.
    /// The check and the stamp happen under one lock, so concurrent callers
    /// cannot both get through.
    pub fn trigger(&self, motion: bool, unknown_identity: bool) -> Option<AlarmEvent> {
        let now = self.clock.now();
        let (event, generation) = {
            let mut state = lock(&self.state);
            if !self.allowed(&state, now) {
                state.suppressed_count += 1;
                debug!(
                    "Alarm suppressed (enabled: {}, {} suppressed so far)",
                    state.enabled, state.suppressed_count
                );
                return None;
            }

            state.active = true;
            state.last_trigger = Some(now);
            state.trigger_count += 1;
            state.generation += 1;
            let event = AlarmEvent {
                timestamp: self.clock.wall(),
                trigger_count: state.trigger_count,
                motion,
                unknown_identity,
            };
            (event, state.generation)
        };

        let action = Arc::clone(&self.action);
        let shared = Arc::clone(&self.state);
        let payload = event.clone();
        let spawned = thread::Builder::new()
            .name(format!("alarm-{}", event.trigger_count))
            .spawn(move || {
                action.fire(&payload);
                let mut state = lock(&shared);
                if state.generation == generation {
                    state.active = false;
                }
            });
        if let Err(e) = spawned {
            warn!("Unable to spawn alarm action thread: {e}");
            let mut state = lock(&self.state);
            if state.generation == generation {
                state.active = false;
            }
        }

        Some(event)
    }

    /// Clears the active flag without waiting for a running action.
    pub fn stop(&self) {
        let mut state = lock(&self.state);
        state.active = false;
        state.generation += 1;
    }

    pub fn set_enabled(&self, enabled: bool) {
        lock(&self.state).enabled = enabled;
    }

    pub fn is_active(&self) -> bool {
        lock(&self.state).active
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn stats(&self) -> TimerStats {
        let now = self.clock.now();
        let state = lock(&self.state);
        TimerStats {
            enabled: state.enabled,
            active: state.active,
            trigger_count: state.trigger_count,
            suppressed_count: state.suppressed_count,
            cooldown_s: self.cooldown.as_secs_f64(),
            seconds_since_last_trigger: state
                .last_trigger
                .map(|last| now.saturating_duration_since(last).as_secs_f64()),
        }
    }
}
