//! Per-frame driver: buffers the frame, runs detection and stabilization,
//! folds the signals into one trigger and routes it through the alarm FSM
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::config::PerimeterConfig;
use crate::error::{ConfigError, SignalError};
use crate::frame::RawFrame;
use crate::identity::{CachedIdentity, IdentityBackend};
use crate::logic::alarm_states::{alarm_registry, AlarmState};
use crate::logic::clock::{Clock, SystemClock};
use crate::logic::context::{ControlEvent, StateContext};
use crate::logic::fsm::{FsmRegistry, FsmStats, StateMachine, TransitionDecision, TransitionEvent};
use crate::logic::intent::Intent;
use crate::logic::telemetry::{epoch_millis, TelemetryPacket, TelemetryRun};
use crate::logic::timer::{AlarmAction, AlarmEvent, CooldownTimer, LogAlarmAction, TimerStats};
use crate::memory::{CacheStats, LruCache, RingBuffer, RingBufferStats};
use crate::motion::{DetectionResult, MotionDetector, MotionMetrics};
use crate::signal;
use crate::stabilizer::{StabilizedDetection, StabilizerStats, TemporalStabilizer};
use log::{debug, warn};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on chained transitions for one event. Every chain in the
/// alarm table ends within a handful of hops.
const MAX_SETTLE_STEPS: usize = AlarmState::ALL.len();

/// Everything that happened while processing one frame.
#[derive(Debug, Clone, Serialize)]
pub struct FrameReport {
    pub frame_idx: u64,
    pub detection: DetectionResult,
    pub stabilized: StabilizedDetection<DetectionResult>,
    pub unknown_identity: bool,
    pub trigger: bool,
    /// State after all transitions caused by this frame.
    pub state: AlarmState,
    pub transitions: Vec<TransitionEvent<AlarmState>>,
    pub alarm: Option<AlarmEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerStats {
    pub state: AlarmState,
    pub time_in_state_s: f64,
    pub armed: bool,
    pub frames_seen: u64,
    pub ring_buffer: RingBufferStats,
    pub identity_cache: CacheStats,
    pub motion: MotionMetrics,
    pub stabilizer: StabilizerStats,
    pub fsm: FsmStats<AlarmState>,
    pub alarm: TimerStats,
}

#[derive(Default)]
struct Dispatch {
    transitions: Vec<TransitionEvent<AlarmState>>,
    alarm: Option<AlarmEvent>,
}

pub struct PerimeterController {
    config: PerimeterConfig,
    clock: Arc<dyn Clock>,
    frames: Arc<RingBuffer<Arc<RawFrame>>>,
    identity_cache: Arc<LruCache<String, bool>>,
    identity: Option<CachedIdentity>,
    detector: Arc<MotionDetector>,
    stabilizer: Arc<TemporalStabilizer<DetectionResult>>,
    machine: Arc<StateMachine<AlarmState>>,
    registry: FsmRegistry<AlarmState>,
    timer: Arc<CooldownTimer>,
    telemetry: TelemetryRun,
    armed: AtomicBool,
    frames_seen: u64,
}

impl PerimeterController {
    /// Controller on the system clock with the logging alarm action.
    pub fn new(config: PerimeterConfig) -> Result<Self, ConfigError> {
        Self::with_parts(config, Arc::new(SystemClock), Arc::new(LogAlarmAction))
    }

    pub fn with_parts(
        config: PerimeterConfig,
        clock: Arc<dyn Clock>,
        action: Arc<dyn AlarmAction>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let telemetry = TelemetryRun::new(config.telemetry.as_deref())
            .map_err(|e| ConfigError::Telemetry(format!("{e:#}")))?;

        Ok(PerimeterController {
            frames: Arc::new(RingBuffer::new(config.ring_buffer_capacity)?),
            identity_cache: Arc::new(LruCache::new(config.cache_capacity)?),
            identity: None,
            detector: Arc::new(MotionDetector::new(config.motion())?),
            stabilizer: Arc::new(TemporalStabilizer::new(config.stabilizer())?),
            machine: Arc::new(StateMachine::new(AlarmState::Idle, Arc::clone(&clock))),
            registry: alarm_registry(),
            timer: Arc::new(CooldownTimer::new(
                config.alarm(),
                Arc::clone(&clock),
                action,
            )),
            telemetry,
            armed: AtomicBool::new(true),
            frames_seen: 0,
            clock,
            config,
        })
    }

    /// Installs the identity matcher; its verdicts are memoized in the
    /// controller's cache.
    pub fn with_identity_backend(mut self, backend: Box<dyn IdentityBackend>) -> Self {
        debug!("Using identity backend {}", backend.name());
        self.identity = Some(CachedIdentity::new(
            backend,
            Arc::clone(&self.identity_cache),
        ));
        self
    }

    /// Replaces the run opened from `config.telemetry`.
    pub fn with_telemetry(mut self, telemetry: TelemetryRun) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Directory of the active telemetry run, if any.
    pub fn telemetry_dir(&self) -> Option<&Path> {
        self.telemetry.dir()
    }

    pub fn config(&self) -> &PerimeterConfig {
        &self.config
    }

    /// Recent frames, shared with any retrospective consumer.
    pub fn frames(&self) -> &Arc<RingBuffer<Arc<RawFrame>>> {
        &self.frames
    }

    pub fn identity_cache(&self) -> &Arc<LruCache<String, bool>> {
        &self.identity_cache
    }

    pub fn detector(&self) -> &Arc<MotionDetector> {
        &self.detector
    }

    pub fn stabilizer(&self) -> &Arc<TemporalStabilizer<DetectionResult>> {
        &self.stabilizer
    }

    /// The state machine, e.g. for registering entry callbacks.
    pub fn machine(&self) -> &Arc<StateMachine<AlarmState>> {
        &self.machine
    }

    pub fn timer(&self) -> &Arc<CooldownTimer> {
        &self.timer
    }

    pub fn state(&self) -> AlarmState {
        self.machine.current_state()
    }

    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    /// Flips the armed flag and returns the new value.
    pub fn toggle_armed(&self) -> bool {
        !self.armed.fetch_xor(true, Ordering::SeqCst)
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Idle -> Monitoring. Does nothing in any other state.
    pub fn start(&mut self) -> Vec<TransitionEvent<AlarmState>> {
        self.dispatch(ControlEvent::Start).transitions
    }

    /// Walks the machine back to Idle and quiets the alarm timer.
    pub fn stop(&mut self) -> Vec<TransitionEvent<AlarmState>> {
        let mut transitions = Vec::new();
        for _ in 0..MAX_SETTLE_STEPS {
            if self.machine.current_state() == AlarmState::Idle {
                break;
            }
            let step = self.dispatch(ControlEvent::Stop).transitions;
            if step.is_empty() {
                break;
            }
            transitions.extend(step);
        }
        self.timer.stop();
        transitions
    }

    /// Runs one frame through the pipeline. `unknown_identity` comes from an
    /// external matcher; use [`process_frame_fingerprinted`] to consult the
    /// installed backend instead.
    ///
    /// [`process_frame_fingerprinted`]: Self::process_frame_fingerprinted
    pub fn process_frame(
        &mut self,
        frame: RawFrame,
        unknown_identity: bool,
    ) -> Result<FrameReport, SignalError> {
        self.run_frame(Arc::new(frame), unknown_identity)
    }

    /// Like [`process_frame`](Self::process_frame), but asks the identity
    /// backend about `fingerprint`. Without a backend nobody is unknown.
    pub fn process_frame_fingerprinted(
        &mut self,
        frame: RawFrame,
        fingerprint: &str,
    ) -> Result<FrameReport, SignalError> {
        let unknown_identity = self
            .identity
            .as_ref()
            .is_some_and(|identity| identity.unknown_present(fingerprint, &frame));
        self.run_frame(Arc::new(frame), unknown_identity)
    }

    fn run_frame(
        &mut self,
        frame: Arc<RawFrame>,
        unknown_identity: bool,
    ) -> Result<FrameReport, SignalError> {
        self.frames.write(Arc::clone(&frame));
        let frame_idx = self.frames_seen;
        self.frames_seen += 1;

        let detection = self.detector.detect(&frame)?;
        let stabilized = self.stabilizer.stabilize(detection.clone());
        let motion = stabilized.value.motion_present;
        let trigger = signal::alarm_condition(motion, unknown_identity, self.is_armed());

        if !detection.insufficient_history {
            self.record(&TelemetryPacket::Detection {
                ts: epoch_millis(self.clock.wall()),
                frame_idx,
                motion_present: detection.motion_present,
                region_count: detection.region_count,
                stabilized_count: stabilized.value.region_count,
                accepted: stabilized.accepted,
                latency_us: detection.processing_time.as_micros(),
            });
        }

        let outcome = self.dispatch(ControlEvent::Frame {
            trigger,
            motion,
            unknown_identity,
        });

        Ok(FrameReport {
            frame_idx,
            detection,
            stabilized,
            unknown_identity,
            trigger,
            state: self.machine.current_state(),
            transitions: outcome.transitions,
            alarm: outcome.alarm,
        })
    }

    /// Hands `event` to the current state's handler, commits any transition
    /// and runs its intents, then lets the new state settle.
    fn dispatch(&mut self, event: ControlEvent) -> Dispatch {
        let mut outcome = Dispatch::default();
        let mut event = event;

        for _ in 0..MAX_SETTLE_STEPS {
            let state = self.machine.current_state();
            let ctx = self.context();

            match self.registry.handle(state, &ctx, &event) {
                TransitionDecision::Stay(intents) => {
                    self.execute_all(&intents, &mut outcome);
                    return outcome;
                }
                TransitionDecision::Transition {
                    to,
                    reason,
                    intents,
                } => {
                    match self.machine.transition_to(to, reason) {
                        Ok(committed) => outcome.transitions.push(committed),
                        Err(e) => {
                            warn!("Handler for {state} requested a rejected move: {e}");
                            return outcome;
                        }
                    }
                    self.execute_all(&intents, &mut outcome);
                    event = ControlEvent::Settle;
                }
            }
        }

        warn!("State machine did not settle after {MAX_SETTLE_STEPS} steps");
        outcome
    }

    fn context(&self) -> StateContext {
        StateContext {
            time_in_state: self.machine.time_in_state(),
            alert_dwell: self.config.alert_dwell(),
            cooldown: self.config.cooldown(),
        }
    }

    fn execute_all(&mut self, intents: &[Intent], outcome: &mut Dispatch) {
        for intent in intents {
            self.execute(intent, outcome);
        }
    }

    /// Applies one intent. Telemetry failures are logged and never abort the
    /// frame.
    fn execute(&mut self, intent: &Intent, outcome: &mut Dispatch) {
        let now = epoch_millis(self.clock.wall());
        match intent {
            Intent::NoOp => {}

            Intent::LogTransition { from, to, reason } => {
                let sequence = self.machine.transition_count();
                self.record(&TelemetryPacket::FsmTransition {
                    ts: now,
                    from: from.as_str(),
                    to: to.as_str(),
                    reason: reason.as_str(),
                    sequence,
                });
            }

            Intent::FireAlarm {
                motion,
                unknown_identity,
            } => {
                self.record(&TelemetryPacket::IntentExecuted { ts: now, intent });
                match self.timer.trigger(*motion, *unknown_identity) {
                    Some(event) => {
                        self.record(&TelemetryPacket::AlarmTriggered {
                            ts: now,
                            trigger_count: event.trigger_count,
                            motion: event.motion,
                            unknown_identity: event.unknown_identity,
                        });
                        outcome.alarm = Some(event);
                    }
                    None => {
                        let suppressed_count = self.timer.stats().suppressed_count;
                        self.record(&TelemetryPacket::AlarmSuppressed {
                            ts: now,
                            suppressed_count,
                        });
                    }
                }
            }
        }
    }

    fn record(&mut self, packet: &TelemetryPacket) {
        if let Err(e) = self.telemetry.write(packet) {
            warn!("Failed to write telemetry: {e}");
        }
    }

    pub fn stats(&self) -> ControllerStats {
        ControllerStats {
            state: self.machine.current_state(),
            time_in_state_s: self.machine.time_in_state().as_secs_f64(),
            armed: self.is_armed(),
            frames_seen: self.frames_seen,
            ring_buffer: self.frames.stats(),
            identity_cache: self.identity_cache.stats(),
            motion: self.detector.metrics(),
            stabilizer: self.stabilizer.stats(),
            fsm: self.machine.stats(),
            alarm: self.timer.stats(),
        }
    }

    /// Appends the current stats snapshot to the telemetry log.
    pub fn record_stats(&mut self) {
        let stats = self.stats();
        match serde_json::to_value(&stats) {
            Ok(value) => {
                let ts = epoch_millis(self.clock.wall());
                self.record(&TelemetryPacket::Stats { ts, stats: &value });
            }
            Err(e) => warn!("Unable to serialize stats: {e}"),
        }
    }

    /// Time left before Cooldown may hand back to Monitoring, if cooling down.
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        (self.machine.current_state() == AlarmState::Cooldown).then(|| {
            self.config
                .cooldown()
                .saturating_sub(self.machine.time_in_state())
        })
    }
}
