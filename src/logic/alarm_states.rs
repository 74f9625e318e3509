//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::logic::context::{ControlEvent, StateContext};
use crate::logic::fsm::{FsmRegistry, StateHandler, StateKeyLike, TransitionDecision};
use crate::logic::intent::Intent;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Hash, Eq, PartialEq, Clone, Debug, Copy, Serialize, Deserialize)]
/// Escalation ladder of the perimeter controller
pub enum AlarmState {
    Idle,
    Monitoring,
    Alert,
    Alarm,
    Cooldown,
}

impl fmt::Display for AlarmState {
    /// Human-readable name used in logs/telemetry
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl AlarmState {
    /// Static string form (no allocation) for hot paths
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmState::Idle => "Idle",
            AlarmState::Monitoring => "Monitoring",
            AlarmState::Alert => "Alert",
            AlarmState::Alarm => "Alarm",
            AlarmState::Cooldown => "Cooldown",
        }
    }

    pub const ALL: [AlarmState; 5] = [
        AlarmState::Idle,
        AlarmState::Monitoring,
        AlarmState::Alert,
        AlarmState::Alarm,
        AlarmState::Cooldown,
    ];
}

impl StateKeyLike for AlarmState {
    fn allowed_targets(self) -> &'static [Self] {
        match self {
            AlarmState::Idle => &[AlarmState::Monitoring],
            AlarmState::Monitoring => &[AlarmState::Alert, AlarmState::Idle],
            AlarmState::Alert => &[AlarmState::Alarm, AlarmState::Monitoring],
            AlarmState::Alarm => &[AlarmState::Cooldown],
            AlarmState::Cooldown => &[AlarmState::Monitoring, AlarmState::Idle],
        }
    }
}

/// Builds the registry with one handler per alarm state.
pub fn alarm_registry() -> FsmRegistry<AlarmState> {
    let mut registry = FsmRegistry::new();
    registry.register(AlarmState::Idle, Box::new(IdleState));
    registry.register(AlarmState::Monitoring, Box::new(MonitoringState));
    registry.register(AlarmState::Alert, Box::new(AlertState));
    registry.register(AlarmState::Alarm, Box::new(AlarmHandler));
    registry.register(AlarmState::Cooldown, Box::new(CooldownState));
    registry
}

fn transition(to: AlarmState, reason: &str) -> TransitionDecision<AlarmState> {
    TransitionDecision::Transition {
        to,
        reason: reason.into(),
        intents: vec![],
    }
}

fn stay() -> TransitionDecision<AlarmState> {
    TransitionDecision::Stay(vec![Intent::NoOp])
}

pub struct IdleState;

impl StateHandler<AlarmState> for IdleState {
    /// Start -> Monitoring, otherwise stay (frames are ignored while idle)
    fn on_event(
        &mut self,
        _ctx: &StateContext,
        event: &ControlEvent,
    ) -> TransitionDecision<AlarmState> {
        match event {
            ControlEvent::Start => transition(AlarmState::Monitoring, "system started"),
            _ => stay(),
        }
    }
}

pub struct MonitoringState;

impl StateHandler<AlarmState> for MonitoringState {
    /// Trigger -> Alert, Stop -> Idle
    fn on_event(
        &mut self,
        _ctx: &StateContext,
        event: &ControlEvent,
    ) -> TransitionDecision<AlarmState> {
        match event {
            ControlEvent::Frame { trigger: true, .. } => {
                transition(AlarmState::Alert, "threat detected")
            }
            ControlEvent::Stop => transition(AlarmState::Idle, "system stopped"),
            _ => stay(),
        }
    }
}

pub struct AlertState;

impl StateHandler<AlarmState> for AlertState {
    /// A trigger that outlasts the dwell confirms the threat; a quiet frame
    /// drops back to Monitoring
    fn on_event(
        &mut self,
        ctx: &StateContext,
        event: &ControlEvent,
    ) -> TransitionDecision<AlarmState> {
        match *event {
            ControlEvent::Frame {
                trigger: true,
                motion,
                unknown_identity,
            } if ctx.time_in_state > ctx.alert_dwell => TransitionDecision::Transition {
                to: AlarmState::Alarm,
                reason: "confirmed threat".into(),
                intents: vec![Intent::FireAlarm {
                    motion,
                    unknown_identity,
                }],
            },
            ControlEvent::Frame { trigger: true, .. } => stay(),
            ControlEvent::Frame { trigger: false, .. } => {
                transition(AlarmState::Monitoring, "false alarm")
            }
            ControlEvent::Stop => transition(AlarmState::Monitoring, "system stopping"),
            _ => stay(),
        }
    }
}

pub struct AlarmHandler;

impl StateHandler<AlarmState> for AlarmHandler {
    /// Alarm is transient: any event moves on to Cooldown
    fn on_event(
        &mut self,
        _ctx: &StateContext,
        _event: &ControlEvent,
    ) -> TransitionDecision<AlarmState> {
        transition(AlarmState::Cooldown, "alarm triggered")
    }
}

pub struct CooldownState;

impl StateHandler<AlarmState> for CooldownState {
    /// Holds for the cooldown period whatever the trigger says
    fn on_event(
        &mut self,
        ctx: &StateContext,
        event: &ControlEvent,
    ) -> TransitionDecision<AlarmState> {
        match event {
            ControlEvent::Frame { .. } if ctx.time_in_state > ctx.cooldown => {
                transition(AlarmState::Monitoring, "cooldown expired")
            }
            ControlEvent::Stop => transition(AlarmState::Idle, "system stopped"),
            _ => stay(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FsmError;
    use crate::logic::clock::ManualClock;
    use crate::logic::fsm::StateMachine;
    use std::sync::Arc;
    use std::time::Duration;

    fn ctx(secs: f64) -> StateContext {
        StateContext {
            time_in_state: Duration::from_secs_f64(secs),
            alert_dwell: Duration::from_secs(2),
            cooldown: Duration::from_secs(10),
        }
    }

    fn frame(trigger: bool) -> ControlEvent {
        ControlEvent::Frame {
            trigger,
            motion: trigger,
            unknown_identity: false,
        }
    }

    fn target(decision: TransitionDecision<AlarmState>) -> Option<AlarmState> {
        match decision {
            TransitionDecision::Transition { to, .. } => Some(to),
            TransitionDecision::Stay(_) => None,
        }
    }

    #[test]
    fn machine_rejects_skipping_to_alarm() {
        let machine = StateMachine::new(AlarmState::Idle, Arc::new(ManualClock::new()));

        let err = machine
            .transition_to(AlarmState::Alarm, "confirmed threat")
            .unwrap_err();
        assert_eq!(
            err,
            FsmError::InvalidTransition {
                from: "Idle".into(),
                to: "Alarm".into(),
            }
        );
        assert_eq!(machine.current_state(), AlarmState::Idle);
        assert_eq!(machine.transition_count(), 0);
        assert_eq!(machine.history().len(), 1);

        machine
            .transition_to(AlarmState::Monitoring, "system started")
            .unwrap();
        machine
            .transition_to(AlarmState::Alert, "threat detected")
            .unwrap();
        machine
            .transition_to(AlarmState::Alarm, "confirmed threat")
            .unwrap();
        assert!(machine
            .transition_to(AlarmState::Monitoring, "false alarm")
            .is_err());
        assert_eq!(machine.current_state(), AlarmState::Alarm);
        assert_eq!(machine.transition_count(), 3);
    }

    #[test]
    fn adjacency_table() {
        use AlarmState::*;
        assert!(!Idle.can_transition_to(Alarm));
        assert!(Monitoring.can_transition_to(Alert));
        assert_eq!(Alarm.allowed_targets(), &[Cooldown]);
        for state in AlarmState::ALL {
            assert!(!state.can_transition_to(state));
        }
    }

    #[test]
    fn handlers_only_request_allowed_targets() {
        let mut registry = alarm_registry();
        let events = [
            ControlEvent::Start,
            ControlEvent::Stop,
            ControlEvent::Settle,
            frame(true),
            frame(false),
        ];
        for state in AlarmState::ALL {
            for secs in [0.0, 2.5, 11.0] {
                for event in &events {
                    if let Some(to) = target(registry.handle(state, &ctx(secs), event)) {
                        assert!(state.can_transition_to(to), "{state} -> {to}");
                    }
                }
            }
        }
    }

    #[test]
    fn alert_waits_for_dwell() {
        let mut alert = AlertState;
        assert_eq!(target(alert.on_event(&ctx(1.0), &frame(true))), None);
        assert_eq!(target(alert.on_event(&ctx(2.0), &frame(true))), None);

        match alert.on_event(&ctx(2.1), &frame(true)) {
            TransitionDecision::Transition { to, intents, .. } => {
                assert_eq!(to, AlarmState::Alarm);
                assert_eq!(
                    intents,
                    vec![Intent::FireAlarm {
                        motion: true,
                        unknown_identity: false
                    }]
                );
            }
            other => panic!("expected escalation, got {other:?}"),
        }

        assert_eq!(
            target(alert.on_event(&ctx(0.5), &frame(false))),
            Some(AlarmState::Monitoring)
        );
    }

    #[test]
    fn cooldown_ignores_trigger_until_expiry() {
        let mut cooldown = CooldownState;
        assert_eq!(target(cooldown.on_event(&ctx(5.0), &frame(true))), None);
        assert_eq!(
            target(cooldown.on_event(&ctx(10.5), &frame(true))),
            Some(AlarmState::Monitoring)
        );
        assert_eq!(
            target(cooldown.on_event(&ctx(10.5), &frame(false))),
            Some(AlarmState::Monitoring)
        );
    }
}
