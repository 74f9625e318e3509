//! Generic FSM runtime: validated transitions, history, callbacks, and the
//! handler registry that maps each state to its event logic
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::error::FsmError;
use crate::logic::clock::Clock;
use crate::logic::context::{ControlEvent, StateContext};
use crate::logic::intent::Intent;
use crate::sync::lock;
use log::{info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

/// Trait bound for enum-like state keys used by the FSM.
/// Each key carries its own row of the adjacency table.
pub trait StateKeyLike:
    Eq + Hash + Copy + Display + Debug + Send + Sync + Serialize + 'static
{
    fn allowed_targets(self) -> &'static [Self];

    fn can_transition_to(self, target: Self) -> bool {
        self.allowed_targets().contains(&target)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry<K> {
    pub state: K,
    pub timestamp: SystemTime,
    pub reason: String,
}

/// A committed transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionEvent<K> {
    pub from: K,
    pub to: K,
    pub reason: String,
    pub timestamp: SystemTime,
    /// 1-based position of this transition in the machine's lifetime.
    pub sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FsmStats<K> {
    pub current_state: K,
    pub previous_state: Option<K>,
    pub time_in_state_s: f64,
    pub transition_count: u64,
    pub history_len: usize,
}

pub type StateCallback<K> = Arc<dyn Fn(&TransitionEvent<K>) + Send + Sync>;

struct MachineInner<K> {
    current: K,
    previous: Option<K>,
    entered_at: Instant,
    transition_count: u64,
    history: Vec<HistoryEntry<K>>,
}

/// State holder that only accepts transitions listed in the key's adjacency.
pub struct StateMachine<K: StateKeyLike> {
    clock: Arc<dyn Clock>,
    inner: Mutex<MachineInner<K>>,
    callbacks: Mutex<HashMap<K, Vec<StateCallback<K>>>>,
}

impl<K: StateKeyLike> StateMachine<K> {
    pub fn new(initial: K, clock: Arc<dyn Clock>) -> Self {
        let history = vec![HistoryEntry {
            state: initial,
            timestamp: clock.wall(),
            reason: "initial state".into(),
        }];

        StateMachine {
            inner: Mutex::new(MachineInner {
                current: initial,
                previous: None,
                entered_at: clock.now(),
                transition_count: 0,
                history,
            }),
            callbacks: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Moves to `target` if the adjacency allows it. On rejection nothing is
    /// mutated. Callbacks for `target` run after the state lock is dropped.
    pub fn transition_to(
        &self,
        target: K,
        reason: impl Into<String>,
    ) -> Result<TransitionEvent<K>, FsmError> {
        let reason = reason.into();
        let event = {
            let mut inner = lock(&self.inner);
            let from = inner.current;
            if !from.can_transition_to(target) {
                warn!("Rejected transition {from} -> {target} ({reason})");
                return Err(FsmError::InvalidTransition {
                    from: from.to_string(),
                    to: target.to_string(),
                });
            }

            let timestamp = self.clock.wall();
            inner.previous = Some(from);
            inner.current = target;
            inner.entered_at = self.clock.now();
            inner.transition_count += 1;
            inner.history.push(HistoryEntry {
                state: target,
                timestamp,
                reason: reason.clone(),
            });

            TransitionEvent {
                from,
                to: target,
                reason,
                timestamp,
                sequence: inner.transition_count,
            }
        };

        info!("{} -> {}: {}", event.from, event.to, event.reason);

        let callbacks = lock(&self.callbacks)
            .get(&target)
            .cloned()
            .unwrap_or_default();
        for callback in callbacks {
            callback(&event);
        }

        Ok(event)
    }

    /// Registers `callback` to run after every transition into `state`.
    pub fn register_callback<F>(&self, state: K, callback: F)
    where
        F: Fn(&TransitionEvent<K>) + Send + Sync + 'static,
    {
        lock(&self.callbacks)
            .entry(state)
            .or_default()
            .push(Arc::new(callback));
    }

    pub fn current_state(&self) -> K {
        lock(&self.inner).current
    }

    pub fn previous_state(&self) -> Option<K> {
        lock(&self.inner).previous
    }

    pub fn time_in_state(&self) -> Duration {
        let entered_at = lock(&self.inner).entered_at;
        self.clock.now().saturating_duration_since(entered_at)
    }

    pub fn transition_count(&self) -> u64 {
        lock(&self.inner).transition_count
    }

    pub fn history(&self) -> Vec<HistoryEntry<K>> {
        lock(&self.inner).history.clone()
    }

    pub fn stats(&self) -> FsmStats<K> {
        let inner = lock(&self.inner);
        FsmStats {
            current_state: inner.current,
            previous_state: inner.previous,
            time_in_state_s: self
                .clock
                .now()
                .saturating_duration_since(inner.entered_at)
                .as_secs_f64(),
            transition_count: inner.transition_count,
            history_len: inner.history.len(),
        }
    }
}

/// Decision returned by a state handler.
/// Stay(intents) keeps current state
/// Transition switches to `to`
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionDecision<K> {
    Stay(Vec<Intent>),
    Transition {
        to: K,
        reason: String,
        intents: Vec<Intent>,
    },
}

/// Per-state event handler: receives the timing context and the event and
/// returns a decision plus any intents to emit.
pub trait StateHandler<K: StateKeyLike>: Send + Sync {
    fn on_event(&mut self, ctx: &StateContext, event: &ControlEvent) -> TransitionDecision<K>;
}

/// Registry mapping a state key to its handler implementation.
pub struct FsmRegistry<K: StateKeyLike> {
    handlers: HashMap<K, Box<dyn StateHandler<K>>>,
}

impl<K: StateKeyLike> FsmRegistry<K> {
    pub fn new() -> Self {
        FsmRegistry {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a given state key
    pub fn register(&mut self, state: K, handler: Box<dyn StateHandler<K>>) {
        self.handlers.insert(state, handler);
    }

    /// Route an event to `state`'s handler. On a transition a LogTransition
    /// intent is prepended; the caller commits the state change and runs the
    /// intents.
    pub fn handle(
        &mut self,
        state: K,
        ctx: &StateContext,
        event: &ControlEvent,
    ) -> TransitionDecision<K> {
        let Some(handler) = self.handlers.get_mut(&state) else {
            // No handler registered: remain in place and emit a NoOp
            return TransitionDecision::Stay(vec![Intent::NoOp]);
        };

        match handler.on_event(ctx, event) {
            TransitionDecision::Transition {
                to,
                reason,
                mut intents,
            } => {
                intents.insert(
                    0,
                    Intent::LogTransition {
                        from: state.to_string(),
                        to: to.to_string(),
                        reason: reason.clone(),
                    },
                );
                TransitionDecision::Transition {
                    to,
                    reason,
                    intents,
                }
            }
            stay => stay,
        }
    }
}

impl<K: StateKeyLike> Default for FsmRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}
