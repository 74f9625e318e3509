//! Inputs handed to the per-state handlers
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use serde::Serialize;
use std::time::Duration;

/// What the controller is asking the current state to react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControlEvent {
    Start,
    Stop,
    /// One processed frame with its combined trigger and the signals behind it.
    Frame {
        trigger: bool,
        motion: bool,
        unknown_identity: bool,
    },
    /// Sent after a committed transition so transient states can move on.
    Settle,
}

/// Read-only timing view of the machine for the current dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateContext {
    pub time_in_state: Duration,
    /// How long a trigger must persist in Alert before escalating.
    pub alert_dwell: Duration,
    /// How long Cooldown holds before returning to Monitoring.
    pub cooldown: Duration,
}
