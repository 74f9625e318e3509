//! SPDX-License-Identifier: GPL-3.0-or-later

use serde::Serialize;

/// Side effects requested by a state handler, executed by the controller
/// after the state change has been committed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    NoOp, // Nothing to do
    FireAlarm {
        // Ask the cooldown timer to run the alarm action
        motion: bool,
        unknown_identity: bool,
    },
    LogTransition {
        // Structured record of a committed transition, for telemetry
        from: String,
        to: String,
        reason: String,
    },
}
