//! SPDX-License-Identifier: GPL-3.0-or-later

pub mod alarm_states;
pub mod clock;
pub mod context;
pub mod controller;
pub mod fsm;
pub mod intent;
pub mod telemetry;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
