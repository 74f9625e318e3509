//! SPDX-License-Identifier: GPL-3.0-or-later

pub mod config;
pub mod error;
pub mod frame;
pub mod identity;
pub mod logic;
pub mod memory;
pub mod motion;
pub mod signal;
pub mod stabilizer;
mod sync;


pub use config::PerimeterConfig;
pub use error::{ConfigError, FsmError, SignalError};
pub use frame::{PixelFormat, RawFrame};
pub use logic::alarm_states::AlarmState;
pub use logic::controller::{ControllerStats, FrameReport, PerimeterController};
pub use logic::timer::{AlarmAction, AlarmEvent, LogAlarmAction};
