//! SPDX-License-Identifier: GPL-3.0-or-later

pub mod detector;
pub mod preprocessing;

pub use detector::{
    BoundingBox, DetectionResult, MotionConfig, MotionDetector, MotionMetrics, Region,
};
