//! Error types shared across the detection and control core
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use thiserror::Error;

/// Failures of the pixel-grid primitives. A mismatch means the pipeline is
/// misconfigured, so these are always propagated to the caller.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("shape mismatch: expected {expected:?} (w, h), got {actual:?}")]
    ShapeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("pixel buffer holds {actual} bytes, {expected} required for the frame geometry")]
    BufferSize { expected: usize, actual: usize },

    #[error("grid layout error: {0}")]
    Layout(#[from] ndarray::ShapeError),
}

/// Out-of-range configuration, rejected at construction time.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("blur_kernel_size must be odd, got {0}")]
    EvenKernel(u32),

    #[error("stabilizer_min_confidence_frames ({min}) exceeds stabilizer_window ({window})")]
    ConfidenceExceedsWindow { min: usize, window: usize },

    #[error("{0} must be a finite, non-negative number of seconds")]
    Duration(&'static str),

    #[error("unable to parse configuration: {0}")]
    Parse(String),

    #[error("unable to open telemetry run: {0}")]
    Telemetry(String),
}

/// Rejected state machine operations. The machine is left untouched.
#[derive(Debug, Error, PartialEq)]
pub enum FsmError {
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}
