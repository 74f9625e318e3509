//! Frame reduction and mask morphology for the differencing pipeline
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::error::SignalError;
use crate::frame::RawFrame;
use image::GrayImage;
use imageproc::distance_transform::Norm;
use log::debug;
use std::time::Instant;

/// Sigma used for a Gaussian of width `k` when no sigma is supplied, matching
/// the usual computer-vision convention.
pub fn sigma_for_kernel(k: u32) -> f32 {
    0.3 * ((k as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Normalized 1-D Gaussian weights of odd width `k`.
pub fn gaussian_kernel(k: u32) -> Vec<f32> {
    let sigma = sigma_for_kernel(k);
    let half = (k / 2) as i32;
    let denom = 2.0 * sigma * sigma;

    let mut weights: Vec<f32> = (-half..=half)
        .map(|i| (-((i * i) as f32) / denom).exp())
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.iter_mut().for_each(|w| *w /= sum);
    weights
}

/// Separable Gaussian smoothing. A width of 1 is the identity.
pub fn smooth(gray: &GrayImage, kernel_size: u32) -> GrayImage {
    if kernel_size <= 1 {
        return gray.clone();
    }
    let kernel = gaussian_kernel(kernel_size);
    imageproc::filter::separable_filter_equal(gray, &kernel)
}

/// Reduce stage: intensity conversion followed by smoothing.
pub fn reduce(frame: &RawFrame, kernel_size: u32) -> Result<GrayImage, SignalError> {
    let started = Instant::now();
    let gray = frame.to_gray()?;
    let smoothed = smooth(&gray, kernel_size);
    debug!(
        "Reduced {}x{} frame in {}us",
        frame.width,
        frame.height,
        started.elapsed().as_micros()
    );
    Ok(smoothed)
}

/// Grows "on" regions with a 5x5 square element, `iterations` times.
pub fn dilate_square(mask: &GrayImage, iterations: u32) -> GrayImage {
    let mut out = mask.clone();
    for _ in 0..iterations {
        out = imageproc::morphology::dilate(&out, Norm::LInf, 2);
    }
    out
}
