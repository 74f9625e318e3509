//! Boolean gates, the threshold comparator and pixel-wise grid operations
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::error::SignalError;
use image::GrayImage;
use ndarray::{Array2, ArrayView2, Zip};
use rayon::iter::{IntoParallelRefMutIterator, ParallelIterator};
use serde::{Deserialize, Serialize};

pub fn and(a: bool, b: bool) -> bool {
    a && b
}

pub fn or(a: bool, b: bool) -> bool {
    a || b
}

pub fn not(a: bool) -> bool {
    !a
}

pub fn xor(a: bool, b: bool) -> bool {
    a != b
}

pub fn nand(a: bool, b: bool) -> bool {
    not(and(a, b))
}

pub fn nor(a: bool, b: bool) -> bool {
    not(or(a, b))
}

/// The trigger consumed by the alarm controller:
/// (motion OR unknown identity) AND armed.
pub fn alarm_condition(motion_present: bool, unknown_identity: bool, system_armed: bool) -> bool {
    and(or(motion_present, unknown_identity), system_armed)
}

/// Comparator modes for [`threshold_comparison`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Greater,
    Less,
    Equal,
    GreaterOrEqual,
    LessOrEqual,
}

impl Comparison {
    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::Greater => value > threshold,
            Comparison::Less => value < threshold,
            Comparison::Equal => value == threshold,
            Comparison::GreaterOrEqual => value >= threshold,
            Comparison::LessOrEqual => value <= threshold,
        }
    }
}

pub fn threshold_comparison(value: f64, threshold: f64, comparison: Comparison) -> bool {
    comparison.holds(value, threshold)
}

/// |lhs - rhs| per pixel.
pub fn pixel_subtraction(lhs: &GrayImage, rhs: &GrayImage) -> Result<GrayImage, SignalError> {
    zip_pixels(lhs, rhs, |a, b| a.abs_diff(b))
}

/// Saturating per-pixel sum.
pub fn pixel_addition(lhs: &GrayImage, rhs: &GrayImage) -> Result<GrayImage, SignalError> {
    zip_pixels(lhs, rhs, |a, b| a.saturating_add(b))
}

/// Scales every pixel, rounding to nearest and saturating to 0..=255.
pub fn pixel_multiplication(frame: &GrayImage, scalar: f32) -> GrayImage {
    map_pixels(frame, |p| (p as f32 * scalar).round().clamp(0.0, 255.0) as u8)
}

pub fn bitwise_and(lhs: &GrayImage, rhs: &GrayImage) -> Result<GrayImage, SignalError> {
    zip_pixels(lhs, rhs, |a, b| a & b)
}

pub fn bitwise_or(lhs: &GrayImage, rhs: &GrayImage) -> Result<GrayImage, SignalError> {
    zip_pixels(lhs, rhs, |a, b| a | b)
}

pub fn bitwise_xor(lhs: &GrayImage, rhs: &GrayImage) -> Result<GrayImage, SignalError> {
    zip_pixels(lhs, rhs, |a, b| a ^ b)
}

pub fn bitwise_not(frame: &GrayImage) -> GrayImage {
    map_pixels(frame, |p| !p)
}

/// Keeps `frame` pixels where `mask` is non-zero and clears the rest.
pub fn apply_mask(frame: &GrayImage, mask: &GrayImage) -> Result<GrayImage, SignalError> {
    zip_pixels(frame, mask, |p, m| if m != 0 { p } else { 0 })
}

/// Comparator bank: 255 where `pixel > threshold`, else 0.
pub fn binary_threshold(frame: &GrayImage, threshold: u8) -> GrayImage {
    map_pixels(frame, |p| {
        if threshold_comparison(p as f64, threshold as f64, Comparison::Greater) {
            255
        } else {
            0
        }
    })
}

pub fn ensure_same_shape(lhs: &GrayImage, rhs: &GrayImage) -> Result<(), SignalError> {
    if lhs.dimensions() != rhs.dimensions() {
        return Err(SignalError::ShapeMismatch {
            expected: lhs.dimensions(),
            actual: rhs.dimensions(),
        });
    }
    Ok(())
}

fn grid_view(image: &GrayImage) -> Result<ArrayView2<'_, u8>, SignalError> {
    let (w, h) = image.dimensions();
    let (w, h) = (w as usize, h as usize);
    Ok(ArrayView2::from_shape((h, w), &image.as_raw()[..w * h])?)
}

fn zip_pixels<F>(lhs: &GrayImage, rhs: &GrayImage, op: F) -> Result<GrayImage, SignalError>
where
    F: Fn(u8, u8) -> u8 + Sync + Send,
{
    ensure_same_shape(lhs, rhs)?;
    let a = grid_view(lhs)?;
    let b = grid_view(rhs)?;

    let mut out = Array2::<u8>::zeros(a.raw_dim());
    Zip::from(&mut out)
        .and(&a)
        .and(&b)
        .par_for_each(|o, &x, &y| *o = op(x, y));

    let (w, h) = lhs.dimensions();
    let (raw, _offset) = out.into_raw_vec_and_offset();
    let len = raw.len();
    GrayImage::from_raw(w, h, raw).ok_or(SignalError::BufferSize {
        expected: w as usize * h as usize,
        actual: len,
    })
}

fn map_pixels<F>(frame: &GrayImage, op: F) -> GrayImage
where
    F: Fn(u8) -> u8 + Sync + Send,
{
    let mut out = frame.clone();
    let pixels: &mut [u8] = &mut out;
    pixels.par_iter_mut().for_each(|p| *p = op(*p));
    out
}
