//! Frame payloads fed into the detection pipeline
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::error::SignalError;
use image::{DynamicImage, GrayImage, RgbImage};
use rayon::iter::{IndexedParallelIterator, ParallelIterator};
use rayon::prelude::ParallelSliceMut;
use std::time::SystemTime;

/// Channel layout of a frame's pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Gray8,
    Rgb8,
}

impl PixelFormat {
    pub fn channels(&self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb8 => 3,
        }
    }
}

/// A captured frame: a fixed-shape grid of 8-bit samples plus capture time.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: usize,
    pub height: usize,
    pub format: PixelFormat,
    pub data: Vec<u8>,
    pub timestamp: SystemTime,
}

impl RawFrame {
    /// Wraps a pixel buffer, checking that its length matches the geometry.
    pub fn new(
        width: usize,
        height: usize,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, SignalError> {
        let expected = width * height * format.channels();
        if data.len() != expected {
            return Err(SignalError::BufferSize {
                expected,
                actual: data.len(),
            });
        }

        Ok(RawFrame {
            width,
            height,
            format,
            data,
            timestamp: SystemTime::now(),
        })
    }

    pub fn from_gray(image: GrayImage) -> Self {
        let (w, h) = image.dimensions();
        RawFrame {
            width: w as usize,
            height: h as usize,
            format: PixelFormat::Gray8,
            data: image.into_raw(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn from_rgb(image: RgbImage) -> Self {
        let (w, h) = image.dimensions();
        RawFrame {
            width: w as usize,
            height: h as usize,
            format: PixelFormat::Rgb8,
            data: image.into_raw(),
            timestamp: SystemTime::now(),
        }
    }

    /// Gray inputs stay single-channel; everything else goes through RGB8.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        match image {
            DynamicImage::ImageLuma8(gray) => Self::from_gray(gray),
            other => Self::from_rgb(other.to_rgb8()),
        }
    }

    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width as u32, self.height as u32)
    }

    /// Reduces the frame to a single 8-bit intensity channel.
    ///
    /// RGB input uses the BT.601 luma weights (0.299, 0.587, 0.114) through
    /// per-channel lookup tables, computed in parallel chunks.
    pub fn to_gray(&self) -> Result<GrayImage, SignalError> {
        let pixels = self.width * self.height;
        let expected = pixels * self.format.channels();
        if self.data.len() != expected {
            return Err(SignalError::BufferSize {
                expected,
                actual: self.data.len(),
            });
        }

        let (w, h) = self.dimensions();
        let gray_pixels = match self.format {
            PixelFormat::Gray8 => self.data.clone(),
            PixelFormat::Rgb8 => rgb_to_luma(&self.data, pixels),
        };

        GrayImage::from_raw(w, h, gray_pixels).ok_or(SignalError::BufferSize {
            expected: pixels,
            actual: self.data.len() / self.format.channels(),
        })
    }
}

fn rgb_to_luma(rgb_pixels: &[u8], pixels: usize) -> Vec<u8> {
    // Fixed-point weights scaled by 2^14, summing to exactly 16384.
    const W_R: u32 = 4899;
    const W_G: u32 = 9617;
    const W_B: u32 = 1868;
    const CHUNK: usize = 1024;

    let mut lut_r = [0u32; 256];
    let mut lut_g = [0u32; 256];
    let mut lut_b = [0u32; 256];
    for i in 0..256 {
        lut_r[i] = W_R * i as u32;
        lut_g[i] = W_G * i as u32;
        lut_b[i] = W_B * i as u32;
    }

    let mut gray_pixels = vec![0u8; pixels];
    gray_pixels
        .par_chunks_mut(CHUNK)
        .enumerate()
        .for_each(|(chunk_index, gray_chunk)| {
            let start = chunk_index * CHUNK;
            for (i, pixel) in gray_chunk.iter_mut().enumerate() {
                let base = (start + i) * 3;
                let r = rgb_pixels[base] as usize;
                let g = rgb_pixels[base + 1] as usize;
                let b = rgb_pixels[base + 2] as usize;

                let weighted = lut_r[r] + lut_g[g] + lut_b[b];
                *pixel = ((weighted + (1 << 13)) >> 14).min(255) as u8;
            }
        });

    gray_pixels
}
