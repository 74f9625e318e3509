//! Frame-differencing motion detector
//!
//! Each frame is reduced to a smoothed intensity grid and compared against the
//! previous one. Changed pixels are thresholded into a binary mask, dilated to
//! merge nearby fragments, and grouped into 8-connected regions; regions that
//! are large enough count as motion.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::error::{ConfigError, SignalError};
use crate::frame::RawFrame;
use crate::motion::preprocessing;
use crate::signal::{self, Comparison};
use crate::sync::lock;
use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use log::debug;
use rayon::iter::{IndexedParallelIterator, ParallelIterator};
use rayon::slice::ParallelSlice;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionConfig {
    /// Per-pixel intensity change that counts as "changed" (strictly greater).
    pub threshold: u8,
    /// Smallest region, in pixels, that counts as motion.
    pub min_region_area: u32,
    /// Odd Gaussian kernel width used by the reduce stage.
    pub blur_kernel_size: u32,
    pub dilation_iterations: u32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        MotionConfig {
            threshold: 25,
            min_region_area: 500,
            blur_kernel_size: 21,
            dilation_iterations: 2,
        }
    }
}

impl MotionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.blur_kernel_size == 0 {
            return Err(ConfigError::Zero("blur_kernel_size"));
        }
        if self.blur_kernel_size % 2 == 0 {
            return Err(ConfigError::EvenKernel(self.blur_kernel_size));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Region {
    pub bbox: BoundingBox,
    /// Number of "on" pixels in the component.
    pub area: u32,
}

/// Outcome of one `detect` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    pub motion_present: bool,
    pub region_count: usize,
    /// Surviving regions, largest first.
    pub regions: Vec<Region>,
    pub processing_time: Duration,
    /// Set only on the bootstrap frame, which has nothing to compare against.
    pub insufficient_history: bool,
}

impl DetectionResult {
    fn bootstrap(processing_time: Duration) -> Self {
        DetectionResult {
            motion_present: false,
            region_count: 0,
            regions: Vec::new(),
            processing_time,
            insufficient_history: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotionMetrics {
    pub frames_processed: u64,
    pub bootstrap_frames: u64,
    pub motion_detected_count: u64,
    pub total_processing_time_s: f64,
    pub average_processing_time_ms: f64,
    /// Throughput implied by the average processing time.
    pub fps: f64,
    pub detection_rate_percent: f64,
}

#[derive(Default)]
struct DetectorState {
    previous: Option<GrayImage>,
    frames_processed: u64,
    bootstrap_frames: u64,
    motion_detected_count: u64,
    total_processing_time: Duration,
}

pub struct MotionDetector {
    config: MotionConfig,
    state: Mutex<DetectorState>,
}

impl MotionDetector {
    pub fn new(config: MotionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(MotionDetector {
            config,
            state: Mutex::new(DetectorState::default()),
        })
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    /// Runs the full pipeline on one frame.
    ///
    /// The first frame after construction or [`reset`](Self::reset) only seeds
    /// the history. A frame whose geometry differs from the stored one fails
    /// with [`SignalError::ShapeMismatch`] and leaves the history untouched.
    pub fn detect(&self, frame: &RawFrame) -> Result<DetectionResult, SignalError> {
        let started = Instant::now();
        let reduced = preprocessing::reduce(frame, self.config.blur_kernel_size)?;

        let diff = {
            let mut state = lock(&self.state);
            let diff = match state.previous.as_ref() {
                None => None,
                Some(previous) => Some(signal::pixel_subtraction(previous, &reduced)?),
            };
            state.previous = Some(reduced);
            match diff {
                Some(diff) => diff,
                None => {
                    state.bootstrap_frames += 1;
                    debug!("Stored bootstrap frame, no history to compare against yet");
                    return Ok(DetectionResult::bootstrap(started.elapsed()));
                }
            }
        };

        let mask = signal::binary_threshold(&diff, self.config.threshold);
        let dilated = preprocessing::dilate_square(&mask, self.config.dilation_iterations);

        let cluster_time = Instant::now();
        let mut regions: Vec<Region> = extract_regions(&dilated)
            .into_iter()
            .filter(|region| {
                signal::threshold_comparison(
                    region.area as f64,
                    self.config.min_region_area as f64,
                    Comparison::GreaterOrEqual,
                )
            })
            .collect();
        regions.sort_by(|a, b| b.area.cmp(&a.area));
        debug!(
            "Region extraction kept {} regions in {}us",
            regions.len(),
            cluster_time.elapsed().as_micros()
        );

        let processing_time = started.elapsed();
        let motion_present = !regions.is_empty();

        let mut state = lock(&self.state);
        state.frames_processed += 1;
        state.total_processing_time += processing_time;
        if motion_present {
            state.motion_detected_count += 1;
        }

        Ok(DetectionResult {
            motion_present,
            region_count: regions.len(),
            regions,
            processing_time,
            insufficient_history: false,
        })
    }

    pub fn metrics(&self) -> MotionMetrics {
        let state = lock(&self.state);
        let total_s = state.total_processing_time.as_secs_f64();
        let (average_ms, fps, detection_rate) = if state.frames_processed == 0 {
            (0.0, 0.0, 0.0)
        } else {
            let frames = state.frames_processed as f64;
            let average_s = total_s / frames;
            let fps = if average_s > 0.0 { 1.0 / average_s } else { 0.0 };
            (
                average_s * 1000.0,
                fps,
                state.motion_detected_count as f64 / frames * 100.0,
            )
        };

        MotionMetrics {
            frames_processed: state.frames_processed,
            bootstrap_frames: state.bootstrap_frames,
            motion_detected_count: state.motion_detected_count,
            total_processing_time_s: total_s,
            average_processing_time_ms: average_ms,
            fps,
            detection_rate_percent: detection_rate,
        }
    }

    /// Zeroes the running totals; the stored previous frame is kept.
    pub fn reset_metrics(&self) {
        let mut state = lock(&self.state);
        let previous = state.previous.take();
        *state = DetectorState {
            previous,
            ..DetectorState::default()
        };
    }

    /// Forgets the previous frame and zeroes the totals.
    pub fn reset(&self) {
        *lock(&self.state) = DetectorState::default();
    }
}

#[derive(Clone, Copy)]
struct RegionAcc {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    area: u32,
}

impl RegionAcc {
    fn at(x: u32, y: u32) -> Self {
        RegionAcc {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            area: 0,
        }
    }

    fn include(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.area += 1;
    }

    fn merge(&mut self, other: &RegionAcc) {
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
        self.area += other.area;
    }

    fn into_region(self) -> Region {
        Region {
            bbox: BoundingBox {
                x: self.min_x,
                y: self.min_y,
                width: self.max_x - self.min_x + 1,
                height: self.max_y - self.min_y + 1,
            },
            area: self.area,
        }
    }
}

/// 8-connected components of non-zero mask pixels, with area and bounds.
pub fn extract_regions(mask: &GrayImage) -> Vec<Region> {
    let width = mask.width() as usize;
    if width == 0 || mask.height() == 0 {
        return Vec::new();
    }

    // Background pixels are 0.
    let labeled = connected_components(mask, Connectivity::Eight, Luma([0u8]));

    // Accumulate each label's bounds and area row by row in parallel.
    let by_label: HashMap<u32, RegionAcc> = labeled
        .as_raw()
        .par_chunks(width)
        .enumerate()
        .fold(HashMap::new, |mut acc: HashMap<u32, RegionAcc>, (y, row)| {
            for (x, &label) in row.iter().enumerate() {
                if label == 0 {
                    continue;
                }
                let (x, y) = (x as u32, y as u32);
                acc.entry(label)
                    .or_insert_with(|| RegionAcc::at(x, y))
                    .include(x, y);
            }
            acc
        })
        .reduce(HashMap::new, |mut merged, part| {
            for (label, region) in part {
                merged
                    .entry(label)
                    .and_modify(|existing| existing.merge(&region))
                    .or_insert(region);
            }
            merged
        });

    by_label.into_values().map(RegionAcc::into_region).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_frame(image: GrayImage) -> RawFrame {
        RawFrame::from_gray(image)
    }

    fn with_block(w: u32, h: u32, x0: u32, y0: u32, size: u32) -> GrayImage {
        let mut image = GrayImage::from_pixel(w, h, Luma([20]));
        for y in y0..y0 + size {
            for x in x0..x0 + size {
                image.put_pixel(x, y, Luma([230]));
            }
        }
        image
    }

    #[test]
    fn rejects_even_or_zero_kernel() {
        let even = MotionConfig {
            blur_kernel_size: 4,
            ..MotionConfig::default()
        };
        assert_eq!(MotionDetector::new(even).err(), Some(ConfigError::EvenKernel(4)));

        let zero = MotionConfig {
            blur_kernel_size: 0,
            ..MotionConfig::default()
        };
        assert!(MotionDetector::new(zero).is_err());
    }

    #[test]
    fn bootstrap_frame_reports_insufficient_history() {
        let detector = MotionDetector::new(MotionConfig::default()).unwrap();
        let result = detector
            .detect(&gray_frame(GrayImage::from_pixel(64, 48, Luma([10]))))
            .unwrap();

        assert!(result.insufficient_history);
        assert!(!result.motion_present);
        let metrics = detector.metrics();
        assert_eq!(metrics.frames_processed, 0);
        assert_eq!(metrics.bootstrap_frames, 1);
        assert_eq!(metrics.fps, 0.0);
    }

    #[test]
    fn identical_frames_have_no_motion() {
        let detector = MotionDetector::new(MotionConfig::default()).unwrap();
        let image = with_block(120, 90, 30, 30, 20);
        detector.detect(&gray_frame(image.clone())).unwrap();

        let result = detector.detect(&gray_frame(image)).unwrap();
        assert!(!result.insufficient_history);
        assert!(!result.motion_present);
        assert_eq!(result.region_count, 0);
        assert_eq!(detector.metrics().frames_processed, 1);
        assert_eq!(detector.metrics().detection_rate_percent, 0.0);
    }

    #[test]
    fn differenced_frame_feeds_throughput() {
        let detector = MotionDetector::new(MotionConfig::default()).unwrap();
        detector
            .detect(&gray_frame(GrayImage::from_pixel(160, 120, Luma([20]))))
            .unwrap();
        let result = detector
            .detect(&gray_frame(with_block(160, 120, 40, 30, 50)))
            .unwrap();

        let metrics = detector.metrics();
        assert_eq!(metrics.frames_processed, 1);
        assert_eq!(metrics.motion_detected_count, 1);
        assert_eq!(metrics.detection_rate_percent, 100.0);
        assert!(result.processing_time > Duration::ZERO);
        assert!(metrics.total_processing_time_s > 0.0);
        assert!(metrics.average_processing_time_ms > 0.0);
        assert!(metrics.fps > 0.0);
        let product = metrics.fps * metrics.average_processing_time_ms;
        assert!((product - 1000.0).abs() < 1e-6 * 1000.0);
    }

    #[test]
    fn large_changed_block_is_motion() {
        let detector = MotionDetector::new(MotionConfig::default()).unwrap();
        detector
            .detect(&gray_frame(GrayImage::from_pixel(160, 120, Luma([20]))))
            .unwrap();

        let result = detector
            .detect(&gray_frame(with_block(160, 120, 40, 30, 50)))
            .unwrap();
        assert!(result.motion_present);
        assert_eq!(result.region_count, 1);
        assert!(result.regions[0].area >= 2500);

        let bbox = result.regions[0].bbox;
        assert!(bbox.x <= 40 && bbox.y <= 30);
        assert!(bbox.x + bbox.width >= 90 && bbox.y + bbox.height >= 80);

        let metrics = detector.metrics();
        assert_eq!(metrics.motion_detected_count, 1);
        assert!((metrics.detection_rate_percent - 100.0).abs() < 1e-9);
    }

    #[test]
    fn small_change_is_filtered_out() {
        let config = MotionConfig {
            blur_kernel_size: 1,
            dilation_iterations: 0,
            ..MotionConfig::default()
        };
        let detector = MotionDetector::new(config).unwrap();
        detector
            .detect(&gray_frame(GrayImage::from_pixel(80, 60, Luma([20]))))
            .unwrap();

        let result = detector
            .detect(&gray_frame(with_block(80, 60, 10, 10, 5)))
            .unwrap();
        assert!(!result.motion_present);
    }

    #[test]
    fn shape_mismatch_keeps_history() {
        let detector = MotionDetector::new(MotionConfig::default()).unwrap();
        let base = GrayImage::from_pixel(64, 48, Luma([20]));
        detector.detect(&gray_frame(base.clone())).unwrap();

        let err = detector
            .detect(&gray_frame(GrayImage::from_pixel(32, 48, Luma([20]))))
            .unwrap_err();
        assert!(matches!(err, SignalError::ShapeMismatch { .. }));

        // History still holds the 64x48 frame.
        let result = detector.detect(&gray_frame(base)).unwrap();
        assert!(!result.insufficient_history);
        assert!(!result.motion_present);
    }

    #[test]
    fn reset_forgets_history() {
        let detector = MotionDetector::new(MotionConfig::default()).unwrap();
        let image = GrayImage::from_pixel(40, 30, Luma([5]));
        detector.detect(&gray_frame(image.clone())).unwrap();
        detector.detect(&gray_frame(image.clone())).unwrap();

        detector.reset_metrics();
        assert_eq!(detector.metrics().frames_processed, 0);
        assert!(!detector.detect(&gray_frame(image.clone())).unwrap().insufficient_history);

        detector.reset();
        assert!(detector.detect(&gray_frame(image)).unwrap().insufficient_history);
    }

    #[test]
    fn separate_blobs_are_separate_regions() {
        let mut mask = GrayImage::new(30, 10);
        for (x, y) in [(1, 1), (2, 2), (3, 3), (20, 5), (21, 5)] {
            mask.put_pixel(x, y, Luma([255]));
        }
        let mut regions = extract_regions(&mask);
        regions.sort_by_key(|r| r.bbox.x);

        assert_eq!(regions.len(), 2);
        // Diagonal neighbours join under 8-connectivity.
        assert_eq!(regions[0].area, 3);
        assert_eq!(
            regions[0].bbox,
            BoundingBox {
                x: 1,
                y: 1,
                width: 3,
                height: 3
            }
        );
        assert_eq!(regions[1].area, 2);
    }
}
