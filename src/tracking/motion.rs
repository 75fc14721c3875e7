//! Frame-difference motion source
//!
//! Camera frames are downsampled to a small grayscale grid and compared with
//! the previous grid. Pixels whose luma changed by at least the threshold are
//! "active"; their centroid is the reported position.

use crate::math::clamp01;

use super::types::{RgbaFrame, TrackSample};

pub const MOTION_WIDTH: u32 = 160;
pub const MOTION_HEIGHT: u32 = 120;

/// Active-area fraction that maps to full confidence
const CONFIDENCE_REFERENCE_FRACTION: f64 = 0.18;

/// Inclusive bounding box of active pixels, in grid coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBox {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionResult {
    pub sample: TrackSample,
    /// Only reported while present
    pub bbox: Option<PixelBox>,
    pub active_pixels: u32,
}

/// Frame-difference tracker
#[derive(Debug, Clone)]
pub struct MotionTracker {
    width: u32,
    height: u32,
    prev_gray: Vec<u8>,
    has_prev: bool,
}

impl Default for MotionTracker {
    fn default() -> Self {
        Self::new(MOTION_WIDTH, MOTION_HEIGHT)
    }
}

impl MotionTracker {
    pub fn new(width: u32, height: u32) -> Self {
        let width = width.max(2);
        let height = height.max(2);
        Self {
            width,
            height,
            prev_gray: vec![0; (width * height) as usize],
            has_prev: false,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Forget the reference frame; the next frame only primes it
    pub fn reset(&mut self) {
        self.has_prev = false;
    }

    /// Process one camera frame
    ///
    /// `diff_threshold` is clamped to [1, 80]. The first frame after a reset
    /// never reports presence.
    pub fn process_frame(&mut self, frame: &RgbaFrame, diff_threshold: u32, min_area: u32) -> MotionResult {
        if !frame.is_valid() {
            tracing::trace!(width = frame.width, height = frame.height, "motion frame rejected");
            return MotionResult { sample: TrackSample::absent(), bbox: None, active_pixels: 0 };
        }

        let (w, h) = (self.width, self.height);
        let thr = diff_threshold.clamp(1, 80) as u8;

        let mut sum_x = 0u64;
        let mut sum_y = 0u64;
        let mut count = 0u32;
        let (mut x0, mut y0, mut x1, mut y1) = (w, h, 0u32, 0u32);

        for y in 0..h {
            // Nearest-neighbour sample of the source frame
            let sy = (y as u64 * frame.height as u64 / h as u64) as u32;
            for x in 0..w {
                let sx = (x as u64 * frame.width as u64 / w as u64) as u32;
                let [r, g, b, _] = frame.pixel(sx, sy);
                let gray = ((r as u32 * 3 + g as u32 * 4 + b as u32) >> 3) as u8;

                let i = (y * w + x) as usize;
                let prev = self.prev_gray[i];
                self.prev_gray[i] = gray;

                if !self.has_prev || gray.abs_diff(prev) < thr {
                    continue;
                }

                sum_x += x as u64;
                sum_y += y as u64;
                count += 1;
                x0 = x0.min(x);
                y0 = y0.min(y);
                x1 = x1.max(x);
                y1 = y1.max(y);
            }
        }

        self.has_prev = true;

        let present = count >= min_area;
        let confidence = clamp01(count as f64 / (w as f64 * h as f64 * CONFIDENCE_REFERENCE_FRACTION));

        if !present {
            return MotionResult {
                sample: TrackSample { confidence, ..TrackSample::absent() },
                bbox: None,
                active_pixels: count,
            };
        }

        let n = count.max(1) as f64;
        let x_norm = clamp01(sum_x as f64 / n / (w - 1) as f64);
        let y_norm = clamp01(sum_y as f64 / n / (h - 1) as f64);

        MotionResult {
            sample: TrackSample::present(x_norm, y_norm, confidence),
            bbox: Some(PixelBox { x0, y0, x1, y1 }),
            active_pixels: count,
        }
    }
}
