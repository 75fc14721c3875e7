//! Shared tracking types

use crate::math::clamp01;

/// Per-source tracking result for one fusion tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackSample {
    pub present: bool,
    /// Horizontal position, 0 = left edge of the camera frame
    pub x_norm: f64,
    /// Vertical position, 0 = top edge
    pub y_norm: f64,
    pub confidence: f64,
}

impl TrackSample {
    /// Absent sample centered in the frame
    pub fn absent() -> Self {
        Self { present: false, x_norm: 0.5, y_norm: 0.5, confidence: 0.0 }
    }

    pub fn present(x_norm: f64, y_norm: f64, confidence: f64) -> Self {
        Self { present: true, x_norm, y_norm, confidence }
    }
}

impl Default for TrackSample {
    fn default() -> Self {
        Self::absent()
    }
}

/// Bounding box in normalized frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NormBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl NormBox {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x0 + self.x1) * 0.5, (self.y0 + self.y1) * 0.5)
    }

    pub fn area(&self) -> f64 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Intersection over union; degenerate unions give 0
    pub fn iou(&self, other: &NormBox) -> f64 {
        let ix0 = self.x0.max(other.x0);
        let iy0 = self.y0.max(other.y0);
        let ix1 = self.x1.min(other.x1);
        let iy1 = self.y1.min(other.y1);
        let inter = (ix1 - ix0).max(0.0) * (iy1 - iy0).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 1e-9 {
            return 0.0;
        }
        inter / union
    }

    /// Every edge clamped into [0, 1]
    pub fn clamped(&self) -> NormBox {
        NormBox {
            x0: clamp01(self.x0),
            y0: clamp01(self.y0),
            x1: clamp01(self.x1),
            y1: clamp01(self.y1),
        }
    }

    pub fn translated(&self, dx: f64, dy: f64) -> NormBox {
        NormBox {
            x0: self.x0 + dx,
            y0: self.y0 + dy,
            x1: self.x1 + dx,
            y1: self.y1 + dy,
        }
    }

    pub fn lerp(&self, to: &NormBox, t: f64) -> NormBox {
        let l = crate::math::lerp;
        NormBox {
            x0: l(self.x0, to.x0, t),
            y0: l(self.y0, to.y0, t),
            x1: l(self.x1, to.x1, t),
            y1: l(self.y1, to.y1, t),
        }
    }
}

/// RGBA8 camera frame
#[derive(Debug, Clone, PartialEq)]
pub struct RgbaFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl RgbaFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self { data, width, height }
    }

    /// Frame filled with one color
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self { data, width, height }
    }

    /// True when the buffer holds exactly width x height pixels
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == self.width as usize * self.height as usize * 4
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }
}

/// Local camera capture
///
/// Implementations return the most recent frame without blocking, or `None`
/// when no new frame has arrived since the last call.
pub trait CameraSource: Send {
    fn is_running(&self) -> bool;
    fn latest_frame(&mut self) -> Option<RgbaFrame>;
}
