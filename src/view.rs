//! Preview view transform
//!
//! Maps world millimeters to preview-surface pixels and back, with zoom about
//! an anchor point and panning.

/// Minimum zoom (pixels per mm)
pub const MIN_SCALE: f64 = 0.6;
/// Maximum zoom (pixels per mm)
pub const MAX_SCALE: f64 = 25.0;
/// Zoom used on reset
pub const DEFAULT_SCALE: f64 = 2.2;
/// Zoom factor per button step
const ZOOM_STEP: f64 = 1.25;
/// Zoom factor per 100 units of wheel delta
const WHEEL_BASE: f64 = 1.14;
/// Vertical position of the world center on the surface, as a fraction of height
const CENTER_Y_FRACTION: f64 = 0.58;

/// Pan/zoom state of the preview surface
#[derive(Debug, Clone, PartialEq)]
pub struct ViewTransform {
    /// World point (mm) shown at the surface center
    center: (f64, f64),
    /// Pixels per millimeter
    scale: f64,
    /// Surface size in pixels
    surface: (f64, f64),
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self::new(1280.0, 720.0)
    }
}

impl ViewTransform {
    /// Create a view for a surface of the given pixel size
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            center: (0.0, 0.0),
            scale: DEFAULT_SCALE,
            surface: (width.max(1.0), height.max(1.0)),
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn center(&self) -> (f64, f64) {
        self.center
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.surface = (width.max(1.0), height.max(1.0));
    }

    /// Surface point the world center maps to
    fn pivot(&self) -> (f64, f64) {
        (self.surface.0 * 0.5, self.surface.1 * CENTER_Y_FRACTION)
    }

    /// World mm to surface pixels (Y up in world, down on screen)
    pub fn mm_to_screen(&self, x_mm: f64, y_mm: f64) -> (f64, f64) {
        let (px, py) = self.pivot();
        (
            px + (x_mm - self.center.0) * self.scale,
            py - (y_mm - self.center.1) * self.scale,
        )
    }

    /// Surface pixels to world mm
    pub fn screen_to_mm(&self, sx: f64, sy: f64) -> (f64, f64) {
        let (px, py) = self.pivot();
        (
            self.center.0 + (sx - px) / self.scale,
            self.center.1 - (sy - py) / self.scale,
        )
    }

    /// Set zoom, keeping the world point under `anchor` fixed on screen
    pub fn set_zoom(&mut self, scale: f64, anchor: Option<(f64, f64)>) {
        let (ax, ay) = anchor.unwrap_or_else(|| self.pivot());
        let scale = if scale.is_finite() { scale } else { self.scale };
        let before = self.screen_to_mm(ax, ay);
        self.scale = scale.clamp(MIN_SCALE, MAX_SCALE);
        let after = self.screen_to_mm(ax, ay);
        self.center.0 += before.0 - after.0;
        self.center.1 += before.1 - after.1;
    }

    /// Wheel zoom about the cursor
    pub fn on_scroll(&mut self, delta_y: f64, cursor: (f64, f64)) {
        let factor = WHEEL_BASE.powf(-delta_y / 100.0);
        self.set_zoom(self.scale * factor, Some(cursor));
    }

    pub fn zoom_in(&mut self) {
        self.set_zoom(self.scale * ZOOM_STEP, None);
    }

    pub fn zoom_out(&mut self) {
        self.set_zoom(self.scale / ZOOM_STEP, None);
    }

    /// Back to the default zoom, about the surface pivot
    pub fn reset_zoom(&mut self) {
        self.set_zoom(DEFAULT_SCALE, None);
    }

    /// Pan by a surface-pixel drag delta
    pub fn pan_pixels(&mut self, dx: f64, dy: f64) {
        self.center.0 -= dx / self.scale;
        self.center.1 += dy / self.scale;
    }
}
