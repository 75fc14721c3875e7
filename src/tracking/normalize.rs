//! Camera-space to world-space mapping
//!
//! Every accepted detection goes through the same pipeline: optional mirror and
//! vertical inversion, horizontal center-crop remap, then a linear map into the
//! configured millimeter box. The vertical coordinate is pinned to the middle of
//! the box after the remap.

use serde::{Deserialize, Serialize};

use crate::math::{clamp01, lerp};

use super::types::TrackSample;

/// Default fraction of the frame width that maps onto the full box
pub const DEFAULT_CENTER_RATIO: f64 = 0.6;

/// Millimeter box tracking coordinates are mapped into
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackMap {
    #[serde(default = "default_x_min")]
    pub x_min: f64,
    #[serde(default = "default_x_max")]
    pub x_max: f64,
    #[serde(default = "default_y_min")]
    pub y_min: f64,
    #[serde(default = "default_y_max")]
    pub y_max: f64,
}

fn default_x_min() -> f64 {
    -630.0
}
fn default_x_max() -> f64 {
    630.0
}
fn default_y_min() -> f64 {
    -350.0
}
fn default_y_max() -> f64 {
    350.0
}

impl Default for TrackMap {
    fn default() -> Self {
        Self {
            x_min: default_x_min(),
            x_max: default_x_max(),
            y_min: default_y_min(),
            y_max: default_y_max(),
        }
    }
}

/// Stretch the central `ratio` of [0, 1] onto the full range
///
/// Values outside the crop clamp to the nearest edge. The ratio is limited to
/// [0.01, 1].
pub fn remap_center_range(v: f64, ratio: f64) -> f64 {
    let r = ratio.clamp(0.01, 1.0);
    let margin = (1.0 - r) * 0.5;
    clamp01((v - margin) / r)
}

/// A sample mapped into world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldPoint {
    pub x_norm: f64,
    pub y_norm: f64,
    pub x_mm: f64,
    pub y_mm: f64,
}

/// Normalization settings shared by every source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub mirror_x: bool,
    /// Kept with the other camera options; has no effect while y is pinned
    pub invert_y: bool,
    pub center_ratio: f64,
    pub map: TrackMap,
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            mirror_x: false,
            invert_y: false,
            center_ratio: DEFAULT_CENTER_RATIO,
            map: TrackMap::default(),
        }
    }
}

impl Normalization {
    pub fn to_world(&self, sample: &TrackSample) -> WorldPoint {
        let mut x = clamp_or_center(sample.x_norm);
        if self.mirror_x {
            x = 1.0 - x;
        }
        x = remap_center_range(x, self.center_ratio);

        // Placement is one-dimensional; the camera's vertical axis is ignored
        let y = 0.5;

        WorldPoint {
            x_norm: x,
            y_norm: y,
            x_mm: lerp(self.map.x_min, self.map.x_max, x),
            y_mm: lerp(self.map.y_min, self.map.y_max, y),
        }
    }
}

fn clamp_or_center(v: f64) -> f64 {
    if v.is_finite() {
        clamp01(v)
    } else {
        0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_remap_center_range() {
        assert_relative_eq!(remap_center_range(0.5, 0.6), 0.5);
        assert_relative_eq!(remap_center_range(0.2, 0.6), 0.0);
        assert_relative_eq!(remap_center_range(0.8, 0.6), 1.0, epsilon = 1e-12);
        assert_eq!(remap_center_range(0.05, 0.6), 0.0);
        assert_eq!(remap_center_range(0.95, 0.6), 1.0);
        // Full ratio is the identity
        assert_relative_eq!(remap_center_range(0.3, 1.0), 0.3);
        // Ratio floor keeps the division finite
        assert!(remap_center_range(0.5, 0.0).is_finite());
    }

    #[test]
    fn test_to_world_center() {
        let n = Normalization::default();
        let p = n.to_world(&TrackSample::present(0.5, 0.1, 1.0));
        assert_relative_eq!(p.x_mm, 0.0, epsilon = 1e-9);
        assert_eq!(p.y_norm, 0.5);
        assert_relative_eq!(p.y_mm, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_to_world_mirror() {
        let n = Normalization { mirror_x: true, center_ratio: 1.0, ..Default::default() };
        let p = n.to_world(&TrackSample::present(0.25, 0.5, 1.0));
        assert_relative_eq!(p.x_norm, 0.75);
        assert_relative_eq!(p.x_mm, 315.0, epsilon = 1e-9);
    }

    #[test]
    fn test_to_world_edges_and_non_finite() {
        let n = Normalization::default();
        assert_relative_eq!(n.to_world(&TrackSample::present(0.0, 0.5, 1.0)).x_mm, -630.0);
        assert_relative_eq!(n.to_world(&TrackSample::present(1.0, 0.5, 1.0)).x_mm, 630.0);
        assert_relative_eq!(n.to_world(&TrackSample::present(f64::NAN, 0.5, 1.0)).x_mm, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_custom_map_y_is_box_middle() {
        let n = Normalization {
            map: TrackMap { x_min: 0.0, x_max: 100.0, y_min: 0.0, y_max: 40.0 },
            center_ratio: 1.0,
            invert_y: true,
            ..Default::default()
        };
        let p = n.to_world(&TrackSample::present(0.1, 0.9, 1.0));
        assert_relative_eq!(p.x_mm, 10.0, epsilon = 1e-9);
        assert_relative_eq!(p.y_mm, 20.0);
    }
}
