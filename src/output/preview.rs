//! Preview consumers
//!
//! The preview receives its own post-processed copy of each drawn frame along
//! with the LED positions, projected through the current [`ViewTransform`].

use crate::geometry::World;
use crate::view::ViewTransform;

/// One LED as it lands on the preview surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenLed {
    pub sx: f64,
    pub sy: f64,
    pub rgb: [u8; 3],
}

/// Consumer of preview frames
pub trait PreviewSink: Send {
    /// Called at the draw cadence with a frame independent of the one sent
    fn draw(&mut self, frame: &[u8], world: &World, origin: (f64, f64));
}

/// Project every LED of `frame` onto the preview surface
pub fn project_frame(frame: &[u8], world: &World, view: &ViewTransform) -> Vec<ScreenLed> {
    (0..world.len())
        .map(|gi| {
            let (sx, sy) = view.mm_to_screen(world.x[gi] as f64, world.y[gi] as f64);
            let k = gi * 3;
            ScreenLed { sx, sy, rgb: [frame[k], frame[k + 1], frame[k + 2]] }
        })
        .collect()
}

/// Preview that keeps the latest projected frame in memory
#[derive(Debug, Default)]
pub struct ProjectedPreview {
    pub view: ViewTransform,
    pub leds: Vec<ScreenLed>,
    pub origin_px: (f64, f64),
    pub frames_drawn: u64,
}

impl ProjectedPreview {
    pub fn new(view: ViewTransform) -> Self {
        Self { view, ..Default::default() }
    }
}

impl PreviewSink for ProjectedPreview {
    fn draw(&mut self, frame: &[u8], world: &World, origin: (f64, f64)) {
        self.leds = project_frame(frame, world, &self.view);
        self.origin_px = self.view.mm_to_screen(origin.0, origin.1);
        self.frames_drawn += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoardLayout;

    #[test]
    fn test_projection_matches_view() {
        let layout = BoardLayout::default();
        let mut frame = vec![0u8; layout.world().frame_len()];
        frame[3..6].copy_from_slice(&[1, 2, 3]);

        let mut preview = ProjectedPreview::new(ViewTransform::new(1000.0, 500.0));
        preview.draw(&frame, layout.world(), (0.0, 0.0));

        assert_eq!(preview.leds.len(), layout.world().len());
        assert_eq!(preview.leds[1].rgb, [1, 2, 3]);
        assert_eq!(preview.origin_px, (500.0, 290.0));
        let (x, y) = preview.view.screen_to_mm(preview.leds[0].sx, preview.leds[0].sy);
        assert!((x - layout.world().x[0] as f64).abs() < 1e-6);
        assert!((y - layout.world().y[0] as f64).abs() < 1e-6);
    }
}
