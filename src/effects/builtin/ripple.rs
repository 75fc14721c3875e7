//! Radial ripple rings

use super::{base_level_param, BASE_LEVEL_KEY};
use crate::effects::traits::{add_rgb, fill_base, EffectDefinition};
use crate::effects::types::{EffectState, ParamSet, ParameterMeta, RenderContext};
use crate::geometry::World;

/// Rings expanding from the origin, one every `period` seconds
///
/// The radial phase `r/speed - t` is wrapped into the period and lit as a
/// Gaussian on the distance to the nearest ring.
pub struct RippleDefinition;

impl EffectDefinition for RippleDefinition {
    fn id(&self) -> &'static str {
        "ripple"
    }

    fn label(&self) -> &'static str {
        "Ripple"
    }

    fn description(&self) -> &'static str {
        "Ripples spreading from the origin"
    }

    fn params(&self) -> Vec<ParameterMeta> {
        vec![
            base_level_param(),
            ParameterMeta::range("speed", "Speed(mm/s)", 190.0, 10.0, 600.0),
            ParameterMeta::range_with_step("period", "Period(s)", 1.10, 0.2, 3.0, 0.05),
            ParameterMeta::range_with_step("width", "Width(s)", 0.095, 0.01, 0.40, 0.01),
        ]
    }

    fn render(&self, ctx: &RenderContext, out: &mut [u8], _state: &mut EffectState, params: &ParamSet, world: &World) {
        fill_base(out, params.value(BASE_LEVEL_KEY, 20.0));

        let speed = params.value("speed", 190.0).max(1e-6);
        let period = params.value("period", 1.10).max(1e-6);
        let width = params.value("width", 0.095).max(1e-6);

        for gi in 0..world.len() {
            let x = world.x[gi] as f64 - ctx.origin_x;
            let y = world.y[gi] as f64 - ctx.origin_y;
            let r = x.hypot(y);

            let phase = r / speed - ctx.t;
            let p = ((phase % period) + period) % period;
            let d = p.min(period - p);
            let a = (-(d * d) / (2.0 * width * width)).exp();
            if a < 0.02 {
                continue;
            }
            add_rgb(out, gi, 50.0 * a, 90.0 * a, 180.0 * a);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::builtin::test_support::{ctx, render_once};

    #[test]
    fn test_ring_at_origin_when_phase_aligned() {
        // Board 4 sits at -70mm; its center is 70mm from the origin. A ring
        // passes radius r when t = r/speed (mod period).
        let layout = crate::geometry::BoardLayout::default();
        let w = layout.world();
        let inner = 4 * 48 + 42;
        let r = (w.x[inner] as f64).hypot(w.y[inner] as f64);
        let out = render_once(&RippleDefinition, ctx(r / 190.0));
        let px = &out[inner * 3..inner * 3 + 3];
        assert_eq!(px, &[70, 90, 180]);
    }

    #[test]
    fn test_far_from_ring_is_base_only() {
        let layout = crate::geometry::BoardLayout::default();
        let w = layout.world();
        let inner = 4 * 48 + 42;
        let r = (w.x[inner] as f64).hypot(w.y[inner] as f64);
        // Half a period away from the ring
        let out = render_once(&RippleDefinition, ctx(r / 190.0 + 0.55));
        assert_eq!(&out[inner * 3..inner * 3 + 3], &[20, 0, 0]);
    }
}
