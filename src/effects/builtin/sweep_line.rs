//! Line rotating through the origin

use super::{base_level_param, gaussian, BASE_LEVEL_KEY};
use crate::effects::traits::{add_rgb, fill_base, EffectDefinition};
use crate::effects::types::{EffectState, ParamSet, ParameterMeta, RenderContext};
use crate::geometry::World;

/// Gaussian band around a rotating line, green channel cycling with time
pub struct SweepLineDefinition;

impl EffectDefinition for SweepLineDefinition {
    fn id(&self) -> &'static str {
        "sweepLine"
    }

    fn label(&self) -> &'static str {
        "Sweep Line"
    }

    fn description(&self) -> &'static str {
        "A rotating line"
    }

    fn params(&self) -> Vec<ParameterMeta> {
        vec![
            base_level_param(),
            ParameterMeta::range_with_step("angW", "Angular(rad/s)", 0.85, 0.0, 4.0, 0.05),
            ParameterMeta::range("thick", "Thickness(mm)", 18.0, 3.0, 80.0),
        ]
    }

    fn render(&self, ctx: &RenderContext, out: &mut [u8], _state: &mut EffectState, params: &ParamSet, world: &World) {
        fill_base(out, params.value(BASE_LEVEL_KEY, 20.0));

        let t = ctx.t;
        let ang = t * params.value("angW", 0.85);
        let (ny, nx) = ang.sin_cos();
        let thickness = params.value("thick", 18.0).max(1e-6);
        let c = 0.5 + 0.5 * (t * 2.0).sin();

        for gi in 0..world.len() {
            let x = world.x[gi] as f64 - ctx.origin_x;
            let y = world.y[gi] as f64 - ctx.origin_y;
            // Signed distance to the line through the origin along (nx, ny)
            let d = (-ny * x + nx * y).abs();
            let a = gaussian(d * d, thickness);
            if a < 0.01 {
                continue;
            }
            add_rgb(out, gi, 120.0 * a, (40.0 + 120.0 * c) * a, 200.0 * a);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::builtin::test_support::{ctx, render_once};

    #[test]
    fn test_horizontal_line_lights_every_board_center() {
        // At t=0 the line runs along X through y=0
        let out = render_once(&SweepLineDefinition, ctx(0.0));
        for b in 0..10 {
            // Outer LED 0 sits exactly on y=0
            let gi = b * 48;
            let px = &out[gi * 3..gi * 3 + 3];
            assert_eq!(px, &[140, 100, 200]);
        }
    }
}
