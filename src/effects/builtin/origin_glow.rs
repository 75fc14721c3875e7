//! Radial glow around the origin

use super::{base_level_param, BASE_LEVEL_KEY};
use crate::effects::traits::{add_rgb, fill_base, EffectDefinition};
use crate::effects::types::{EffectState, ParamSet, ParameterMeta, RenderContext};
use crate::geometry::World;

/// Linear falloff from the origin out to a radius
pub struct OriginGlowDefinition;

impl EffectDefinition for OriginGlowDefinition {
    fn id(&self) -> &'static str {
        "originGlow"
    }

    fn label(&self) -> &'static str {
        "Origin Glow"
    }

    fn description(&self) -> &'static str {
        "Glow around the origin"
    }

    fn params(&self) -> Vec<ParameterMeta> {
        vec![
            base_level_param(),
            ParameterMeta::range("radius", "Radius(mm)", 55.0, 10.0, 200.0),
            ParameterMeta::range("glow", "Glow", 140.0, 0.0, 255.0),
        ]
    }

    fn render(&self, ctx: &RenderContext, out: &mut [u8], _state: &mut EffectState, params: &ParamSet, world: &World) {
        fill_base(out, params.value(BASE_LEVEL_KEY, 20.0));

        let radius = params.value("radius", 55.0);
        let glow = params.value("glow", 140.0);
        let inv = 1.0 / radius.max(1e-6);

        for gi in 0..world.len() {
            let x = world.x[gi] as f64 - ctx.origin_x;
            let y = world.y[gi] as f64 - ctx.origin_y;
            let d = x.hypot(y);
            if d > radius {
                continue;
            }
            let a = 1.0 - d * inv;
            add_rgb(out, gi, 30.0 * a, 40.0 * a, glow * a);
        }
    }
}
