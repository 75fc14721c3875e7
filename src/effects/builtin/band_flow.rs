//! Gaussian band travelling along world X

use super::{base_level_param, gaussian, BASE_LEVEL_KEY};
use crate::effects::traits::{add_rgb, fill_base, EffectDefinition};
use crate::effects::types::{EffectState, ParamSet, ParameterMeta, RenderContext};
use crate::geometry::World;

/// Band whose head wraps around a span centered on the origin
pub struct BandFlowXDefinition;

impl EffectDefinition for BandFlowXDefinition {
    fn id(&self) -> &'static str {
        "bandFlowX"
    }

    fn label(&self) -> &'static str {
        "Band Flow X"
    }

    fn description(&self) -> &'static str {
        "A band flowing along X"
    }

    fn params(&self) -> Vec<ParameterMeta> {
        vec![
            base_level_param(),
            ParameterMeta::range("speed", "Speed(mm/s)", 240.0, 0.0, 600.0),
            ParameterMeta::range("sigma", "Sigma(mm)", 35.0, 5.0, 120.0),
            ParameterMeta::range_with_step("span", "Span(mm)", 520.0, 50.0, 2000.0, 10.0),
        ]
    }

    fn render(&self, ctx: &RenderContext, out: &mut [u8], _state: &mut EffectState, params: &ParamSet, world: &World) {
        fill_base(out, params.value(BASE_LEVEL_KEY, 20.0));

        let speed = params.value("speed", 240.0);
        let sigma = params.value("sigma", 35.0).max(1e-6);
        let span = params.value("span", 520.0).max(1e-6);
        let head = -span * 0.5 + (ctx.t * speed) % span;

        for gi in 0..world.len() {
            let dx = (world.x[gi] as f64 - ctx.origin_x) - head;
            let a = gaussian(dx * dx, sigma);
            if a < 0.01 {
                continue;
            }
            add_rgb(out, gi, 80.0 * a, 30.0 * a, 160.0 * a);
        }
    }
}
