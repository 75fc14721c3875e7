//! Dot orbiting the origin

use super::{base_level_param, gaussian, BASE_LEVEL_KEY};
use crate::effects::traits::{add_rgb, fill_base, EffectDefinition};
use crate::effects::types::{EffectState, ParamSet, ParameterMeta, RenderContext};
use crate::geometry::World;

pub struct OrbitPulseDefinition;

impl EffectDefinition for OrbitPulseDefinition {
    fn id(&self) -> &'static str {
        "orbitPulse"
    }

    fn label(&self) -> &'static str {
        "Orbit Pulse"
    }

    fn description(&self) -> &'static str {
        "A point circling the origin"
    }

    fn params(&self) -> Vec<ParameterMeta> {
        vec![
            base_level_param(),
            ParameterMeta::range("R", "Radius(mm)", 140.0, 0.0, 400.0),
            ParameterMeta::range_with_step("w", "Angular(rad/s)", 1.2, 0.0, 6.0, 0.05),
            ParameterMeta::range("sigma", "Sigma(mm)", 28.0, 5.0, 120.0),
        ]
    }

    fn render(&self, ctx: &RenderContext, out: &mut [u8], _state: &mut EffectState, params: &ParamSet, world: &World) {
        fill_base(out, params.value(BASE_LEVEL_KEY, 20.0));

        let radius = params.value("R", 140.0);
        let w = params.value("w", 1.2);
        let px = (ctx.t * w).cos() * radius;
        let py = (ctx.t * w).sin() * radius;
        let sigma = params.value("sigma", 28.0).max(1e-6);

        for gi in 0..world.len() {
            let dx = (world.x[gi] as f64 - ctx.origin_x) - px;
            let dy = (world.y[gi] as f64 - ctx.origin_y) - py;
            let a = gaussian(dx * dx + dy * dy, sigma);
            if a < 0.01 {
                continue;
            }
            add_rgb(out, gi, 40.0 * a, 160.0 * a, 120.0 * a);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::builtin::test_support::ctx;
    use crate::geometry::BoardLayout;

    #[test]
    fn test_dot_starts_on_positive_x() {
        // At t=0 the dot is at (R, 0), right over board 6's center
        let layout = BoardLayout::default();
        let mut params = OrbitPulseDefinition.default_params();
        params.set("R", 210.0);
        let mut out = vec![0u8; layout.world().frame_len()];
        let mut state = EffectState::new();
        OrbitPulseDefinition.render(&ctx(0.0), &mut out, &mut state, &params, layout.world());

        let center6 = 6 * 48 + 42;
        let far = 0;
        assert!(out[center6 * 3 + 1] > 100);
        assert_eq!(&out[far * 3..far * 3 + 3], &[20, 0, 0]);
    }
}
