//! Decaying random sparkles

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{base_level_param, BASE_LEVEL_KEY};
use crate::effects::traits::{add_rgb, fill_base, EffectDefinition};
use crate::effects::types::{EffectState, ParamSet, ParameterMeta, RenderContext};
use crate::geometry::World;

/// Per-instance sparkle intensities
pub struct SparkleField {
    intensity: Vec<f32>,
    rng: StdRng,
}

impl SparkleField {
    pub fn new(len: usize) -> Self {
        Self::with_rng(len, StdRng::from_rng(&mut rand::rng()))
    }

    /// Field with a caller-provided generator
    pub fn with_rng(len: usize, rng: StdRng) -> Self {
        Self { intensity: vec![0.0; len], rng }
    }

    pub fn intensity(&self) -> &[f32] {
        &self.intensity
    }

    /// Decay every LED, then kick `floor(rate * dt)` random LEDs
    pub fn step(&mut self, dt: f64, rate: f64, decay: f64) {
        let decay_mul = (-dt * decay).exp() as f32;
        for v in self.intensity.iter_mut() {
            *v *= decay_mul;
        }

        if self.intensity.is_empty() {
            return;
        }
        let spawns = (rate * dt).floor().max(0.0) as usize;
        for _ in 0..spawns {
            let gi = self.rng.random_range(0..self.intensity.len());
            self.intensity[gi] = (self.intensity[gi] + 0.9).min(1.0);
        }
    }
}

/// Stateful sparkle field
pub struct SparkleDefinition;

impl EffectDefinition for SparkleDefinition {
    fn id(&self) -> &'static str {
        "sparkle"
    }

    fn label(&self) -> &'static str {
        "Sparkle"
    }

    fn description(&self) -> &'static str {
        "Random twinkles (stateful)"
    }

    fn params(&self) -> Vec<ParameterMeta> {
        vec![
            base_level_param(),
            ParameterMeta::range("rate", "Rate(/s)", 18.0, 0.0, 120.0),
            ParameterMeta::range_with_step("decay", "Decay", 6.0, 0.5, 20.0, 0.1),
        ]
    }

    fn init(&self, state: &mut EffectState, _params: &ParamSet) {
        // Allocated lazily on the first render, sized to the LED count
        state.clear();
    }

    fn render(&self, ctx: &RenderContext, out: &mut [u8], state: &mut EffectState, params: &ParamSet, world: &World) {
        fill_base(out, params.value(BASE_LEVEL_KEY, 20.0));

        let total = world.len();
        let field = state.get_or_insert_with(|| SparkleField::new(total));
        if field.intensity.len() != total {
            field.intensity = vec![0.0; total];
        }

        let raw_dt = if ctx.dt == 0.0 || ctx.dt.is_nan() { 0.016 } else { ctx.dt };
        let dt = raw_dt.clamp(0.0, 0.05);
        field.step(dt, params.value("rate", 18.0), params.value("decay", 6.0));

        for (gi, &a) in field.intensity.iter().enumerate() {
            if a < 0.02 {
                continue;
            }
            let a = a as f64;
            add_rgb(out, gi, 180.0 * a, 220.0 * a, 255.0 * a);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoardLayout;

    #[test]
    fn test_step_decays_and_spawns() {
        let mut field = SparkleField::with_rng(100, StdRng::seed_from_u64(7));
        // 120/s over 50ms spawns six sparks
        field.step(0.05, 120.0, 6.0);
        let lit = field.intensity().iter().filter(|&&v| v > 0.0).count();
        assert!((1..=6).contains(&lit));
        assert!(field.intensity().iter().all(|&v| v <= 1.0));

        let before: f32 = field.intensity().iter().sum();
        field.step(0.05, 0.0, 6.0);
        let after: f32 = field.intensity().iter().sum();
        let expected = before * (-0.05f64 * 6.0).exp() as f32;
        assert!((after - expected).abs() < 1e-4);
    }

    #[test]
    fn test_reallocates_for_new_led_count() {
        let def = SparkleDefinition;
        let params = def.default_params();
        let mut state = EffectState::new();
        def.init(&mut state, &params);
        let ctx = RenderContext { t: 0.0, dt: 0.02, origin_x: 0.0, origin_y: 0.0 };

        let small = BoardLayout::new(2);
        let mut out = vec![0u8; small.world().frame_len()];
        def.render(&ctx, &mut out, &mut state, &params, small.world());
        assert_eq!(state.get_mut::<SparkleField>().map(|f| f.intensity().len()), Some(96));

        let big = BoardLayout::new(10);
        let mut out = vec![0u8; big.world().frame_len()];
        def.render(&ctx, &mut out, &mut state, &params, big.world());
        assert_eq!(state.get_mut::<SparkleField>().map(|f| f.intensity().len()), Some(480));
        assert!(out.chunks_exact(3).all(|px| px[0] >= 20));
    }
}
