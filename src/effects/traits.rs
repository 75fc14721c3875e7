//! Effect plugin contract
//!
//! An effect is a stateless descriptor: identity, a parameter schema and a
//! `render` function. Any per-instance data lives in the [`EffectState`] the
//! caller owns, so one registered descriptor serves the base effect and every
//! layer at once.

use super::types::{EffectState, ParamSet, ParameterMeta, RenderContext};
use crate::geometry::World;

/// Capability to fill an RGB buffer given time, an origin and LED positions
pub trait EffectDefinition: Send + Sync {
    /// Unique identifier (e.g. "ripple")
    fn id(&self) -> &'static str;

    /// Display name
    fn label(&self) -> &'static str;

    /// One-line description
    fn description(&self) -> &'static str {
        ""
    }

    /// Parameter schema, in display order
    fn params(&self) -> Vec<ParameterMeta> {
        Vec::new()
    }

    /// Prepare per-instance state. Called on activation and on state reset.
    fn init(&self, _state: &mut EffectState, _params: &ParamSet) {}

    /// Write exactly one RGB triple per LED into `out`
    ///
    /// `out.len()` is `world.len() * 3`. Implementations either fill every
    /// pixel unconditionally or fill a base color and then brighten with
    /// clamped addition.
    fn render(
        &self,
        ctx: &RenderContext,
        out: &mut [u8],
        state: &mut EffectState,
        params: &ParamSet,
        world: &World,
    );

    /// Default parameter values
    fn default_params(&self) -> ParamSet {
        ParamSet::from_schema(&self.params())
    }
}

/// Fill every pixel with a red base level and clear green/blue
pub(crate) fn fill_base(out: &mut [u8], base_r: f64) {
    let r = crate::math::clamp255(base_r);
    for px in out.chunks_exact_mut(3) {
        px[0] = r;
        px[1] = 0;
        px[2] = 0;
    }
}

/// Clamped additive brighten of one LED
#[inline]
pub(crate) fn add_rgb(out: &mut [u8], led: usize, r: f64, g: f64, b: f64) {
    use crate::math::clamp255;
    let k = led * 3;
    out[k] = clamp255(out[k] as f64 + r);
    out[k + 1] = clamp255(out[k + 1] as f64 + g);
    out[k + 2] = clamp255(out[k + 2] as f64 + b);
}
