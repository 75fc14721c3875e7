//! Built-in effects
//!
//! The standard LED effects that ship with ledfield. All except `red20` start
//! from a red base fill controlled by the `baseR` parameter.

mod band_flow;
mod board_hop;
mod orbit_pulse;
mod origin_glow;
mod red20;
mod ripple;
mod sparkle;
mod sweep_line;

pub use band_flow::BandFlowXDefinition;
pub use board_hop::BoardHopDefinition;
pub use orbit_pulse::OrbitPulseDefinition;
pub use origin_glow::OriginGlowDefinition;
pub use red20::Red20Definition;
pub use ripple::RippleDefinition;
pub use sparkle::{SparkleDefinition, SparkleField};
pub use sweep_line::SweepLineDefinition;

use super::types::ParameterMeta;
use super::EffectRegistry;

/// Key of the base fill level shared by the built-ins
pub const BASE_LEVEL_KEY: &str = "baseR";

/// Register all built-in effects with the registry
pub fn register_builtin_effects(registry: &mut EffectRegistry) {
    registry.register(Red20Definition);
    registry.register(OriginGlowDefinition);
    registry.register(BandFlowXDefinition);
    registry.register(RippleDefinition);
    registry.register(OrbitPulseDefinition);
    registry.register(SweepLineDefinition);
    registry.register(BoardHopDefinition);
    registry.register(SparkleDefinition);
}

pub(crate) fn base_level_param() -> ParameterMeta {
    ParameterMeta::range(BASE_LEVEL_KEY, "Base R", 20.0, 0.0, 50.0)
}

/// Gaussian falloff for a squared distance
#[inline]
pub(crate) fn gaussian(d2: f64, sigma: f64) -> f64 {
    (-d2 / (2.0 * sigma * sigma)).exp()
}
