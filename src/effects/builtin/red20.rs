//! Flat red fill

use crate::effects::traits::EffectDefinition;
use crate::effects::types::{EffectState, ParamSet, RenderContext};
use crate::geometry::World;

/// Every LED at (20, 0, 0)
pub struct Red20Definition;

impl EffectDefinition for Red20Definition {
    fn id(&self) -> &'static str {
        "red20"
    }

    fn label(&self) -> &'static str {
        "Base: Red20"
    }

    fn description(&self) -> &'static str {
        "All LEDs at red 20"
    }

    fn render(&self, _ctx: &RenderContext, out: &mut [u8], _state: &mut EffectState, _params: &ParamSet, _world: &World) {
        for px in out.chunks_exact_mut(3) {
            px.copy_from_slice(&[20, 0, 0]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::builtin::test_support::{ctx, render_once};

    #[test]
    fn test_flat_fill() {
        let out = render_once(&Red20Definition, ctx(3.0));
        assert!(out.chunks_exact(3).all(|px| px == [20, 0, 0]));
        assert!(Red20Definition.params().is_empty());
    }
}
