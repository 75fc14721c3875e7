//! Round-robin board highlight

use super::{base_level_param, BASE_LEVEL_KEY};
use crate::effects::traits::{add_rgb, fill_base, EffectDefinition};
use crate::effects::types::{EffectState, ParamSet, ParameterMeta, RenderContext};
use crate::geometry::World;

/// Lights one board at a time with a shimmer keyed by local index
pub struct BoardHopDefinition;

impl EffectDefinition for BoardHopDefinition {
    fn id(&self) -> &'static str {
        "boardHop"
    }

    fn label(&self) -> &'static str {
        "Board Hop"
    }

    fn description(&self) -> &'static str {
        "Cycles through boards one at a time"
    }

    fn params(&self) -> Vec<ParameterMeta> {
        vec![
            base_level_param(),
            ParameterMeta::range_with_step("period", "Period(s/board)", 0.85, 0.2, 2.0, 0.05),
        ]
    }

    fn render(&self, ctx: &RenderContext, out: &mut [u8], _state: &mut EffectState, params: &ParamSet, world: &World) {
        fill_base(out, params.value(BASE_LEVEL_KEY, 20.0));

        let boards = world.board_count() as i64;
        if boards == 0 {
            return;
        }
        let t = ctx.t;
        let period = params.value("period", 0.85).max(1e-6);
        let idx = (t / period).floor() as i64 % boards;

        for gi in 0..world.len() {
            if world.board[gi] as i64 != idx {
                continue;
            }
            let i = world.local[gi] as f64;
            let a = 0.25 + 0.75 * (0.5 + 0.5 * (t * 6.0 + i * 0.25).sin());
            add_rgb(out, gi, 40.0 * a, 180.0 * a, 80.0 * a);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::builtin::test_support::{ctx, render_once};

    fn lit_boards(out: &[u8]) -> Vec<usize> {
        (0..10)
            .filter(|b| (0..48).any(|i| out[(b * 48 + i) * 3 + 1] > 0))
            .collect()
    }

    #[test]
    fn test_hops_one_board_per_period() {
        assert_eq!(lit_boards(&render_once(&BoardHopDefinition, ctx(0.1))), vec![0]);
        assert_eq!(lit_boards(&render_once(&BoardHopDefinition, ctx(0.9))), vec![1]);
        // Wraps after ten periods
        assert_eq!(lit_boards(&render_once(&BoardHopDefinition, ctx(8.5 + 0.1))), vec![0]);
    }
}
