//! Base effect plus additive layer pool

use std::sync::Arc;

use super::layer::{Layer, LayerEnvelope, TimeBase, LAYER_INTENSITY, LAYER_MAX};
use crate::effects::{EffectRegistry, EffectState, ParamSet, RenderContext, BASE_LEVEL_KEY};
use crate::geometry::World;
use crate::math::clamp255;

/// Owns the base effect instance and the transient layers
///
/// Every frame: clear, render the base with the live origin, then render each
/// layer newest to oldest into a scratch buffer and add it on top scaled by its
/// opacity. Layers whose opacity reaches zero are removed in the same pass.
pub struct LayerEngine {
    registry: Arc<EffectRegistry>,
    active_id: Option<String>,
    active_params: ParamSet,
    base_state: EffectState,
    base_last_t: Option<f64>,
    layers: Vec<Layer>,
    scratch: Vec<u8>,
    envelope: LayerEnvelope,
    max_layers: usize,
}

impl std::fmt::Debug for LayerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerEngine")
            .field("active_id", &self.active_id)
            .field("layers", &self.layers.len())
            .finish()
    }
}

impl LayerEngine {
    /// Engine with the first registered effect active
    pub fn new(registry: Arc<EffectRegistry>) -> Self {
        let active_id = registry.first_id().map(str::to_string);
        let active_params = active_id
            .as_deref()
            .map(|id| registry.default_params(id))
            .unwrap_or_default();
        let mut engine = Self {
            registry,
            active_id,
            active_params,
            base_state: EffectState::new(),
            base_last_t: None,
            layers: Vec::with_capacity(LAYER_MAX + 1),
            scratch: Vec::new(),
            envelope: LayerEnvelope::default(),
            max_layers: LAYER_MAX,
        };
        engine.reset_base_state();
        engine
    }

    pub fn registry(&self) -> &Arc<EffectRegistry> {
        &self.registry
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn active_params(&self) -> &ParamSet {
        &self.active_params
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn envelope(&self) -> LayerEnvelope {
        self.envelope
    }

    /// Switch the base effect. Unknown ids fall back to the first registered
    /// effect. Parameters reset to defaults and base state is re-initialized.
    pub fn set_active(&mut self, id: &str) {
        let resolved = if self.registry.contains(id) {
            Some(id.to_string())
        } else {
            tracing::warn!(effect = id, "unknown effect, falling back to first registered");
            self.registry.first_id().map(str::to_string)
        };
        self.active_params = resolved
            .as_deref()
            .map(|id| self.registry.default_params(id))
            .unwrap_or_default();
        self.active_id = resolved;
        self.reset_base_state();
    }

    /// Merge parameter overrides into the active parameters
    pub fn set_params(&mut self, next: &ParamSet) {
        self.active_params.merge(next);
    }

    /// Restore the active effect's default parameters
    pub fn reset_params(&mut self) {
        self.active_params = self
            .active_id
            .as_deref()
            .map(|id| self.registry.default_params(id))
            .unwrap_or_default();
    }

    /// Re-initialize base state and drop every layer
    pub fn reset_state(&mut self) {
        self.reset_base_state();
        self.layers.clear();
    }

    fn reset_base_state(&mut self) {
        self.base_state = EffectState::new();
        self.base_last_t = None;
        if let Some(def) = self.active_id.as_deref().and_then(|id| self.registry.get(id)) {
            def.init(&mut self.base_state, &self.active_params);
        }
    }

    /// Spawn a copy of the active effect at the given origin, on the global clock
    pub fn spawn_layer_from_current(&mut self, now: f64, origin_x: f64, origin_y: f64) {
        let Some(id) = self.active_id.clone() else {
            return;
        };
        let params = self.active_params.clone();
        self.push_layer(id, params, origin_x, origin_y, now, TimeBase::Abs);
    }

    /// Spawn a layer of a specific effect
    ///
    /// `params` of `None` uses the effect's defaults. Unknown ids are ignored
    /// and return false.
    pub fn spawn_layer(
        &mut self,
        effect_id: &str,
        params: Option<&ParamSet>,
        origin_x: f64,
        origin_y: f64,
        now: f64,
        time_base: TimeBase,
    ) -> bool {
        if !self.registry.contains(effect_id) {
            tracing::debug!(effect = effect_id, "spawn ignored, effect not registered");
            return false;
        }
        let params = params
            .cloned()
            .unwrap_or_else(|| self.registry.default_params(effect_id));
        self.push_layer(effect_id.to_string(), params, origin_x, origin_y, now, time_base);
        true
    }

    fn push_layer(
        &mut self,
        effect_id: String,
        mut params: ParamSet,
        origin_x: f64,
        origin_y: f64,
        now: f64,
        time_base: TimeBase,
    ) {
        // Stacked layers must not re-add the base fill
        if params.contains(BASE_LEVEL_KEY) {
            params.set(BASE_LEVEL_KEY, 0.0);
        }

        let mut state = EffectState::new();
        if let Some(def) = self.registry.get(&effect_id) {
            def.init(&mut state, &params);
        }

        self.layers.push(Layer {
            effect_id,
            params,
            state,
            born: now,
            last_t: None,
            origin_x,
            origin_y,
            time_base,
        });

        if self.layers.len() > self.max_layers {
            let excess = self.layers.len() - self.max_layers;
            self.layers.drain(..excess);
        }
    }

    /// Hook for origin edits; effects read the origin every frame, so nothing
    /// needs to happen here yet
    pub fn on_origin_changed(&mut self) {}

    /// Composite one frame into `out` (length `world.len() * 3`)
    pub fn render_frame(&mut self, now: f64, origin_x: f64, origin_y: f64, world: &World, out: &mut [u8]) {
        out.fill(0);

        let base_dt = self.base_last_t.map_or(1.0 / 60.0, |last| now - last);
        self.base_last_t = Some(now);

        if let Some(def) = self.active_id.as_deref().and_then(|id| self.registry.get(id)) {
            let ctx = RenderContext { t: now, dt: base_dt, origin_x, origin_y };
            def.render(&ctx, out, &mut self.base_state, &self.active_params, world);
        }

        if self.scratch.len() != out.len() {
            self.scratch = vec![0; out.len()];
        }

        for idx in (0..self.layers.len()).rev() {
            let layer = &mut self.layers[idx];
            let a = self.envelope.opacity(layer.age(now));
            if a <= 0.0 {
                self.layers.remove(idx);
                continue;
            }

            let ctx = RenderContext {
                t: layer.local_time(now),
                dt: layer.advance(now),
                origin_x: layer.origin_x,
                origin_y: layer.origin_y,
            };

            self.scratch.fill(0);
            if let Some(def) = self.registry.get(&layer.effect_id) {
                def.render(&ctx, &mut self.scratch, &mut layer.state, &layer.params, world);
            }

            let k = a * LAYER_INTENSITY;
            for (o, &s) in out.iter_mut().zip(self.scratch.iter()) {
                *o = clamp255(*o as f64 + s as f64 * k);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::layer::LIFE_SEC;
    use crate::geometry::BoardLayout;

    fn engine() -> LayerEngine {
        LayerEngine::new(Arc::new(EffectRegistry::with_builtins()))
    }

    #[test]
    fn test_defaults_to_first_effect() {
        let engine = engine();
        assert_eq!(engine.active_id(), Some("red20"));
        assert!(engine.active_params().is_empty());
    }

    #[test]
    fn test_set_active_falls_back() {
        let mut engine = engine();
        engine.set_active("ripple");
        assert_eq!(engine.active_id(), Some("ripple"));
        assert_eq!(engine.active_params().get("period"), Some(1.10));
        engine.set_active("doesNotExist");
        assert_eq!(engine.active_id(), Some("red20"));
    }

    #[test]
    fn test_params_merge_and_reset() {
        let mut engine = engine();
        engine.set_active("originGlow");
        engine.set_params(&ParamSet::from([("radius", 120.0)]));
        assert_eq!(engine.active_params().get("radius"), Some(120.0));
        assert_eq!(engine.active_params().get("glow"), Some(140.0));
        engine.reset_params();
        assert_eq!(engine.active_params().get("radius"), Some(55.0));
    }

    #[test]
    fn test_spawn_forces_base_level_to_zero() {
        let mut engine = engine();
        engine.set_active("originGlow");
        engine.spawn_layer_from_current(1.0, 10.0, 20.0);
        let layer = &engine.layers()[0];
        assert_eq!(layer.params.get(BASE_LEVEL_KEY), Some(0.0));
        assert_eq!(layer.time_base, TimeBase::Abs);
        assert_eq!((layer.origin_x, layer.origin_y), (10.0, 20.0));
        // Active parameters are untouched
        assert_eq!(engine.active_params().get(BASE_LEVEL_KEY), Some(20.0));
    }

    #[test]
    fn test_spawn_unknown_effect_is_ignored() {
        let mut engine = engine();
        assert!(!engine.spawn_layer("nope", None, 0.0, 0.0, 0.0, TimeBase::Rel));
        assert_eq!(engine.layer_count(), 0);
        assert!(engine.spawn_layer("ripple", None, 0.0, 0.0, 0.0, TimeBase::Rel));
        assert_eq!(engine.layers()[0].params.get(BASE_LEVEL_KEY), Some(0.0));
        assert_eq!(engine.layers()[0].params.get("speed"), Some(190.0));
    }

    #[test]
    fn test_cap_evicts_oldest_inserted() {
        let mut engine = engine();
        for i in 0..30 {
            engine.spawn_layer("ripple", None, i as f64, 0.0, 0.0, TimeBase::Rel);
        }
        assert_eq!(engine.layer_count(), LAYER_MAX);
        // The first six were evicted
        assert_eq!(engine.layers()[0].origin_x, 6.0);
        assert_eq!(engine.layers()[LAYER_MAX - 1].origin_x, 29.0);
    }

    #[test]
    fn test_dead_layers_removed_during_render() {
        let layout = BoardLayout::default();
        let mut out = vec![0u8; layout.world().frame_len()];
        let mut engine = engine();
        engine.spawn_layer("ripple", None, 0.0, 0.0, 0.0, TimeBase::Rel);
        engine.spawn_layer("ripple", None, 0.0, 0.0, 1.0, TimeBase::Rel);

        engine.render_frame(LIFE_SEC - 0.01, 0.0, 0.0, layout.world(), &mut out);
        assert_eq!(engine.layer_count(), 2);
        engine.render_frame(LIFE_SEC, 0.0, 0.0, layout.world(), &mut out);
        assert_eq!(engine.layer_count(), 1);
        assert_eq!(engine.layers()[0].born, 1.0);
    }

    #[test]
    fn test_layers_add_over_base() {
        let layout = BoardLayout::default();
        let mut out = vec![0u8; layout.world().frame_len()];
        let mut engine = engine();

        engine.render_frame(0.0, 0.0, 0.0, layout.world(), &mut out);
        assert!(out.chunks_exact(3).all(|px| px == [20, 0, 0]));

        engine.spawn_layer("originGlow", None, 0.0, 0.0, 0.0, TimeBase::Rel);
        engine.render_frame(0.1, 0.0, 0.0, layout.world(), &mut out);
        // LED 42 on board 4 sits 61mm from the origin, outside the 55mm glow
        let gi = 4 * 48 + 42;
        assert_eq!(&out[gi * 3..gi * 3 + 3], &[20, 0, 0]);
        // Board 0 carries only the base
        assert_eq!(&out[0..3], &[20, 0, 0]);
        assert_eq!(out.len(), layout.world().frame_len());
    }

    #[test]
    fn test_layer_glow_blends_with_opacity() {
        let layout = BoardLayout::default();
        let mut out = vec![0u8; layout.world().frame_len()];
        let mut engine = engine();
        let gi = 4 * 48 + 42;
        let (x, y) = (layout.world().x[gi] as f64, layout.world().y[gi] as f64);

        engine.spawn_layer("originGlow", None, x, y, 0.0, TimeBase::Rel);
        engine.render_frame(0.1, 0.0, 0.0, layout.world(), &mut out);
        // Full opacity: base (20,0,0) plus glow at the center (30,40,140)
        assert_eq!(&out[gi * 3..gi * 3 + 3], &[50, 40, 140]);

        // Half faded
        engine.render_frame(1.25, 0.0, 0.0, layout.world(), &mut out);
        assert_eq!(&out[gi * 3..gi * 3 + 3], &[35, 20, 70]);
    }

    #[test]
    fn test_empty_registry_renders_black() {
        let layout = BoardLayout::default();
        let mut out = vec![7u8; layout.world().frame_len()];
        let mut engine = LayerEngine::new(Arc::new(EffectRegistry::new()));
        assert_eq!(engine.active_id(), None);
        engine.spawn_layer_from_current(0.0, 0.0, 0.0);
        engine.render_frame(0.0, 0.0, 0.0, layout.world(), &mut out);
        assert!(out.iter().all(|&v| v == 0));
        assert_eq!(engine.layer_count(), 0);
    }

    #[test]
    fn test_reset_state_clears_layers() {
        let mut engine = engine();
        engine.spawn_layer("ripple", None, 0.0, 0.0, 0.0, TimeBase::Rel);
        engine.reset_state();
        assert_eq!(engine.layer_count(), 0);
    }
}
