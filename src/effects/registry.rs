//! Effect registry
//!
//! Holds every registered effect definition keyed by id, and remembers the
//! registration order for listing.

use std::collections::HashMap;
use std::sync::Arc;

use super::traits::EffectDefinition;
use super::types::ParamSet;

/// Registry of available effects
#[derive(Default, Clone)]
pub struct EffectRegistry {
    effects: HashMap<String, Arc<dyn EffectDefinition>>,
    order: Vec<String>,
}

impl std::fmt::Debug for EffectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectRegistry").field("order", &self.order).finish()
    }
}

impl EffectRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry populated with the built-in effects
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        super::builtin::register_builtin_effects(&mut registry);
        registry
    }

    /// Register an effect. Re-registering an id replaces it in place.
    pub fn register(&mut self, definition: impl EffectDefinition + 'static) {
        let id = definition.id().to_string();
        if !self.effects.contains_key(&id) {
            self.order.push(id.clone());
        } else {
            tracing::debug!(effect = %id, "replacing registered effect");
        }
        self.effects.insert(id, Arc::new(definition));
    }

    /// Get an effect definition by id
    pub fn get(&self, id: &str) -> Option<Arc<dyn EffectDefinition>> {
        self.effects.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.effects.contains_key(id)
    }

    /// Ids in registration order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    /// Definitions in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn EffectDefinition>> {
        self.order.iter().filter_map(|id| self.effects.get(id))
    }

    /// First registered id, used as the fallback active effect
    pub fn first_id(&self) -> Option<&str> {
        self.order.first().map(|s| s.as_str())
    }

    /// Default parameters for an effect, empty if unknown
    pub fn default_params(&self, id: &str) -> ParamSet {
        self.effects
            .get(id)
            .map(|d| d.default_params())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}
