//! Effect parameter and state types
//!
//! Parameters are plain numeric maps keyed by name; each effect publishes a
//! schema of [`ParameterMeta`] describing ranges and defaults.

use std::any::Any;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Kind of control a parameter is edited with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    #[default]
    Range,
    Number,
}

/// Parameter schema entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterMeta {
    /// Key in the parameter map
    pub key: String,
    /// Display label
    pub label: String,
    #[serde(rename = "type", default)]
    pub kind: ParameterKind,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub default: f64,
}

impl ParameterMeta {
    /// Slider parameter with unit step
    pub fn range(key: &str, label: &str, default: f64, min: f64, max: f64) -> Self {
        Self::range_with_step(key, label, default, min, max, 1.0)
    }

    /// Slider parameter with a custom step
    pub fn range_with_step(key: &str, label: &str, default: f64, min: f64, max: f64, step: f64) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            kind: ParameterKind::Range,
            min,
            max,
            step,
            default,
        }
    }

    /// Clamp a candidate value into this parameter's range
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Named numeric parameter values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamSet(BTreeMap<String, f64>);

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults from a schema
    pub fn from_schema(schema: &[ParameterMeta]) -> Self {
        Self(schema.iter().map(|p| (p.key.clone(), p.default)).collect())
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }

    /// Value for `key`, or `fallback` when unset
    pub fn value(&self, key: &str, fallback: f64) -> f64 {
        self.get(key).unwrap_or(fallback)
    }

    pub fn set(&mut self, key: impl Into<String>, value: f64) {
        self.0.insert(key.into(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Overwrite entries present in `other`, keep the rest
    pub fn merge(&mut self, other: &ParamSet) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), *v);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const N: usize> From<[(&str, f64); N]> for ParamSet {
    fn from(pairs: [(&str, f64); N]) -> Self {
        Self(pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect())
    }
}

/// Private per-instance scratch storage
///
/// Effects that keep state between frames store a value of their own type
/// here. Stateless effects never touch it.
#[derive(Default)]
pub struct EffectState {
    slot: Option<Box<dyn Any + Send>>,
}

impl std::fmt::Debug for EffectState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectState")
            .field("occupied", &self.slot.is_some())
            .finish()
    }
}

impl EffectState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the stored value, creating it when absent or of another type
    pub fn get_or_insert_with<T: Any + Send>(&mut self, make: impl FnOnce() -> T) -> &mut T {
        let fresh = !matches!(&self.slot, Some(b) if b.is::<T>());
        if fresh {
            self.slot = Some(Box::new(make()));
        }
        // The slot now holds a T
        match self.slot.as_mut().and_then(|b| b.downcast_mut::<T>()) {
            Some(v) => v,
            None => unreachable!("effect state slot holds the requested type"),
        }
    }

    pub fn get_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.slot.as_mut().and_then(|b| b.downcast_mut::<T>())
    }

    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }

    pub fn clear(&mut self) {
        self.slot = None;
    }
}

/// Per-call render inputs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderContext {
    /// Seconds; either the global clock or the layer's age
    pub t: f64,
    /// Seconds since this instance last rendered
    pub dt: f64,
    /// Origin X in mm
    pub origin_x: f64,
    /// Origin Y in mm
    pub origin_y: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_set_defaults_and_merge() {
        let schema = vec![
            ParameterMeta::range("baseR", "Base R", 20.0, 0.0, 50.0),
            ParameterMeta::range("speed", "Speed", 240.0, 0.0, 600.0),
        ];
        let mut params = ParamSet::from_schema(&schema);
        assert_eq!(params.get("baseR"), Some(20.0));
        params.merge(&ParamSet::from([("speed", 10.0), ("extra", 1.0)]));
        assert_eq!(params.value("speed", 0.0), 10.0);
        assert_eq!(params.value("missing", 3.5), 3.5);
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_param_set_json_shape() {
        let params = ParamSet::from([("baseR", 0.0), ("speed", 190.0)]);
        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(json, r#"{"baseR":0.0,"speed":190.0}"#);
    }

    #[test]
    fn test_state_slot_reuse_and_replace() {
        let mut state = EffectState::new();
        assert!(state.is_empty());
        state.get_or_insert_with(|| vec![1.0f32; 4])[0] = 7.0;
        assert_eq!(state.get_or_insert_with(|| vec![0.0f32; 4])[0], 7.0);
        // A different type replaces the slot
        assert_eq!(*state.get_or_insert_with(|| 5u32), 5);
        state.clear();
        assert!(state.get_mut::<u32>().is_none());
    }
}
