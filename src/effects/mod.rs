//! LED effect system
//!
//! Effects are registered once at startup and looked up by string id. A single
//! definition renders any number of instances; each instance keeps its own
//! [`EffectState`], parameter copy and clock.
//!
//! # Architecture
//!
//! - `EffectDefinition` - identity, parameter schema, `init` and `render`
//! - `EffectRegistry` - id to definition map, in registration order
//! - `ParamSet` / `ParameterMeta` - parameter values and their schema

pub mod builtin;
pub mod registry;
pub mod traits;
pub mod types;

pub use builtin::{register_builtin_effects, BASE_LEVEL_KEY};
pub use registry::EffectRegistry;
pub use traits::EffectDefinition;
pub use types::{EffectState, ParamSet, ParameterKind, ParameterMeta, RenderContext};
