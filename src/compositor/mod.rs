//! Layer compositor
//!
//! Renders the active base effect plus any number of transient layers into a
//! single RGB frame.
//!
//! # Architecture
//!
//! - `LayerEngine`: owns the base effect instance and the layer pool
//! - `Layer`: a time-boxed effect instance with its own origin snapshot
//! - `LayerEnvelope`: opacity over a layer's age

pub mod engine;
pub mod layer;

pub use engine::LayerEngine;
pub use layer::{Layer, LayerEnvelope, TimeBase, FADEOUT_SEC, LAYER_INTENSITY, LAYER_MAX, LIFE_SEC};
