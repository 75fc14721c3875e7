//! Transient effect layers
//!
//! A layer is a time-boxed instance of an effect with its own parameter
//! snapshot, private state and origin. It fades out over the tail of its
//! lifetime and is evicted once its age reaches the lifetime.

use serde::{Deserialize, Serialize};

use crate::effects::{EffectState, ParamSet};

/// Maximum concurrent layers; the oldest-inserted are dropped past this
pub const LAYER_MAX: usize = 24;
/// Layer lifetime in seconds
pub const LIFE_SEC: f64 = 1.6;
/// Fade-out duration at the end of the lifetime
pub const FADEOUT_SEC: f64 = 0.7;
/// Global scale applied to every layer's contribution
pub const LAYER_INTENSITY: f64 = 1.0;

/// Clock a layer's effect sees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeBase {
    /// Global render clock
    Abs,
    /// Seconds since the layer was spawned
    #[default]
    Rel,
}

/// Opacity envelope over a layer's age
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerEnvelope {
    pub life: f64,
    pub fadeout: f64,
}

impl Default for LayerEnvelope {
    fn default() -> Self {
        Self { life: LIFE_SEC, fadeout: FADEOUT_SEC }
    }
}

impl LayerEnvelope {
    /// Opacity in [0, 1] at `age` seconds. Zero means the layer is dead.
    pub fn opacity(&self, age: f64) -> f64 {
        if age >= self.life {
            return 0.0;
        }
        let fade_start = (self.life - self.fadeout).max(0.0);
        if age <= fade_start {
            return 1.0;
        }
        let t = (age - fade_start) / self.fadeout.max(1e-6);
        (1.0 - t).max(0.0)
    }
}

/// A live layer record
#[derive(Debug)]
pub struct Layer {
    pub effect_id: String,
    pub params: ParamSet,
    pub state: EffectState,
    /// Spawn time in seconds on the render clock
    pub born: f64,
    /// Time of the previous render, if any
    pub last_t: Option<f64>,
    pub origin_x: f64,
    pub origin_y: f64,
    pub time_base: TimeBase,
}

impl Layer {
    pub fn age(&self, now: f64) -> f64 {
        now - self.born
    }

    /// Time handed to the effect: the age for relative layers, `now` otherwise
    pub fn local_time(&self, now: f64) -> f64 {
        match self.time_base {
            TimeBase::Rel => self.age(now),
            TimeBase::Abs => now,
        }
    }

    /// Seconds since the previous render, 1/60 on the first one
    pub fn advance(&mut self, now: f64) -> f64 {
        let dt = self.last_t.map_or(1.0 / 60.0, |last| now - last);
        self.last_t = Some(now);
        dt
    }
}
