//! Ledfield Library
//!
//! Real-time effect compositing for arrays of round LED boards, driven by a
//! pointer or by person tracking, with frames streamed to an LED controller.

pub mod app;
pub mod compositor;
pub mod effects;
pub mod geometry;
pub mod layout;
pub mod math;
pub mod origin;
pub mod output;
pub mod settings;
pub mod telemetry;
pub mod tracking;
pub mod view;

pub use app::{App, TickReport};
pub use compositor::{LayerEngine, TimeBase};
pub use effects::{EffectDefinition, EffectRegistry, ParamSet};
pub use geometry::{Board, BoardLayout, World};
pub use layout::{LayoutDocument, LayoutError};
pub use origin::OriginState;
pub use output::{ColorProcessor, ColorSettings, FrameLink, LinkError};
pub use settings::{AppPreferences, EngineSettings, SettingsError};
pub use tracking::{TrackingFusion, TrackingSettings};
