//! Frame output
//!
//! Color post-processing, the hardware frame link and preview consumers.

pub mod color;
pub mod link;
pub mod preview;

pub use color::{BoardGlow, ColorProcessor, ColorSettings, StripePalette, StripeSample, TrackingOverlay};
pub use link::{encode_packet, FrameLink, FrameTransport, LinkError, SendOutcome, WriterTransport};
pub use preview::{project_frame, PreviewSink, ProjectedPreview, ScreenLed};
