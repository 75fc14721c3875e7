//! Person tracking
//!
//! Three interchangeable sources produce normalized camera-space samples:
//!
//! - `motion` - frame differencing on a downsampled grayscale grid
//! - `person` - a neural detector on a worker thread plus a box tracker
//! - `feed` / `sse` - an external multi-person track feed
//!
//! `fusion` picks the configured source, maps samples into world millimeters
//! and keeps the smoothed anchors the renderer follows.

pub mod detector;
pub mod feed;
pub mod fusion;
pub mod motion;
pub mod normalize;
pub mod person;
pub mod sse;
pub mod types;

pub use detector::{
    best_detection, decode_yolo, nms, Detection, DetectorError, InferenceWorker, Letterbox, OutputTensor,
    PersonDetector, TensorModel, YoloDetector,
};
pub use feed::{pick_best, pick_second, FeedEvent, FeedSelection, FeedState, FeedStatus, FeedTrack, TracksMessage};
pub use fusion::{
    min_confidence, motion_params, Anchor, FusionEvent, FusionUpdate, MotionParams, SourceKind, TrackingFusion,
    TrackingSettings, RIPPLE_EFFECT_ID, RIPPLE_PARAMS,
};
pub use motion::{MotionResult, MotionTracker};
pub use normalize::{remap_center_range, Normalization, TrackMap, WorldPoint};
pub use person::{BoxTracker, PersonResult, PersonTracker};
pub use sse::{FeedClient, FeedError, SseParser};
pub use types::{CameraSource, NormBox, RgbaFrame, TrackSample};
