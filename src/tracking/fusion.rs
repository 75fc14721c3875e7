//! Tracking fusion
//!
//! Exactly one source feeds the fusion at a time: the external feed when it is
//! enabled, otherwise the local camera through the person detector (if one
//! loaded) or the motion tracker. Each accepted sample is mapped to world
//! millimeters and folded into a smoothed anchor. The primary anchor raises a
//! ripple on every absent-to-present edge and may drive the global origin.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::geometry::BoardLayout;
use crate::math::{clamp01, lerp};
use crate::output::{BoardGlow, StripePalette, StripeSample, TrackingOverlay};

use super::detector::{DetectorError, PersonDetector};
use super::feed::{FeedState, FeedStatus};
use super::motion::MotionTracker;
use super::normalize::{Normalization, TrackMap, DEFAULT_CENTER_RATIO};
use super::person::PersonTracker;
use super::sse::{open_feed, FeedClient};
use super::types::{CameraSource, TrackSample};

/// Fusion update rate
pub const TRACK_FPS: f64 = 15.0;
/// Trail samples kept per anchor
pub const TRAIL_MAX: usize = 6;
/// Per-step weight falloff along a trail, most recent first
pub const TRAIL_DECAY: f64 = 0.72;
pub const DEFAULT_SENSITIVITY: f64 = 0.55;
pub const DEFAULT_SMOOTHING: f64 = 0.25;

/// Ripple raised on a presence rising edge
pub const RIPPLE_EFFECT_ID: &str = "ripple";
pub const RIPPLE_PARAMS: [(&str, f64); 4] = [("baseR", 0.0), ("speed", 260.0), ("period", 1.05), ("width", 0.10)];

/// Minimum confidence for feed tracks and person detections
pub fn min_confidence(sensitivity: f64) -> f64 {
    lerp(0.60, 0.25, clamp01(sensitivity))
}

/// Motion tracker thresholds derived from sensitivity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionParams {
    pub diff_threshold: u32,
    pub min_area: u32,
}

pub fn motion_params(sensitivity: f64) -> MotionParams {
    let s = clamp01(sensitivity);
    MotionParams {
        diff_threshold: (lerp(32.0, 12.0, s).round() as u32).clamp(1, 80),
        min_area: lerp(1200.0, 280.0, s).round() as u32,
    }
}

/// Tracking configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingSettings {
    /// Use the external feed instead of the local camera
    #[serde(default)]
    pub use_feed: bool,
    #[serde(default)]
    pub feed_url: String,
    #[serde(default)]
    pub camera_index: i64,
    #[serde(default)]
    pub mirror_x: bool,
    #[serde(default)]
    pub invert_y: bool,
    #[serde(default = "default_center_ratio")]
    pub center_ratio: f64,
    #[serde(default)]
    pub map: TrackMap,
    #[serde(default = "default_smoothing")]
    pub smoothing: f64,
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f64,
    /// Let the primary anchor move the origin
    #[serde(default = "default_true")]
    pub drive_origin: bool,
}

fn default_center_ratio() -> f64 {
    DEFAULT_CENTER_RATIO
}
fn default_smoothing() -> f64 {
    DEFAULT_SMOOTHING
}
fn default_sensitivity() -> f64 {
    DEFAULT_SENSITIVITY
}
fn default_true() -> bool {
    true
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            use_feed: false,
            feed_url: String::new(),
            camera_index: 0,
            mirror_x: false,
            invert_y: false,
            center_ratio: DEFAULT_CENTER_RATIO,
            map: TrackMap::default(),
            smoothing: DEFAULT_SMOOTHING,
            sensitivity: DEFAULT_SENSITIVITY,
            drive_origin: true,
        }
    }
}

impl TrackingSettings {
    pub fn normalization(&self) -> Normalization {
        Normalization {
            mirror_x: self.mirror_x,
            invert_y: self.invert_y,
            center_ratio: self.center_ratio,
            map: self.map,
        }
    }

    /// Bring every field back into its valid range
    pub fn clamp_ranges(&mut self) {
        self.center_ratio = finite_or(self.center_ratio, DEFAULT_CENTER_RATIO).clamp(0.01, 1.0);
        self.smoothing = clamp01(finite_or(self.smoothing, DEFAULT_SMOOTHING));
        self.sensitivity = clamp01(finite_or(self.sensitivity, DEFAULT_SENSITIVITY));
        self.camera_index = self.camera_index.max(0);
        let d = TrackMap::default();
        self.map.x_min = finite_or(self.map.x_min, d.x_min);
        self.map.x_max = finite_or(self.map.x_max, d.x_max);
        self.map.y_min = finite_or(self.map.y_min, d.y_min);
        self.map.y_max = finite_or(self.map.y_max, d.y_max);
        self.feed_url = self.feed_url.trim().to_string();
    }
}

fn finite_or(v: f64, fallback: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        fallback
    }
}

/// Which source produced the current samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Motion,
    Person,
    Feed,
}

impl SourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Motion => "motion",
            SourceKind::Person => "person",
            SourceKind::Feed => "feed",
        }
    }
}

/// Side effects requested by a fusion tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FusionEvent {
    /// Spawn the presence ripple at this world point
    SpawnRipple { x: f64, y: f64 },
    /// Move the origin to the primary anchor
    DriveOrigin { x: f64, y: f64 },
}

/// Smoothed world-space anchor with its trail
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Anchor {
    pub x: f64,
    pub y: f64,
    /// A smoothed position exists
    pub has: bool,
    pub present: bool,
    /// Confidence while present, 0 otherwise
    pub confidence: f64,
    /// Anchor x positions, oldest first
    pub trail: VecDeque<f64>,
}

impl Anchor {
    pub fn clear(&mut self) {
        self.present = false;
        self.has = false;
        self.confidence = 0.0;
        self.trail.clear();
    }

    /// Fold in a new world position; the first sample snaps
    fn hold(&mut self, x: f64, y: f64, smooth: f64) {
        if self.has {
            self.x = lerp(self.x, x, smooth);
            self.y = lerp(self.y, y, smooth);
        } else {
            self.x = x;
            self.y = y;
            self.has = true;
        }
        self.trail.push_back(self.x);
        while self.trail.len() > TRAIL_MAX {
            self.trail.pop_front();
        }
    }

    /// Stripe samples, most recent first
    fn stripes(&self, palette: StripePalette) -> impl Iterator<Item = StripeSample> + '_ {
        let strength = self.confidence;
        self.trail
            .iter()
            .rev()
            .enumerate()
            .filter(move |_| self.has)
            .map(move |(i, &x)| StripeSample {
                x_mm: x,
                strength: strength * TRAIL_DECAY.powi(i as i32),
                palette,
            })
    }
}

/// Result of one fusion tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FusionUpdate {
    pub events: Vec<FusionEvent>,
}

/// Fuses the configured tracking source into the primary and secondary anchors
pub struct TrackingFusion {
    settings: TrackingSettings,
    motion: MotionTracker,
    person: Option<PersonTracker>,
    camera: Option<Box<dyn CameraSource>>,
    feed: FeedState,
    feed_client: Option<FeedClient>,
    primary: Anchor,
    secondary: Anchor,
    primary_board: usize,
    last_tick: Option<f64>,
    source: Option<SourceKind>,
    info: String,
}

impl TrackingFusion {
    pub fn new(mut settings: TrackingSettings) -> Self {
        settings.clamp_ranges();
        let mut fusion = Self {
            settings,
            motion: MotionTracker::default(),
            person: None,
            camera: None,
            feed: FeedState::new(),
            feed_client: None,
            primary: Anchor::default(),
            secondary: Anchor::default(),
            primary_board: 0,
            last_tick: None,
            source: None,
            info: "track: off".to_string(),
        };
        if fusion.settings.use_feed {
            fusion.open_feed();
        }
        fusion
    }

    pub fn settings(&self) -> &TrackingSettings {
        &self.settings
    }

    /// Replace settings; feed on/off and url changes reconnect
    pub fn set_settings(&mut self, mut settings: TrackingSettings) {
        settings.clamp_ranges();
        let feed_changed = settings.use_feed != self.settings.use_feed || settings.feed_url != self.settings.feed_url;
        let toggled = settings.use_feed != self.settings.use_feed;
        self.settings = settings;
        if feed_changed {
            if self.settings.use_feed {
                self.detach_camera();
                self.open_feed();
            } else {
                self.close_feed();
            }
        }
        if toggled {
            self.reset_state();
        }
    }

    pub fn primary(&self) -> &Anchor {
        &self.primary
    }

    pub fn secondary(&self) -> &Anchor {
        &self.secondary
    }

    /// Board nearest the primary anchor at its last update
    pub fn primary_board(&self) -> usize {
        self.primary_board
    }

    pub fn feed(&self) -> &FeedState {
        &self.feed
    }

    pub fn feed_mut(&mut self) -> &mut FeedState {
        &mut self.feed
    }

    /// Status line of the last tick
    pub fn info(&self) -> &str {
        &self.info
    }

    pub fn source(&self) -> Option<SourceKind> {
        self.source
    }

    pub fn has_person_detector(&self) -> bool {
        self.person.is_some()
    }

    /// Forget anchors, trails and the throttle clock
    pub fn reset_state(&mut self) {
        self.primary.clear();
        self.secondary.clear();
        self.last_tick = None;
    }

    /// Start using a local camera; ignored while the feed is enabled
    pub fn attach_camera(&mut self, camera: Box<dyn CameraSource>) -> bool {
        if self.settings.use_feed {
            tracing::warn!("camera not attached, external feed is in use");
            return false;
        }
        self.camera = Some(camera);
        self.motion.reset();
        if let Some(person) = self.person.as_mut() {
            person.reset();
        }
        self.primary.clear();
        self.last_tick = None;
        true
    }

    pub fn detach_camera(&mut self) {
        if self.camera.take().is_some() {
            tracing::info!("camera detached");
            self.info = "track: off".to_string();
        }
        if let Some(person) = self.person.as_mut() {
            person.reset();
        }
        self.primary.clear();
        self.last_tick = None;
    }

    /// Install the person detector, or fall back to motion if it failed to load
    pub fn set_person_detector(&mut self, detector: Result<Box<dyn PersonDetector>, DetectorError>) {
        match detector.and_then(PersonTracker::new) {
            Ok(tracker) => {
                tracing::info!("person detector ready");
                self.person = Some(tracker);
                self.info = "track: person ready".to_string();
            }
            Err(e) => {
                tracing::warn!(error = %e, "person detector unavailable, using motion");
                self.person = None;
                self.info = format!("track: person failed ({e})");
            }
        }
    }

    fn open_feed(&mut self) {
        self.close_feed();
        self.feed_client = open_feed(&self.settings.feed_url, &mut self.feed);
    }

    fn close_feed(&mut self) {
        if let Some(mut client) = self.feed_client.take() {
            client.close();
        }
        self.feed.set_status(FeedStatus::Idle, "");
    }

    /// Run one fusion step if the 15 Hz throttle allows it
    pub fn update(&mut self, now: f64, layout: &BoardLayout) -> FusionUpdate {
        if let Some(client) = self.feed_client.as_ref() {
            client.drain(&mut self.feed, now);
        }

        let mut out = FusionUpdate::default();
        if let Some(last) = self.last_tick {
            if now - last < 1.0 / TRACK_FPS {
                return out;
            }
        }
        self.last_tick = Some(now);

        let sensitivity = clamp01(self.settings.sensitivity);
        if self.settings.use_feed {
            self.update_from_feed(now, sensitivity, layout, &mut out);
        } else {
            self.update_from_camera(now, sensitivity, layout, &mut out);
        }
        out
    }

    fn update_from_feed(&mut self, now: f64, sensitivity: f64, layout: &BoardLayout, out: &mut FusionUpdate) {
        self.source = Some(SourceKind::Feed);
        if self.feed.status() != FeedStatus::Open {
            self.primary.clear();
            self.secondary.clear();
            self.info = format!("track: feed {}", self.feed.status());
            return;
        }

        let selection = self
            .feed
            .select(self.settings.camera_index, now, min_confidence(sensitivity));
        if selection.is_empty() {
            self.primary.clear();
            self.secondary.clear();
            self.info = "track: feed idle".to_string();
            return;
        }

        let conf_a = match selection.primary.filter(|s| s.present) {
            Some(sample) => {
                self.apply_primary(&sample, layout, out);
                Some(self.primary.confidence)
            }
            None => {
                self.primary.clear();
                None
            }
        };
        let conf_b = match selection.secondary.filter(|s| s.present) {
            Some(sample) => {
                self.apply_secondary(&sample);
                Some(self.secondary.confidence)
            }
            None => {
                self.secondary.clear();
                None
            }
        };

        let people = conf_a.is_some() as u32 + conf_b.is_some() as u32;
        let fmt = |c: Option<f64>| c.map_or_else(|| "--".to_string(), |c| format!("{c:.2}"));
        self.info = format!(
            "track: feed {} people:{} conf:{}/{}",
            if people > 0 { "on" } else { "idle" },
            people,
            fmt(conf_a),
            fmt(conf_b)
        );
    }

    fn update_from_camera(&mut self, now: f64, sensitivity: f64, layout: &BoardLayout, out: &mut FusionUpdate) {
        let Some(camera) = self.camera.as_mut().filter(|c| c.is_running()) else {
            return;
        };
        let Some(frame) = camera.latest_frame() else {
            return;
        };

        let (sample, kind) = match self.person.as_mut() {
            Some(person) => {
                let res = person.tick(now, &frame, min_confidence(sensitivity), clamp01(self.settings.smoothing));
                (res.sample, SourceKind::Person)
            }
            None => {
                let p = motion_params(sensitivity);
                let res = self.motion.process_frame(&frame, p.diff_threshold, p.min_area);
                (res.sample, SourceKind::Motion)
            }
        };
        self.source = Some(kind);

        if sample.present {
            self.apply_primary(&sample, layout, out);
        } else {
            self.primary.clear();
        }
        let conf = if sample.present { self.primary.confidence } else { finite_or(sample.confidence, 0.0) };
        self.info = format!(
            "track: {} {} b:{} conf:{:.2}",
            kind.label(),
            if self.primary.present { "on" } else { "idle" },
            self.primary_board,
            conf
        );
    }

    fn apply_primary(&mut self, sample: &TrackSample, layout: &BoardLayout, out: &mut FusionUpdate) {
        let conf = finite_or(sample.confidence, 0.0);
        let p = self.settings.normalization().to_world(sample);
        self.primary_board = layout.nearest_board(p.x_mm as f32);

        if !self.primary.present {
            tracing::debug!(x = p.x_mm, y = p.y_mm, "presence rising edge");
            out.events.push(FusionEvent::SpawnRipple { x: p.x_mm, y: p.y_mm });
        }
        self.primary.present = true;
        self.primary.confidence = conf;
        self.primary.hold(p.x_mm, p.y_mm, clamp01(self.settings.smoothing));

        if self.settings.drive_origin {
            out.events.push(FusionEvent::DriveOrigin { x: self.primary.x, y: self.primary.y });
        }
    }

    fn apply_secondary(&mut self, sample: &TrackSample) {
        let p = self.settings.normalization().to_world(sample);
        self.secondary.present = true;
        self.secondary.confidence = finite_or(sample.confidence, 0.0);
        self.secondary.hold(p.x_mm, p.y_mm, clamp01(self.settings.smoothing));
    }

    /// Stripe and board-glow overlays for the current anchors
    pub fn overlay(&self) -> TrackingOverlay {
        let mut stripes: Vec<StripeSample> = self.primary.stripes(StripePalette::Blue).collect();
        stripes.extend(self.secondary.stripes(StripePalette::GreenOrange));
        let board_glow = self.primary.present.then(|| BoardGlow {
            board: self.primary_board,
            strength: self.primary.confidence,
            y_norm: 0.5,
        });
        TrackingOverlay { board_glow, stripes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::types::RgbaFrame;
    use approx::assert_relative_eq;

    fn feed_fusion(settings: TrackingSettings) -> TrackingFusion {
        let mut fusion = TrackingFusion::new(TrackingSettings { use_feed: true, ..settings });
        fusion.feed_mut().set_status(FeedStatus::Open, "");
        fusion
    }

    fn push_tracks(fusion: &mut TrackingFusion, now: f64, json_tracks: &str) {
        let data = format!(r#"{{"type":"tracks","cameraIndex":0,"tracks":{json_tracks}}}"#);
        assert!(fusion.feed_mut().handle_message("tracks", &data, now));
    }

    fn ripple_count(update: &FusionUpdate) -> usize {
        update
            .events
            .iter()
            .filter(|e| matches!(e, FusionEvent::SpawnRipple { .. }))
            .count()
    }

    #[test]
    fn test_sensitivity_mapping() {
        assert_relative_eq!(min_confidence(0.0), 0.60);
        assert_relative_eq!(min_confidence(1.0), 0.25, epsilon = 1e-12);
        assert_relative_eq!(min_confidence(0.55), 0.4075, epsilon = 1e-12);
        assert_eq!(motion_params(0.55), MotionParams { diff_threshold: 21, min_area: 694 });
        assert_eq!(motion_params(0.0), MotionParams { diff_threshold: 32, min_area: 1200 });
        assert_eq!(motion_params(1.0), MotionParams { diff_threshold: 12, min_area: 280 });
    }

    #[test]
    fn test_rising_edge_spawns_one_ripple() {
        let layout = BoardLayout::default();
        let mut fusion = feed_fusion(TrackingSettings::default());
        let present = r#"[{"id":1,"centerN":[0.5,0.5],"areaN":0.2,"conf":0.9}]"#;
        let absent = r#"[{"id":1,"centerN":[0.5,0.5],"areaN":0.2,"conf":0.1}]"#;

        push_tracks(&mut fusion, 0.0, present);
        let u = fusion.update(0.0, &layout);
        assert_eq!(ripple_count(&u), 1);
        assert!(u.events.contains(&FusionEvent::SpawnRipple { x: 0.0, y: 0.0 }));

        // Sustained presence
        push_tracks(&mut fusion, 0.1, present);
        assert_eq!(ripple_count(&fusion.update(0.1, &layout)), 0);

        // Falling edge
        push_tracks(&mut fusion, 0.2, absent);
        assert_eq!(ripple_count(&fusion.update(0.2, &layout)), 0);
        assert!(!fusion.primary().has);

        // Second rising edge
        push_tracks(&mut fusion, 0.3, present);
        assert_eq!(ripple_count(&fusion.update(0.3, &layout)), 1);
    }

    #[test]
    fn test_throttle() {
        let layout = BoardLayout::default();
        let mut fusion = feed_fusion(TrackingSettings::default());
        push_tracks(&mut fusion, 0.0, r#"[{"id":1,"centerN":[0.5,0.5],"areaN":0.2,"conf":0.9}]"#);
        assert_eq!(fusion.update(0.0, &layout).events.len(), 2);
        assert!(fusion.update(0.05, &layout).events.is_empty());
        assert_eq!(fusion.update(0.07, &layout).events.len(), 1);
    }

    #[test]
    fn test_hold_snaps_then_smooths_and_trail_caps() {
        let layout = BoardLayout::default();
        let settings = TrackingSettings { center_ratio: 1.0, smoothing: 0.5, drive_origin: false, ..Default::default() };
        let mut fusion = feed_fusion(settings);

        push_tracks(&mut fusion, 0.0, r#"[{"id":1,"centerN":[0.75,0.5],"areaN":0.2,"conf":0.9}]"#);
        fusion.update(0.0, &layout);
        assert_relative_eq!(fusion.primary().x, 315.0, epsilon = 1e-9);

        push_tracks(&mut fusion, 0.1, r#"[{"id":1,"centerN":[0.25,0.5],"areaN":0.2,"conf":0.9}]"#);
        let u = fusion.update(0.1, &layout);
        assert!(u.events.is_empty());
        assert_relative_eq!(fusion.primary().x, 0.0, epsilon = 1e-9);

        for i in 2..10 {
            let now = i as f64 * 0.1;
            push_tracks(&mut fusion, now, r#"[{"id":1,"centerN":[0.25,0.5],"areaN":0.2,"conf":0.9}]"#);
            fusion.update(now, &layout);
        }
        assert_eq!(fusion.primary().trail.len(), TRAIL_MAX);
    }

    #[test]
    fn test_primary_and_secondary_overlay() {
        let layout = BoardLayout::default();
        let mut fusion = feed_fusion(TrackingSettings::default());
        push_tracks(
            &mut fusion,
            0.0,
            r#"[{"id":1,"centerN":[0.2,0.5],"areaN":0.1,"conf":0.8},{"id":2,"centerN":[0.8,0.5],"areaN":0.4,"conf":0.6}]"#,
        );
        fusion.update(0.0, &layout);
        assert!(fusion.primary().present && fusion.secondary().present);
        assert_eq!(fusion.info(), "track: feed on people:2 conf:0.60/0.80");
        // Larger track is primary: x 0.8 maps to the right edge
        assert_relative_eq!(fusion.primary().x, 630.0, epsilon = 1e-9);
        assert_eq!(fusion.primary_board(), 9);

        push_tracks(
            &mut fusion,
            0.1,
            r#"[{"id":1,"centerN":[0.2,0.5],"areaN":0.1,"conf":0.8},{"id":2,"centerN":[0.8,0.5],"areaN":0.4,"conf":0.6}]"#,
        );
        fusion.update(0.1, &layout);
        let overlay = fusion.overlay();
        let blue: Vec<_> = overlay.stripes.iter().filter(|s| s.palette == StripePalette::Blue).collect();
        assert_eq!(blue.len(), 2);
        assert_relative_eq!(blue[0].strength, 0.6);
        assert_relative_eq!(blue[1].strength, 0.6 * 0.72);
        assert_eq!(overlay.stripes.len(), 4);
        assert_eq!(overlay.board_glow.map(|g| g.board), Some(9));
    }

    #[test]
    fn test_feed_not_open_clears() {
        let layout = BoardLayout::default();
        let mut fusion = feed_fusion(TrackingSettings::default());
        push_tracks(&mut fusion, 0.0, r#"[{"id":1,"centerN":[0.5,0.5],"areaN":0.2,"conf":0.9}]"#);
        fusion.update(0.0, &layout);
        assert!(fusion.primary().has);

        fusion.feed_mut().set_status(FeedStatus::Connecting, "reconnecting");
        fusion.update(0.1, &layout);
        assert!(!fusion.primary().has);
        assert!(fusion.primary().trail.is_empty());
        assert_eq!(fusion.info(), "track: feed connecting");
        assert!(fusion.overlay().stripes.is_empty());
    }

    #[test]
    fn test_feed_stale_is_idle() {
        let layout = BoardLayout::default();
        let mut fusion = feed_fusion(TrackingSettings::default());
        push_tracks(&mut fusion, 0.0, r#"[{"id":1,"centerN":[0.5,0.5],"areaN":0.2,"conf":0.9}]"#);
        fusion.update(2.0, &layout);
        assert_eq!(fusion.info(), "track: feed idle");
        assert!(!fusion.primary().present);
    }

    struct ScriptedCamera {
        frames: Vec<RgbaFrame>,
    }

    impl CameraSource for ScriptedCamera {
        fn is_running(&self) -> bool {
            true
        }

        fn latest_frame(&mut self) -> Option<RgbaFrame> {
            if self.frames.len() > 1 {
                Some(self.frames.remove(0))
            } else {
                self.frames.first().cloned()
            }
        }
    }

    #[test]
    fn test_motion_source_drives_origin() {
        let layout = BoardLayout::default();
        let mut fusion = TrackingFusion::new(TrackingSettings::default());
        let dark = RgbaFrame::solid(160, 120, [0, 0, 0, 255]);
        let mut lit = dark.clone();
        // Left half lights up
        for y in 0..120u32 {
            for x in 0..80u32 {
                let i = ((y * 160 + x) * 4) as usize;
                lit.data[i..i + 3].copy_from_slice(&[255, 255, 255]);
            }
        }
        assert!(fusion.attach_camera(Box::new(ScriptedCamera { frames: vec![dark, lit] })));

        assert!(fusion.update(0.0, &layout).events.is_empty());
        let u = fusion.update(0.1, &layout);
        assert_eq!(ripple_count(&u), 1);
        assert!(u.events.iter().any(|e| matches!(e, FusionEvent::DriveOrigin { x, .. } if *x < 0.0)));
        assert_eq!(fusion.source(), Some(SourceKind::Motion));
        assert!(fusion.info().starts_with("track: motion on b:"));
    }

    #[test]
    fn test_detector_load_failure_falls_back() {
        let mut fusion = TrackingFusion::new(TrackingSettings::default());
        fusion.set_person_detector(Err(DetectorError::Load("model missing".into())));
        assert!(!fusion.has_person_detector());
        assert_eq!(fusion.info(), "track: person failed (failed to load detector: model missing)");
    }

    #[test]
    fn test_feed_blocks_camera() {
        let mut fusion = feed_fusion(TrackingSettings::default());
        let cam = ScriptedCamera { frames: vec![RgbaFrame::solid(4, 4, [0, 0, 0, 255])] };
        assert!(!fusion.attach_camera(Box::new(cam)));
    }

    struct FlickerCamera {
        frames: [RgbaFrame; 2],
        polls: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    }

    impl CameraSource for FlickerCamera {
        fn is_running(&self) -> bool {
            true
        }

        fn latest_frame(&mut self) -> Option<RgbaFrame> {
            let n = self.polls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Some(self.frames[n % 2].clone())
        }
    }

    #[test]
    fn test_enabling_feed_overrides_active_camera() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let layout = BoardLayout::default();
        let dark = RgbaFrame::solid(160, 120, [0, 0, 0, 255]);
        let mut lit = dark.clone();
        for y in 0..120u32 {
            for x in 0..80u32 {
                let i = ((y * 160 + x) * 4) as usize;
                lit.data[i..i + 3].copy_from_slice(&[255, 255, 255]);
            }
        }
        let polls = std::sync::Arc::new(AtomicUsize::new(0));
        let mut fusion = TrackingFusion::new(TrackingSettings::default());
        assert!(fusion.attach_camera(Box::new(FlickerCamera { frames: [dark, lit], polls: polls.clone() })));

        fusion.update(0.0, &layout);
        let u = fusion.update(0.1, &layout);
        assert_eq!(fusion.source(), Some(SourceKind::Motion));
        assert!(u.events.iter().any(|e| matches!(e, FusionEvent::DriveOrigin { x, .. } if *x < 0.0)));

        // Switch to the feed while the camera is still flickering
        let settings = TrackingSettings { use_feed: true, ..fusion.settings().clone() };
        fusion.set_settings(settings);
        fusion.feed_mut().set_status(FeedStatus::Open, "");
        let polled_before = polls.load(Ordering::SeqCst);

        let tracks = r#"[{"id":7,"centerN":[0.9,0.5],"areaN":0.3,"conf":0.9}]"#;
        let mut ripples = 0;
        for i in 2..10 {
            let now = i as f64 * 0.1;
            push_tracks(&mut fusion, now, tracks);
            let u = fusion.update(now, &layout);
            assert_eq!(fusion.source(), Some(SourceKind::Feed));
            assert!(fusion.info().starts_with("track: feed on"));
            for event in &u.events {
                match *event {
                    FusionEvent::DriveOrigin { x, y } | FusionEvent::SpawnRipple { x, y } => {
                        assert_relative_eq!(x, 630.0, epsilon = 1e-9);
                        assert_relative_eq!(y, 0.0, epsilon = 1e-9);
                    }
                }
            }
            ripples += ripple_count(&u);
        }
        assert_eq!(ripples, 1);
        assert_eq!(polls.load(Ordering::SeqCst), polled_before);
        assert!(!fusion.attach_camera(Box::new(ScriptedCamera { frames: vec![RgbaFrame::solid(4, 4, [0; 4])] })));
    }

    #[test]
    fn test_clamp_ranges() {
        let mut s = TrackingSettings { sensitivity: 3.0, smoothing: f64::NAN, center_ratio: 0.0, ..Default::default() };
        s.clamp_ranges();
        assert_eq!(s.sensitivity, 1.0);
        assert_eq!(s.smoothing, DEFAULT_SMOOTHING);
        assert_eq!(s.center_ratio, 0.01);
    }
}
