//! External multi-person track feed state
//!
//! The feed pushes `hello`, `tracks` and `ping` events. The latest `tracks`
//! message per camera index is kept with its arrival time; anything older than
//! [`FEED_STALE_SEC`] is treated as absent.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::math::clamp01;

use super::types::TrackSample;

/// Age after which a camera's last message no longer counts
pub const FEED_STALE_SEC: f64 = 1.5;

/// Connection status of the feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedStatus {
    #[default]
    Idle,
    Connecting,
    Open,
    Error,
}

impl fmt::Display for FeedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FeedStatus::Idle => "idle",
            FeedStatus::Connecting => "connecting",
            FeedStatus::Open => "open",
            FeedStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Events produced by a feed connection
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// A connection attempt started; the detail is empty on first connect
    Connecting(String),
    Open,
    Error(String),
    /// One server-sent event
    Message { event: String, data: String },
}

/// One track inside a `tracks` message
#[derive(Debug, Clone, PartialEq)]
pub struct FeedTrack {
    pub id: Option<f64>,
    pub center: [f64; 2],
    pub area: f64,
    pub confidence: f64,
}

impl FeedTrack {
    fn from_value(v: &Value) -> Self {
        let center_at = |i: usize| {
            v.get("centerN")
                .and_then(Value::as_array)
                .and_then(|a| a.get(i))
                .and_then(as_number)
                .filter(|x| x.is_finite())
                .unwrap_or(0.5)
        };
        Self {
            id: v.get("id").and_then(as_number),
            center: [center_at(0), center_at(1)],
            area: v.get("areaN").and_then(as_number).filter(|a| !a.is_nan()).unwrap_or(0.0),
            confidence: v
                .get("conf")
                .and_then(Value::as_f64)
                .filter(|c| c.is_finite())
                .unwrap_or(0.0),
        }
    }

    /// Tracking sample; present when confidence reaches `min_conf`
    pub fn to_sample(&self, min_conf: f64) -> TrackSample {
        TrackSample {
            present: self.confidence >= min_conf,
            x_norm: clamp01(self.center[0]),
            y_norm: clamp01(self.center[1]),
            confidence: self.confidence,
        }
    }
}

/// A `tracks` message for one camera
#[derive(Debug, Clone, PartialEq)]
pub struct TracksMessage {
    pub camera_index: i64,
    pub target_id: Option<f64>,
    pub tracks: Vec<FeedTrack>,
}

impl TracksMessage {
    /// Parse a `tracks` payload; `None` for anything else or a bad camera index
    pub fn parse(data: &str) -> Option<Self> {
        let v: Value = serde_json::from_str(data).ok()?;
        if v.get("type").and_then(Value::as_str) != Some("tracks") {
            return None;
        }
        let camera = v.get("cameraIndex").and_then(as_number).filter(|c| c.is_finite())?;
        // Fractional indices can never be selected
        if camera.fract() != 0.0 {
            return None;
        }
        let tracks = v
            .get("tracks")
            .and_then(Value::as_array)
            .map(|a| a.iter().map(FeedTrack::from_value).collect())
            .unwrap_or_default();
        Some(Self {
            camera_index: camera as i64,
            target_id: v.get("targetId").filter(|t| !t.is_null()).and_then(as_number),
            tracks,
        })
    }
}

/// Numbers and numeric strings
fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Primary track: the target id if present, else the largest area
///
/// Ties keep the earlier track.
pub fn pick_best(tracks: &[FeedTrack], target_id: Option<f64>) -> Option<usize> {
    if tracks.is_empty() {
        return None;
    }
    if let Some(target) = target_id {
        if let Some(i) = tracks.iter().position(|t| t.id == Some(target)) {
            return Some(i);
        }
    }
    let mut best = 0;
    for (i, t) in tracks.iter().enumerate().skip(1) {
        if t.area > tracks[best].area {
            best = i;
        }
    }
    Some(best)
}

/// Secondary track: the largest area other than the primary
///
/// Tracks sharing the primary's id are skipped as well.
pub fn pick_second(tracks: &[FeedTrack], primary: Option<usize>) -> Option<usize> {
    let primary_id = primary.and_then(|p| tracks.get(p)).and_then(|t| t.id);
    let mut best = None;
    let mut best_area = -1.0;
    for (i, t) in tracks.iter().enumerate() {
        if Some(i) == primary || (primary_id.is_some() && t.id == primary_id) {
            continue;
        }
        if t.area > best_area {
            best = Some(i);
            best_area = t.area;
        }
    }
    best
}

/// Primary and secondary samples chosen from the feed
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FeedSelection {
    pub primary: Option<TrackSample>,
    pub secondary: Option<TrackSample>,
}

impl FeedSelection {
    pub fn is_empty(&self) -> bool {
        self.primary.is_none() && self.secondary.is_none()
    }
}

/// Client-side state of the feed connection
#[derive(Debug, Clone, Default)]
pub struct FeedState {
    status: FeedStatus,
    detail: String,
    cameras: Vec<Value>,
    latest: HashMap<i64, (f64, TracksMessage)>,
}

impl FeedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> FeedStatus {
        self.status
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// Camera descriptions from the last `hello`
    pub fn cameras(&self) -> &[Value] {
        &self.cameras
    }

    pub fn set_status(&mut self, status: FeedStatus, detail: impl Into<String>) {
        self.status = status;
        self.detail = detail.into();
    }

    /// Status line, e.g. `feed: connecting (reconnecting)`
    pub fn status_line(&self) -> String {
        if self.detail.is_empty() {
            format!("feed: {}", self.status)
        } else {
            format!("feed: {} ({})", self.status, self.detail)
        }
    }

    /// Drop cached messages and camera list
    pub fn clear(&mut self) {
        self.cameras.clear();
        self.latest.clear();
    }

    pub fn handle_event(&mut self, event: FeedEvent, now: f64) {
        match event {
            FeedEvent::Connecting(detail) => self.set_status(FeedStatus::Connecting, detail),
            FeedEvent::Open => self.set_status(FeedStatus::Open, ""),
            FeedEvent::Error(detail) => self.set_status(FeedStatus::Error, detail),
            FeedEvent::Message { event, data } => {
                self.handle_message(&event, &data, now);
            }
        }
    }

    /// Apply one server-sent event; returns true if state changed
    pub fn handle_message(&mut self, event: &str, data: &str, now: f64) -> bool {
        match event {
            "hello" => {
                let Ok(v) = serde_json::from_str::<Value>(data) else {
                    return false;
                };
                if v.get("type").and_then(Value::as_str) != Some("hello") {
                    return false;
                }
                self.cameras = v.get("cameras").and_then(Value::as_array).cloned().unwrap_or_default();
                tracing::debug!(cameras = self.cameras.len(), "feed hello");
                true
            }
            "tracks" => match TracksMessage::parse(data) {
                Some(msg) => {
                    // Only fresh cameras are kept, so unknown indices cannot pile up
                    self.latest.retain(|_, (at, _)| now - *at <= FEED_STALE_SEC);
                    self.latest.insert(msg.camera_index, (now, msg));
                    true
                }
                None => {
                    tracing::trace!("feed tracks message ignored");
                    false
                }
            },
            _ => false,
        }
    }

    /// Last message for a camera if it is still fresh
    pub fn fresh_message(&self, camera_index: i64, now: f64) -> Option<&TracksMessage> {
        let (at, msg) = self.latest.get(&camera_index)?;
        if now - at > FEED_STALE_SEC {
            return None;
        }
        Some(msg)
    }

    pub fn select(&self, camera_index: i64, now: f64, min_conf: f64) -> FeedSelection {
        let Some(msg) = self.fresh_message(camera_index, now) else {
            return FeedSelection::default();
        };
        let primary = pick_best(&msg.tracks, msg.target_id);
        let secondary = pick_second(&msg.tracks, primary);
        FeedSelection {
            primary: primary.map(|i| msg.tracks[i].to_sample(min_conf)),
            secondary: secondary.map(|i| msg.tracks[i].to_sample(min_conf)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: f64, area: f64, conf: f64) -> FeedTrack {
        FeedTrack { id: Some(id), center: [0.5, 0.5], area, confidence: conf }
    }

    #[test]
    fn test_parse_tracks_message() {
        let msg = TracksMessage::parse(
            r#"{"type":"tracks","cameraIndex":1,"targetId":"7","tracks":[
                {"id":7,"centerN":[0.2,null],"areaN":0.1,"conf":0.9},
                {"id":"8","centerN":[1.4,0.3],"areaN":"0.3","conf":"0.8"}]}"#,
        )
        .unwrap();
        assert_eq!(msg.camera_index, 1);
        assert_eq!(msg.target_id, Some(7.0));
        assert_eq!(msg.tracks[0].center, [0.2, 0.5]);
        assert_eq!(msg.tracks[1].id, Some(8.0));
        assert_eq!(msg.tracks[1].area, 0.3);
        // Confidence must be a JSON number
        assert_eq!(msg.tracks[1].confidence, 0.0);
        assert_eq!(msg.tracks[1].to_sample(0.5).x_norm, 1.0);
    }

    #[test]
    fn test_parse_rejects() {
        assert!(TracksMessage::parse(r#"{"type":"hello","cameraIndex":0}"#).is_none());
        assert!(TracksMessage::parse(r#"{"type":"tracks","cameraIndex":"x"}"#).is_none());
        assert!(TracksMessage::parse(r#"{"type":"tracks"}"#).is_none());
        assert!(TracksMessage::parse("not json").is_none());
        let empty = TracksMessage::parse(r#"{"type":"tracks","cameraIndex":0}"#).unwrap();
        assert!(empty.tracks.is_empty());
    }

    #[test]
    fn test_pick_best_prefers_target_then_area() {
        let tracks = vec![track(1.0, 0.2, 0.9), track(2.0, 0.5, 0.9), track(3.0, 0.5, 0.9)];
        assert_eq!(pick_best(&tracks, None), Some(1));
        assert_eq!(pick_best(&tracks, Some(3.0)), Some(2));
        assert_eq!(pick_best(&tracks, Some(99.0)), Some(1));
        assert_eq!(pick_best(&[], None), None);
    }

    #[test]
    fn test_pick_second_excludes_primary() {
        let tracks = vec![track(1.0, 0.2, 0.9), track(2.0, 0.5, 0.9), track(3.0, 0.4, 0.9)];
        assert_eq!(pick_second(&tracks, Some(1)), Some(2));
        assert_eq!(pick_second(&tracks[..1], Some(0)), None);

        // Tracks without ids are still distinct
        let anon = vec![
            FeedTrack { id: None, center: [0.5, 0.5], area: 0.5, confidence: 1.0 },
            FeedTrack { id: None, center: [0.5, 0.5], area: 0.1, confidence: 1.0 },
        ];
        assert_eq!(pick_second(&anon, pick_best(&anon, None)), Some(1));
    }

    #[test]
    fn test_select_staleness() {
        let mut feed = FeedState::new();
        feed.handle_event(FeedEvent::Open, 0.0);
        assert!(feed.handle_message(
            "tracks",
            r#"{"type":"tracks","cameraIndex":0,"tracks":[{"id":1,"centerN":[0.3,0.5],"areaN":0.2,"conf":0.5}]}"#,
            10.0,
        ));

        let sel = feed.select(0, 11.0, 0.4);
        assert!(sel.primary.unwrap().present);
        assert!(sel.secondary.is_none());
        assert!(!feed.select(0, 11.0, 0.6).primary.unwrap().present);
        assert!(feed.select(1, 11.0, 0.4).is_empty());
        assert!(feed.select(0, 11.6, 0.4).is_empty());
    }

    #[test]
    fn test_stale_cameras_are_pruned() {
        let mut feed = FeedState::new();
        for (i, now) in [(0, 0.0), (1, 0.2), (2, 1.0), (3, 1.8)] {
            let data = format!(r#"{{"type":"tracks","cameraIndex":{i},"tracks":[]}}"#);
            assert!(feed.handle_message("tracks", &data, now));
        }
        // Cameras 0 and 1 went quiet for more than 1.5 s
        let mut kept: Vec<i64> = feed.latest.keys().copied().collect();
        kept.sort_unstable();
        assert_eq!(kept, vec![2, 3]);
        assert!(feed.fresh_message(2, 1.8).is_some());

        for n in 0..100 {
            let data = format!(r#"{{"type":"tracks","cameraIndex":{},"tracks":[]}}"#, 100 + n);
            feed.handle_message("tracks", &data, 10.0 + n as f64 * 2.0);
        }
        assert_eq!(feed.latest.len(), 1);
        assert!(feed.fresh_message(199, 208.0).is_some());
    }

    #[test]
    fn test_hello_and_status() {
        let mut feed = FeedState::new();
        assert_eq!(feed.status_line(), "feed: idle");
        feed.handle_event(FeedEvent::Connecting("reconnecting".into()), 0.0);
        assert_eq!(feed.status_line(), "feed: connecting (reconnecting)");
        feed.handle_event(
            FeedEvent::Message { event: "hello".into(), data: r#"{"type":"hello","cameras":[{"index":0}]}"#.into() },
            0.0,
        );
        assert_eq!(feed.cameras().len(), 1);
        assert!(!feed.handle_message("ping", "", 0.0));
        feed.clear();
        assert!(feed.cameras().is_empty());
    }
}
