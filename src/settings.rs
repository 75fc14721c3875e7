//! Engine settings and per-user preferences
//!
//! Both persist as XML through `quick_xml` + `serde`. Missing elements fall
//! back to their defaults, and out-of-range values are clamped after load.

use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use quick_xml::de::from_str;
use quick_xml::se::to_string;
use serde::{Deserialize, Serialize};

use crate::origin::{Snap, DEFAULT_SNAP_STEP_MM};
use crate::output::ColorSettings;
use crate::tracking::TrackingSettings;

pub const MIN_RENDER_FPS: u32 = 10;
pub const MAX_RENDER_FPS: u32 = 60;

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// Settings file errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parse error: {0}")]
    XmlParse(#[from] quick_xml::DeError),

    #[error("XML write error: {0}")]
    XmlWrite(#[from] quick_xml::SeError),

    #[error("could not determine config directory")]
    NoConfigDir,
}

/// Frame link connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSettings {
    /// Device node or file the frames are written to
    #[serde(rename = "port", default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,

    /// Pause after opening before the first frame, for controllers that reset on open
    #[serde(rename = "postOpenDelayMs", default = "default_post_open_delay_ms")]
    pub post_open_delay_ms: u64,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self { port: None, post_open_delay_ms: default_post_open_delay_ms() }
    }
}

fn default_post_open_delay_ms() -> u64 {
    650
}

/// Every tunable of the running engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "LedfieldSettings")]
pub struct EngineSettings {
    /// Render cadence in Hz (10-60)
    #[serde(rename = "renderFps", default = "default_render_fps")]
    pub render_fps: u32,

    /// Effect selected at startup; unknown ids fall back to the first registered effect
    #[serde(rename = "activeEffect", default, skip_serializing_if = "Option::is_none")]
    pub active_effect: Option<String>,

    #[serde(rename = "color", default)]
    pub color: ColorSettings,

    #[serde(rename = "tracking", default)]
    pub tracking: TrackingSettings,

    #[serde(rename = "link", default)]
    pub link: LinkSettings,

    #[serde(rename = "snapEnabled", default)]
    pub snap_enabled: bool,

    #[serde(rename = "snapStepMm", default = "default_snap_step_mm")]
    pub snap_step_mm: f64,
}

fn default_render_fps() -> u32 {
    30
}

fn default_snap_step_mm() -> f64 {
    DEFAULT_SNAP_STEP_MM
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            render_fps: default_render_fps(),
            active_effect: None,
            color: ColorSettings::default(),
            tracking: TrackingSettings::default(),
            link: LinkSettings::default(),
            snap_enabled: false,
            snap_step_mm: default_snap_step_mm(),
        }
    }
}

impl EngineSettings {
    /// Clamp every value into its valid range
    pub fn clamp_ranges(&mut self) {
        self.render_fps = self.render_fps.clamp(MIN_RENDER_FPS, MAX_RENDER_FPS);
        self.color.clamp_ranges();
        self.tracking.clamp_ranges();
        if !self.snap_step_mm.is_finite() || self.snap_step_mm < 1.0 {
            self.snap_step_mm = default_snap_step_mm();
        }
    }

    pub fn snap(&self) -> Snap {
        Snap { enabled: self.snap_enabled, step_mm: self.snap_step_mm }
    }

    /// Load settings from an XML file
    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path)?;
        let mut settings: Self = from_str(&contents)?;
        settings.clamp_ranges();
        tracing::info!(path = %path.display(), fps = settings.render_fps, "settings loaded");
        Ok(settings)
    }

    /// Save settings to an XML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        let xml = to_string(self)?;
        fs::write(path, format!("{XML_DECLARATION}{xml}"))?;
        tracing::info!(path = %path.display(), "settings saved");
        Ok(())
    }
}

/// Small per-user preferences that survive restarts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename = "LedfieldPreferences")]
pub struct AppPreferences {
    #[serde(rename = "lastLayoutFile", default, skip_serializing_if = "Option::is_none")]
    pub last_layout_file: Option<String>,

    #[serde(rename = "useFeed", default)]
    pub use_feed: bool,

    #[serde(rename = "feedUrl", default, skip_serializing_if = "Option::is_none")]
    pub feed_url: Option<String>,

    #[serde(rename = "cameraIndex", default)]
    pub camera_index: i64,
}

impl AppPreferences {
    fn get_prefs_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("ledfield");
            p.push("preferences.xml");
            p
        })
    }

    /// Load from the user config dir, or defaults when missing or unreadable
    pub fn load() -> Self {
        match Self::get_prefs_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        let Ok(contents) = fs::read_to_string(path) else {
            return Self::default();
        };
        match from_str(&contents) {
            Ok(prefs) => prefs,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable preferences");
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        let path = Self::get_prefs_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let xml = to_string(self)?;
        fs::write(path, format!("{XML_DECLARATION}{xml}"))?;
        Ok(())
    }

    pub fn set_last_layout(&mut self, path: &Path) {
        self.last_layout_file = Some(path.to_string_lossy().into_owned());
    }

    pub fn last_layout(&self) -> Option<PathBuf> {
        self.last_layout_file.as_ref().map(PathBuf::from)
    }

    /// Overlay the remembered feed selection onto `tracking`
    pub fn apply_to(&self, tracking: &mut TrackingSettings) {
        tracking.use_feed = self.use_feed;
        if let Some(url) = &self.feed_url {
            tracking.feed_url = url.clone();
        }
        tracking.camera_index = self.camera_index;
    }

    /// Remember the feed selection from `tracking`
    pub fn capture_from(&mut self, tracking: &TrackingSettings) {
        self.use_feed = tracking.use_feed;
        self.feed_url = Some(tracking.feed_url.clone()).filter(|u| !u.is_empty());
        self.camera_index = tracking.camera_index;
    }
}

/// Accept a typed number only if it is finite and inside `range`
///
/// Anything else, including an empty field, keeps `prev`.
pub fn commit_number(prev: f64, raw: &str, range: RangeInclusive<f64>) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && range.contains(&v) => v,
        _ => prev,
    }
}
