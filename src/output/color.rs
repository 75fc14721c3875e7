//! Color post-processing for composited LED frames
//!
//! Applied in order: gain, gamma, hue/saturation look, per-board confidence
//! glow, tracking stripes. Every stage writes bytes back into the same frame,
//! so the output always stays within [0, 255].

use serde::{Deserialize, Serialize};

use crate::geometry::{Ring, World};
use crate::math::{clamp01, clamp255, round255};

/// Output color adjustments
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorSettings {
    /// Uniform multiplier, clamped to [0, 1]
    #[serde(rename = "gain")]
    pub gain: f64,

    /// Gamma exponent for the output lookup table
    #[serde(rename = "gamma")]
    pub gamma: f64,

    /// Enable the hue/saturation look
    #[serde(rename = "lookEnabled")]
    pub look_enabled: bool,

    /// Chroma rotation in degrees
    #[serde(rename = "lookHueDeg")]
    pub look_hue_deg: f64,

    /// Chroma scale (1.0 = unchanged)
    #[serde(rename = "lookSat")]
    pub look_sat: f64,

    /// Enable tracking overlays (board glow and stripes)
    #[serde(rename = "panelLight")]
    pub panel_light: bool,
}

impl Default for ColorSettings {
    fn default() -> Self {
        Self {
            gain: 1.0,
            gamma: 1.0,
            look_enabled: false,
            look_hue_deg: 0.0,
            look_sat: 1.0,
            panel_light: true,
        }
    }
}

impl ColorSettings {
    /// Bring values back into their valid ranges; non-finite values reset
    pub fn clamp_ranges(&mut self) {
        let d = Self::default();
        let fix = |v: f64, fallback: f64, lo: f64, hi: f64| if v.is_finite() { v.clamp(lo, hi) } else { fallback };
        self.gain = fix(self.gain, d.gain, 0.0, 1.0);
        self.gamma = fix(self.gamma, d.gamma, 0.2, 4.0);
        self.look_hue_deg = fix(self.look_hue_deg, d.look_hue_deg, -180.0, 180.0);
        self.look_sat = fix(self.look_sat, d.look_sat, 0.0, 2.0);
    }
}

/// Color ramp used by a tracking stripe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StripePalette {
    /// Magenta core through violet to cyan edges
    #[default]
    Blue,
    /// Green core through olive to orange edges
    GreenOrange,
}

impl StripePalette {
    /// Color at normalized distance `t` from the stripe center
    fn color_at(self, t: f64) -> (f64, f64, f64) {
        let (a, b, c) = match self {
            StripePalette::Blue => ((220.0, 40.0, 255.0), (70.0, 80.0, 255.0), (40.0, 200.0, 255.0)),
            StripePalette::GreenOrange => ((60.0, 255.0, 70.0), (120.0, 200.0, 30.0), (255.0, 120.0, 40.0)),
        };
        let (from, to, m) = if t < 0.5 { (a, b, t / 0.5) } else { (b, c, (t - 0.5) / 0.5) };
        (
            from.0 * (1.0 - m) + to.0 * m,
            from.1 * (1.0 - m) + to.1 * m,
            from.2 * (1.0 - m) + to.2 * m,
        )
    }
}

/// Board highlighted by tracking confidence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoardGlow {
    pub board: usize,
    pub strength: f64,
    pub y_norm: f64,
}

/// One vertical stripe at a trail sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StripeSample {
    pub x_mm: f64,
    pub strength: f64,
    pub palette: StripePalette,
}

/// Tracking-driven overlays for one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackingOverlay {
    pub board_glow: Option<BoardGlow>,
    /// Most recent first
    pub stripes: Vec<StripeSample>,
}

const STRIPE_CORE_SIGMA: f64 = 28.0;
const STRIPE_GLOW_SIGMA: f64 = 110.0;

/// Stateful color processor; caches the gamma table
#[derive(Debug, Clone)]
pub struct ColorProcessor {
    gamma_lut: [u8; 256],
    lut_gamma: f64,
}

impl Default for ColorProcessor {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl ColorProcessor {
    pub fn new(gamma: f64) -> Self {
        let mut processor = Self { gamma_lut: [0; 256], lut_gamma: f64::NAN };
        processor.set_gamma(gamma);
        processor
    }

    pub fn gamma_lut(&self) -> &[u8; 256] {
        &self.gamma_lut
    }

    /// Rebuild the lookup table if `gamma` differs from the cached one
    pub fn set_gamma(&mut self, gamma: f64) {
        if gamma == self.lut_gamma {
            return;
        }
        for (i, v) in self.gamma_lut.iter_mut().enumerate() {
            let x = i as f64 / 255.0;
            *v = round255(x.powf(gamma) * 255.0);
        }
        self.lut_gamma = gamma;
    }

    /// Run every stage in order over `rgb`
    pub fn process(&mut self, rgb: &mut [u8], world: &World, t: f64, settings: &ColorSettings, overlay: &TrackingOverlay) {
        apply_gain(rgb, settings.gain);
        self.set_gamma(settings.gamma);
        self.apply_gamma(rgb);
        if settings.look_enabled {
            apply_look(rgb, settings.look_hue_deg, settings.look_sat);
        }
        if !settings.panel_light {
            return;
        }
        if let Some(glow) = overlay.board_glow {
            apply_board_glow(rgb, world, glow.board, t, glow.strength, glow.y_norm);
        }
        for stripe in &overlay.stripes {
            apply_tracking_stripe(rgb, world, stripe.x_mm, t, stripe.strength, stripe.palette);
        }
    }

    pub fn apply_gamma(&self, rgb: &mut [u8]) {
        for v in rgb.iter_mut() {
            *v = self.gamma_lut[*v as usize];
        }
    }
}

/// Uniform multiply; skipped when the clamped gain is exactly 1
pub fn apply_gain(rgb: &mut [u8], gain: f64) {
    let g = if gain.is_nan() { 1.0 } else { clamp01(gain) };
    if g == 1.0 {
        return;
    }
    for v in rgb.iter_mut() {
        *v = round255(*v as f64 * g);
    }
}

/// Rotate chroma by `hue_deg` and scale it by `sat` in YIQ space
pub fn apply_look(rgb: &mut [u8], hue_deg: f64, sat: f64) {
    let hue_deg = if hue_deg.is_finite() { hue_deg } else { 0.0 };
    let sat = if sat.is_finite() { sat.max(0.0) } else { 1.0 };
    if hue_deg == 0.0 && sat == 1.0 {
        return;
    }

    let (sa, ca) = hue_deg.to_radians().sin_cos();
    for px in rgb.chunks_exact_mut(3) {
        let (r, g, b) = (px[0] as f64, px[1] as f64, px[2] as f64);

        let y = 0.299 * r + 0.587 * g + 0.114 * b;
        let i = 0.596 * r - 0.274 * g - 0.322 * b;
        let q = 0.211 * r - 0.523 * g + 0.312 * b;

        let i2 = (i * ca - q * sa) * sat;
        let q2 = (i * sa + q * ca) * sat;

        px[0] = round255(y + 0.956 * i2 + 0.621 * q2);
        px[1] = round255(y - 0.272 * i2 - 0.647 * q2);
        px[2] = round255(y - 1.106 * i2 + 1.703 * q2);
    }
}

fn hsv_to_rgb(h: f64, s: f64, v: f64) -> (f64, f64, f64) {
    let h = ((h % 1.0) + 1.0) % 1.0;
    let i = (h * 6.0).floor();
    let f = h * 6.0 - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);
    let (r, g, b) = match i as i64 % 6 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    (r * 255.0, g * 255.0, b * 255.0)
}

/// Pulse one board's LEDs with a two-tone blue mix scaled by `strength`
pub fn apply_board_glow(rgb: &mut [u8], world: &World, board: usize, t: f64, strength: f64, y_norm: f64) {
    if board >= world.board_count() {
        return;
    }
    let s = clamp01(strength);
    if !(s > 0.0) {
        return;
    }

    let b = board as f64;
    let yk = clamp01(y_norm);
    let hue = 0.62 + 0.16 * (0.5 - yk) + 0.06 * (t * 0.7 + b * 0.9).sin();
    let sat = 0.95;

    let mix = 0.5 + 0.5 * (t * 0.9 + b * 0.4).sin();
    let c1 = hsv_to_rgb(hue, sat, 1.0);
    let c2 = hsv_to_rgb(hue + 0.18, sat, 1.0);
    let base = (
        c1.0 * (1.0 - mix) + c2.0 * mix,
        c1.1 * (1.0 - mix) + c2.1 * mix,
        c1.2 * (1.0 - mix) + c2.2 * mix,
    );

    for gi in 0..world.len() {
        if world.board[gi] as usize != board {
            continue;
        }
        let li = world.local[gi] as usize;
        let ring_w = match Ring::of(li) {
            Ring::Outer => 0.62,
            Ring::Mid => 0.82,
            Ring::Inner => 1.0,
        };
        let li = li as f64;
        let pulse = 0.65 + 0.35 * (t * 6.0 - li * 0.22).sin();
        let sparkle = if (li * 12.9898 + t * 8.0 + b * 1.7).sin() > 0.985 { 1.0 } else { 0.0 };
        let v = (0.35 + 0.65 * pulse) * ring_w * (1.0 + 0.65 * sparkle) * (0.75 + 0.25 * s);

        let k = gi * 3;
        rgb[k] = clamp255(rgb[k] as f64 + base.0 * v * s);
        rgb[k + 1] = clamp255(rgb[k + 1] as f64 + base.1 * v * s);
        rgb[k + 2] = clamp255(rgb[k + 2] as f64 + base.2 * v * s);
    }
}

/// Vertical stripe centered at `x_mm`: a narrow core over a wide glow
pub fn apply_tracking_stripe(rgb: &mut [u8], world: &World, x_mm: f64, t: f64, strength: f64, palette: StripePalette) {
    let s = clamp01(strength);
    if !(s > 0.0) {
        return;
    }

    let inv_core = 1.0 / (STRIPE_CORE_SIGMA * STRIPE_CORE_SIGMA * 2.0);
    let inv_glow = 1.0 / (STRIPE_GLOW_SIGMA * STRIPE_GLOW_SIGMA * 2.0);
    let breath = 0.86 + 0.14 * (t * 2.2).sin();

    for gi in 0..world.len() {
        let dx = (world.x[gi] as f64 - x_mm).abs();
        let w_core = (-(dx * dx) * inv_core).exp();
        let w_glow = (-(dx * dx) * inv_glow).exp();
        if w_glow < 0.01 {
            continue;
        }

        let shimmer = 0.92 + 0.08 * (t * 4.2 + dx * 0.10).sin();
        let w = (0.95 * w_core + 0.55 * w_glow) * breath * shimmer;

        let tt = clamp01(dx / (STRIPE_GLOW_SIGMA * 1.15));
        let (r_base, g_base, b_base) = palette.color_at(tt);

        let k = gi * 3;
        rgb[k] = clamp255(rgb[k] as f64 + r_base * s * w);
        rgb[k + 1] = clamp255(rgb[k + 1] as f64 + g_base * s * w);
        rgb[k + 2] = clamp255(rgb[k + 2] as f64 + b_base * s * (0.70 * w_core + 0.90 * w_glow) * shimmer);
    }
}
