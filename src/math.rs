//! Small numeric helpers shared by effects, color and tracking

/// Clamp to a byte, truncating the fraction. NaN maps to 0.
#[inline]
pub fn clamp255(v: f64) -> u8 {
    if v < 0.0 {
        0
    } else if v > 255.0 {
        255
    } else {
        v as u8
    }
}

/// Round then clamp to a byte
#[inline]
pub fn round255(v: f64) -> u8 {
    clamp255(v.round())
}

#[inline]
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

#[inline]
pub fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}
