//! Global origin ownership
//!
//! One point in world millimeters that effects render around. It has three
//! writers: direct edits, pointer-follow and tracking. Tracking takes over by
//! switching pointer-follow off, so at most one of them writes per tick.

use crate::geometry::Board;

/// Minimum time between pointer-follow updates
pub const ORIGIN_FOLLOW_INTERVAL_SEC: f64 = 0.08;
pub const DEFAULT_SNAP_STEP_MM: f64 = 10.0;

/// Last writer of the origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OriginSource {
    #[default]
    Manual,
    PointerFollow,
    Tracking,
}

/// Grid snapping for pointer-placed origins
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snap {
    pub enabled: bool,
    pub step_mm: f64,
}

impl Default for Snap {
    fn default() -> Self {
        Self { enabled: false, step_mm: DEFAULT_SNAP_STEP_MM }
    }
}

impl Snap {
    pub fn apply(&self, v: f64) -> f64 {
        if !self.enabled {
            return v;
        }
        let step = if self.step_mm.is_finite() { self.step_mm.max(1.0) } else { DEFAULT_SNAP_STEP_MM };
        (v / step).round() * step
    }
}

#[derive(Debug, Clone, Default)]
pub struct OriginState {
    x: f64,
    y: f64,
    source: OriginSource,
    follow: bool,
    pointer: (f64, f64),
    last_follow: Option<f64>,
    pub snap: Snap,
}

impl OriginState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    pub fn source(&self) -> OriginSource {
        self.source
    }

    pub fn is_following(&self) -> bool {
        self.follow
    }

    /// Exact placement, no snapping
    pub fn set_manual(&mut self, x: f64, y: f64) {
        self.x = x;
        self.y = y;
        self.source = OriginSource::Manual;
    }

    /// Pointer placement; `bypass_snap` mirrors holding the snap modifier
    pub fn set_at_world(&mut self, x: f64, y: f64, bypass_snap: bool) {
        let (x, y) = if bypass_snap { (x, y) } else { (self.snap.apply(x), self.snap.apply(y)) };
        self.set_manual(x, y);
    }

    pub fn zero(&mut self) {
        self.set_manual(0.0, 0.0);
    }

    pub fn to_board(&mut self, board: &Board) {
        self.set_manual(board.cx as f64, board.cy as f64);
    }

    /// Remember the pointer position in world millimeters
    pub fn set_pointer(&mut self, x: f64, y: f64) {
        self.pointer = (x, y);
    }

    pub fn pointer(&self) -> (f64, f64) {
        self.pointer
    }

    /// Toggle pointer-follow
    ///
    /// Turning it on jumps the origin to the pointer and returns true; the
    /// caller spawns a layer from the current effect.
    pub fn set_follow(&mut self, on: bool) -> bool {
        self.follow = on;
        if !on {
            return false;
        }
        self.last_follow = None;
        let (px, py) = self.pointer;
        self.set_at_world(px, py, false);
        self.source = OriginSource::PointerFollow;
        tracing::debug!(x = self.x, y = self.y, "pointer follow on");
        true
    }

    /// Follow step; true when the origin moved and a layer should be spawned
    pub fn poll_follow(&mut self, now: f64) -> bool {
        if !self.follow {
            return false;
        }
        if let Some(last) = self.last_follow {
            if now - last < ORIGIN_FOLLOW_INTERVAL_SEC {
                return false;
            }
        }
        self.last_follow = Some(now);
        let (px, py) = self.pointer;
        self.set_at_world(px, py, false);
        self.source = OriginSource::PointerFollow;
        true
    }

    /// Tracking write; cancels pointer-follow
    pub fn drive_from_tracking(&mut self, x: f64, y: f64) {
        if self.follow {
            tracing::debug!("pointer follow off, tracking drives origin");
            self.follow = false;
        }
        self.x = x;
        self.y = y;
        self.source = OriginSource::Tracking;
    }

    /// Status line, e.g. `origin: (12.0,-3.5) mm`
    pub fn status_line(&self) -> String {
        format!("origin: ({:.1},{:.1}) mm", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snap() {
        let snap = Snap { enabled: true, step_mm: 10.0 };
        assert_eq!(snap.apply(14.0), 10.0);
        assert_eq!(snap.apply(-16.0), -20.0);
        assert_eq!(Snap { enabled: false, step_mm: 10.0 }.apply(14.0), 14.0);
        assert_eq!(Snap { enabled: true, step_mm: 0.2 }.apply(1.4), 1.0);
    }

    #[test]
    fn test_follow_cadence() {
        let mut o = OriginState::new();
        o.set_pointer(30.0, -10.0);
        assert!(!o.poll_follow(0.0));

        assert!(o.set_follow(true));
        assert_eq!(o.position(), (30.0, -10.0));
        // Fires right away after enabling, then at the follow interval
        assert!(o.poll_follow(1.0));
        o.set_pointer(40.0, 0.0);
        assert!(!o.poll_follow(1.05));
        assert!(o.poll_follow(1.08));
        assert_eq!(o.position(), (40.0, 0.0));
        assert_eq!(o.source(), OriginSource::PointerFollow);

        assert!(!o.set_follow(false));
        assert!(!o.poll_follow(2.0));
    }

    #[test]
    fn test_tracking_cancels_follow() {
        let mut o = OriginState::new();
        o.set_follow(true);
        o.drive_from_tracking(120.0, 0.0);
        assert!(!o.is_following());
        assert_eq!(o.source(), OriginSource::Tracking);
        assert!(!o.poll_follow(5.0));
        assert_eq!(o.position(), (120.0, 0.0));
    }

    #[test]
    fn test_manual_writes() {
        let mut o = OriginState::new();
        o.snap.enabled = true;
        o.set_at_world(12.0, 17.0, false);
        assert_eq!(o.position(), (10.0, 20.0));
        o.set_at_world(12.0, 17.0, true);
        assert_eq!(o.position(), (12.0, 17.0));
        o.to_board(&Board::new(-140.0, 5.0, 0.0));
        assert_eq!(o.position(), (-140.0, 5.0));
        o.zero();
        assert_eq!(o.status_line(), "origin: (0.0,0.0) mm");
    }
}
