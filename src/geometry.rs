//! LED board geometry
//!
//! Every board carries 48 LEDs laid out on three concentric rings. Boards are
//! posed in world millimeters (center plus rotation); world LED positions are
//! derived from those poses and rebuilt whenever a pose changes.

use serde::{Deserialize, Serialize};

/// Number of boards in the default array
pub const BOARDS: usize = 10;
/// LEDs on a single board
pub const LEDS_PER_BOARD: usize = 48;
/// LEDs across the default array
pub const TOTAL_LEDS: usize = BOARDS * LEDS_PER_BOARD;
/// Byte length of one RGB frame for the default array
pub const FRAME_LEN: usize = TOTAL_LEDS * 3;
/// Default spacing between board centers along X
pub const BOARD_SPACING_MM: f32 = 140.0;

/// Ring a local LED index belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ring {
    /// Indices 0..30, diameter 92 mm
    Outer,
    /// Indices 30..42, diameter 34 mm
    Mid,
    /// Indices 42..48, diameter 18 mm
    Inner,
}

impl Ring {
    /// Ring membership of a local index (0..48)
    pub fn of(local_index: usize) -> Ring {
        match local_index {
            0..=29 => Ring::Outer,
            30..=41 => Ring::Mid,
            _ => Ring::Inner,
        }
    }
}

struct RingDef {
    diameter_mm: f32,
    count: usize,
    start_deg: f32,
    first: usize,
}

// Counter-clockwise from start angle
const RINGS: [RingDef; 3] = [
    RingDef { diameter_mm: 92.0, count: 30, start_deg: 0.0, first: 0 },
    RingDef { diameter_mm: 34.0, count: 12, start_deg: 15.0, first: 30 },
    RingDef { diameter_mm: 18.0, count: 6, start_deg: 0.0, first: 42 },
];

/// Fixed 48-point local template, in board-local millimeters
pub fn local_template() -> [[f32; 2]; LEDS_PER_BOARD] {
    let mut pts = [[0.0f32; 2]; LEDS_PER_BOARD];
    for ring in &RINGS {
        let r = ring.diameter_mm / 2.0;
        for i in 0..ring.count {
            let a = (ring.start_deg + 360.0 * i as f32 / ring.count as f32).to_radians();
            pts[ring.first + i] = [a.cos() * r, a.sin() * r];
        }
    }
    pts
}

/// Pose of a single board
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Board {
    /// Center X in mm
    pub cx: f32,
    /// Center Y in mm
    pub cy: f32,
    /// Rotation in degrees, counter-clockwise
    #[serde(rename = "rotDeg")]
    pub rot_deg: f32,
}

impl Board {
    pub fn new(cx: f32, cy: f32, rot_deg: f32) -> Self {
        Self { cx, cy, rot_deg }
    }

    pub fn is_finite(&self) -> bool {
        self.cx.is_finite() && self.cy.is_finite() && self.rot_deg.is_finite()
    }
}

/// Evenly spaced boards along X, centered on zero
pub fn default_boards(count: usize) -> Vec<Board> {
    let start_x = -((count.saturating_sub(1)) as f32 * BOARD_SPACING_MM) / 2.0;
    (0..count)
        .map(|b| Board::new(start_x + b as f32 * BOARD_SPACING_MM, 0.0, 0.0))
        .collect()
}

/// Flat world-space LED arrays, indexed by `board * 48 + local`
#[derive(Debug, Clone, Default)]
pub struct World {
    pub x: Vec<f32>,
    pub y: Vec<f32>,
    pub board: Vec<u16>,
    pub local: Vec<u16>,
    board_count: usize,
}

impl World {
    /// Number of LEDs
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn board_count(&self) -> usize {
        self.board_count
    }

    /// Byte length of an RGB frame for this world
    pub fn frame_len(&self) -> usize {
        self.len() * 3
    }

    /// Rotate the template by each board's rotation, translate by its center
    fn rebuild(&mut self, boards: &[Board], template: &[[f32; 2]; LEDS_PER_BOARD]) {
        let total = boards.len() * LEDS_PER_BOARD;
        self.x.resize(total, 0.0);
        self.y.resize(total, 0.0);
        self.board.resize(total, 0);
        self.local.resize(total, 0);
        self.board_count = boards.len();

        for (b, bd) in boards.iter().enumerate() {
            let th = bd.rot_deg.to_radians();
            let (s, c) = th.sin_cos();
            for (i, p) in template.iter().enumerate() {
                let gi = b * LEDS_PER_BOARD + i;
                self.x[gi] = p[0] * c - p[1] * s + bd.cx;
                self.y[gi] = p[0] * s + p[1] * c + bd.cy;
                self.board[gi] = b as u16;
                self.local[gi] = i as u16;
            }
        }
    }
}

/// Board poses plus the derived world arrays
///
/// The board count is fixed at construction; poses can be edited one at a time
/// or replaced wholesale. Either way the world arrays are rebuilt before the
/// call returns.
#[derive(Debug, Clone)]
pub struct BoardLayout {
    boards: Vec<Board>,
    template: [[f32; 2]; LEDS_PER_BOARD],
    world: World,
}

impl Default for BoardLayout {
    fn default() -> Self {
        Self::new(BOARDS)
    }
}

impl BoardLayout {
    /// Create `count` evenly spaced boards
    pub fn new(count: usize) -> Self {
        let mut layout = Self {
            boards: default_boards(count),
            template: local_template(),
            world: World::default(),
        };
        layout.rebuild_world();
        layout
    }

    pub fn boards(&self) -> &[Board] {
        &self.boards
    }

    pub fn board_count(&self) -> usize {
        self.boards.len()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn template(&self) -> &[[f32; 2]; LEDS_PER_BOARD] {
        &self.template
    }

    /// Recompute world positions from the current poses
    pub fn rebuild_world(&mut self) {
        self.world.rebuild(&self.boards, &self.template);
    }

    /// Update one board pose. Returns false for an out-of-range index.
    pub fn set_board(&mut self, index: usize, board: Board) -> bool {
        let Some(slot) = self.boards.get_mut(index) else {
            return false;
        };
        *slot = board;
        self.rebuild_world();
        true
    }

    /// Replace every pose at once. The count must match.
    pub fn replace_all(&mut self, boards: &[Board]) -> bool {
        if boards.len() != self.boards.len() {
            return false;
        }
        self.boards.copy_from_slice(boards);
        self.rebuild_world();
        true
    }

    /// Restore the evenly spaced default arrangement
    pub fn reset_all(&mut self) {
        self.boards = default_boards(self.boards.len());
        self.rebuild_world();
    }

    /// Index of the board whose center X is closest to `x_mm`
    ///
    /// Ties resolve to the lower index.
    pub fn nearest_board(&self, x_mm: f32) -> usize {
        let mut best = 0;
        let mut best_d = f32::INFINITY;
        for (i, b) in self.boards.iter().enumerate() {
            let d = (x_mm - b.cx).abs();
            if d < best_d {
                best_d = d;
                best = i;
            }
        }
        best
    }
}
