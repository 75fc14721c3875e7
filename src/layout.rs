//! Layout document
//!
//! JSON snapshot of board poses, the origin and the active effect:
//!
//! ```json
//! { "version": 2,
//!   "meta": { "boards": 10, "ledsPerBoard": 48, "total": 480 },
//!   "origin": { "x": 0, "y": 0 },
//!   "boards": [ { "id": 0, "cx": -630, "cy": 0, "rotDeg": 0 } ],
//!   "fx": { "id": "ripple", "params": { "speed": 190 } } }
//! ```
//!
//! Import is all-or-nothing: the document is fully validated before anything
//! is applied.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::compositor::LayerEngine;
use crate::effects::ParamSet;
use crate::geometry::{Board, BoardLayout, LEDS_PER_BOARD};
use crate::origin::OriginState;

pub const LAYOUT_VERSION: u32 = 2;

/// Layout import/export errors
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("layout is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("layout has {found} boards, expected {expected}")]
    BoardCount { expected: usize, found: usize },

    #[error("board {0} has a non-finite pose")]
    NonFiniteBoard(usize),

    #[error("origin is not finite")]
    NonFiniteOrigin,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutMeta {
    #[serde(default)]
    pub boards: usize,
    #[serde(default)]
    pub leds_per_board: usize,
    #[serde(default)]
    pub total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OriginPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoardEntry {
    #[serde(default)]
    pub id: usize,
    #[serde(flatten)]
    pub pose: Board,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxEntry {
    pub id: String,
    #[serde(default)]
    pub params: ParamSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutDocument {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub meta: LayoutMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<OriginPoint>,
    pub boards: Vec<BoardEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fx: Option<FxEntry>,
}

fn default_version() -> u32 {
    LAYOUT_VERSION
}

impl LayoutDocument {
    /// Snapshot the current state
    pub fn capture(layout: &BoardLayout, origin: &OriginState, engine: &LayerEngine) -> Self {
        let count = layout.board_count();
        Self {
            version: LAYOUT_VERSION,
            meta: LayoutMeta {
                boards: count,
                leds_per_board: LEDS_PER_BOARD,
                total: count * LEDS_PER_BOARD,
                note: Some(
                    "board order: 0..n-1, each board index: 0..47 (outer 30, mid 12 start 15deg, inner 6)."
                        .to_string(),
                ),
            },
            origin: Some(OriginPoint { x: origin.x(), y: origin.y() }),
            boards: layout
                .boards()
                .iter()
                .enumerate()
                .map(|(id, pose)| BoardEntry { id, pose: *pose })
                .collect(),
            fx: engine.active_id().map(|id| FxEntry {
                id: id.to_string(),
                params: engine.active_params().clone(),
            }),
        }
    }

    pub fn parse(text: &str) -> Result<Self, LayoutError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, LayoutError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load_file(path: &Path) -> Result<Self, LayoutError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn save_file(&self, path: &Path) -> Result<(), LayoutError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json_pretty()?)?;
        tracing::info!(path = %path.display(), "layout saved");
        Ok(())
    }

    /// Check the document against a layout of `board_count` boards
    pub fn validate(&self, board_count: usize) -> Result<Vec<Board>, LayoutError> {
        if self.boards.len() != board_count {
            return Err(LayoutError::BoardCount { expected: board_count, found: self.boards.len() });
        }
        if let Some(i) = self.boards.iter().position(|b| !b.pose.is_finite()) {
            return Err(LayoutError::NonFiniteBoard(i));
        }
        if let Some(o) = self.origin {
            if !(o.x.is_finite() && o.y.is_finite()) {
                return Err(LayoutError::NonFiniteOrigin);
            }
        }
        Ok(self.boards.iter().map(|b| b.pose).collect())
    }

    /// Validate, then apply boards, origin and effect
    ///
    /// Boards are taken in document order; their `id` fields are informational.
    pub fn apply(
        &self,
        layout: &mut BoardLayout,
        origin: &mut OriginState,
        engine: &mut LayerEngine,
    ) -> Result<(), LayoutError> {
        let boards = self.validate(layout.board_count())?;

        layout.replace_all(&boards);
        if let Some(o) = self.origin {
            origin.set_manual(o.x, o.y);
            engine.on_origin_changed();
        }
        if let Some(fx) = self.fx.as_ref().filter(|fx| !fx.id.is_empty()) {
            engine.set_active(&fx.id);
            engine.set_params(&fx.params);
        }
        tracing::info!(boards = boards.len(), "layout applied");
        Ok(())
    }
}
