//! Resolves which tile an interaction targeted.
//!
//! The game surface hands over an explicit [`HitDescriptor`] with each event.
//! Resolution is best effort: anything unresolvable degrades to
//! [`FALLBACK_LABEL`] with a warning so the move is still recorded.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{InteractionEvent, GRID_SIDE, TILE_COUNT};

/// Label recorded when the targeted tile cannot be resolved.
pub const FALLBACK_LABEL: u8 = 0;

/// What the game surface knows about the element that was hit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum HitDescriptor {
    /// The tile index is known directly.
    Tile { index: i64 },
    /// A string annotation carried by the hit element, e.g. `"7"`.
    Annotation { value: String },
    /// Only the board's rendered size is known; the tile is derived from the
    /// event's offset within the board.
    Geometry { width: f64, height: f64 },
    /// The event did not land on anything tile-like.
    Missing,
}

#[derive(Debug, Error, PartialEq)]
pub enum UnresolvedTile {
    #[error("tile index {0} is outside the 5x5 board")]
    OutOfRange(i64),
    #[error("annotation {0:?} is not a tile index")]
    Unparsable(String),
    #[error("offset ({offset_x}, {offset_y}) lies outside the board")]
    OffBoard { offset_x: f64, offset_y: f64 },
    #[error("board geometry {width}x{height} is unusable")]
    BadGeometry { width: f64, height: f64 },
    #[error("no tile information attached to the event")]
    Missing,
}

/// Strict resolution used by [`label_move`].
pub fn resolve_tile(event: &InteractionEvent, hit: &HitDescriptor) -> Result<u8, UnresolvedTile> {
    match hit {
        HitDescriptor::Tile { index } => check_range(*index),
        HitDescriptor::Annotation { value } => {
            let index = value
                .trim()
                .parse::<i64>()
                .map_err(|_| UnresolvedTile::Unparsable(value.clone()))?;
            check_range(index)
        }
        HitDescriptor::Geometry { width, height } => {
            let usable = width.is_finite() && height.is_finite() && *width > 0.0 && *height > 0.0;
            if !usable {
                return Err(UnresolvedTile::BadGeometry {
                    width: *width,
                    height: *height,
                });
            }
            let cell_width = width / GRID_SIDE as f64;
            let cell_height = height / GRID_SIDE as f64;
            let col = (event.offset_x / cell_width).floor();
            let row = (event.offset_y / cell_height).floor();
            if !(0.0..GRID_SIDE as f64).contains(&col) || !(0.0..GRID_SIDE as f64).contains(&row) {
                return Err(UnresolvedTile::OffBoard {
                    offset_x: event.offset_x,
                    offset_y: event.offset_y,
                });
            }
            check_range(row as i64 * GRID_SIDE as i64 + col as i64)
        }
        HitDescriptor::Missing => Err(UnresolvedTile::Missing),
    }
}

/// Never fails: unresolvable hits are logged and labelled [`FALLBACK_LABEL`].
pub fn label_move(event: &InteractionEvent, hit: &HitDescriptor) -> u8 {
    match resolve_tile(event, hit) {
        Ok(index) => index,
        Err(reason) => {
            log::warn!("move label fell back to {FALLBACK_LABEL}: {reason}");
            FALLBACK_LABEL
        }
    }
}

fn check_range(index: i64) -> Result<u8, UnresolvedTile> {
    if (0..TILE_COUNT as i64).contains(&index) {
        Ok(index as u8)
    } else {
        Err(UnresolvedTile::OutOfRange(index))
    }
}
