use serde::{Deserialize, Serialize};

use crate::features::TILE_COUNT;
use crate::game::TileSet;
use crate::training::PredictionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HazardOrigin {
    /// Placed when the round started.
    Seeded,
    /// Placed by the predictor during play.
    Predicted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "origin")]
pub enum TileContent {
    Gem,
    Hazard(HazardOrigin),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tile {
    pub content: TileContent,
    pub revealed: bool,
    pub guaranteed_safe: bool,
}

impl Default for Tile {
    fn default() -> Self {
        Self {
            content: TileContent::Gem,
            revealed: false,
            guaranteed_safe: false,
        }
    }
}

impl Tile {
    pub fn is_hazard(&self) -> bool {
        matches!(self.content, TileContent::Hazard(_))
    }
}

/// The 5×5 board as the player sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameGrid {
    tiles: [Tile; TILE_COUNT],
}

impl Default for GameGrid {
    fn default() -> Self {
        Self {
            tiles: [Tile::default(); TILE_COUNT],
        }
    }
}

impl GameGrid {
    /// A grid of gems with the given seeded hazards.
    pub fn with_hazards(hazards: &TileSet) -> Self {
        let mut grid = Self::default();
        for index in hazards.iter() {
            grid.tiles[index].content = TileContent::Hazard(HazardOrigin::Seeded);
        }
        grid
    }

    pub fn tile(&self, index: usize) -> Option<&Tile> {
        self.tiles.get(index)
    }

    pub fn tiles(&self) -> &[Tile; TILE_COUNT] {
        &self.tiles
    }

    pub fn revealed_set(&self) -> TileSet {
        self.indices_where(|tile| tile.revealed)
    }

    pub fn safe_set(&self) -> TileSet {
        self.indices_where(|tile| tile.guaranteed_safe)
    }

    /// Tiles the predictor may not touch.
    pub fn protected_set(&self) -> TileSet {
        self.revealed_set().union(self.safe_set())
    }

    pub fn hazard_set(&self) -> TileSet {
        self.indices_where(Tile::is_hazard)
    }

    /// Hazards placed by the predictor, revealed or not.
    pub fn predicted_hazards(&self) -> TileSet {
        self.indices_where(|tile| tile.content == TileContent::Hazard(HazardOrigin::Predicted))
    }

    pub fn gem_count(&self) -> usize {
        TILE_COUNT - self.hazard_set().len()
    }

    pub fn revealed_gems(&self) -> usize {
        self.tiles
            .iter()
            .filter(|tile| tile.revealed && !tile.is_hazard())
            .count()
    }

    /// Promises the player this tile is a gem. A hazard here is turned back
    /// into a gem so the promise holds.
    pub fn mark_safe(&mut self, index: usize) -> bool {
        let Some(tile) = self.tiles.get_mut(index) else {
            return false;
        };
        if tile.revealed {
            return false;
        }
        tile.guaranteed_safe = true;
        tile.content = TileContent::Gem;
        true
    }

    /// Reveals one tile and returns what was under it. `None` when the index
    /// is off the board or the tile was already revealed.
    pub fn reveal(&mut self, index: usize) -> Option<TileContent> {
        let tile = self.tiles.get_mut(index)?;
        if tile.revealed {
            return None;
        }
        tile.revealed = true;
        Some(tile.content)
    }

    pub fn reveal_all(&mut self) {
        for tile in &mut self.tiles {
            tile.revealed = true;
        }
    }

    fn indices_where(&self, predicate: impl Fn(&Tile) -> bool) -> TileSet {
        self.tiles
            .iter()
            .enumerate()
            .filter(|(_, tile)| predicate(tile))
            .map(|(index, _)| index)
            .collect()
    }
}

/// Applies ranked predictions to a grid as hazard placements.
pub struct GridAdjuster;

impl GridAdjuster {
    /// Returns the adjusted grid; the input is left as it was.
    ///
    /// Unrevealed predicted hazards from earlier passes go back to gems, then
    /// every predicted index becomes a hazard unless the tile is revealed or
    /// guaranteed safe. Revealed tiles are never modified.
    pub fn apply(prediction: &PredictionResult, grid: &GameGrid) -> GameGrid {
        let mut next = grid.clone();

        for tile in next.tiles.iter_mut().filter(|tile| !tile.revealed) {
            if tile.content == TileContent::Hazard(HazardOrigin::Predicted) {
                tile.content = TileContent::Gem;
            }
        }

        for index in prediction.indices() {
            let Some(tile) = next.tiles.get_mut(index) else {
                continue;
            };
            if tile.revealed || tile.guaranteed_safe {
                continue;
            }
            // Seeded hazards keep their origin.
            if tile.content == TileContent::Gem {
                tile.content = TileContent::Hazard(HazardOrigin::Predicted);
            }
        }

        next
    }
}
