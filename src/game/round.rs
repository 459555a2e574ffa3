use rand::seq::index::sample;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::GameError;
use crate::features::TILE_COUNT;

use super::grid::{GameGrid, TileContent};
use super::tiles::TileSet;

pub const DEFAULT_MINES: usize = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum RoundState {
    #[default]
    Idle,
    Playing,
    Won,
    Lost,
}

/// Result of one reveal.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum RevealOutcome {
    /// Tile was revealed already, off the board, or the round is over.
    Ignored,
    Gem { payout: f64 },
    Hazard,
    Cleared { payout: f64 },
}

/// Multiplied bet after `gems` safe reveals on a board with `mines` hazards.
pub fn calculate_payout(bet: f64, mines: usize, gems: usize) -> f64 {
    let mut multiplier = 1.0;
    for i in 0..gems {
        let remaining = TILE_COUNT.saturating_sub(mines + i);
        if remaining == 0 {
            break;
        }
        multiplier = multiplier * (TILE_COUNT - i) as f64 / remaining as f64;
    }
    bet * multiplier
}

/// One round of the mines game.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MiningRound {
    state: RoundState,
    bet: f64,
    mines: usize,
    payout: f64,
    grid: GameGrid,
}

impl Default for MiningRound {
    fn default() -> Self {
        Self {
            state: RoundState::Idle,
            bet: 0.0,
            mines: DEFAULT_MINES,
            payout: 0.0,
            grid: GameGrid::default(),
        }
    }
}

impl MiningRound {
    /// Seeds `mines` hazards at random and starts play.
    pub fn start<R: Rng + ?Sized>(bet: f64, mines: usize, rng: &mut R) -> Result<Self, GameError> {
        if !(1..TILE_COUNT).contains(&mines) {
            return Err(GameError::InvalidMines(mines));
        }
        if !bet.is_finite() || bet <= 0.0 {
            return Err(GameError::InvalidBet(bet));
        }

        let hazards: TileSet = sample(rng, TILE_COUNT, mines).into_iter().collect();
        Ok(Self {
            state: RoundState::Playing,
            bet,
            mines,
            payout: bet,
            grid: GameGrid::with_hazards(&hazards),
        })
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    pub fn payout(&self) -> f64 {
        self.payout
    }

    pub fn mines(&self) -> usize {
        self.mines
    }

    pub fn grid(&self) -> &GameGrid {
        &self.grid
    }

    /// Installs an adjusted grid. Ignored once the round is over.
    pub fn replace_grid(&mut self, grid: GameGrid) {
        if self.state == RoundState::Playing {
            self.grid = grid;
        }
    }

    pub fn reveal(&mut self, index: usize) -> RevealOutcome {
        if self.state != RoundState::Playing {
            return RevealOutcome::Ignored;
        }
        match self.grid.reveal(index) {
            None => RevealOutcome::Ignored,
            Some(TileContent::Hazard(_)) => {
                self.state = RoundState::Lost;
                self.payout = 0.0;
                self.grid.reveal_all();
                RevealOutcome::Hazard
            }
            Some(TileContent::Gem) => {
                let gems = self.grid.revealed_gems();
                self.payout = calculate_payout(self.bet, self.mines, gems);
                if gems >= self.grid.gem_count() {
                    self.state = RoundState::Won;
                    self.grid.reveal_all();
                    RevealOutcome::Cleared {
                        payout: self.payout,
                    }
                } else {
                    RevealOutcome::Gem {
                        payout: self.payout,
                    }
                }
            }
        }
    }

    /// Ends play and banks the current payout.
    pub fn cash_out(&mut self) -> Result<f64, GameError> {
        if self.state != RoundState::Playing {
            return Err(GameError::NotPlaying);
        }
        self.state = RoundState::Won;
        self.grid.reveal_all();
        Ok(self.payout)
    }
}
