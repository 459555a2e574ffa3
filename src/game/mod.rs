pub mod grid;
pub mod round;
pub mod tiles;

pub use grid::{GameGrid, GridAdjuster, HazardOrigin, Tile, TileContent};
pub use round::{calculate_payout, MiningRound, RevealOutcome, RoundState, DEFAULT_MINES};
pub use tiles::TileSet;
