use serde::{Deserialize, Serialize};

use crate::features::TILE_COUNT;

/// Set of tile indices on the 5×5 board, stored as a bitmask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileSet(u32);

impl TileSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Ignores indices that are off the board.
    pub fn insert(&mut self, index: usize) {
        if index < TILE_COUNT {
            self.0 |= 1 << index;
        }
    }

    pub fn remove(&mut self, index: usize) {
        if index < TILE_COUNT {
            self.0 &= !(1 << index);
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        index < TILE_COUNT && self.0 & (1 << index) != 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn union(self, other: TileSet) -> TileSet {
        TileSet(self.0 | other.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..TILE_COUNT).filter(move |index| self.contains(*index))
    }
}

impl FromIterator<usize> for TileSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = TileSet::empty();
        for index in iter {
            set.insert(index);
        }
        set
    }
}
