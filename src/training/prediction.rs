use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::features::TILE_COUNT;
use crate::game::TileSet;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TileScore {
    pub index: u8,
    pub score: f32,
}

/// Ranked tiles designated as adversarial, best first. At most 25 entries,
/// never a duplicate index.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub ranked: Vec<TileScore>,
}

impl PredictionResult {
    /// The identity result: nothing to designate.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.ranked.iter().map(|tile| usize::from(tile.index))
    }

    pub fn contains(&self, index: usize) -> bool {
        self.indices().any(|i| i == index)
    }
}

/// Jitters, ranks, filters, and truncates a tile distribution.
///
/// Each score moves by at most `jitter` in either direction before sorting.
/// Tiles in `excluded` are dropped after ranking, then the list is cut to
/// `top_k`.
pub fn rank_tiles<R: Rng + ?Sized>(
    probs: &[f32; TILE_COUNT],
    excluded: &TileSet,
    top_k: usize,
    jitter: f32,
    rng: &mut R,
) -> PredictionResult {
    let mut scored: Vec<TileScore> = probs
        .iter()
        .enumerate()
        .map(|(index, &p)| {
            let noise = if jitter > 0.0 {
                rng.gen_range(-jitter..=jitter)
            } else {
                0.0
            };
            TileScore {
                index: index as u8,
                score: p + noise,
            }
        })
        .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score));

    PredictionResult {
        ranked: scored
            .into_iter()
            .filter(|tile| !excluded.contains(usize::from(tile.index)))
            .take(top_k)
            .collect(),
    }
}
