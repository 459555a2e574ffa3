pub mod extractor;
pub mod labeler;

pub use extractor::{extract_features, FeatureVector, InteractionEvent, PointerKind, FEATURE_DIM};
pub use labeler::{label_move, resolve_tile, HitDescriptor, UnresolvedTile, FALLBACK_LABEL};

/// Number of tiles on the 5×5 board, and the classifier's output width.
pub const TILE_COUNT: usize = 25;

/// Tiles per board row.
pub const GRID_SIDE: usize = 5;
