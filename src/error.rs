//! Typed errors for the learning pipeline boundaries.

use thiserror::Error;

use crate::training::ModelStatus;

/// Failure of the persistence backend (open, read, or write).
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend worker is gone or refused the command.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The backend accepted the command but it failed.
    #[error("storage backend failure: {0:#}")]
    Backend(#[from] anyhow::Error),
}

/// Failure of a training cycle or of model restore.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("training diverged during epoch {epoch}")]
    Diverged { epoch: usize },

    #[error("corrupt model weights: {0}")]
    CorruptWeights(String),

    #[error("a training cycle is already running")]
    Busy,

    #[error("model is not ready (status: {0:?})")]
    NotReady(ModelStatus),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("training worker failed: {0}")]
    Worker(String),
}

/// Rejected round actions.
#[derive(Debug, Error, PartialEq)]
pub enum GameError {
    #[error("a round needs between 1 and 24 mines, got {0}")]
    InvalidMines(usize),

    #[error("bet must be a positive amount, got {0}")]
    InvalidBet(f64),

    #[error("no round in play")]
    NotPlaying,
}
