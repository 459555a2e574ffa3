pub mod network;
pub mod prediction;
pub mod sequence;
pub mod trainer;

pub use network::{SequenceClassifier, MAX_HIDDEN, MAX_WINDOW};
pub use prediction::{rank_tiles, PredictionResult, TileScore};
pub use sequence::{
    build_sequences, build_sequences_from, latest_window, Anomaly, AnomalyKind, SequenceBatch,
    SequenceWindow, WINDOW,
};
pub use trainer::{ModelOrigin, ModelStatus, ModelTrainer, TrainReport, TrainerConfig};
