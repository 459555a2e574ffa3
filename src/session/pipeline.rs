//! One pipeline pass per qualifying interaction.
//!
//! extract + label → append → snapshot → (train) → predict. A pass that
//! cannot record its move aborts with [`PassOutcome::Failed`]; a failed
//! training cycle only costs that cycle, and prediction still runs on the
//! previous weights.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::db::MoveRecord;
use crate::error::StorageError;
use crate::features::{extract_features, label_move, HitDescriptor, InteractionEvent};
use crate::game::TileSet;
use crate::settings::PipelineSettings;
use crate::store::KeyValueStore;
use crate::training::{
    build_sequences_from, latest_window, ModelTrainer, PredictionResult, TrainReport,
};

use super::policy::{TrainingCursor, TrainingTrigger};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Work queued for the session worker.
#[derive(Debug, Clone)]
pub struct PassRequest {
    pub event: InteractionEvent,
    pub hit: HitDescriptor,
    /// Tiles the prediction must leave alone (revealed or guaranteed safe).
    pub excluded: TileSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PassStage {
    Append,
    Snapshot,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum PassOutcome {
    /// The move was recorded and the log holds a full window to predict from.
    #[serde(rename_all = "camelCase")]
    Predicted {
        move_id: i64,
        label: u8,
        prediction: PredictionResult,
        trained: Option<TrainReport>,
    },
    /// The move was recorded; not enough history to predict yet.
    #[serde(rename_all = "camelCase")]
    Recorded {
        move_id: i64,
        label: u8,
        log_len: usize,
    },
    /// Moves and weights were wiped and the model re-initialized.
    Reset,
    Failed { stage: PassStage, message: String },
}

impl PassOutcome {
    fn failed(stage: PassStage, err: impl std::fmt::Display) -> Self {
        PassOutcome::Failed {
            stage,
            message: err.to_string(),
        }
    }

    pub fn prediction(&self) -> Option<&PredictionResult> {
        match self {
            PassOutcome::Predicted { prediction, .. } => Some(prediction),
            _ => None,
        }
    }
}

/// Session-scoped pass runner. Owned by exactly one worker task.
pub struct Pipeline<S: KeyValueStore> {
    store: Arc<S>,
    trainer: Arc<ModelTrainer<S>>,
    window: usize,
    trigger: TrainingTrigger,
    cursor: TrainingCursor,
}

impl<S: KeyValueStore> Pipeline<S> {
    pub fn new(store: Arc<S>, trainer: Arc<ModelTrainer<S>>, settings: &PipelineSettings) -> Self {
        Self {
            store,
            trainer,
            window: settings.window,
            trigger: TrainingTrigger::from(settings),
            cursor: TrainingCursor::new(settings.max_train_windows),
        }
    }

    pub async fn run_pass(&mut self, request: PassRequest) -> PassOutcome {
        let started = Instant::now();
        let features = extract_features(&request.event);
        let label = label_move(&request.event, &request.hit);

        let move_id = match self.store.append(&features, label).await {
            Ok(id) => id,
            Err(err) => {
                log_error!("pass aborted, move not recorded: {err}");
                return PassOutcome::failed(PassStage::Append, err);
            }
        };

        let records = match self.snapshot().await {
            Ok(records) => records,
            Err(err) => {
                log_error!("pass aborted after recording move {move_id}, snapshot failed: {err}");
                return PassOutcome::failed(PassStage::Snapshot, err);
            }
        };

        let trained = if self.trigger.should_train(records.len()) {
            self.train_on(&records).await
        } else {
            None
        };

        let Some(window) = latest_window(&records, self.window) else {
            log_debug!(
                "move {move_id} recorded, {} of {} moves needed to predict",
                records.len(),
                self.window
            );
            return PassOutcome::Recorded {
                move_id,
                label,
                log_len: records.len(),
            };
        };

        let prediction = self.trainer.predict(&window, &request.excluded);
        log_debug!(
            "pass for move {move_id} done in {}ms, {} tiles designated",
            started.elapsed().as_millis(),
            prediction.len()
        );
        PassOutcome::Predicted {
            move_id,
            label,
            prediction,
            trained,
        }
    }

    /// Wipes the move log and the weights, then starts over with a fresh
    /// model.
    pub async fn reset(&mut self) -> PassOutcome {
        if let Err(err) = self.store.clear_all().await {
            log_error!("reset failed clearing moves: {err}");
            return PassOutcome::failed(PassStage::Reset, err);
        }
        if let Err(err) = self.store.clear_weights().await {
            log_error!("reset failed clearing weights: {err}");
            return PassOutcome::failed(PassStage::Reset, err);
        }
        if let Err(err) = self.trainer.initialize() {
            log_error!("reset failed re-initializing model: {err}");
            return PassOutcome::failed(PassStage::Reset, err);
        }
        self.cursor.rewind();
        log_info!("session state reset");
        PassOutcome::Reset
    }

    /// Stable copy of the log, taken right after the append completed.
    async fn snapshot(&self) -> Result<Vec<MoveRecord>, StorageError> {
        self.store.load_all().await
    }

    async fn train_on(&mut self, records: &[MoveRecord]) -> Option<TrainReport> {
        let first_target = self.cursor.first_target(records.len());
        let batch = build_sequences_from(records, self.window, first_target);
        if batch.windows.is_empty() {
            return None;
        }
        if !batch.anomalies.is_empty() {
            log_warn!(
                "training on {} windows with {} repaired entries",
                batch.windows.len(),
                batch.anomalies.len()
            );
        }

        match self.trainer.train_incremental(batch.windows).await {
            Ok(report) => {
                self.cursor.advance_to(records.len());
                Some(report)
            }
            Err(err) => {
                log_error!("training cycle failed, keeping previous weights: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{PointerKind, FEATURE_DIM};
    use crate::store::{MemoryStore, ModelStore, MoveStore};
    use crate::training::{ModelStatus, TrainerConfig};

    fn settings() -> PipelineSettings {
        PipelineSettings {
            seed: Some(5),
            epochs: 1,
            ..PipelineSettings::default()
        }
    }

    async fn pipeline(store: Arc<MemoryStore>) -> Pipeline<MemoryStore> {
        let settings = settings();
        let trainer = Arc::new(ModelTrainer::new(
            Arc::clone(&store),
            TrainerConfig::from(&settings),
        ));
        trainer.load_or_initialize().await.unwrap();
        Pipeline::new(store, trainer, &settings)
    }

    fn click(tile: i64, t: f64) -> PassRequest {
        PassRequest {
            event: InteractionEvent {
                client_x: 100.0 + t,
                client_y: 80.0,
                offset_x: 12.0,
                offset_y: 30.0,
                pointer_type: PointerKind::Mouse,
                time_stamp: t * 250.0,
                ..Default::default()
            },
            hit: HitDescriptor::Tile { index: tile },
            excluded: TileSet::empty(),
        }
    }

    #[tokio::test]
    async fn first_moves_are_only_recorded() {
        let store = Arc::new(MemoryStore::new());
        let mut pipeline = pipeline(Arc::clone(&store)).await;

        for i in 0..9 {
            let outcome = pipeline.run_pass(click(i, i as f64)).await;
            assert!(matches!(outcome, PassOutcome::Recorded { log_len, .. } if log_len == i as usize + 1));
        }
        assert_eq!(store.load_all().await.unwrap().len(), 9);
    }

    #[tokio::test]
    async fn eleventh_move_trains_and_predicts() {
        let store = Arc::new(MemoryStore::new());
        let mut pipeline = pipeline(Arc::clone(&store)).await;

        let mut outcomes = Vec::new();
        for i in 0..11 {
            outcomes.push(pipeline.run_pass(click(i % 25, i as f64)).await);
        }

        match &outcomes[9] {
            PassOutcome::Predicted { trained, prediction, .. } => {
                assert!(trained.is_none());
                assert_eq!(prediction.len(), 3);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        match &outcomes[10] {
            PassOutcome::Predicted { trained: Some(report), label, .. } => {
                assert_eq!(report.windows, 1);
                assert_eq!(*label, 10);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(store.load_weights().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn storage_failure_aborts_only_that_pass() {
        let store = Arc::new(MemoryStore::new());
        let mut pipeline = pipeline(Arc::clone(&store)).await;

        pipeline.run_pass(click(1, 1.0)).await;
        store.set_failing(true);
        let failed = pipeline.run_pass(click(2, 2.0)).await;
        assert!(matches!(failed, PassOutcome::Failed { stage: PassStage::Append, .. }));

        store.set_failing(false);
        let next = pipeline.run_pass(click(3, 3.0)).await;
        assert!(matches!(next, PassOutcome::Recorded { log_len: 2, .. }));
    }

    #[tokio::test]
    async fn damaged_history_still_trains() {
        let store = Arc::new(MemoryStore::new());
        store.push_raw(vec![None; FEATURE_DIM], 3).await;
        store.push_raw(vec![Some(1.0); 4], 99).await;
        let mut pipeline = pipeline(Arc::clone(&store)).await;

        let mut last = None;
        for i in 0..9 {
            last = Some(pipeline.run_pass(click(i, i as f64)).await);
        }
        assert!(matches!(
            last,
            Some(PassOutcome::Predicted { trained: Some(_), .. })
        ));
    }

    #[tokio::test]
    async fn reset_wipes_history_and_weights() {
        let store = Arc::new(MemoryStore::new());
        let mut pipeline = pipeline(Arc::clone(&store)).await;
        for i in 0..11 {
            pipeline.run_pass(click(i, i as f64)).await;
        }

        assert_eq!(pipeline.reset().await, PassOutcome::Reset);
        assert!(store.load_all().await.unwrap().is_empty());
        assert!(store.load_weights().await.unwrap().is_none());
        assert_eq!(pipeline.trainer.status(), ModelStatus::Ready);

        let outcome = pipeline.run_pass(click(4, 1.0)).await;
        assert!(matches!(outcome, PassOutcome::Recorded { log_len: 1, .. }));
    }
}
