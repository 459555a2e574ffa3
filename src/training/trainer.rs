//! Owner of the single mutable classifier.
//!
//! Status machine: `Uninitialized → Loading → Ready`, then `Ready ⇄ Training`.
//! Training works on a clone of the current weights off the async runtime and
//! swaps the whole model in only after the new weights were persisted, so a
//! reader sees either the old model or the new one. While a cycle is in
//! flight `predict` answers with an empty result instead of waiting.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::features::FeatureVector;
use crate::game::TileSet;
use crate::settings::PipelineSettings;
use crate::store::ModelStore;

use super::network::SequenceClassifier;
use super::prediction::{rank_tiles, PredictionResult};
use super::sequence::SequenceWindow;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ModelStatus {
    #[default]
    Uninitialized,
    Loading,
    Ready,
    Training,
}

/// Where the current weights came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ModelOrigin {
    Restored,
    Fresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainReport {
    pub windows: usize,
    pub epochs: usize,
    pub mean_loss: f32,
    pub duration_ms: u64,
}

impl TrainReport {
    fn nothing_to_do() -> Self {
        Self {
            windows: 0,
            epochs: 0,
            mean_loss: f32::NAN,
            duration_ms: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub window: usize,
    pub hidden_size: usize,
    pub epochs: usize,
    pub learning_rate: f32,
    pub top_k: usize,
    pub jitter: f32,
    pub seed: Option<u64>,
}

impl From<&PipelineSettings> for TrainerConfig {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            window: settings.window,
            hidden_size: settings.hidden_size,
            epochs: settings.epochs,
            learning_rate: settings.learning_rate,
            top_k: settings.top_k,
            jitter: settings.jitter,
            seed: settings.seed,
        }
    }
}

struct TrainerState {
    status: ModelStatus,
    model: Option<Arc<SequenceClassifier>>,
}

pub struct ModelTrainer<S: ModelStore> {
    store: Arc<S>,
    config: TrainerConfig,
    state: Mutex<TrainerState>,
    rng: Mutex<StdRng>,
}

/// Returns the status to `Ready` however a training cycle ends, including
/// when the training future is dropped mid-flight.
struct TrainingGuard<'a> {
    state: &'a Mutex<TrainerState>,
}

impl Drop for TrainingGuard<'_> {
    fn drop(&mut self) {
        let mut state = lock(self.state);
        if state.status == ModelStatus::Training {
            state.status = ModelStatus::Ready;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl<S: ModelStore> ModelTrainer<S> {
    pub fn new(store: Arc<S>, config: TrainerConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            store,
            config,
            state: Mutex::new(TrainerState {
                status: ModelStatus::Uninitialized,
                model: None,
            }),
            rng: Mutex::new(rng),
        }
    }

    pub fn status(&self) -> ModelStatus {
        lock(&self.state).status
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Serialized form of the weights currently served, if any.
    pub fn weights_blob(&self) -> Option<Vec<u8>> {
        lock(&self.state).model.as_ref().map(|model| model.to_bytes())
    }

    /// Restores persisted weights, falling back to fresh ones when they are
    /// absent, corrupt, or built for a different shape. A storage failure is
    /// returned so the caller can retry.
    pub async fn load_or_initialize(&self) -> Result<ModelOrigin, ModelError> {
        let previous = {
            let mut state = lock(&self.state);
            if state.status == ModelStatus::Training {
                return Err(ModelError::Busy);
            }
            std::mem::replace(&mut state.status, ModelStatus::Loading)
        };

        let restored = match self.store.load_weights().await {
            Ok(Some(blob)) => match self.decode(&blob) {
                Ok(model) => Some(model),
                Err(err) => {
                    log_warn!("persisted model rejected, starting fresh: {err}");
                    None
                }
            },
            Ok(None) => {
                log_info!("no persisted model found, starting fresh");
                None
            }
            Err(err) => {
                // Starting fresh here would overwrite the stored model on the
                // next successful cycle.
                log_error!("failed to read persisted model: {err}");
                lock(&self.state).status = previous;
                return Err(err.into());
            }
        };

        match restored {
            Some(model) => {
                let mut state = lock(&self.state);
                state.model = Some(Arc::new(model));
                state.status = ModelStatus::Ready;
                log_info!("restored model weights from storage");
                Ok(ModelOrigin::Restored)
            }
            None => {
                self.install_fresh()?;
                Ok(ModelOrigin::Fresh)
            }
        }
    }

    /// Replaces the current weights with freshly initialized ones.
    pub fn initialize(&self) -> Result<(), ModelError> {
        self.install_fresh()
    }

    fn install_fresh(&self) -> Result<(), ModelError> {
        let model = {
            let mut rng = lock(&self.rng);
            SequenceClassifier::new(self.config.window, self.config.hidden_size, &mut *rng)
        };
        let mut state = lock(&self.state);
        if state.status == ModelStatus::Training {
            return Err(ModelError::Busy);
        }
        state.model = Some(Arc::new(model));
        state.status = ModelStatus::Ready;
        log_info!(
            "initialized fresh model (window {}, hidden {})",
            self.config.window,
            self.config.hidden_size
        );
        Ok(())
    }

    fn decode(&self, blob: &[u8]) -> Result<SequenceClassifier, ModelError> {
        let model = SequenceClassifier::from_bytes(blob)?;
        if model.window() != self.config.window || model.hidden() != self.config.hidden_size {
            return Err(ModelError::ShapeMismatch {
                expected: format!(
                    "window {}, hidden {}",
                    self.config.window, self.config.hidden_size
                ),
                actual: format!("window {}, hidden {}", model.window(), model.hidden()),
            });
        }
        Ok(model)
    }

    /// One exclusive training cycle over `pairs`.
    ///
    /// An empty batch is a no-op. On any failure the served weights are left
    /// exactly as they were.
    pub async fn train_incremental(
        &self,
        pairs: Vec<SequenceWindow>,
    ) -> Result<TrainReport, ModelError> {
        if pairs.is_empty() {
            return Ok(TrainReport::nothing_to_do());
        }

        let current = {
            let mut state = lock(&self.state);
            match state.status {
                ModelStatus::Ready => {}
                ModelStatus::Training => return Err(ModelError::Busy),
                other => return Err(ModelError::NotReady(other)),
            }
            let model = state
                .model
                .clone()
                .ok_or(ModelError::NotReady(ModelStatus::Uninitialized))?;
            state.status = ModelStatus::Training;
            model
        };
        let _guard = TrainingGuard { state: &self.state };

        let started = Instant::now();
        let epochs = self.config.epochs;
        let learning_rate = self.config.learning_rate;
        let windows = pairs.len();

        let fitted = tokio::task::spawn_blocking(move || {
            let examples: Vec<(&[FeatureVector], u8)> = pairs
                .iter()
                .map(|pair| (pair.inputs.as_slice(), pair.label))
                .collect();
            let mut candidate = (*current).clone();
            candidate
                .fit(&examples, epochs, learning_rate)
                .map(|stats| (candidate, stats))
        })
        .await
        .map_err(|err| ModelError::Worker(err.to_string()))?;

        let (candidate, stats) = match fitted {
            Ok(result) => result,
            Err(err) => {
                log_error!("training cycle over {windows} windows failed: {err}");
                return Err(err);
            }
        };

        if let Err(err) = self.store.save_weights(candidate.to_bytes()).await {
            log_error!("trained weights could not be persisted, keeping previous model: {err}");
            return Err(err.into());
        }

        lock(&self.state).model = Some(Arc::new(candidate));

        let report = TrainReport {
            windows,
            epochs: stats.epochs,
            mean_loss: stats.last_epoch_loss,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        log_info!(
            "training cycle done: {} windows x {} epochs, loss {:.4} -> {:.4} in {}ms",
            report.windows,
            report.epochs,
            stats.first_epoch_loss,
            stats.last_epoch_loss,
            report.duration_ms
        );
        Ok(report)
    }

    /// Ranks the adversarial tiles for the given most-recent window.
    ///
    /// Returns an empty result when the model is not `Ready`, when the window
    /// has the wrong length, or when inference fails.
    pub fn predict(&self, window: &[FeatureVector], excluded: &TileSet) -> PredictionResult {
        let model = {
            let state = lock(&self.state);
            match (&state.model, state.status) {
                (Some(model), ModelStatus::Ready) => Arc::clone(model),
                (_, status) => {
                    log_debug!("prediction skipped, model status {status:?}");
                    return PredictionResult::empty();
                }
            }
        };

        let probs = match model.predict_proba(window) {
            Ok(probs) => probs,
            Err(err) => {
                log_warn!("prediction skipped: {err}");
                return PredictionResult::empty();
            }
        };

        let mut rng = lock(&self.rng);
        rank_tiles(
            &probs,
            excluded,
            self.config.top_k,
            self.config.jitter,
            &mut *rng,
        )
    }
}
