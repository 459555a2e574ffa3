use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ModelError;
use crate::features::{HitDescriptor, InteractionEvent};
use crate::game::TileSet;
use crate::settings::PipelineSettings;
use crate::store::KeyValueStore;
use crate::training::{ModelOrigin, ModelStatus, ModelTrainer, TrainerConfig};

use super::pipeline::{PassOutcome, PassRequest, Pipeline};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

enum Command {
    Pass(Box<PassRequest>),
    Reset,
}

/// Session-scoped context: one model, one worker, one ordered queue.
///
/// Passes run strictly in submission order on a single worker task, so a
/// move that arrives while a training cycle is in flight waits for it to
/// finish. Outcomes come back on a channel; applying them to the live grid is
/// left to the owner.
pub struct SessionController<S: KeyValueStore> {
    session_id: Uuid,
    origin: ModelOrigin,
    trainer: Arc<ModelTrainer<S>>,
    queue: Option<mpsc::Sender<Command>>,
    outcomes: Option<mpsc::UnboundedReceiver<PassOutcome>>,
    handle: Option<JoinHandle<()>>,
    cancel_token: CancellationToken,
}

impl<S: KeyValueStore> SessionController<S> {
    /// Restores or initializes the model and spawns the worker. Must be
    /// called inside a tokio runtime.
    pub async fn start(store: Arc<S>, settings: PipelineSettings) -> Result<Self, ModelError> {
        let session_id = Uuid::new_v4();
        let trainer = Arc::new(ModelTrainer::new(
            Arc::clone(&store),
            TrainerConfig::from(&settings),
        ));
        let origin = trainer.load_or_initialize().await?;

        let (queue_tx, queue_rx) = mpsc::channel(settings.queue_capacity.max(1));
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();

        let pipeline = Pipeline::new(store, Arc::clone(&trainer), &settings);
        let handle = tokio::spawn(session_loop(
            session_id,
            pipeline,
            queue_rx,
            outcome_tx,
            cancel_token.clone(),
        ));

        log_info!("session {session_id} started with {origin:?} model");

        Ok(Self {
            session_id,
            origin,
            trainer,
            queue: Some(queue_tx),
            outcomes: Some(outcome_rx),
            handle: Some(handle),
            cancel_token,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn origin(&self) -> ModelOrigin {
        self.origin
    }

    pub fn model_status(&self) -> ModelStatus {
        self.trainer.status()
    }

    /// Queues one pipeline pass. Waits while the queue is full.
    pub async fn submit(
        &self,
        event: InteractionEvent,
        hit: HitDescriptor,
        excluded: TileSet,
    ) -> Result<()> {
        let request = PassRequest {
            event,
            hit,
            excluded,
        };
        self.enqueue(Command::Pass(Box::new(request))).await
    }

    /// Queues a wipe of moves and weights followed by a fresh model.
    pub async fn reset(&self) -> Result<()> {
        self.enqueue(Command::Reset).await
    }

    async fn enqueue(&self, command: Command) -> Result<()> {
        let queue = self
            .queue
            .as_ref()
            .ok_or_else(|| anyhow!("session {} is shutting down", self.session_id))?;
        queue
            .send(command)
            .await
            .map_err(|_| anyhow!("session {} worker has stopped", self.session_id))
    }

    /// Next outcome, in submission order. `None` once the worker is gone and
    /// every outcome was delivered.
    pub async fn next_outcome(&mut self) -> Option<PassOutcome> {
        match self.outcomes.as_mut() {
            Some(outcomes) => outcomes.recv().await,
            None => None,
        }
    }

    /// Hands the outcome stream to the caller, e.g. to `select!` on it.
    pub fn take_outcomes(&mut self) -> Option<mpsc::UnboundedReceiver<PassOutcome>> {
        self.outcomes.take()
    }

    /// Stops the worker after the pass in flight; queued passes are dropped.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Runs every queued pass, then joins the worker.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.queue.take();
        match self.handle.take() {
            Some(handle) => handle.await.context("session worker failed to join"),
            None => Ok(()),
        }
    }
}

impl<S: KeyValueStore> Drop for SessionController<S> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.cancel_token.cancel();
        }
    }
}

async fn session_loop<S: KeyValueStore>(
    session_id: Uuid,
    mut pipeline: Pipeline<S>,
    mut queue: mpsc::Receiver<Command>,
    outcomes: mpsc::UnboundedSender<PassOutcome>,
    cancel_token: CancellationToken,
) {
    let mut passes: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("session {session_id} cancelled after {passes} passes");
                break;
            }
            command = queue.recv() => {
                let Some(command) = command else {
                    log_info!("session {session_id} drained after {passes} passes");
                    break;
                };
                let outcome = match command {
                    Command::Pass(request) => {
                        passes += 1;
                        pipeline.run_pass(*request).await
                    }
                    Command::Reset => pipeline.reset().await,
                };
                if outcomes.send(outcome).is_err() {
                    log_warn!("session {session_id} outcome dropped, receiver gone");
                }
            }
        }
    }
}
