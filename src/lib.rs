pub mod db;
pub mod error;
pub mod features;
pub mod game;
pub mod session;
pub mod settings;
pub mod store;
pub mod training;
mod utils;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use rand::{rngs::StdRng, SeedableRng};
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};

use features::{HitDescriptor, InteractionEvent};
use game::{GridAdjuster, MiningRound, DEFAULT_MINES};
use session::{PassOutcome, SessionController};
use settings::SettingsStore;
use store::SqliteStore;

/// Data directory override.
pub const DATA_DIR_ENV: &str = "ADAPTIVE_MINES_DATA_DIR";

const DEFAULT_DATA_DIR: &str = "adaptive-mines-data";
const DEFAULT_BET: f64 = 1.0;

/// One line of input on stdin.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InputLine {
    Click { event: InteractionEvent, tile: i64 },
    Control(ControlCommand),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
enum ControlCommand {
    Reset,
    CashOut,
    NewRound {
        #[serde(default = "default_bet")]
        bet: f64,
        #[serde(default = "default_mines")]
        mines: usize,
    },
}

fn default_bet() -> f64 {
    DEFAULT_BET
}

fn default_mines() -> usize {
    DEFAULT_MINES
}

fn data_dir() -> PathBuf {
    std::env::var_os(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

fn emit(line: serde_json::Value) {
    println!("{line}");
}

pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("adaptive-mines starting up...");

    let data_dir = data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;

    let store = Arc::new(SqliteStore::open(data_dir.join("adaptive-mines.sqlite3"))?);
    let settings = SettingsStore::new(data_dir.join("settings.json"))?;

    let runtime = tokio::runtime::Runtime::new().context("failed to build tokio runtime")?;
    runtime.block_on(play(store, settings))
}

async fn play(store: Arc<SqliteStore>, settings: SettingsStore) -> Result<()> {
    let pipeline_settings = settings.pipeline();
    let mut rng = match pipeline_settings.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut session = SessionController::start(store, pipeline_settings).await?;
    let mut outcomes = session
        .take_outcomes()
        .context("session outcome stream already taken")?;
    emit(json!({
        "type": "session",
        "sessionId": session.session_id(),
        "model": session.origin(),
    }));

    let mut round = MiningRound::start(DEFAULT_BET, DEFAULT_MINES, &mut rng)?;
    emit(json!({ "type": "round", "round": &round }));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<InputLine>(&line) {
                    Ok(input) => handle_input(input, &session, &mut round, &mut rng).await?,
                    Err(err) => {
                        log::warn!("skipping unreadable input line: {err}");
                        emit(json!({ "type": "error", "message": err.to_string() }));
                    }
                }
            }
            Some(outcome) = outcomes.recv() => apply_outcome(outcome, &mut round),
        }
    }

    session.shutdown().await?;
    while let Some(outcome) = outcomes.recv().await {
        apply_outcome(outcome, &mut round);
    }
    emit(json!({ "type": "done", "round": &round }));
    Ok(())
}

async fn handle_input(
    input: InputLine,
    session: &SessionController<SqliteStore>,
    round: &mut MiningRound,
    rng: &mut StdRng,
) -> Result<()> {
    match input {
        InputLine::Click { event, tile } => {
            let reveal = usize::try_from(tile)
                .map(|index| round.reveal(index))
                .unwrap_or(game::RevealOutcome::Ignored);
            emit(json!({
                "type": "reveal",
                "tile": tile,
                "result": reveal,
                "state": round.state(),
            }));
            session
                .submit(
                    event,
                    HitDescriptor::Tile { index: tile },
                    round.grid().protected_set(),
                )
                .await?;
        }
        InputLine::Control(ControlCommand::Reset) => session.reset().await?,
        InputLine::Control(ControlCommand::CashOut) => match round.cash_out() {
            Ok(payout) => emit(json!({ "type": "cashOut", "payout": payout })),
            Err(err) => emit(json!({ "type": "error", "message": err.to_string() })),
        },
        InputLine::Control(ControlCommand::NewRound { bet, mines }) => {
            match MiningRound::start(bet, mines, rng) {
                Ok(next) => {
                    *round = next;
                    emit(json!({ "type": "round", "round": &*round }));
                }
                Err(err) => emit(json!({ "type": "error", "message": err.to_string() })),
            }
        }
    }
    Ok(())
}

/// Applies a finished pass to the live grid. The round is the only writer.
fn apply_outcome(outcome: PassOutcome, round: &mut MiningRound) {
    if let Some(prediction) = outcome.prediction() {
        let adjusted = GridAdjuster::apply(prediction, round.grid());
        round.replace_grid(adjusted);
    }
    emit(json!({ "type": "pass", "outcome": &outcome, "state": round.state() }));
}
