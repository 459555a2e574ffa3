use std::sync::Arc;

use adaptive_mines_lib::features::{HitDescriptor, InteractionEvent, PointerKind};
use adaptive_mines_lib::game::{GameGrid, GridAdjuster, TileSet};
use adaptive_mines_lib::session::{PassOutcome, PassStage, SessionController};
use adaptive_mines_lib::settings::PipelineSettings;
use adaptive_mines_lib::store::{MemoryStore, ModelStore, MoveStore, SqliteStore};
use adaptive_mines_lib::training::{ModelOrigin, WINDOW};

fn settings() -> PipelineSettings {
    PipelineSettings {
        seed: Some(42),
        epochs: 2,
        ..PipelineSettings::default()
    }
}

fn pointer_event(step: usize) -> InteractionEvent {
    let t = step as f64;
    InteractionEvent {
        client_x: 320.0 + 7.0 * t,
        client_y: 240.0 - 3.0 * t,
        offset_x: 40.0 + t,
        offset_y: 55.0,
        screen_x: 1020.0 + 7.0 * t,
        screen_y: 640.0 - 3.0 * t,
        page_x: 320.0 + 7.0 * t,
        page_y: 240.0 - 3.0 * t,
        movement_x: Some(1.5),
        movement_y: None,
        pressure: Some(0.5),
        pointer_type: PointerKind::Mouse,
        time_stamp: 1_000.0 + 375.0 * t,
    }
}

async fn submit_moves<S>(session: &SessionController<S>, count: usize, excluded: TileSet)
where
    S: adaptive_mines_lib::store::KeyValueStore,
{
    for step in 0..count {
        session
            .submit(
                pointer_event(step),
                HitDescriptor::Tile {
                    index: (step * 7 % 25) as i64,
                },
                excluded,
            )
            .await
            .unwrap();
    }
}

async fn collect<S>(session: &mut SessionController<S>, count: usize) -> Vec<PassOutcome>
where
    S: adaptive_mines_lib::store::KeyValueStore,
{
    let mut outcomes = Vec::with_capacity(count);
    for _ in 0..count {
        outcomes.push(session.next_outcome().await.unwrap());
    }
    outcomes
}

#[tokio::test]
async fn eleventh_move_trains_and_designates_hazards() {
    let store = Arc::new(MemoryStore::new());
    let mut session = SessionController::start(Arc::clone(&store), settings())
        .await
        .unwrap();

    submit_moves(&session, WINDOW + 1, TileSet::empty()).await;
    let outcomes = collect(&mut session, WINDOW + 1).await;

    assert!(outcomes[..WINDOW - 1]
        .iter()
        .all(|o| matches!(o, PassOutcome::Recorded { .. })));
    match &outcomes[WINDOW] {
        PassOutcome::Predicted {
            trained: Some(report),
            prediction,
            ..
        } => {
            assert_eq!(report.windows, 1);
            assert_eq!(prediction.len(), 3);
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    assert_eq!(store.load_all().await.unwrap().len(), WINDOW + 1);
    assert!(store.load_weights().await.unwrap().is_some());
    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn predictions_never_touch_revealed_tiles() {
    let store = Arc::new(MemoryStore::new());
    let mut session = SessionController::start(store, settings()).await.unwrap();

    let mut grid = GameGrid::default();
    for index in [0, 1, 2, 5, 6, 7, 12, 18, 24] {
        grid.reveal(index);
    }
    grid.mark_safe(13);
    let protected = grid.protected_set();

    submit_moves(&session, 2 * (WINDOW + 1), protected).await;
    for outcome in collect(&mut session, 2 * (WINDOW + 1)).await {
        if let Some(prediction) = outcome.prediction() {
            assert!(protected.iter().all(|index| !prediction.contains(index)));
            let adjusted = GridAdjuster::apply(prediction, &grid);
            for index in protected.iter() {
                assert_eq!(adjusted.tile(index), grid.tile(index));
            }
            grid = adjusted;
        }
    }
    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn storage_outage_fails_the_pass_and_the_session_keeps_going() {
    let store = Arc::new(MemoryStore::new());
    let mut session = SessionController::start(Arc::clone(&store), settings())
        .await
        .unwrap();

    submit_moves(&session, 3, TileSet::empty()).await;
    collect(&mut session, 3).await;

    store.set_failing(true);
    submit_moves(&session, 1, TileSet::empty()).await;
    assert!(matches!(
        session.next_outcome().await,
        Some(PassOutcome::Failed {
            stage: PassStage::Append,
            ..
        })
    ));

    store.set_failing(false);
    submit_moves(&session, 1, TileSet::empty()).await;
    assert!(matches!(
        session.next_outcome().await,
        Some(PassOutcome::Recorded { log_len: 4, .. })
    ));
    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn reset_starts_from_an_empty_log() {
    let store = Arc::new(MemoryStore::new());
    let mut session = SessionController::start(Arc::clone(&store), settings())
        .await
        .unwrap();

    submit_moves(&session, WINDOW + 1, TileSet::empty()).await;
    collect(&mut session, WINDOW + 1).await;

    session.reset().await.unwrap();
    assert_eq!(session.next_outcome().await, Some(PassOutcome::Reset));
    assert!(store.load_all().await.unwrap().is_empty());
    assert!(store.load_weights().await.unwrap().is_none());

    submit_moves(&session, 1, TileSet::empty()).await;
    assert!(matches!(
        session.next_outcome().await,
        Some(PassOutcome::Recorded { log_len: 1, .. })
    ));
    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn trained_weights_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("moves.sqlite3");

    {
        let store = Arc::new(SqliteStore::open(path.clone()).unwrap());
        let mut session = SessionController::start(store, settings()).await.unwrap();
        assert_eq!(session.origin(), ModelOrigin::Fresh);
        submit_moves(&session, WINDOW + 1, TileSet::empty()).await;
        let outcomes = collect(&mut session, WINDOW + 1).await;
        assert!(matches!(
            outcomes.last(),
            Some(PassOutcome::Predicted {
                trained: Some(_),
                ..
            })
        ));
        session.shutdown().await.unwrap();
    }

    let store = Arc::new(SqliteStore::open(path).unwrap());
    let mut session = SessionController::start(Arc::clone(&store), settings())
        .await
        .unwrap();
    assert_eq!(session.origin(), ModelOrigin::Restored);
    assert_eq!(store.load_all().await.unwrap().len(), WINDOW + 1);

    submit_moves(&session, 1, TileSet::empty()).await;
    assert!(matches!(
        session.next_outcome().await,
        Some(PassOutcome::Predicted { trained: None, .. })
    ));
    session.shutdown().await.unwrap();
}
