use std::path::PathBuf;

use crate::db::{Database, MoveRecord, WorkerUnavailable};
use crate::error::StorageError;
use crate::features::FeatureVector;

use super::{ModelStore, MoveStore};

/// Backend persisting to the SQLite file owned by a [`Database`] worker.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn open(path: PathBuf) -> Result<Self, StorageError> {
        Database::new(path)
            .map(Self::new)
            .map_err(|err| StorageError::Unavailable(format!("{err:#}")))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

/// A dead worker means the backend is unavailable; anything else is a
/// failed command.
fn storage_error(err: anyhow::Error) -> StorageError {
    if err.is::<WorkerUnavailable>() {
        StorageError::Unavailable(err.to_string())
    } else {
        StorageError::Backend(err)
    }
}

impl MoveStore for SqliteStore {
    async fn append(&self, features: &FeatureVector, label: u8) -> Result<i64, StorageError> {
        self.db.insert_move(features, label).await.map_err(storage_error)
    }

    async fn load_all(&self) -> Result<Vec<MoveRecord>, StorageError> {
        self.db.get_moves().await.map_err(storage_error)
    }

    async fn clear_all(&self) -> Result<(), StorageError> {
        self.db.delete_all_moves().await.map_err(storage_error)
    }
}

impl ModelStore for SqliteStore {
    async fn load_weights(&self) -> Result<Option<Vec<u8>>, StorageError> {
        self.db.get_model_weights().await.map_err(storage_error)
    }

    async fn save_weights(&self, blob: Vec<u8>) -> Result<(), StorageError> {
        self.db.upsert_model_weights(blob).await.map_err(storage_error)
    }

    async fn clear_weights(&self) -> Result<(), StorageError> {
        self.db.delete_model_weights().await.map_err(storage_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn vector(seed: f32) -> FeatureVector {
        let mut values = [0.0; 13];
        for (i, value) in values.iter_mut().enumerate() {
            *value = seed + i as f32;
        }
        FeatureVector::sanitized(values).0
    }

    #[tokio::test]
    async fn load_all_returns_moves_in_append_order() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path().join("moves.sqlite3")).unwrap();

        let mut ids = Vec::new();
        for n in 0..7u8 {
            ids.push(store.append(&vector(f32::from(n)), n).await.unwrap());
        }

        let records = store.load_all().await.unwrap();
        assert_eq!(records.len(), 7);
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        for (n, record) in records.iter().enumerate() {
            assert_eq!(record.id, ids[n]);
            assert_eq!(record.label, n as i64);
            assert_eq!(record.features[0], Some(n as f32));
            assert_eq!(record.features.len(), 13);
        }
    }

    #[tokio::test]
    async fn log_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("moves.sqlite3");

        {
            let store = SqliteStore::open(path.clone()).unwrap();
            store.append(&vector(1.0), 3).await.unwrap();
            store.append(&vector(2.0), 4).await.unwrap();
            store.save_weights(vec![1, 2, 3]).await.unwrap();
        }

        let reopened = SqliteStore::open(path).unwrap();
        let labels: Vec<i64> = reopened
            .load_all()
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.label)
            .collect();
        assert_eq!(labels, vec![3, 4]);
        assert_eq!(reopened.load_weights().await.unwrap(), Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn clear_all_keeps_ids_increasing() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path().join("moves.sqlite3")).unwrap();

        let before = store.append(&vector(0.0), 1).await.unwrap();
        store.clear_all().await.unwrap();
        assert!(store.load_all().await.unwrap().is_empty());

        let after = store.append(&vector(0.0), 1).await.unwrap();
        assert!(after > before);
    }

    #[tokio::test]
    async fn weights_blob_is_replaced_and_cleared() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path().join("moves.sqlite3")).unwrap();

        assert_eq!(store.load_weights().await.unwrap(), None);
        store.save_weights(vec![9; 4]).await.unwrap();
        store.save_weights(vec![7; 2]).await.unwrap();
        assert_eq!(store.load_weights().await.unwrap(), Some(vec![7, 7]));

        store.clear_weights().await.unwrap();
        assert_eq!(store.load_weights().await.unwrap(), None);
    }

    #[tokio::test]
    async fn dead_worker_reports_unavailable() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path().join("moves.sqlite3")).unwrap();
        store.append(&vector(1.0), 2).await.unwrap();

        let crashed = store
            .database()
            .execute(|_conn| -> anyhow::Result<()> { panic!("worker crashed") })
            .await;
        assert!(crashed.unwrap_err().is::<WorkerUnavailable>());

        assert!(matches!(
            store.append(&vector(2.0), 3).await,
            Err(StorageError::Unavailable(_))
        ));
        assert!(matches!(
            store.load_weights().await,
            Err(StorageError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn failed_statement_is_a_backend_error() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path().join("moves.sqlite3")).unwrap();
        store
            .database()
            .execute(|conn| {
                conn.execute("DROP TABLE moves", [])?;
                Ok(())
            })
            .await
            .unwrap();

        assert!(matches!(
            store.load_all().await,
            Err(StorageError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn malformed_rows_decode_leniently() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path().join("moves.sqlite3")).unwrap();

        store
            .database()
            .execute(|conn| {
                conn.execute(
                    "INSERT INTO moves (features, label, created_at)
                     VALUES ('[1, \"bad\", null]', 99, '2026-01-01T00:00:00Z')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        store
            .database()
            .execute(|conn| {
                conn.execute(
                    "INSERT INTO moves (features, label, created_at)
                     VALUES ('oops', 'seven', 'yesterday')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let records = store.load_all().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].features, vec![Some(1.0), None, None]);
        assert_eq!(records[0].label, 99);
        assert!(records[1].features.is_empty());
        assert_eq!(records[1].label, -1);
    }
}
