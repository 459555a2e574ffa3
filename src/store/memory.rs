use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::anyhow;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::db::MoveRecord;
use crate::error::StorageError;
use crate::features::FeatureVector;

use super::{ModelStore, MoveStore};

#[derive(Default)]
struct MemoryState {
    moves: Vec<MoveRecord>,
    next_id: i64,
    weights: Option<Vec<u8>>,
}

/// Volatile backend for tests and throwaway sessions.
///
/// `set_failing(true)` makes every call return [`StorageError::Unavailable`].
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Stores a record verbatim, bypassing extraction. Lets tests plant
    /// malformed rows the way a damaged database would return them.
    pub async fn push_raw(&self, features: Vec<Option<f32>>, label: i64) -> i64 {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = state.next_id;
        state.moves.push(MoveRecord {
            id,
            features,
            label,
            created_at: Utc::now(),
        });
        id
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable("memory store set to fail".into()))
        } else {
            Ok(())
        }
    }
}

impl MoveStore for MemoryStore {
    async fn append(&self, features: &FeatureVector, label: u8) -> Result<i64, StorageError> {
        self.check()?;
        let stored = features.values().iter().map(|v| Some(*v)).collect();
        Ok(self.push_raw(stored, i64::from(label)).await)
    }

    async fn load_all(&self) -> Result<Vec<MoveRecord>, StorageError> {
        self.check()?;
        Ok(self.state.lock().await.moves.clone())
    }

    async fn clear_all(&self) -> Result<(), StorageError> {
        self.check()?;
        self.state.lock().await.moves.clear();
        Ok(())
    }
}

impl ModelStore for MemoryStore {
    async fn load_weights(&self) -> Result<Option<Vec<u8>>, StorageError> {
        self.check()?;
        Ok(self.state.lock().await.weights.clone())
    }

    async fn save_weights(&self, blob: Vec<u8>) -> Result<(), StorageError> {
        self.check()?;
        if blob.is_empty() {
            return Err(StorageError::Backend(anyhow!("refusing to store empty weights")));
        }
        self.state.lock().await.weights = Some(blob);
        Ok(())
    }

    async fn clear_weights(&self) -> Result<(), StorageError> {
        self.check()?;
        self.state.lock().await.weights = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_and_load_preserve_order() {
        let store = MemoryStore::new();
        for n in 0..30u8 {
            let vector = FeatureVector::sanitized([f32::from(n); 13]).0;
            store.append(&vector, n % 25).await.unwrap();
        }

        let records = store.load_all().await.unwrap();
        assert_eq!(records.len(), 30);
        assert!(records.windows(2).all(|pair| pair[0].id < pair[1].id));
        assert_eq!(records[29].features[0], Some(29.0));
    }

    #[tokio::test]
    async fn failing_store_reports_storage_errors() {
        let store = MemoryStore::new();
        store.set_failing(true);
        let vector = FeatureVector::zeros();
        assert!(matches!(
            store.append(&vector, 0).await,
            Err(StorageError::Unavailable(_))
        ));
        assert!(store.load_all().await.is_err());

        store.set_failing(false);
        assert!(store.append(&vector, 0).await.is_ok());
    }
}
