//! Storage seam for the learning pipeline.
//!
//! Two collections: an ordered append-only move log and a single weights blob.
//! The pipeline only talks to these traits, so the SQLite backend and the
//! in-memory test backend are interchangeable.

use std::future::Future;

use crate::db::MoveRecord;
use crate::error::StorageError;
use crate::features::FeatureVector;

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Durable, ordered, append-only move log.
pub trait MoveStore: Send + Sync + 'static {
    /// Persists one move and returns its id. Ids strictly increase.
    fn append(
        &self,
        features: &FeatureVector,
        label: u8,
    ) -> impl Future<Output = Result<i64, StorageError>> + Send;

    /// All records in append order.
    fn load_all(&self) -> impl Future<Output = Result<Vec<MoveRecord>, StorageError>> + Send;

    /// Destroys every record. Explicit reset only.
    fn clear_all(&self) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// Single-blob collection for serialized classifier weights.
pub trait ModelStore: Send + Sync + 'static {
    fn load_weights(&self) -> impl Future<Output = Result<Option<Vec<u8>>, StorageError>> + Send;

    fn save_weights(&self, blob: Vec<u8>) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn clear_weights(&self) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// Everything a session needs from its backend.
pub trait KeyValueStore: MoveStore + ModelStore {}

impl<T: MoveStore + ModelStore> KeyValueStore for T {}
