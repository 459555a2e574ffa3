use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::db::Database;

const CURRENT_WEIGHTS_KEY: &str = "current";

impl Database {
    pub async fn get_model_weights(&self) -> Result<Option<Vec<u8>>> {
        self.execute(|conn| {
            conn.query_row(
                "SELECT weights FROM model_weights WHERE key = ?1",
                params![CURRENT_WEIGHTS_KEY],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()
            .with_context(|| "failed to read model weights")
        })
        .await
    }

    /// Replaces the stored weights in a single statement.
    pub async fn upsert_model_weights(&self, weights: Vec<u8>) -> Result<()> {
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO model_weights (key, weights, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     weights = excluded.weights,
                     updated_at = excluded.updated_at",
                params![CURRENT_WEIGHTS_KEY, weights, Utc::now().to_rfc3339()],
            )
            .with_context(|| "failed to store model weights")?;
            Ok(())
        })
        .await
    }

    pub async fn delete_model_weights(&self) -> Result<()> {
        self.execute(|conn| {
            conn.execute(
                "DELETE FROM model_weights WHERE key = ?1",
                params![CURRENT_WEIGHTS_KEY],
            )
            .with_context(|| "failed to delete model weights")?;
            Ok(())
        })
        .await
    }
}
