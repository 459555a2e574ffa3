use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::params;

use crate::db::{
    helpers::{decode_features, encode_features, parse_datetime},
    models::MoveRecord,
    Database,
};
use crate::features::FeatureVector;

impl Database {
    /// Appends one move and returns its row id.
    pub async fn insert_move(&self, features: &FeatureVector, label: u8) -> Result<i64> {
        let features_json = encode_features(features)?;
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO moves (features, label, created_at) VALUES (?1, ?2, ?3)",
                params![features_json, i64::from(label), Utc::now().to_rfc3339()],
            )
            .with_context(|| "failed to insert move")?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Every move, ascending by id.
    pub async fn get_moves(&self) -> Result<Vec<MoveRecord>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, features, label, created_at
                 FROM moves
                 ORDER BY id ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut moves = Vec::new();
            while let Some(row) = rows.next()? {
                let id: i64 = row.get(0)?;
                let features: Option<String> = row.get(1).unwrap_or(None);
                let created_at: Option<String> = row.get(3).unwrap_or(None);
                moves.push(MoveRecord {
                    id,
                    features: features.as_deref().map(decode_features).unwrap_or_default(),
                    // Damaged labels surface as out-of-range and get repaired downstream.
                    label: row.get::<_, Option<i64>>(2).ok().flatten().unwrap_or(-1),
                    created_at: created_at
                        .as_deref()
                        .and_then(|raw| parse_datetime(raw, "created_at").ok())
                        .unwrap_or_default(),
                });
            }

            Ok(moves)
        })
        .await
    }

    pub async fn delete_all_moves(&self) -> Result<()> {
        self.execute(|conn| {
            conn.execute("DELETE FROM moves", [])
                .with_context(|| "failed to clear moves")?;
            Ok(())
        })
        .await
    }
}
