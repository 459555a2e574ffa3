//! Persisted move observation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the move log, as read back from storage.
///
/// `features` is kept exactly as decoded: entries that were not numeric are
/// `None` and the length is not guaranteed to be 13. `label` is likewise the
/// raw stored integer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoveRecord {
    pub id: i64,
    pub features: Vec<Option<f32>>,
    pub label: i64,
    pub created_at: DateTime<Utc>,
}
