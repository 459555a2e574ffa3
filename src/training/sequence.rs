//! Sliding-window training pairs over a move log snapshot.
//!
//! Window `i` is records `[i, i + W)` as inputs with the label of record
//! `i + W` as target, so a log of `N` records yields `max(0, N - W)` windows.
//! Damaged records are repaired locally (zero-filled features, fallback label)
//! and reported as anomalies; they never abort the batch.

use serde::Serialize;

use crate::db::MoveRecord;
use crate::features::{FeatureVector, FALLBACK_LABEL, FEATURE_DIM, TILE_COUNT};

/// Fixed sequence length used by the classifier.
pub const WINDOW: usize = 10;

/// One training example.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceWindow {
    pub inputs: Vec<FeatureVector>,
    pub label: u8,
    /// Id of the record whose label is the target.
    pub target_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AnomalyKind {
    /// Entry missing or not a finite number; zero-filled.
    BadFeature { position: usize },
    /// Vector had the wrong number of entries; padded or truncated to 13.
    WrongLength { found: usize },
    /// Stored label outside the board; replaced by the fallback label.
    BadLabel { found: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    pub record_id: i64,
    pub kind: AnomalyKind,
}

#[derive(Debug, Clone, Default)]
pub struct SequenceBatch {
    pub windows: Vec<SequenceWindow>,
    pub anomalies: Vec<Anomaly>,
}

/// A record after local repair.
#[derive(Debug, Clone, Copy)]
pub struct RepairedMove {
    pub id: i64,
    pub features: FeatureVector,
    pub label: u8,
}

/// Repairs one stored record, pushing a note for every fix it had to make.
pub fn repair_record(record: &MoveRecord, anomalies: &mut Vec<Anomaly>) -> RepairedMove {
    let mut values = [0f32; FEATURE_DIM];

    if record.features.len() != FEATURE_DIM {
        anomalies.push(Anomaly {
            record_id: record.id,
            kind: AnomalyKind::WrongLength {
                found: record.features.len(),
            },
        });
    }

    for (position, slot) in values.iter_mut().enumerate() {
        match record.features.get(position) {
            Some(Some(value)) if value.is_finite() => *slot = *value,
            // Missing tail entries are already covered by WrongLength.
            None => {}
            Some(_) => anomalies.push(Anomaly {
                record_id: record.id,
                kind: AnomalyKind::BadFeature { position },
            }),
        }
    }

    let label = if (0..TILE_COUNT as i64).contains(&record.label) {
        record.label as u8
    } else {
        anomalies.push(Anomaly {
            record_id: record.id,
            kind: AnomalyKind::BadLabel {
                found: record.label,
            },
        });
        FALLBACK_LABEL
    };

    // Every slot is finite at this point, so nothing is replaced here.
    let (features, _) = FeatureVector::sanitized(values);
    RepairedMove {
        id: record.id,
        features,
        label,
    }
}

/// Builds every window over `records` (ascending by id).
pub fn build_sequences(records: &[MoveRecord], window: usize) -> SequenceBatch {
    build_sequences_from(records, window, 0)
}

/// Builds the windows whose target record index is `>= first_target`.
///
/// Only records that some returned window touches are repaired, so anomalies
/// in older history are not re-reported on every incremental cycle.
pub fn build_sequences_from(
    records: &[MoveRecord],
    window: usize,
    first_target: usize,
) -> SequenceBatch {
    let mut batch = SequenceBatch::default();
    if window == 0 || records.len() <= window {
        return batch;
    }

    let first_target = first_target.max(window);
    if first_target >= records.len() {
        return batch;
    }

    let start = first_target - window;
    let repaired: Vec<RepairedMove> = records[start..]
        .iter()
        .map(|record| repair_record(record, &mut batch.anomalies))
        .collect();

    log_anomalies(&batch.anomalies, "training");

    batch.windows = repaired
        .windows(window + 1)
        .map(|span| {
            let (inputs, target) = span.split_at(window);
            SequenceWindow {
                inputs: inputs.iter().map(|m| m.features).collect(),
                label: target[0].label,
                target_id: target[0].id,
            }
        })
        .collect();

    batch
}

/// The most recent `window` feature vectors, repaired, oldest first.
/// `None` when the log is shorter than the window.
pub fn latest_window(records: &[MoveRecord], window: usize) -> Option<Vec<FeatureVector>> {
    if window == 0 || records.len() < window {
        return None;
    }
    let mut anomalies = Vec::new();
    let recent = records[records.len() - window..]
        .iter()
        .map(|record| repair_record(record, &mut anomalies).features)
        .collect();
    log_anomalies(&anomalies, "prediction");
    Some(recent)
}

fn log_anomalies(anomalies: &[Anomaly], purpose: &str) {
    for anomaly in anomalies {
        log::warn!(
            "move {} repaired for {purpose}: {:?}",
            anomaly.record_id,
            anomaly.kind
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(id: i64, label: i64) -> MoveRecord {
        MoveRecord {
            id,
            features: (0..FEATURE_DIM).map(|j| Some(id as f32 + j as f32)).collect(),
            label,
            created_at: Utc::now(),
        }
    }

    fn log_of(n: usize) -> Vec<MoveRecord> {
        (1..=n as i64).map(|id| record(id, id % 25)).collect()
    }

    #[test]
    fn window_count_is_n_minus_w() {
        for n in 0..30 {
            let batch = build_sequences(&log_of(n), WINDOW);
            assert_eq!(batch.windows.len(), n.saturating_sub(WINDOW), "n = {n}");
        }
        assert_eq!(build_sequences(&log_of(5), 3).windows.len(), 2);
    }

    #[test]
    fn eleven_moves_make_one_pair_labelled_by_the_eleventh() {
        let mut log = log_of(11);
        log[10].label = 21;

        let batch = build_sequences(&log, WINDOW);
        assert_eq!(batch.windows.len(), 1);
        let pair = &batch.windows[0];
        assert_eq!(pair.label, 21);
        assert_eq!(pair.target_id, 11);
        assert_eq!(pair.inputs.len(), WINDOW);
        assert_eq!(pair.inputs[0].get(0), Some(1.0));
        assert_eq!(pair.inputs[9].get(0), Some(10.0));
    }

    #[test]
    fn malformed_record_only_degrades_windows_touching_it() {
        let mut log = log_of(14);
        log[2].features[4] = None;
        log[2].features[5] = Some(f32::NAN);

        let batch = build_sequences(&log, WINDOW);
        assert_eq!(batch.windows.len(), 4);
        assert_eq!(batch.anomalies.len(), 2);
        assert!(batch.anomalies.iter().all(|a| a.record_id == 3));

        // windows 0..=2 contain record 3 at positions 2, 1, 0; window 3 does not
        assert_eq!(batch.windows[0].inputs[2].get(4), Some(0.0));
        assert_eq!(batch.windows[0].inputs[2].get(5), Some(0.0));
        assert_eq!(batch.windows[0].inputs[2].get(6), Some(3.0 + 6.0));
        assert!(batch.windows[3]
            .inputs
            .iter()
            .all(|v| v.values().iter().all(|x| *x != 0.0)));
    }

    #[test]
    fn short_vectors_are_padded_and_bad_labels_fall_back() {
        let mut log = log_of(11);
        log[0].features.truncate(4);
        log[10].label = 77;

        let batch = build_sequences(&log, WINDOW);
        assert_eq!(batch.windows.len(), 1);
        assert_eq!(batch.windows[0].label, FALLBACK_LABEL);
        assert_eq!(batch.windows[0].inputs[0].get(12), Some(0.0));
        assert!(batch.anomalies.contains(&Anomaly {
            record_id: 1,
            kind: AnomalyKind::WrongLength { found: 4 }
        }));
        assert!(batch.anomalies.contains(&Anomaly {
            record_id: 11,
            kind: AnomalyKind::BadLabel { found: 77 }
        }));
    }

    #[test]
    fn incremental_build_skips_already_used_targets() {
        let log = log_of(25);
        let all = build_sequences(&log, WINDOW);
        let tail = build_sequences_from(&log, WINDOW, 20);

        assert_eq!(tail.windows.len(), 5);
        assert_eq!(tail.windows[..], all.windows[10..]);
        assert!(build_sequences_from(&log, WINDOW, 25).windows.is_empty());
    }

    #[test]
    fn latest_window_repairs_damaged_records() {
        let mut log = log_of(10);
        log[9].features[3] = None;
        log[9].features.truncate(8);

        let recent = latest_window(&log, WINDOW).unwrap();
        assert_eq!(recent[9].get(3), Some(0.0));
        assert_eq!(recent[9].get(12), Some(0.0));
        assert_eq!(recent[9].get(0), Some(10.0));
        assert!(recent.iter().all(|v| v.values().iter().all(|x| x.is_finite())));
    }

    #[test]
    fn latest_window_needs_a_full_window() {
        assert!(latest_window(&log_of(9), WINDOW).is_none());
        let recent = latest_window(&log_of(12), WINDOW).unwrap();
        assert_eq!(recent.len(), WINDOW);
        assert_eq!(recent[0].get(0), Some(3.0));
        assert_eq!(recent[9].get(0), Some(12.0));
    }
}
