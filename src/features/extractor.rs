//! Pointer event → fixed-length feature vector.

use serde::{Deserialize, Serialize};

pub const FEATURE_DIM: usize = 13;

const TIMESTAMP_MODULUS: f64 = 100_000.0;

/// Pointer device that produced an interaction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PointerKind {
    Mouse,
    Touch,
    Pen,
    #[default]
    #[serde(other)]
    Unknown,
}

impl PointerKind {
    pub fn code(self) -> f32 {
        match self {
            PointerKind::Mouse => 0.0,
            PointerKind::Touch => 1.0,
            PointerKind::Pen | PointerKind::Unknown => 2.0,
        }
    }
}

/// Raw pointer interaction as delivered by the game surface. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct InteractionEvent {
    pub client_x: f64,
    pub client_y: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub screen_x: f64,
    pub screen_y: f64,
    pub page_x: f64,
    pub page_y: f64,
    #[serde(default)]
    pub movement_x: Option<f64>,
    #[serde(default)]
    pub movement_y: Option<f64>,
    #[serde(default)]
    pub pressure: Option<f64>,
    #[serde(default)]
    pub pointer_type: PointerKind,
    /// Milliseconds since the surface was created.
    pub time_stamp: f64,
}

/// Ordered 13-float encoding of one event. Every entry is finite.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FeatureVector([f32; FEATURE_DIM]);

impl FeatureVector {
    /// Builds a vector, replacing non-finite entries with zero.
    /// Returns the vector and how many entries had to be replaced.
    pub fn sanitized(values: [f32; FEATURE_DIM]) -> (Self, usize) {
        let mut replaced = 0;
        let mut out = values;
        for value in out.iter_mut() {
            if !value.is_finite() {
                *value = 0.0;
                replaced += 1;
            }
        }
        (Self(out), replaced)
    }

    pub fn zeros() -> Self {
        Self([0.0; FEATURE_DIM])
    }

    pub fn values(&self) -> &[f32; FEATURE_DIM] {
        &self.0
    }

    pub fn get(&self, index: usize) -> Option<f32> {
        self.0.get(index).copied()
    }
}

/// Encodes an event. Total and deterministic: missing movement and pressure
/// read as zero, non-finite inputs are zeroed.
pub fn extract_features(event: &InteractionEvent) -> FeatureVector {
    let raw = [
        event.client_x as f32,
        event.client_y as f32,
        event.offset_x as f32,
        event.offset_y as f32,
        event.screen_x as f32,
        event.screen_y as f32,
        event.page_x as f32,
        event.page_y as f32,
        event.movement_x.unwrap_or(0.0) as f32,
        event.movement_y.unwrap_or(0.0) as f32,
        event.pressure.unwrap_or(0.0) as f32,
        event.pointer_type.code(),
        event.time_stamp.rem_euclid(TIMESTAMP_MODULUS) as f32,
    ];

    let (vector, replaced) = FeatureVector::sanitized(raw);
    if replaced > 0 {
        log::debug!("zeroed {replaced} non-finite event fields during extraction");
    }
    vector
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> InteractionEvent {
        InteractionEvent {
            client_x: 412.0,
            client_y: 230.5,
            offset_x: 32.0,
            offset_y: 18.0,
            screen_x: 1412.0,
            screen_y: 530.5,
            page_x: 412.0,
            page_y: 830.5,
            movement_x: Some(-3.0),
            movement_y: Some(4.0),
            pressure: Some(0.5),
            pointer_type: PointerKind::Mouse,
            time_stamp: 123_456.75,
        }
    }

    #[test]
    fn extraction_is_deterministic() {
        let event = sample_event();
        let first = extract_features(&event);
        let second = extract_features(&event.clone());

        let first_bits: Vec<u32> = first.values().iter().map(|v| v.to_bits()).collect();
        let second_bits: Vec<u32> = second.values().iter().map(|v| v.to_bits()).collect();
        assert_eq!(first_bits, second_bits);
    }

    #[test]
    fn output_follows_field_order() {
        let vector = extract_features(&sample_event());
        assert_eq!(
            vector.values(),
            &[
                412.0, 230.5, 32.0, 18.0, 1412.0, 530.5, 412.0, 830.5, -3.0, 4.0, 0.5, 0.0,
                23_456.75
            ]
        );
    }

    #[test]
    fn missing_movement_reads_as_zero() {
        let mut event = sample_event();
        event.movement_x = None;
        event.movement_y = None;
        event.pressure = None;

        let vector = extract_features(&event);
        assert_eq!(vector.get(8), Some(0.0));
        assert_eq!(vector.get(9), Some(0.0));
        assert_eq!(vector.get(10), Some(0.0));
    }

    #[test]
    fn pointer_kinds_are_encoded() {
        let mut event = sample_event();
        event.pointer_type = PointerKind::Touch;
        assert_eq!(extract_features(&event).get(11), Some(1.0));
        event.pointer_type = PointerKind::Pen;
        assert_eq!(extract_features(&event).get(11), Some(2.0));
        event.pointer_type = PointerKind::Unknown;
        assert_eq!(extract_features(&event).get(11), Some(2.0));
    }

    #[test]
    fn non_finite_fields_are_zeroed() {
        let mut event = sample_event();
        event.client_x = f64::NAN;
        event.page_y = f64::INFINITY;

        let vector = extract_features(&event);
        assert!(vector.values().iter().all(|v| v.is_finite()));
        assert_eq!(vector.get(0), Some(0.0));
        assert_eq!(vector.get(7), Some(0.0));
    }

    #[test]
    fn unknown_pointer_type_deserializes() {
        let event: InteractionEvent = serde_json::from_str(
            r#"{"clientX":1,"clientY":2,"offsetX":3,"offsetY":4,"screenX":5,"screenY":6,
                "pageX":7,"pageY":8,"pointerType":"stylus","timeStamp":9}"#,
        )
        .unwrap();
        assert_eq!(event.pointer_type, PointerKind::Unknown);
        assert_eq!(event.movement_x, None);
    }
}
