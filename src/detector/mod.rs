//! Protective-equipment detection
//!
//! The detector itself is an external service. This module defines the seam
//! the pipeline talks to and reshapes raw detections into [`PersonPpe`]
//! records.

pub mod rekognition;
pub mod sigv4;

use async_trait::async_trait;

use crate::models::{Attribute, PersonPpe};

pub use rekognition::RekognitionClient;

#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("detector request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("detector returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("detector response could not be parsed: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectedEquipment {
    /// e.g. `FACE_COVER`, `HEAD_COVER`, `HAND_COVER`
    pub kind: String,
    pub confidence: Option<f32>,
    /// `None` when the detector did not say whether the part is covered
    pub covers_body_part: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectedBodyPart {
    /// e.g. `FACE`, `HEAD`, `LEFT_HAND`, `RIGHT_HAND`
    pub name: String,
    pub confidence: Option<f32>,
    pub equipment: Vec<DetectedEquipment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectedPerson {
    pub id: Option<i64>,
    pub confidence: Option<f32>,
    pub body_parts: Vec<DetectedBodyPart>,
}

#[async_trait]
pub trait PpeDetector: Send + Sync {
    /// Detect persons and their equipment in one encoded image.
    async fn detect(&self, image: &[u8]) -> Result<Vec<DetectedPerson>, DetectorError>;
}

fn max_confidence(a: Option<f32>, b: Option<f32>) -> Option<f32> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

fn body_part(person: &DetectedPerson, name: &str) -> Attribute {
    person
        .body_parts
        .iter()
        .filter(|part| part.name.eq_ignore_ascii_case(name))
        .fold(Attribute::default(), |acc, part| {
            Attribute::present(max_confidence(acc.confidence, part.confidence))
        })
}

fn equipment(person: &DetectedPerson, kind: &str) -> Attribute {
    person
        .body_parts
        .iter()
        .flat_map(|part| part.equipment.iter())
        .filter(|eq| eq.kind.eq_ignore_ascii_case(kind) && eq.covers_body_part != Some(false))
        .fold(Attribute::default(), |acc, eq| {
            Attribute::present(max_confidence(acc.confidence, eq.confidence))
        })
}

/// Reshape a raw detection into the full attribute set.
pub fn normalize(person: &DetectedPerson) -> PersonPpe {
    let mut body = body_part(person, "BODY");
    if !body.detected {
        // Rekognition reports no BODY part; the person detection is the body
        body = Attribute::present(person.confidence);
    }

    PersonPpe {
        person_id: person.id,
        person_confidence: person.confidence,
        face: body_part(person, "FACE"),
        face_cover: equipment(person, "FACE_COVER"),
        head: body_part(person, "HEAD"),
        head_cover: equipment(person, "HEAD_COVER"),
        body,
        body_cover: equipment(person, "BODY_COVER"),
        hand_cover: equipment(person, "HAND_COVER"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(name: &str, confidence: f32, equipment: Vec<DetectedEquipment>) -> DetectedBodyPart {
        DetectedBodyPart {
            name: name.to_string(),
            confidence: Some(confidence),
            equipment,
        }
    }

    fn gear(kind: &str, confidence: f32, covers: Option<bool>) -> DetectedEquipment {
        DetectedEquipment {
            kind: kind.to_string(),
            confidence: Some(confidence),
            covers_body_part: covers,
        }
    }

    #[test]
    fn test_normalize_full_person() {
        let person = DetectedPerson {
            id: Some(0),
            confidence: Some(99.1),
            body_parts: vec![
                part("FACE", 98.0, vec![gear("FACE_COVER", 95.5, Some(true))]),
                part("HEAD", 97.0, vec![gear("HEAD_COVER", 91.0, Some(true))]),
                part("LEFT_HAND", 90.0, vec![gear("HAND_COVER", 80.0, Some(true))]),
                part("RIGHT_HAND", 92.0, vec![gear("HAND_COVER", 88.0, None)]),
            ],
        };

        let ppe = normalize(&person);
        assert_eq!(ppe.person_id, Some(0));
        assert_eq!(ppe.face, Attribute::present(Some(98.0)));
        assert_eq!(ppe.face_cover, Attribute::present(Some(95.5)));
        assert_eq!(ppe.head, Attribute::present(Some(97.0)));
        assert_eq!(ppe.head_cover, Attribute::present(Some(91.0)));
        assert_eq!(ppe.body, Attribute::present(Some(99.1)));
        assert!(!ppe.body_cover.detected);
        assert_eq!(ppe.hand_cover, Attribute::present(Some(88.0)));
    }

    #[test]
    fn test_uncovering_equipment_is_ignored() {
        let person = DetectedPerson {
            id: None,
            confidence: Some(70.0),
            body_parts: vec![part(
                "FACE",
                80.0,
                vec![gear("FACE_COVER", 85.0, Some(false))],
            )],
        };

        let ppe = normalize(&person);
        assert!(ppe.face.detected);
        assert_eq!(ppe.face_cover, Attribute::default());
        assert!(!ppe.head.detected);
        assert!(!ppe.hand_cover.detected);
    }

    #[test]
    fn test_explicit_body_part_wins() {
        let person = DetectedPerson {
            id: Some(3),
            confidence: Some(60.0),
            body_parts: vec![part("BODY", 75.0, vec![gear("BODY_COVER", 70.0, Some(true))])],
        };

        let ppe = normalize(&person);
        assert_eq!(ppe.body, Attribute::present(Some(75.0)));
        assert_eq!(ppe.body_cover, Attribute::present(Some(70.0)));
    }

    #[test]
    fn test_serialized_shape_keeps_every_attribute() {
        let ppe = normalize(&DetectedPerson {
            id: None,
            confidence: None,
            body_parts: vec![],
        });
        let json = serde_json::to_value(&ppe).unwrap();

        for key in ["face", "faceCover", "head", "headCover", "body", "bodyCover", "handCover"] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(json["faceCover"]["detected"], false);
        assert!(json.get("personId").is_none());
    }
}
