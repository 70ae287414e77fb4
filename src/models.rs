//! Shared data models used across modules

use serde::Serialize;

/// Presence flag plus detector confidence (percent) for one PPE attribute
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Attribute {
    pub detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl Attribute {
    pub fn present(confidence: Option<f32>) -> Self {
        Self {
            detected: true,
            confidence,
        }
    }
}

/// Normalized equipment record for one detected person.
/// Every attribute is always serialized, absent ones as `detected: false`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonPpe {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_confidence: Option<f32>,
    pub face: Attribute,
    pub face_cover: Attribute,
    pub head: Attribute,
    pub head_cover: Attribute,
    pub body: Attribute,
    pub body_cover: Attribute,
    pub hand_cover: Attribute,
}

/// Detection results for a single sampled frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameAnalysis {
    /// 1-based sequence number of the extracted frame
    pub frame: u32,
    pub timestamp_secs: f64,
    pub persons: Vec<PersonPpe>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub ppe_data: Vec<FrameAnalysis>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub success: bool,
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_upload_response_wire_shape() {
        let response = UploadResponse {
            success: true,
            ppe_data: vec![FrameAnalysis {
                frame: 1,
                timestamp_secs: 0.0,
                persons: vec![PersonPpe {
                    person_id: Some(0),
                    face_cover: Attribute::present(Some(97.5)),
                    ..PersonPpe::default()
                }],
            }],
        };

        let value = serde_json::to_value(&response).unwrap();
        let person = &value["ppeData"][0]["persons"][0];

        assert_eq!(value["success"], true);
        assert_eq!(value["ppeData"][0]["frame"], 1);
        assert_eq!(value["ppeData"][0]["timestampSecs"], 0.0);
        assert_eq!(person["personId"], 0);
        assert!(person.get("personConfidence").is_none());
        assert_eq!(person["faceCover"], json!({"detected": true, "confidence": 97.5}));
        assert_eq!(person["handCover"], json!({"detected": false}));
    }
}
