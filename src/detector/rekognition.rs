//! AWS Rekognition `DetectProtectiveEquipment` client

use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::sigv4::{self, SigningParams};
use super::{DetectedBodyPart, DetectedEquipment, DetectedPerson, DetectorError, PpeDetector};
use crate::config::DetectorConfig;
use crate::constants::REQUIRED_EQUIPMENT_TYPES;

const SERVICE: &str = "rekognition";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const TARGET: &str = "RekognitionService.DetectProtectiveEquipment";

#[derive(Clone)]
pub struct RekognitionClient {
    config: DetectorConfig,
    endpoint: String,
    host: String,
    http: Client,
}

impl RekognitionClient {
    pub fn new(config: DetectorConfig) -> Self {
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://rekognition.{}.amazonaws.com", config.region));
        let host = host_of(&endpoint);

        Self {
            config,
            endpoint,
            host,
            http: Client::new(),
        }
    }
}

/// Host (and port) portion of an endpoint URL, as it must appear in the
/// signed `host` header.
fn host_of(endpoint: &str) -> String {
    let without_scheme = endpoint
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(endpoint);
    without_scheme
        .split('/')
        .next()
        .unwrap_or(without_scheme)
        .to_string()
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DetectRequest<'a> {
    image: ImagePayload,
    summarization_attributes: SummarizationAttributes<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ImagePayload {
    bytes: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SummarizationAttributes<'a> {
    min_confidence: f32,
    required_equipment_types: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DetectResponse {
    #[serde(default)]
    persons: Vec<ResponsePerson>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResponsePerson {
    id: Option<i64>,
    confidence: Option<f32>,
    #[serde(default)]
    body_parts: Vec<ResponseBodyPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResponseBodyPart {
    name: String,
    confidence: Option<f32>,
    #[serde(default)]
    equipment_detections: Vec<ResponseEquipment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResponseEquipment {
    #[serde(rename = "Type")]
    kind: String,
    confidence: Option<f32>,
    covers_body_part: Option<CoversBodyPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CoversBodyPart {
    value: bool,
}

impl From<ResponsePerson> for DetectedPerson {
    fn from(p: ResponsePerson) -> Self {
        Self {
            id: p.id,
            confidence: p.confidence,
            body_parts: p
                .body_parts
                .into_iter()
                .map(|part| DetectedBodyPart {
                    name: part.name,
                    confidence: part.confidence,
                    equipment: part
                        .equipment_detections
                        .into_iter()
                        .map(|eq| DetectedEquipment {
                            kind: eq.kind,
                            confidence: eq.confidence,
                            covers_body_part: eq.covers_body_part.map(|c| c.value),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

fn parse_response(body: &[u8]) -> Result<Vec<DetectedPerson>, DetectorError> {
    let response: DetectResponse = serde_json::from_slice(body)?;
    Ok(response.persons.into_iter().map(DetectedPerson::from).collect())
}

#[async_trait]
impl PpeDetector for RekognitionClient {
    async fn detect(&self, image: &[u8]) -> Result<Vec<DetectedPerson>, DetectorError> {
        let request = DetectRequest {
            image: ImagePayload {
                bytes: base64::engine::general_purpose::STANDARD.encode(image),
            },
            summarization_attributes: SummarizationAttributes {
                min_confidence: self.config.min_confidence,
                required_equipment_types: &REQUIRED_EQUIPMENT_TYPES,
            },
        };
        let payload = serde_json::to_vec(&request)?;

        let signed = sigv4::sign_request(
            &SigningParams {
                credentials: &self.config.credentials,
                region: &self.config.region,
                service: SERVICE,
                host: &self.host,
                content_type: CONTENT_TYPE,
                target: TARGET,
            },
            &payload,
            Utc::now(),
        );

        let mut builder = self
            .http
            .post(&self.endpoint)
            .header("Content-Type", CONTENT_TYPE)
            .header("X-Amz-Target", TARGET)
            .header("X-Amz-Date", &signed.amz_date)
            .header("Authorization", &signed.authorization);
        if let Some(token) = &signed.security_token {
            builder = builder.header("X-Amz-Security-Token", token);
        }

        let resp = builder.body(payload).send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;

        if !status.is_success() {
            return Err(DetectorError::Api {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        parse_response(&body)
    }
}
