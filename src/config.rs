//! Environment-driven configuration.
//!
//! One binary covers every deployment target: the scratch directory, the
//! ffmpeg binaries, the archive backend and authentication are all injected
//! here instead of living in forked copies of the server.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::DEFAULT_MAX_UPLOAD_BYTES;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_FFMPEG_THREADS: usize = 1;
const DEFAULT_AWS_REGION: &str = "us-east-1";
const DEFAULT_MIN_CONFIDENCE: f32 = 80.0;
const DEFAULT_TOKEN_TTL_MINUTES: i64 = 60;
const DEFAULT_LOGIN_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_LOGIN_LOCKOUT_SECS: u64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
}

#[derive(Debug, Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub region: String,
    pub endpoint: Option<String>,
    pub credentials: AwsCredentials,
    pub min_confidence: f32,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub login_max_attempts: u32,
    pub login_lockout: Duration,
}

#[derive(Debug, Clone)]
pub enum ArchiveConfig {
    Local(PathBuf),
    Gcs { bucket: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub work_dir: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub ffmpeg_threads: usize,
    pub max_upload_bytes: usize,
    pub detector: DetectorConfig,
    pub auth: Option<AuthConfig>,
    pub archive: Option<ArchiveConfig>,
    pub log_level: String,
    pub log_format: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let credentials = AwsCredentials {
            access_key_id: required("AWS_ACCESS_KEY_ID")?,
            secret_access_key: required("AWS_SECRET_ACCESS_KEY")?,
            session_token: optional("AWS_SESSION_TOKEN"),
        };

        let detector = DetectorConfig {
            region: optional("AWS_REGION").unwrap_or_else(|| DEFAULT_AWS_REGION.to_string()),
            endpoint: optional("REKOGNITION_ENDPOINT"),
            credentials,
            min_confidence: positive("PPE_MIN_CONFIDENCE", DEFAULT_MIN_CONFIDENCE),
        };

        // Authentication is enabled by the presence of a database
        let auth = match optional("DATABASE_URL") {
            Some(database_url) => Some(AuthConfig {
                database_url,
                jwt_secret: required("JWT_SECRET")?,
                token_ttl: chrono::Duration::minutes(positive(
                    "TOKEN_TTL_MINUTES",
                    DEFAULT_TOKEN_TTL_MINUTES,
                )),
                login_max_attempts: positive("LOGIN_MAX_ATTEMPTS", DEFAULT_LOGIN_MAX_ATTEMPTS),
                login_lockout: Duration::from_secs(positive(
                    "LOGIN_LOCKOUT_SECS",
                    DEFAULT_LOGIN_LOCKOUT_SECS,
                )),
            }),
            None => None,
        };

        let archive = if let Some(path) = optional("ARCHIVE_LOCAL_PATH") {
            Some(ArchiveConfig::Local(PathBuf::from(path)))
        } else {
            optional("ARCHIVE_GCS_BUCKET").map(|bucket| ArchiveConfig::Gcs { bucket })
        };

        Ok(Self {
            port: positive("PORT", DEFAULT_PORT),
            work_dir: optional("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(env::temp_dir),
            ffmpeg_path: PathBuf::from(optional("FFMPEG_PATH").unwrap_or_else(|| "ffmpeg".into())),
            ffprobe_path: PathBuf::from(
                optional("FFPROBE_PATH").unwrap_or_else(|| "ffprobe".into()),
            ),
            ffmpeg_threads: positive("FFMPEG_THREADS", DEFAULT_FFMPEG_THREADS),
            max_upload_bytes: positive("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
            detector,
            auth,
            archive,
            log_level: optional("LOG_LEVEL").unwrap_or_else(|| "info".into()),
            log_format: optional("LOG_FORMAT").unwrap_or_else(|| "plain".into()),
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    optional(key).ok_or(ConfigError::Missing(key))
}

/// Parse a strictly positive number, falling back to `default` when the
/// variable is unset, malformed, or not positive.
fn positive<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + PartialOrd + Default,
{
    parse_positive(optional(key).as_deref(), default)
}

fn parse_positive<T>(raw: Option<&str>, default: T) -> T
where
    T: std::str::FromStr + PartialOrd + Default,
{
    raw.and_then(|s| s.trim().parse().ok())
        .filter(|v| *v > T::default())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_positive_falls_back() {
        assert_eq!(parse_positive(None, 3u32), 3);
        assert_eq!(parse_positive(Some("abc"), 3u32), 3);
        assert_eq!(parse_positive(Some("0"), 3u32), 3);
        assert_eq!(parse_positive(Some("-5"), 60i64), 60);
        assert_eq!(parse_positive(Some(" 12 "), 3u32), 12);
        assert_eq!(parse_positive(Some("72.5"), 80.0f32), 72.5);
    }
}
