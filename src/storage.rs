//! Upload archive backends.
//!
//! Uploaded videos can be kept on local disk or in GCS after analysis. The
//! backend is chosen at startup; with neither configured nothing is archived.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use google_cloud_storage::client::Storage;
use std::path::{Path, PathBuf};

use crate::config::ArchiveConfig;

#[derive(Clone)]
pub enum Archive {
    Local(PathBuf),
    Gcs { client: Storage, bucket: String },
}

impl Archive {
    pub async fn from_config(
        config: &ArchiveConfig,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        match config {
            ArchiveConfig::Local(path) => {
                tokio::fs::create_dir_all(path).await?;
                Ok(Archive::Local(path.clone()))
            }
            ArchiveConfig::Gcs { bucket } => {
                // GCS client uses GOOGLE_APPLICATION_CREDENTIALS env var
                let client = Storage::builder().build().await?;
                Ok(Archive::Gcs {
                    client,
                    bucket: bucket.clone(),
                })
            }
        }
    }

    /// Copy the file at `source` to `key` in the archive.
    pub async fn store_file(
        &self,
        source: &Path,
        key: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        match self {
            Archive::Local(root) => {
                let full_path = root.join(key);
                if let Some(parent) = full_path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::copy(source, &full_path).await?;
            }
            Archive::Gcs { client, bucket } => {
                let data = tokio::fs::read(source).await?;
                let bucket = format!("projects/_/buckets/{}", bucket);
                client
                    .write_object(&bucket, key, Bytes::from(data))
                    .send_buffered()
                    .await?;
            }
        }
        Ok(())
    }
}

/// Object key for an archived upload.
/// e.g. `uploads/user_7/2025-01-01/1735689600000_1a2b3c4d.mp4`
pub fn archive_key(user_id: Option<i64>, now: DateTime<Utc>, ext: &str) -> String {
    let owner = match user_id {
        Some(id) => format!("user_{}", id),
        None => "anonymous".to_string(),
    };
    // Random suffix keeps concurrent uploads in the same millisecond apart
    format!(
        "uploads/{}/{}/{}_{:08x}.{}",
        owner,
        now.format("%Y-%m-%d"),
        now.timestamp_millis(),
        rand::random::<u32>(),
        ext
    )
}

/// File extension for an uploaded video
pub fn get_extension(content_type: Option<&str>, file_name: Option<&str>) -> &'static str {
    match content_type {
        Some("video/mp4") => return "mp4",
        Some("video/webm") => return "webm",
        Some("video/quicktime") => return "mov",
        Some("video/x-msvideo") => return "avi",
        Some("video/x-matroska") => return "mkv",
        _ => {}
    }

    let ext = file_name
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("mp4") => "mp4",
        Some("webm") => "webm",
        Some("mov") => "mov",
        Some("avi") => "avi",
        Some("mkv") => "mkv",
        _ => "bin",
    }
}
