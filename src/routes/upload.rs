//! Video upload and PPE analysis

use axum::{
    Json, Router,
    extract::{
        Multipart, State,
        multipart::{Field, MultipartRejection},
    },
    http::HeaderMap,
    routing::post,
};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;

use crate::AppState;
use crate::constants::{SCRATCH_DIR_PREFIX, VIDEO_FIELD};
use crate::domain::logs;
use crate::models::{FrameAnalysis, UploadResponse};
use crate::routes::auth::get_user_id_from_bearer;
use crate::services::error::{ApiError, LogErr};
use crate::storage::{archive_key, get_extension};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/upload", post(upload))
}

/// A video written to its per-request scratch directory.
/// The directory and everything in it is removed when this is dropped.
struct ReceivedVideo {
    scratch: TempDir,
    path: PathBuf,
    ext: &'static str,
    bytes: u64,
}

/// POST /upload - Analyze the multipart `video` field for PPE, one frame per second
async fn upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let user_id = match &state.auth {
        Some(auth) => Some(get_user_id_from_bearer(auth, &headers).await?),
        None => None,
    };

    // Not a multipart body at all is treated the same as a missing file
    let mut multipart = multipart.map_err(|_| ApiError::MissingUpload)?;
    let video = receive_video(&state, &mut multipart)
        .await?
        .ok_or(ApiError::MissingUpload)?;

    tracing::info!(user_id = ?user_id, bytes = video.bytes, "video received");

    let result = analyze_upload(&state, user_id, &video).await;

    if let (Some(auth), Some(user_id)) = (&state.auth, user_id) {
        if let Err(e) = logs::record_request_outcome(&auth.db, user_id, result.is_ok()).await {
            tracing::warn!(user_id, error = %e, "failed to record request outcome");
        }
    }

    let ppe_data = result?;
    tracing::info!(user_id = ?user_id, frames = ppe_data.len(), "video analyzed");

    Ok(Json(UploadResponse {
        success: true,
        ppe_data,
    }))
}

async fn analyze_upload(
    state: &AppState,
    user_id: Option<i64>,
    video: &ReceivedVideo,
) -> Result<Vec<FrameAnalysis>, ApiError> {
    if let Some(archive) = &state.archive {
        let key = archive_key(user_id, Utc::now(), video.ext);
        match archive.store_file(&video.path, &key).await {
            Ok(()) => tracing::debug!(key = %key, "upload archived"),
            Err(e) => tracing::warn!(key = %key, error = %e, "failed to archive upload"),
        }
    }

    Ok(state.pipeline.run(&video.path, video.scratch.path()).await?)
}

/// Find the video field and stream it to disk.
/// Returns `None` when the field is absent or empty.
async fn receive_video(
    state: &AppState,
    multipart: &mut Multipart,
) -> Result<Option<ReceivedVideo>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(e.body_text()))?
    {
        if field.name() != Some(VIDEO_FIELD) {
            continue;
        }
        return save_field(state, field).await;
    }

    Ok(None)
}

async fn save_field(
    state: &AppState,
    mut field: Field<'_>,
) -> Result<Option<ReceivedVideo>, ApiError> {
    let ext = get_extension(field.content_type(), field.file_name());

    tokio::fs::create_dir_all(&state.work_dir)
        .await
        .log_500("Failed to create work directory")?;
    let scratch = tempfile::Builder::new()
        .prefix(SCRATCH_DIR_PREFIX)
        .tempdir_in(&state.work_dir)
        .log_500("Failed to create scratch directory")?;

    let path = scratch.path().join(format!("input.{}", ext));
    let mut file = tokio::fs::File::create(&path)
        .await
        .log_500("Failed to create upload file")?;

    let mut bytes = 0u64;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ApiError::validation(e.body_text()))?
    {
        file.write_all(&chunk)
            .await
            .log_500("Failed to write upload")?;
        bytes += chunk.len() as u64;
    }
    file.flush().await.log_500("Failed to write upload")?;

    if bytes == 0 {
        return Ok(None);
    }

    Ok(Some(ReceivedVideo {
        scratch,
        path,
        ext,
        bytes,
    }))
}
