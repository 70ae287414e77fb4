//! Error handling for route handlers
//!
//! Every failure leaves a handler as an [`ApiError`], rendered as
//! `{ "success": false, "error": "..." }` with a matching status code.
//! Internal details are logged, never returned to the client.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::pipeline::PipelineError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No video file uploaded")]
    MissingUpload,

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Too many failed login attempts, try again later")]
    TooManyAttempts,

    #[error("Video processing failed: {0}")]
    Transcode(String),

    #[error("Detection service failed: {0}")]
    Detector(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unauthorized<T: Into<String>>(msg: T) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn internal<T: Into<String>>(msg: T) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingUpload | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Detector(_) => StatusCode::BAD_GATEWAY,
            ApiError::Transcode(_) | ApiError::Database(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show to clients
    fn public_message(&self) -> String {
        match self {
            ApiError::Transcode(_) => "Failed to process video".to_string(),
            ApiError::Detector(_) => "Failed to analyze video".to_string(),
            ApiError::Database(_) | ApiError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Detector(e) => ApiError::Detector(e.to_string()),
            PipelineError::Join(e) => ApiError::Internal(e.to_string()),
            other => ApiError::Transcode(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "request failed");
        } else {
            tracing::warn!(status = %status, error = %self, "request rejected");
        }

        let body = Json(json!({
            "success": false,
            "error": self.public_message(),
        }));
        (status, body).into_response()
    }
}

/// Extension trait for logging errors and converting to ApiError
pub trait LogErr<T> {
    /// Log error with context and return an internal error
    fn log_500(self, context: &str) -> Result<T, ApiError>;
}

impl<T, E: std::fmt::Display> LogErr<T> for Result<T, E> {
    fn log_500(self, context: &str) -> Result<T, ApiError> {
        self.map_err(|e| {
            tracing::error!(error = %e, "{}", context);
            ApiError::internal(format!("{}: {}", context, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::DetectorError;
    use crate::frames::FrameError;
    use axum::{Router, body::Body, http::Request, routing::get};
    use tower::ServiceExt;

    async fn missing_upload_handler() -> Result<&'static str, ApiError> {
        Err(ApiError::MissingUpload)
    }

    async fn db_error_handler() -> Result<&'static str, ApiError> {
        Err(ApiError::Database(sqlx::Error::RowNotFound))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_missing_upload_response() {
        let app = Router::new().route("/test", get(missing_upload_handler));
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "No video file uploaded");
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let app = Router::new().route("/test", get(db_error_handler));
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["error"], "Internal server error");
    }

    #[test]
    fn test_pipeline_error_mapping() {
        let err: ApiError = PipelineError::Frames(FrameError::NoFrames).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(matches!(err, ApiError::Transcode(_)));

        let err: ApiError = PipelineError::Detector(DetectorError::Api {
            status: 400,
            body: "bad image".into(),
        })
        .into();
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_log_500() {
        let result: Result<(), String> = Err("disk full".to_string());
        let err = result.log_500("Archive error").unwrap_err();
        assert!(matches!(err, ApiError::Internal(msg) if msg == "Archive error: disk full"));
    }
}
