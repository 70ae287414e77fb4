//! Signup and login endpoints, plus bearer-token resolution for uploads

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    routing::post,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};

use crate::{AppState, AuthState};
use crate::domain::{logs, users};
use crate::models::TokenResponse;
use crate::services::error::{ApiError, LogErr};
use crate::services::{password, session};

const MIN_PASSWORD_LEN: usize = 8;

pub fn routes() -> Router<Arc<AppState>> {
    // Rate limit auth endpoints per client IP to slow down brute force
    let rate_limit_config = GovernorConfigBuilder::default()
        .per_second(6) // one token replenished every 6 seconds
        .burst_size(10)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .expect("Failed to build rate limit config");

    let rate_limit_layer = GovernorLayer {
        config: rate_limit_config.into(),
    };

    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .layer(rate_limit_layer)
}

fn auth_state(state: &AppState) -> Result<&AuthState, ApiError> {
    state
        .auth
        .as_ref()
        .ok_or_else(|| ApiError::internal("authentication is not configured"))
}

/// Resolve the user behind an `Authorization: Bearer <token>` header
pub async fn get_user_id_from_bearer(
    auth: &AuthState,
    headers: &HeaderMap,
) -> Result<i64, ApiError> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Missing bearer token"))?;

    let user_id = session::validate_access_token(token, &auth.jwt_secret)
        .map_err(|e| ApiError::unauthorized(e.to_string()))?;

    // A valid token for a deleted user is still unauthorized
    if !users::user_exists(&auth.db, user_id).await? {
        return Err(ApiError::unauthorized("Invalid token"));
    }

    Ok(user_id)
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    username: String,
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

impl SignupRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.username.trim().is_empty() {
            return Err(ApiError::validation("Username is required"));
        }
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(ApiError::validation("A valid email is required"));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ApiError::validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        Ok(())
    }
}

fn issue_token(auth: &AuthState, user_id: i64) -> Result<String, ApiError> {
    session::create_access_token(user_id, &auth.jwt_secret, auth.token_ttl)
        .log_500("Failed to create access token")
}

/// POST /signup - Create an account and return a bearer token
async fn signup(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    let auth = auth_state(&state)?;
    let Json(req) = payload.map_err(|e| ApiError::validation(e.body_text()))?;
    req.validate()?;

    let username = req.username.trim().to_string();
    let candidate = req.password;
    let password_hash = tokio::task::spawn_blocking(move || password::hash_password(&candidate))
        .await
        .log_500("Password hashing task failed")?
        .log_500("Password hashing failed")?;

    let user_id = users::insert_user(&auth.db, &username, req.email.trim(), &password_hash)
        .await?
        .ok_or_else(|| ApiError::Conflict("Username already exists".to_string()))?;

    logs::insert_log(&auth.db, user_id, logs::ACTION_SIGNUP).await?;
    tracing::info!(user_id, username = %username, "user signed up");

    let token = issue_token(auth, user_id)?;
    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            success: true,
            token,
        }),
    ))
}

/// POST /login - Exchange username and password for a bearer token
async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let auth = auth_state(&state)?;
    let Json(req) = payload.map_err(|e| ApiError::validation(e.body_text()))?;

    let username = req.username.trim().to_string();
    if username.is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("Username and password are required"));
    }

    if auth.login_guard.is_locked(&username) {
        return Err(ApiError::TooManyAttempts);
    }

    let credentials = users::find_user_by_username(&auth.db, &username).await?;
    let candidate = req.password;
    let verified = match credentials {
        Some(creds) => {
            let hash = creds.password_hash;
            let ok =
                tokio::task::spawn_blocking(move || password::verify_password(&candidate, &hash))
                    .await
                    .log_500("Password verification task failed")?
                    .log_500("Password verification failed")?;
            ok.then_some(creds.id)
        }
        None => {
            // Unknown usernames cost the same hashing work as known ones
            tokio::task::spawn_blocking(move || password::verify_dummy(&candidate))
                .await
                .log_500("Password verification task failed")?;
            None
        }
    };

    let Some(user_id) = verified else {
        if auth.login_guard.record_failure(&username) {
            tracing::warn!(username = %username, "login locked after repeated failures");
        }
        return Err(ApiError::unauthorized("Invalid username or password"));
    };

    // A lockout may have started while the password was being verified
    if !auth.login_guard.record_success(&username) {
        return Err(ApiError::TooManyAttempts);
    }

    logs::insert_log(&auth.db, user_id, logs::ACTION_LOGIN).await?;
    tracing::info!(user_id, "user logged in");

    let token = issue_token(auth, user_id)?;
    Ok(Json(TokenResponse {
        success: true,
        token,
    }))
}
