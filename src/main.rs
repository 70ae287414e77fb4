mod compress;
mod config;
mod constants;
mod detector;
mod domain;
mod frames;
mod logging;
mod models;
mod pipeline;
mod routes;
mod services;
mod storage;

use axum::{Router, extract::DefaultBodyLimit};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use compress::CompressionPolicy;
use config::{AuthConfig, Config};
use detector::RekognitionClient;
use frames::Ffmpeg;
use pipeline::Pipeline;
use services::login_guard::{LoginGuard, LoginGuardConfig};
use storage::Archive;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// How often stale login failure records are swept
const LOGIN_GUARD_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

pub struct AuthState {
    pub db: PgPool,
    pub jwt_secret: Vec<u8>,
    pub token_ttl: chrono::Duration,
    pub login_guard: LoginGuard,
}

pub struct AppState {
    pub work_dir: PathBuf,
    pub pipeline: Pipeline,
    pub archive: Option<Archive>,
    /// `None` when no database is configured; uploads are then anonymous
    pub auth: Option<AuthState>,
}

fn build_app(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    routes::build_routes(state.auth.is_some())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn connect_auth(config: &AuthConfig) -> Result<AuthState, BoxError> {
    let db = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&db).await?;
    tracing::info!("database migrations applied");

    Ok(AuthState {
        db,
        jwt_secret: config.jwt_secret.as_bytes().to_vec(),
        token_ttl: config.token_ttl,
        login_guard: LoginGuard::new(LoginGuardConfig {
            max_attempts: config.login_max_attempts,
            lockout: config.login_lockout,
        }),
    })
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = Config::from_env()?;
    logging::init_logging(&config.log_level, &config.log_format);

    let auth = match &config.auth {
        Some(auth_config) => Some(connect_auth(auth_config).await?),
        None => {
            tracing::warn!("DATABASE_URL not set, authentication disabled");
            None
        }
    };

    let archive = match &config.archive {
        Some(archive_config) => Some(Archive::from_config(archive_config).await?),
        None => None,
    };

    let detector = Arc::new(RekognitionClient::new(config.detector.clone()));
    let ffmpeg = Ffmpeg::new(
        config.ffmpeg_path.clone(),
        config.ffprobe_path.clone(),
        config.ffmpeg_threads,
    );

    let state = Arc::new(AppState {
        work_dir: config.work_dir.clone(),
        pipeline: Pipeline::new(ffmpeg, CompressionPolicy::default(), detector),
        archive,
        auth,
    });

    if let Some(lockout) = config.auth.as_ref().map(|a| a.login_lockout) {
        let state = state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(LOGIN_GUARD_CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                if let Some(auth) = &state.auth {
                    auth.login_guard.cleanup(lockout);
                }
            }
        });
    }

    let app = build_app(state, config.max_upload_bytes);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    // Client addresses are needed by the auth rate limiter
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
