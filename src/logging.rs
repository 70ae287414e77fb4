//! Structured logging setup

use tracing::Level;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn parse_level(log_level: &str) -> Level {
    match log_level.to_uppercase().as_str() {
        "TRACE" => Level::TRACE,
        "DEBUG" => Level::DEBUG,
        "INFO" => Level::INFO,
        "WARN" | "WARNING" => Level::WARN,
        "ERROR" => Level::ERROR,
        _ => {
            eprintln!("Invalid log level '{}', defaulting to INFO", log_level);
            Level::INFO
        }
    }
}

/// Install the global subscriber. `log_format` is `json` or `plain`.
pub fn init_logging(log_level: &str, log_format: &str) {
    let level = parse_level(log_level);

    // LOG_LEVEL wins over RUST_LOG so deployments behave the same everywhere
    let env_filter = EnvFilter::new(format!("ppe_api={},tower_http=info,sqlx=warn", level));
    let subscriber = tracing_subscriber::registry().with(env_filter);

    if log_format.eq_ignore_ascii_case("json") {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .init();
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }

    tracing::info!(log_level = %level, log_format = %log_format, "logging initialized");
}
