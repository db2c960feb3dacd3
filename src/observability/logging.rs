//! Structured logging.
//!
//! # Responsibilities
//! - Map the bootstrap logging level name to a tracing level
//! - Initialize the tracing subscriber once per process
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - `RUST_LOG`, when set, overrides the bootstrap level
//! - Unknown or empty level names fall back to `info`

use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::env;

/// Parse a logging level name. Case-insensitive; anything unknown is `info`.
pub fn parse_log_level(name: &str) -> Level {
    match name.trim().to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// The level named by `GATEWAY_LOGGING_LEVEL`.
pub fn log_level_from_env() -> Level {
    parse_log_level(&std::env::var(env::LOGGING_LEVEL).unwrap_or_default())
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_logging(level: Level) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
    if installed.is_ok() {
        tracing::info!(level = %level, "Logging initialized");
    }
}
