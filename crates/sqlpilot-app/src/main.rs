//! Sqlpilot application binary - composition root.
//!
//! Ties the crates together into a single executable:
//! 1. Load configuration from TOML (env overrides for API keys)
//! 2. Open SQLite storage for the audit logs
//! 3. Build the generation client and conversation orchestrator
//! 4. Start the axum gateway (HTTP + WebSocket)

use std::path::PathBuf;
use std::sync::Arc;

use sqlpilot_ai::AiClient;
use sqlpilot_chat::ConversationOrchestrator;
use sqlpilot_core::config::PilotConfig;
use sqlpilot_core::types::SystemStamp;
use sqlpilot_gateway::{routes, AppState};
use sqlpilot_store::{ConversationLogRepository, Database, LoginLogRepository};

/// Expand ~ to home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if data_dir.starts_with("~/") || data_dir.starts_with("~\\") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(&data_dir[2..])
    } else {
        PathBuf::from(data_dir)
    }
}

/// Resolve the config file path (SQLPILOT_CONFIG env, or ~/.sqlpilot/config.toml).
fn config_path() -> PathBuf {
    if let Ok(p) = std::env::var("SQLPILOT_CONFIG") {
        return PathBuf::from(p);
    }
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".sqlpilot").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".sqlpilot").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting sqlpilot v{}", env!("CARGO_PKG_VERSION"));

    // Config, with per-mode API keys picked up from the environment.
    let config_file = config_path();
    let mut config = PilotConfig::load_or_default(&config_file);
    config.ai.keys.apply_env();
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    let missing = config.ai.keys.missing();
    if !missing.is_empty() {
        tracing::warn!(
            modes = ?missing,
            "No API key configured for some modes; requests for them will fail"
        );
    }

    // Storage.
    let data_dir = resolve_data_dir(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    let db_path = data_dir.join("sqlpilot.db");
    let db = Arc::new(Database::new(&db_path)?);
    tracing::info!(path = %db_path.display(), "SQLite database opened");

    let login_logs = Arc::new(LoginLogRepository::new(Arc::clone(&db)));
    let conversation_logs = Arc::new(ConversationLogRepository::new(db));

    // Generation backend + orchestrator.
    let backend = Arc::new(AiClient::new(config.ai.clone()));
    let orchestrator = Arc::new(ConversationOrchestrator::new(
        backend,
        conversation_logs,
        SystemStamp::default(),
    ));
    tracing::info!(base_url = %config.ai.base_url, "Generation backend ready");

    // Gateway.
    let state = AppState::new(config, login_logs, orchestrator);
    routes::start_server(state).await?;

    Ok(())
}
