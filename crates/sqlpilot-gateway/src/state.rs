//! Application state shared across handlers and connection tasks.

use std::sync::Arc;

use sqlpilot_chat::ConversationOrchestrator;
use sqlpilot_core::config::PilotConfig;
use sqlpilot_store::LoginLogRepository;

use crate::registry::InFlightRegistry;
use crate::session::SessionStore;

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration, fixed at startup.
    pub config: Arc<PilotConfig>,
    /// Cookie-token session store.
    pub sessions: Arc<SessionStore>,
    /// Login audit repository, written on session establishment.
    pub login_logs: Arc<LoginLogRepository>,
    /// Per-turn conversation state machine.
    pub orchestrator: Arc<ConversationOrchestrator>,
    /// In-flight request registry for cancellation.
    pub registry: Arc<InFlightRegistry>,
}

impl AppState {
    pub fn new(
        config: PilotConfig,
        login_logs: Arc<LoginLogRepository>,
        orchestrator: Arc<ConversationOrchestrator>,
    ) -> Self {
        let sessions = Arc::new(SessionStore::new(config.session.ttl_secs));
        Self {
            config: Arc::new(config),
            sessions,
            login_logs,
            orchestrator,
            registry: Arc::new(InFlightRegistry::new()),
        }
    }
}
