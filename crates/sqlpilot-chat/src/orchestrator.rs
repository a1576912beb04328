//! Conversation orchestrator: the per-turn state machine.
//!
//! One `handle_turn` call drives RECEIVED -> user audit -> generation ->
//! AI audit -> outcome. Turns for the same conversation are strictly
//! serialized behind a per-conversation async lock, so committed seq
//! values are gapless and alternate USER/AI starting at 1.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rand::distr::Alphanumeric;
use rand::Rng;
use tracing::{error, info, warn};

use sqlpilot_ai::{GenerationBackend, GenerationRequest};
use sqlpilot_core::generate_log_id;
use sqlpilot_core::types::{ActorRole, ConversationLogEntry, FunctionMode, SystemStamp};
use sqlpilot_store::ConversationLogRepository;

use crate::error::TurnError;

/// Maximum accepted request text length in characters.
const MAX_TEXT_LENGTH: usize = 8000;

/// Cap on per-conversation lock/counter entries kept in memory. Idle
/// conversations beyond this are evicted; a later turn on one reseeds
/// from the client's counter, same as after a restart.
const MAX_TRACKED_CONVERSATIONS: usize = 1024;

/// Highest seq seed accepted from a client, leaving room for one full
/// USER/AI pair without overflow.
const MAX_SEQ_SEED: i64 = i64::MAX - 2;

/// Snapshot of the session bound to the connection, taken at upgrade time.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    /// Whether the session completed login-log establishment.
    pub established: bool,
    /// Login-log row backing this session, when established.
    pub login_log_id: Option<String>,
    /// Actor number of the session owner.
    pub actor_no: String,
}

/// One inbound user turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub mode: FunctionMode,
    /// Natural-language request (create mode) or SQL text (other modes).
    pub text: String,
    pub dialect: String,
    /// Conversation to continue; None/empty mints a new one.
    pub conversation_id: Option<String>,
    /// Client's view of the running turn counter. Used only to seed a
    /// conversation this process has not seen yet (e.g. after a restart).
    pub conversation_seq: i64,
    pub schema_data: Option<serde_json::Value>,
    /// Flips to true when the request is cancelled; handed through to
    /// the generation backend so it can drop its stream early.
    pub cancel: Option<tokio::sync::watch::Receiver<bool>>,
}

/// The result handed back to the gateway for emission.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub conversation_id: String,
    /// Seq of the AI turn (the user turn holds seq - 1).
    pub seq: i64,
    pub answer: String,
    pub mode: FunctionMode,
}

/// Central coordinator for conversational turns.
///
/// Holds the per-conversation exclusion locks and authoritative turn
/// counters; conversation identity and seq are the only state carried
/// forward between requests.
pub struct ConversationOrchestrator {
    backend: Arc<dyn GenerationBackend>,
    turns: Arc<ConversationLogRepository>,
    stamp: SystemStamp,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    counters: Mutex<HashMap<String, i64>>,
}

impl ConversationOrchestrator {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        turns: Arc<ConversationLogRepository>,
        stamp: SystemStamp,
    ) -> Self {
        Self {
            backend,
            turns,
            stamp,
            locks: Mutex::new(HashMap::new()),
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Handle one user turn end to end.
    ///
    /// The USER audit row is committed before the backend call starts and
    /// is kept even if generation then fails; the AI audit row is
    /// committed before the outcome is returned.
    pub async fn handle_turn(
        &self,
        session: &SessionIdentity,
        request: TurnRequest,
    ) -> Result<TurnOutcome, TurnError> {
        if !session.established {
            return Err(TurnError::NotAuthenticated);
        }
        let login_log_id = session
            .login_log_id
            .clone()
            .ok_or(TurnError::NotAuthenticated)?;

        if request.text.trim().is_empty() {
            return Err(TurnError::InvalidRequest(
                "request text cannot be empty".to_string(),
            ));
        }
        if request.text.len() > MAX_TEXT_LENGTH {
            return Err(TurnError::InvalidRequest(format!(
                "request text exceeds maximum length of {} characters",
                MAX_TEXT_LENGTH
            )));
        }

        let (conversation_id, minted) = match request.conversation_id.as_deref() {
            Some(id) if !id.is_empty() => (id.to_string(), false),
            _ => (mint_conversation_id(), true),
        };

        // Turns within one conversation are strictly sequential: the lock
        // is held from before the seq increment until the AI row commits.
        let lock = self.conversation_lock(&conversation_id)?;
        let _guard = lock.lock_owned().await;

        let base_seq = self.current_seq(&conversation_id, if minted { 0 } else { request.conversation_seq })?;

        let user_seq = base_seq + 1;
        let user_entry = self.turn_entry(
            &login_log_id,
            &conversation_id,
            user_seq,
            ActorRole::User,
            request.mode,
            &request.text,
        );
        self.turns
            .create(&user_entry)
            .map_err(|e| TurnError::Audit(e.to_string()))?;
        self.store_seq(&conversation_id, user_seq)?;

        info!(
            conversation_id = %conversation_id,
            seq = user_seq,
            mode = %request.mode,
            "User turn audited"
        );

        let generation = GenerationRequest {
            mode: request.mode,
            text: request.text.clone(),
            dialect: request.dialect.clone(),
            schema_data: request.schema_data.clone(),
            cancel: request.cancel.clone(),
        };
        let answer = match self.backend.generate(&generation).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "Generation failed");
                return Err(TurnError::Generation(e));
            }
        };

        let ai_seq = user_seq + 1;
        let ai_entry = self.turn_entry(
            &login_log_id,
            &conversation_id,
            ai_seq,
            ActorRole::Ai,
            request.mode,
            &answer,
        );
        if let Err(e) = self.turns.create(&ai_entry) {
            // The answer exists but was not durably logged; surface a
            // failure rather than emit an unaudited answer.
            error!(conversation_id = %conversation_id, error = %e, "AI turn audit failed");
            return Err(TurnError::Audit(e.to_string()));
        }
        self.store_seq(&conversation_id, ai_seq)?;

        info!(conversation_id = %conversation_id, seq = ai_seq, "AI turn audited");

        Ok(TurnOutcome {
            conversation_id,
            seq: ai_seq,
            answer,
            mode: request.mode,
        })
    }

    // -- Private helpers --

    fn conversation_lock(&self, id: &str) -> Result<Arc<tokio::sync::Mutex<()>>, TurnError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|e| TurnError::Internal(format!("lock map poisoned: {}", e)))?;
        if locks.len() >= MAX_TRACKED_CONVERSATIONS && !locks.contains_key(id) {
            // Locks with an outstanding clone belong to a turn still in
            // flight and must survive eviction.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            let mut counters = self
                .counters
                .lock()
                .map_err(|e| TurnError::Internal(format!("counter map poisoned: {}", e)))?;
            counters.retain(|cvrs, _| locks.contains_key(cvrs));
        }
        Ok(Arc::clone(
            locks.entry(id.to_string()).or_default(),
        ))
    }

    /// The authoritative last-committed seq for a conversation. A
    /// conversation unknown to this process is seeded from the client's
    /// counter (continuation after a server restart), clamped so a full
    /// USER/AI pair cannot overflow.
    fn current_seq(&self, id: &str, client_seq: i64) -> Result<i64, TurnError> {
        let counters = self
            .counters
            .lock()
            .map_err(|e| TurnError::Internal(format!("counter map poisoned: {}", e)))?;
        Ok(counters
            .get(id)
            .copied()
            .unwrap_or(client_seq.clamp(0, MAX_SEQ_SEED)))
    }

    fn store_seq(&self, id: &str, seq: i64) -> Result<(), TurnError> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|e| TurnError::Internal(format!("counter map poisoned: {}", e)))?;
        counters.insert(id.to_string(), seq);
        Ok(())
    }

    fn turn_entry(
        &self,
        login_log_id: &str,
        conversation_id: &str,
        seq: i64,
        role: ActorRole,
        mode: FunctionMode,
        content: &str,
    ) -> ConversationLogEntry {
        ConversationLogEntry {
            log_id: generate_log_id(),
            login_log_id: login_log_id.to_string(),
            function_mode: mode,
            conversation_id: conversation_id.to_string(),
            seq,
            role,
            at: Utc::now(),
            content: content.to_string(),
            stamp: self.stamp.clone(),
        }
    }
}

/// Mint a fresh conversation identifier.
fn mint_conversation_id() -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    format!("cvrs_{}", suffix)
}

// =============================================================================
// Tests
// =============================================================================
