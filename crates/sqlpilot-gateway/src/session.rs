//! Cookie sessions and the session-establishment middleware.
//!
//! A session is minted on the first plain HTTP contact: the login audit
//! row is committed first, and only then is the session stored and the
//! cookie set. A failed login-log write means no session.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::{error, info};

use sqlpilot_core::generate_log_id;
use sqlpilot_core::types::{LoginLogEntry, SystemStamp};

use crate::state::AppState;

/// One server-side session, keyed by its cookie token.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub actor_no: String,
    pub organization_no: String,
    /// Login audit row committed when this session was established.
    pub login_log_id: String,
    pub client_addr: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// In-memory session store with absolute TTL expiry.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl: Duration::seconds(ttl_secs as i64),
        }
    }

    /// Look up a live session by cookie token. Expired entries are
    /// dropped on access.
    pub fn resolve(&self, token: &str) -> Option<Session> {
        let mut sessions = self.guard();
        match sessions.get(token) {
            Some(session) if session.expires_at > Utc::now() => Some(session.clone()),
            Some(_) => {
                sessions.remove(token);
                None
            }
            None => None,
        }
    }

    /// Mint and store a new session bound to a committed login-log row.
    pub fn establish(
        &self,
        actor_no: &str,
        organization_no: &str,
        login_log_id: &str,
        client_addr: Option<String>,
    ) -> Session {
        let session = Session {
            token: generate_token(),
            actor_no: actor_no.to_string(),
            organization_no: organization_no.to_string(),
            login_log_id: login_log_id.to_string(),
            client_addr,
            expires_at: Utc::now() + self.ttl,
        };
        self.guard().insert(session.token.clone(), session.clone());
        session
    }

    /// Number of live entries (expired ones included until touched).
    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Generate a random 32-character hex session token.
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    hex::encode(bytes)
}

/// Extract a cookie value by name from the Cookie header.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    for pair in raw.split(';') {
        let pair = pair.trim();
        if let Some(rest) = pair.strip_prefix(name) {
            if let Some(value) = rest.strip_prefix('=') {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn set_cookie(name: &str, token: &str, ttl_secs: u64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        name, token, ttl_secs
    )
}

/// Middleware that establishes a session on first contact.
///
/// A request carrying a live session cookie passes straight through.
/// Otherwise the login audit row is written first; only if that commit
/// succeeds is the session stored and the cookie set on the response.
pub async fn ensure_session(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let cookie_name = state.config.session.cookie_name.clone();
    if let Some(token) = cookie_value(request.headers(), &cookie_name) {
        if state.sessions.resolve(&token).is_some() {
            return next.run(request).await;
        }
    }

    let client_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string());

    let entry = LoginLogEntry {
        log_id: generate_log_id(),
        actor_no: state.config.session.actor_no.clone(),
        login_at: Utc::now(),
        client_addr: client_addr.clone(),
        stamp: SystemStamp::default(),
    };

    let established = match state.login_logs.create(&entry) {
        Ok(()) => {
            let session = state.sessions.establish(
                &state.config.session.actor_no,
                &state.config.session.organization_no,
                &entry.log_id,
                client_addr,
            );
            info!(
                login_log_id = %entry.log_id,
                actor_no = %entry.actor_no,
                "Session established"
            );
            Some(session)
        }
        Err(e) => {
            error!(error = %e, "Login log write failed; session not established");
            None
        }
    };

    let mut response = next.run(request).await;

    if let Some(session) = established {
        let ttl_secs = state.config.session.ttl_secs;
        if let Ok(value) = HeaderValue::from_str(&set_cookie(&cookie_name, &session.token, ttl_secs))
        {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }

    response
}

// =============================================================================
// Tests
// =============================================================================
