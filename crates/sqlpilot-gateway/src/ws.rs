//! WebSocket endpoint: upgrade gating, per-connection loops, and turn
//! dispatch.
//!
//! The session is resolved once at upgrade time and an owned snapshot is
//! passed into every per-message task. A connection without a live
//! session cookie is refused with 401 before the upgrade.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures_util::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use sqlpilot_chat::{SessionIdentity, TurnRequest};

use crate::error::ApiError;
use crate::messages::{
    self, AiResponsePayload, ClientMessage, Decoded, ServerMessage,
};
use crate::session::{self, Session};
use crate::state::AppState;

/// GET /ws - upgrade to a WebSocket, gated on a valid session cookie.
pub async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let session = session::cookie_value(&headers, &state.config.session.cookie_name)
        .and_then(|token| state.sessions.resolve(&token));

    match session {
        Some(session) => {
            ws.on_upgrade(move |socket| handle_socket(socket, state, session))
        }
        None => ApiError::Unauthorized("valid session required".to_string()).into_response(),
    }
}

/// Drive one WebSocket connection until either side closes it.
async fn handle_socket(socket: WebSocket, state: AppState, session: Session) {
    info!(
        actor_no = %session.actor_no,
        login_log_id = %session.login_log_id,
        "WebSocket connected"
    );

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(64);

    // Request ids dispatched on this connection and not yet resolved.
    let connection_requests: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));

    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = messages::encode(&message);
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let identity = SessionIdentity {
        established: true,
        login_log_id: Some(session.login_log_id.clone()),
        actor_no: session.actor_no.clone(),
    };

    let receive_state = state.clone();
    let receive_tx = tx.clone();
    let receive_requests = Arc::clone(&connection_requests);
    let receive_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    dispatch_message(
                        &receive_state,
                        &identity,
                        &receive_tx,
                        &receive_requests,
                        text.as_str(),
                    )
                    .await;
                }
                Ok(Message::Close(_)) => break,
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = receive_task => {},
    }

    // Disconnect abandons whatever is still in flight on this connection.
    let leftover: Vec<String> = {
        let mut requests = connection_requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        requests.drain().collect()
    };
    for request_id in &leftover {
        state.registry.cancel(request_id);
    }

    info!(
        actor_no = %session.actor_no,
        abandoned = leftover.len(),
        "WebSocket disconnected"
    );
}

/// Route one decoded inbound frame.
async fn dispatch_message(
    state: &AppState,
    identity: &SessionIdentity,
    tx: &mpsc::Sender<ServerMessage>,
    connection_requests: &Arc<Mutex<HashSet<String>>>,
    text: &str,
) {
    match messages::decode(text) {
        Decoded::Known(ClientMessage::GenerateSql {
            mode,
            payload,
            request_id,
        }) => {
            let cancel = state.registry.insert(&request_id);
            track(connection_requests, &request_id, true);

            let turn = TurnRequest {
                mode,
                text: payload.natural_language,
                dialect: payload.dialect,
                conversation_id: payload.cvrs_id,
                conversation_seq: payload.cvrs_seq,
                schema_data: payload.schema_data,
                cancel: Some(cancel),
            };

            let state = state.clone();
            let identity = identity.clone();
            let tx = tx.clone();
            let connection_requests = Arc::clone(connection_requests);
            tokio::spawn(async move {
                let message = resolve_turn(&state, &identity, turn, &request_id).await;
                track(&connection_requests, &request_id, false);
                if let Some(message) = message {
                    let _ = tx.send(message).await;
                }
            });
        }
        Decoded::Known(ClientMessage::CancelRequest { request_id }) => {
            let was_in_flight = state.registry.cancel(&request_id);
            info!(
                request_id = %request_id,
                was_in_flight,
                "Cancellation requested"
            );
        }
        Decoded::Unknown {
            msg_type,
            request_id,
        } => {
            let _ = tx
                .send(ServerMessage::Error {
                    message: format!("Unknown message type: {}", msg_type),
                    request_id,
                })
                .await;
        }
        Decoded::Invalid { reason, request_id } => {
            debug!(reason = %reason, "Discarding malformed frame");
            let _ = tx
                .send(ServerMessage::Error {
                    message: "Invalid message format".to_string(),
                    request_id,
                })
                .await;
        }
    }
}

/// Resolve one dispatched turn: run it, then consult the registry to
/// decide whether the outcome may still be sent. Returns `None` when the
/// request was cancelled in the meantime; the audit rows the turn already
/// committed stay in place.
pub async fn resolve_turn(
    state: &AppState,
    identity: &SessionIdentity,
    turn: TurnRequest,
    request_id: &str,
) -> Option<ServerMessage> {
    let outcome = state.orchestrator.handle_turn(identity, turn).await;

    if !state.registry.finish(request_id) {
        debug!(request_id = %request_id, "Response suppressed after cancellation");
        return None;
    }

    Some(match outcome {
        Ok(outcome) => ServerMessage::AiResponse {
            payload: AiResponsePayload {
                mode: outcome.mode,
                response_text: outcome.answer,
                cvrs_id: outcome.conversation_id,
                cvrs_seq: outcome.seq,
            },
            request_id: request_id.to_string(),
        },
        Err(e) => {
            warn!(request_id = %request_id, error = %e, "Turn failed");
            ServerMessage::Error {
                message: e.user_message(),
                request_id: Some(request_id.to_string()),
            }
        }
    })
}

fn track(requests: &Arc<Mutex<HashSet<String>>>, request_id: &str, add: bool) {
    let mut requests = requests
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if add {
        requests.insert(request_id.to_string());
    } else {
        requests.remove(request_id);
    }
}
