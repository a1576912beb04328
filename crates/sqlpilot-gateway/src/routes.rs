//! Router setup and server startup.
//!
//! Configures the axum Router with session middleware, CORS, tracing,
//! the health endpoint, and the WebSocket endpoint.

use std::net::SocketAddr;

use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::session;
use crate::state::AppState;
use crate::ws;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // CORS: allow localhost origins for the browser client. Cookie auth
    // rules out a wildcard origin, so list the configured port plus
    // port+1 for a dev server.
    let port = state.config.general.port;
    let dev_port = port.saturating_add(1);
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list([
            format!("http://127.0.0.1:{}", port)
                .parse::<HeaderValue>()
                .unwrap(),
            format!("http://localhost:{}", port)
                .parse::<HeaderValue>()
                .unwrap(),
            format!("http://127.0.0.1:{}", dev_port)
                .parse::<HeaderValue>()
                .unwrap(),
            format!("http://localhost:{}", dev_port)
                .parse::<HeaderValue>()
                .unwrap(),
        ]))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true);

    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws::ws_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            session::ensure_session,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// GET /health - liveness check, also establishes the session cookie.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "sqlpilot",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Start the HTTP server on the configured address.
///
/// Binds to 127.0.0.1 (localhost only) on the port from config.
pub async fn start_server(state: AppState) -> Result<(), sqlpilot_core::PilotError> {
    let port = state.config.general.port;
    let addr = format!("127.0.0.1:{}", port);

    let router = create_router(state);

    tracing::info!("Starting gateway on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| sqlpilot_core::PilotError::Gateway(format!("Failed to bind: {}", e)))?;

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| sqlpilot_core::PilotError::Gateway(format!("Server error: {}", e)))?;

    Ok(())
}
