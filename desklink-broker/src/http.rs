//! Broker HTTP relay API
//!
//! Axum-based HTTP server exposing the session and message-relay
//! operations. All state lives behind the injectable `SessionStore`.
//!
//! Architecture: each endpoint has a thin axum handler that delegates
//! to a pure inner function. The inner functions are directly testable
//! without axum dispatch machinery.
//!
//! Endpoints:
//! - GET  /health                   — liveness + session count
//! - GET  /version                  — server version info
//! - POST /register_client          — agent registration
//! - GET  /list_sessions            — console discovery
//! - POST /request_connection       — technician connection request
//! - GET  /check_connection_request — agent poll for a pending request
//! - POST /authorize_connection     — client's approve/deny decision
//! - GET  /check_authorization      — console poll for the decision
//! - POST /send_message             — append a payload for the peer
//! - POST /receive_messages         — drain the caller's queue
//! - POST /disconnect               — clear one side's liveness flag

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use desklink_core::config::BrokerConfig;
use desklink_core::models::AuthorizationState;
use desklink_core::protocol::{
    AuthorizeRequest, ConnectionRequest, DisconnectRequest, ReceiveMessagesRequest,
    RegisterRequest, SendMessageRequest, SessionQuery,
};
use desklink_core::{RelayError, SessionStore};

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub store: Arc<dyn SessionStore>,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/register_client", post(register_handler))
        .route("/list_sessions", get(list_sessions_handler))
        .route("/request_connection", post(request_connection_handler))
        .route(
            "/check_connection_request",
            get(check_connection_request_handler),
        )
        .route("/authorize_connection", post(authorize_handler))
        .route("/check_authorization", get(check_authorization_handler))
        .route("/send_message", post(send_message_handler))
        .route("/receive_messages", post(receive_messages_handler))
        .route("/disconnect", post(disconnect_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    store: Arc<dyn SessionStore>,
    config: BrokerConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(HttpState { store });

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("desklink broker listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner health check — liveness plus current session count.
pub async fn health_inner(store: &Arc<dyn SessionStore>) -> (StatusCode, serde_json::Value) {
    let sessions = store.session_count().await;
    (
        StatusCode::OK,
        serde_json::json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "sessions": sessions,
        }),
    )
}

/// Inner version — returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "desklink/1",
    })
}

/// Inner register — always succeeds, creates an independent session.
pub async fn register_inner(
    store: &Arc<dyn SessionStore>,
    req: RegisterRequest,
) -> (StatusCode, serde_json::Value) {
    let session = store.register(req).await;
    tracing::info!(
        session_id = %session.session_id,
        client_name = %session.client_name,
        os = %session.os,
        "client registered"
    );
    (
        StatusCode::OK,
        serde_json::json!({
            "success": true,
            "session_id": session.session_id,
        }),
    )
}

/// Inner list — sessions discoverable by a console.
pub async fn list_sessions_inner(
    store: &Arc<dyn SessionStore>,
) -> (StatusCode, serde_json::Value) {
    let sessions = store.list_available().await;
    (
        StatusCode::OK,
        serde_json::json!({
            "success": true,
            "sessions": sessions,
        }),
    )
}

/// Inner request_connection — records the technician's request for the
/// agent to discover on its next poll.
pub async fn request_connection_inner(
    store: &Arc<dyn SessionStore>,
    req: ConnectionRequest,
) -> (StatusCode, serde_json::Value) {
    match store
        .request_connection(&req.session_id, &req.technician_name)
        .await
    {
        Ok(()) => {
            tracing::info!(
                session_id = %req.session_id,
                technician = %req.technician_name,
                "connection requested"
            );
            (StatusCode::OK, serde_json::json!({"success": true}))
        }
        Err(e) => error_body(e),
    }
}

/// Inner check_connection_request — the agent's long-poll target; the
/// broker answers immediately with current state.
pub async fn check_connection_request_inner(
    store: &Arc<dyn SessionStore>,
    session_id: &str,
) -> (StatusCode, serde_json::Value) {
    match store.pending_request(session_id).await {
        Ok(Some(technician_name)) => (
            StatusCode::OK,
            serde_json::json!({
                "connection_request": true,
                "technician_name": technician_name,
            }),
        ),
        Ok(None) => (
            StatusCode::OK,
            serde_json::json!({"connection_request": false}),
        ),
        Err(e) => error_body(e),
    }
}

/// Inner authorize — applies the client's decision; idempotent.
pub async fn authorize_inner(
    store: &Arc<dyn SessionStore>,
    req: AuthorizeRequest,
) -> (StatusCode, serde_json::Value) {
    match store.authorize(&req.session_id, req.authorized).await {
        Ok(state) => {
            tracing::info!(session_id = %req.session_id, ?state, "authorization decided");
            (StatusCode::OK, serde_json::json!({"success": true}))
        }
        Err(e) => error_body(e),
    }
}

/// Inner check_authorization — the console polls this; the timeout
/// outcome is produced by the console's own deadline.
pub async fn check_authorization_inner(
    store: &Arc<dyn SessionStore>,
    session_id: &str,
) -> (StatusCode, serde_json::Value) {
    match store.authorization_state(session_id).await {
        Ok(state) => (
            StatusCode::OK,
            serde_json::json!({
                "success": true,
                "authorized": state == Some(AuthorizationState::Authorized),
                "pending": state == Some(AuthorizationState::AwaitingClient),
            }),
        ),
        Err(e) => error_body(e),
    }
}

/// Inner send_message — queue a payload for the opposite side.
pub async fn send_message_inner(
    store: &Arc<dyn SessionStore>,
    req: SendMessageRequest,
) -> (StatusCode, serde_json::Value) {
    match store
        .push_message(&req.session_id, req.sender, req.message)
        .await
    {
        Ok(()) => (StatusCode::OK, serde_json::json!({"success": true})),
        Err(e) => error_body(e),
    }
}

/// Inner receive_messages — drain the receiver's queue exactly once.
pub async fn receive_messages_inner(
    store: &Arc<dyn SessionStore>,
    req: ReceiveMessagesRequest,
) -> (StatusCode, serde_json::Value) {
    match store.drain_messages(&req.session_id, req.receiver).await {
        Ok((messages, session_active)) => (
            StatusCode::OK,
            serde_json::json!({
                "success": true,
                "messages": messages,
                "session_active": session_active,
            }),
        ),
        Err(e) => error_body(e),
    }
}

/// Inner disconnect — clears one side's flag; the session disappears
/// once both sides are gone.
pub async fn disconnect_inner(
    store: &Arc<dyn SessionStore>,
    req: DisconnectRequest,
) -> (StatusCode, serde_json::Value) {
    match store.disconnect(&req.session_id, req.who).await {
        Ok(removed) => {
            tracing::info!(
                session_id = %req.session_id,
                who = %req.who,
                removed,
                "side disconnected"
            );
            (StatusCode::OK, serde_json::json!({"success": true}))
        }
        Err(e) => error_body(e),
    }
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state.store).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn register_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    let (status, body) = register_inner(&state.store, req).await;
    (status, Json(body))
}

pub async fn list_sessions_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = list_sessions_inner(&state.store).await;
    (status, Json(body))
}

pub async fn request_connection_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<ConnectionRequest>,
) -> impl IntoResponse {
    let (status, body) = request_connection_inner(&state.store, req).await;
    (status, Json(body))
}

pub async fn check_connection_request_handler(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<SessionQuery>,
) -> impl IntoResponse {
    let (status, body) = check_connection_request_inner(&state.store, &query.session_id).await;
    (status, Json(body))
}

pub async fn authorize_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<AuthorizeRequest>,
) -> impl IntoResponse {
    let (status, body) = authorize_inner(&state.store, req).await;
    (status, Json(body))
}

pub async fn check_authorization_handler(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<SessionQuery>,
) -> impl IntoResponse {
    let (status, body) = check_authorization_inner(&state.store, &query.session_id).await;
    (status, Json(body))
}

pub async fn send_message_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<SendMessageRequest>,
) -> impl IntoResponse {
    let (status, body) = send_message_inner(&state.store, req).await;
    (status, Json(body))
}

pub async fn receive_messages_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<ReceiveMessagesRequest>,
) -> impl IntoResponse {
    let (status, body) = receive_messages_inner(&state.store, req).await;
    (status, Json(body))
}

pub async fn disconnect_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<DisconnectRequest>,
) -> impl IntoResponse {
    let (status, body) = disconnect_inner(&state.store, req).await;
    (status, Json(body))
}

// ============================================================================
// Helpers
// ============================================================================

/// Map a `RelayError` onto an HTTP status plus `{success:false}` body.
/// Unknown-session is an expected condition for both peers and must
/// never surface as a 500.
fn error_body(e: RelayError) -> (StatusCode, serde_json::Value) {
    let status = match e {
        RelayError::NotFound => StatusCode::NOT_FOUND,
        RelayError::RequestPending | RelayError::AlreadyPaired => StatusCode::CONFLICT,
        RelayError::Protocol(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        serde_json::json!({
            "success": false,
            "error": e.to_string(),
        }),
    )
}

// ============================================================================
// Unit Tests — call inner functions directly
// ============================================================================
