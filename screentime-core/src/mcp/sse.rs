//! HTTP/SSE transport for the MCP server.
//!
//! A client opens `GET /sse` and receives an `endpoint` event naming its
//! message URL. JSON-RPC requests are POSTed there; responses are pushed
//! back on the event stream as `message` events.

use super::server::McpServer;
use crate::error::{Error, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;

/// Transport state shared by all handlers.
pub struct SseState {
    server: Arc<McpServer>,
    /// Open event streams by session id.
    sessions: RwLock<HashMap<String, mpsc::Sender<Event>>>,
}

impl SseState {
    pub fn new(server: Arc<McpServer>) -> Self {
        Self {
            server,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Number of open sessions
    pub fn session_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn insert_session(&self, session_id: String, sender: mpsc::Sender<Event>) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id, sender);
    }

    fn session(&self, session_id: &str) -> Option<mpsc::Sender<Event>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }

    fn remove_session(&self, session_id: &str) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
    }
}

/// Removes its session when the event stream is dropped.
struct SessionGuard {
    state: Arc<SseState>,
    session_id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.state.remove_session(&self.session_id);
        tracing::debug!(session_id = %self.session_id, "SSE session closed");
    }
}

/// Query parameters for the message endpoint.
#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: String,
}

/// Create the HTTP router for MCP.
pub fn router(server: Arc<McpServer>) -> Router {
    Router::new()
        .route("/sse", get(handle_sse))
        .route("/message", post(handle_message))
        .route("/health", get(handle_health))
        .with_state(Arc::new(SseState::new(server)))
}

/// Bind `addr` and serve until the listener fails.
pub async fn serve(server: Arc<McpServer>, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Transport(format!("failed to bind {}: {}", addr, e)))?;

    tracing::info!(host_port = addr, "MCP SSE server started");

    axum::serve(listener, router(server))
        .await
        .map_err(|e| Error::Transport(e.to_string()))
}

/// Open an event stream for a new session.
async fn handle_sse(State(state): State<Arc<SseState>>) -> impl IntoResponse {
    let session_id = uuid::Uuid::new_v4().to_string();
    let (event_tx, mut event_rx) = mpsc::channel::<Event>(100);

    state.insert_session(session_id.clone(), event_tx);
    tracing::debug!(session_id = %session_id, "SSE session opened");

    let endpoint = format!("/message?sessionId={}", session_id);
    let guard = SessionGuard {
        state,
        session_id,
    };
    let stream = async_stream::stream! {
        let _guard = guard;
        yield Ok::<_, Infallible>(Event::default().event("endpoint").data(endpoint));
        while let Some(event) = event_rx.recv().await {
            yield Ok(event);
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(30)))
}

/// Accept a JSON-RPC message for a session; the reply goes out on its stream.
async fn handle_message(
    State(state): State<Arc<SseState>>,
    Query(query): Query<MessageQuery>,
    body: String,
) -> Response {
    let event_tx = match state.session(&query.session_id) {
        Some(tx) => tx,
        None => return (StatusCode::NOT_FOUND, "unknown session").into_response(),
    };

    tokio::spawn(async move {
        let server = Arc::clone(&state.server);
        let response = match tokio::task::spawn_blocking(move || server.handle_line(&body)).await {
            Ok(Some(response)) => response,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(error = %e, "MCP request handler panicked");
                return;
            }
        };

        let data = match serde_json::to_string(&response) {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode MCP response");
                return;
            }
        };

        if event_tx
            .send(Event::default().event("message").data(data))
            .await
            .is_err()
        {
            tracing::debug!(session_id = %query.session_id, "SSE session gone before reply");
            state.remove_session(&query.session_id);
        }
    });

    StatusCode::ACCEPTED.into_response()
}

/// Handle health check requests.
async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "screentime-mcp",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::HOME_DIR_KEY;
    use crate::db::{
        ConnectionManager, DatabaseTarget, MigrationSet, MigrationSource, Mode, TemplateContext,
    };
    use crate::tool::QueryTool;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn server() -> Arc<McpServer> {
        let manager = ConnectionManager::new(
            DatabaseTarget::InMemory,
            MigrationSource::Inline(MigrationSet::new(
                "",
                "",
                MigrationSet::embedded().lockdown().sql(),
            )),
            TemplateContext::new().with(HOME_DIR_KEY, "/Users/test"),
            Mode::Production,
        );
        Arc::new(McpServer::new(QueryTool::new(Arc::new(manager))))
    }

    fn app() -> Router {
        router(server())
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_sse_endpoint_streams() {
        let response = app()
            .oneshot(Request::builder().uri("/sse").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "text/event-stream"
        );
    }

    #[tokio::test]
    async fn test_disconnected_streams_release_sessions() {
        let state = Arc::new(SseState::new(server()));

        let mut responses = Vec::new();
        for _ in 0..5 {
            responses.push(handle_sse(State(Arc::clone(&state))).await.into_response());
        }
        assert_eq!(state.session_count(), 5);

        responses.pop();
        assert_eq!(state.session_count(), 4);

        drop(responses);
        assert_eq!(state.session_count(), 0);
    }

    #[tokio::test]
    async fn test_message_for_unknown_session() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/message?sessionId=missing")
                    .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
