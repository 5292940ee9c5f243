//! HTTP transport: MCP over Server-Sent Events
//!
//! - `GET /sse` opens a session. Its first event (`endpoint`) carries the URL
//!   the client posts its messages to.
//! - `POST /messages/?session_id=<id>` takes one JSON-RPC message and answers
//!   202 Accepted; the response is delivered on the session's stream as a
//!   `message` event.
//!
//! Both transports route through [`McpGateway::handle_request`].

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};

use super::gateway::McpGateway;
use super::protocol::{JsonRpcRequest, JsonRpcResponse};

pub const SSE_PATH: &str = "/sse";
pub const MESSAGES_PATH: &str = "/messages/";

type SessionMap = HashMap<String, mpsc::UnboundedSender<JsonRpcResponse>>;

#[derive(Clone)]
pub struct SseState {
    gateway: Arc<McpGateway>,
    sessions: Arc<Mutex<SessionMap>>,
}

impl SseState {
    pub fn new(gateway: Arc<McpGateway>) -> Self {
        Self {
            gateway,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, SessionMap> {
        lock(&self.sessions)
    }
}

fn lock(sessions: &Mutex<SessionMap>) -> MutexGuard<'_, SessionMap> {
    sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Removes its session when the event stream is dropped
struct SessionGuard {
    id: String,
    sessions: Arc<Mutex<SessionMap>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        lock(&self.sessions).remove(&self.id);
        tracing::debug!(session = %self.id, "SSE session closed");
    }
}

pub fn router(gateway: Arc<McpGateway>) -> Router {
    Router::new()
        .route(SSE_PATH, get(open_stream))
        .route(MESSAGES_PATH, post(post_message))
        .with_state(SseState::new(gateway))
}

/// Listen on `addr` until the process is stopped
pub async fn serve_sse(gateway: Arc<McpGateway>, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "SSE transport listening");
    axum::serve(listener, router(gateway)).await?;
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

async fn open_stream(
    State(state): State<SseState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = uuid::Uuid::new_v4().simple().to_string();
    let (tx, rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
    state.sessions().insert(session_id.clone(), tx);
    tracing::debug!(session = %session_id, "SSE session opened");

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("{}?session_id={}", MESSAGES_PATH, session_id));

    let guard = SessionGuard {
        id: session_id,
        sessions: Arc::clone(&state.sessions),
    };
    let messages = UnboundedReceiverStream::new(rx).map(move |response| {
        let _session = &guard;
        Ok(message_event(&response))
    });

    Sse::new(tokio_stream::once(Ok::<_, Infallible>(endpoint)).chain(messages))
        .keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
    session_id: String,
}

async fn post_message(
    State(state): State<SseState>,
    Query(query): Query<SessionQuery>,
    body: String,
) -> Response {
    let Some(tx) = state.sessions().get(&query.session_id).cloned() else {
        return (StatusCode::NOT_FOUND, "Unknown session").into_response();
    };

    let request: JsonRpcRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(session = %query.session_id, error = %e, "Unparseable message");
            let _ = tx.send(JsonRpcResponse::parse_error(&e.to_string()));
            return (StatusCode::BAD_REQUEST, "Could not parse message").into_response();
        }
    };

    if request.is_notification() {
        state.gateway.handle_notification(&request);
        return StatusCode::ACCEPTED.into_response();
    }

    let gateway = Arc::clone(&state.gateway);
    tokio::spawn(async move {
        let response = gateway.handle_request(request).await;
        let _ = tx.send(response);
    });
    StatusCode::ACCEPTED.into_response()
}

fn message_event(response: &JsonRpcResponse) -> Event {
    match serde_json::to_string(response) {
        Ok(json) => Event::default().event("message").data(json),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize response");
            Event::default().comment("unserializable response")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::ResourceResolver;
    use crate::mcp::gateway::SERVER_NAME;
    use crate::zoho::testing::test_client;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    async fn spawn_server(upstream: &MockServer) -> SocketAddr {
        let gateway = Arc::new(McpGateway::new(
            SERVER_NAME,
            ResourceResolver::new(Arc::new(test_client(upstream))),
        ));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(gateway)).await.unwrap();
        });
        addr
    }

    /// Data of the next SSE frame named `event`
    async fn next_event(stream: &mut reqwest::Response, buffer: &mut String, event: &str) -> String {
        let read = async {
            loop {
                while let Some(end) = buffer.find("\n\n") {
                    let frame: String = buffer.drain(..end + 2).collect();
                    let mut name = None;
                    let mut data = Vec::new();
                    for line in frame.lines() {
                        if let Some(v) = line.strip_prefix("event:") {
                            name = Some(v.trim().to_string());
                        } else if let Some(v) = line.strip_prefix("data:") {
                            data.push(v.trim_start().to_string());
                        }
                    }
                    if name.as_deref() == Some(event) {
                        return data.join("\n");
                    }
                }
                let chunk = stream.chunk().await.unwrap().expect("stream ended");
                buffer.push_str(&String::from_utf8_lossy(&chunk));
            }
        };
        tokio::time::timeout(Duration::from_secs(10), read)
            .await
            .expect("timed out waiting for event")
    }

    #[tokio::test]
    async fn test_request_answered_on_session_stream() {
        let upstream = MockServer::start_async().await;
        let addr = spawn_server(&upstream).await;
        let http = reqwest::Client::new();

        let mut stream = http
            .get(format!("http://{}{}", addr, SSE_PATH))
            .send()
            .await
            .unwrap();
        assert_eq!(stream.status(), 200);

        let mut buffer = String::new();
        let endpoint = next_event(&mut stream, &mut buffer, "endpoint").await;
        assert!(endpoint.starts_with("/messages/?session_id="), "{}", endpoint);

        let posted = http
            .post(format!("http://{}{}", addr, endpoint))
            .json(&json!({"jsonrpc": "2.0", "id": 7, "method": "initialize", "params": {}}))
            .send()
            .await
            .unwrap();
        assert_eq!(posted.status(), StatusCode::ACCEPTED.as_u16());

        let message = next_event(&mut stream, &mut buffer, "message").await;
        let response: JsonRpcResponse = serde_json::from_str(&message).unwrap();
        assert_eq!(response.id, Some(crate::mcp::protocol::JsonRpcId::Number(7)));
        assert_eq!(response.result.unwrap()["serverInfo"]["name"], SERVER_NAME);
    }

    #[tokio::test]
    async fn test_unknown_session_and_garbage() {
        let upstream = MockServer::start_async().await;
        let addr = spawn_server(&upstream).await;
        let http = reqwest::Client::new();

        let unknown = http
            .post(format!("http://{}{}?session_id=nope", addr, MESSAGES_PATH))
            .body("{}")
            .send()
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND.as_u16());

        let mut stream = http
            .get(format!("http://{}{}", addr, SSE_PATH))
            .send()
            .await
            .unwrap();
        let mut buffer = String::new();
        let endpoint = next_event(&mut stream, &mut buffer, "endpoint").await;

        let garbage = http
            .post(format!("http://{}{}", addr, endpoint))
            .body("this is not json")
            .send()
            .await
            .unwrap();
        assert_eq!(garbage.status(), StatusCode::BAD_REQUEST.as_u16());

        let message = next_event(&mut stream, &mut buffer, "message").await;
        let response: JsonRpcResponse = serde_json::from_str(&message).unwrap();
        assert_eq!(response.error.unwrap().code, crate::mcp::protocol::PARSE_ERROR);
    }
}
