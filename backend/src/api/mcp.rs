//! MCP Streamable HTTP endpoint handlers.
//!
//! ## Endpoints
//!
//! - `POST /mcp` - Send a JSON-RPC message or batch
//! - `GET /mcp` - Open SSE stream for server-initiated messages
//! - `DELETE /mcp` - Terminate a session
//!
//! A POST without the `mcp-session-id` header must carry a single
//! `initialize` request; it creates a session whose id is returned in the
//! response header. Every other request must name a live session.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::{stream, StreamExt};
use reddit_mcp_types::jsonrpc::error_codes;
use reddit_mcp_types::{JsonRpcMessage, JsonRpcResponse, SESSION_ID_HEADER};
use serde_json::Value;
use std::any::Any;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, error, info};

use crate::mcp::{is_initialize_request, McpEvent, SessionError, TransportError};
use crate::state::AppState;

/// Errors surfaced by the MCP endpoints, rendered as JSON-RPC error envelopes.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Bad Request: No valid session ID provided or not an initialization request")]
    NoValidSession,

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid Request: {0}")]
    InvalidRequest(String),

    #[error("Invalid Request: Server already initialized")]
    AlreadyInitialized,

    #[error("initialize rejected")]
    Handshake(JsonRpcResponse),

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Self::NoValidSession | Self::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, error_codes::SERVER_ERROR)
            }
            Self::Parse(_) => (StatusCode::BAD_REQUEST, error_codes::PARSE_ERROR),
            Self::InvalidRequest(_) | Self::AlreadyInitialized => {
                (StatusCode::BAD_REQUEST, error_codes::INVALID_REQUEST)
            }
            Self::Handshake(response) => {
                return (StatusCode::BAD_REQUEST, Json(response.clone())).into_response();
            }
            Self::Internal(detail) => {
                error!("MCP request failed: {}", detail);
                (StatusCode::INTERNAL_SERVER_ERROR, error_codes::INTERNAL_ERROR)
            }
        };
        let body = JsonRpcResponse::error(None, code, self.to_string());
        (status, Json(body)).into_response()
    }
}

impl From<TransportError> for GatewayError {
    fn from(e: TransportError) -> Self {
        debug!("MCP: session transport unavailable: {}", e);
        Self::NoValidSession
    }
}

/// Response used when a handler panics.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    GatewayError::Internal(format!("handler panicked: {}", detail)).into_response()
}

/// Extract session ID from headers.
fn get_session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn with_session_header(mut response: Response, session_id: &str) -> Response {
    if let Ok(hv) = HeaderValue::from_str(session_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(SESSION_ID_HEADER), hv);
    }
    response
}

fn parse_message(value: Value) -> Result<JsonRpcMessage, GatewayError> {
    serde_json::from_value(value)
        .map_err(|_| GatewayError::InvalidRequest("not a JSON-RPC 2.0 message".to_string()))
}

/// Split a POST body into its messages. Returns whether the body was a batch.
fn parse_messages(body: Value) -> Result<(Vec<JsonRpcMessage>, bool), GatewayError> {
    match body {
        Value::Array(items) => {
            if items.is_empty() {
                return Err(GatewayError::InvalidRequest("empty batch".to_string()));
            }
            let messages = items
                .into_iter()
                .map(parse_message)
                .collect::<Result<Vec<_>, _>>()?;
            Ok((messages, true))
        }
        other => Ok((vec![parse_message(other)?], false)),
    }
}

/// POST /mcp - Handle JSON-RPC messages.
///
/// Returns `application/json` with the response (or array of responses for
/// a batch), or 202 when the body held no requests.
#[utoipa::path(
    post,
    path = "/mcp",
    tag = "MCP",
    params(
        ("mcp-session-id" = Option<String>, Header, description = "Session identifier; omit only on initialize")
    ),
    request_body(content = String, description = "JSON-RPC 2.0 message or batch", content_type = "application/json"),
    responses(
        (status = 200, description = "JSON-RPC response or batch of responses"),
        (status = 202, description = "Notifications accepted"),
        (status = 400, description = "No valid session, malformed message or repeated initialize"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn mcp_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    match get_session_id(&headers) {
        Some(session_id) => forward(&state, &session_id, &body).await,
        None => initialize(&state, &body).await,
    }
}

async fn initialize(state: &AppState, body: &[u8]) -> Result<Response, GatewayError> {
    // Without a session only a well-formed initialize is accepted.
    let body: Value = serde_json::from_slice(body).map_err(|_| {
        debug!("MCP POST without session has an unparseable body");
        GatewayError::NoValidSession
    })?;
    if !is_initialize_request(&body) {
        debug!("MCP POST without session is not an initialize request");
        return Err(GatewayError::NoValidSession);
    }
    let message = parse_message(body)?;

    let pending = state.sessions.begin_session(state.new_handler()).await;
    let (session_id, response) = state
        .sessions
        .complete_handshake(pending, message)
        .await
        .map_err(|e| match e {
            SessionError::Rejected(response) => GatewayError::Handshake(response),
            other => GatewayError::Internal(other.to_string()),
        })?;

    info!("MCP: New session initialized: {}", session_id);
    Ok(with_session_header(
        (StatusCode::OK, Json(response)).into_response(),
        &session_id,
    ))
}

async fn forward(state: &AppState, session_id: &str, body: &[u8]) -> Result<Response, GatewayError> {
    let session = state.sessions.lookup(session_id).await.ok_or_else(|| {
        debug!("MCP POST for unknown session {}", session_id);
        GatewayError::NoValidSession
    })?;

    let body: Value =
        serde_json::from_slice(body).map_err(|e| GatewayError::Parse(e.to_string()))?;
    let (messages, batch) = parse_messages(body)?;
    if messages.iter().any(|m| m.method() == Some("initialize")) {
        return Err(GatewayError::AlreadyInitialized);
    }
    debug!(
        "MCP POST: {} message(s) for session {}",
        messages.len(),
        session_id
    );

    let mut responses = Vec::new();
    for message in messages {
        if let Some(response) = session.send(message).await? {
            responses.push(response);
        }
    }

    let response = if responses.is_empty() {
        StatusCode::ACCEPTED.into_response()
    } else if batch {
        (StatusCode::OK, Json(responses)).into_response()
    } else {
        (StatusCode::OK, Json(responses.remove(0))).into_response()
    };
    Ok(with_session_header(response, session_id))
}

/// GET /mcp - Open SSE stream for server-initiated messages.
///
/// The stream ends when the session closes.
#[utoipa::path(
    get,
    path = "/mcp",
    tag = "MCP",
    params(
        ("mcp-session-id" = String, Header, description = "Session identifier")
    ),
    responses(
        (status = 200, description = "text/event-stream of JSON-RPC notifications"),
        (status = 400, description = "Missing or unknown session")
    )
)]
pub async fn mcp_get(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let session_id = get_session_id(&headers).ok_or_else(|| {
        GatewayError::BadRequest(format!("{} header required for SSE stream", SESSION_ID_HEADER))
    })?;
    let session = state
        .sessions
        .lookup(&session_id)
        .await
        .ok_or(GatewayError::NoValidSession)?;

    info!("MCP: SSE stream opened for session {}", session_id);

    let events = BroadcastStream::new(session.subscribe());
    let stream = stream::unfold((events, session), |(mut events, session)| async move {
        loop {
            // Buffered events are flushed before the stream ends on closure.
            tokio::select! {
                biased;
                next = events.next() => match next {
                    Some(Ok(McpEvent::JsonRpc(json))) => {
                        return Some((Ok::<_, Infallible>(Event::default().data(json)), (events, session)));
                    }
                    Some(Err(_)) => continue, // Lagged
                    None => return None,
                },
                _ = session.closed() => return None,
            }
        }
    });

    let response = Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response();
    Ok(with_session_header(response, &session_id))
}

/// DELETE /mcp - Terminate a session.
#[utoipa::path(
    delete,
    path = "/mcp",
    tag = "MCP",
    params(
        ("mcp-session-id" = String, Header, description = "Session identifier")
    ),
    responses(
        (status = 204, description = "Session terminated"),
        (status = 400, description = "Missing or unknown session")
    )
)]
pub async fn mcp_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, GatewayError> {
    let session_id = get_session_id(&headers).ok_or(GatewayError::NoValidSession)?;

    if state.sessions.close(&session_id).await {
        info!("MCP: Session terminated: {}", session_id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(GatewayError::NoValidSession)
    }
}
