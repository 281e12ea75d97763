//! Per-session transport.
//!
//! A [`Transport`] owns a worker task that feeds inbound JSON-RPC messages to
//! the session's [`McpHandler`] one at a time, in arrival order. Outbound
//! server-initiated messages are broadcast to SSE subscribers.
//!
//! Closing the transport cancels its token. The worker stops taking new
//! messages; a message already being handled runs to completion but its
//! reply is dropped if nobody is waiting for it anymore.

use parking_lot::RwLock;
use reddit_mcp_types::jsonrpc::JsonRpcNotification;
use reddit_mcp_types::mcp::LoggingMessageParams;
use reddit_mcp_types::{JsonRpcMessage, JsonRpcResponse, LoggingLevel};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::handler::McpHandler;

/// Capacity of the outbound event channel.
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Events that can be sent to MCP clients via SSE.
#[derive(Clone, Debug)]
pub enum McpEvent {
    /// A JSON-RPC message to send to the client.
    JsonRpc(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,
}

struct Inbound {
    message: JsonRpcMessage,
    reply: oneshot::Sender<Option<JsonRpcResponse>>,
}

/// Sends `notifications/message` entries to a session's client.
#[derive(Clone)]
pub struct SessionLogger {
    events: broadcast::Sender<McpEvent>,
    level: Arc<RwLock<LoggingLevel>>,
}

impl SessionLogger {
    fn new(events: broadcast::Sender<McpEvent>) -> Self {
        Self {
            events,
            level: Arc::new(RwLock::new(LoggingLevel::Info)),
        }
    }

    /// A logger that is not connected to any session.
    pub fn detached() -> Self {
        let (events, _) = broadcast::channel(1);
        Self::new(events)
    }

    pub fn set_level(&self, level: LoggingLevel) {
        *self.level.write() = level;
    }

    pub fn level(&self) -> LoggingLevel {
        *self.level.read()
    }

    /// Emit a log notification if `level` passes the session's threshold.
    pub fn log(&self, level: LoggingLevel, logger: Option<&str>, data: Value) {
        if level < self.level() {
            return;
        }
        let params = LoggingMessageParams {
            level,
            logger: logger.map(str::to_string),
            data,
        };
        let notification = JsonRpcNotification::new(
            "notifications/message",
            serde_json::to_value(params).ok(),
        );
        if let Ok(json) = serde_json::to_string(&notification) {
            // No subscriber simply means no SSE stream is open.
            let _ = self.events.send(McpEvent::JsonRpc(json));
        }
    }
}

/// Duplex channel of one session.
#[derive(Debug)]
pub struct Transport {
    session_id: String,
    inbox: mpsc::Sender<Inbound>,
    events: broadcast::Sender<McpEvent>,
    cancel: CancellationToken,
}

impl Transport {
    /// Spawn the worker for `handler` and return the transport feeding it.
    pub fn spawn(session_id: String, mut handler: McpHandler, capacity: usize) -> Self {
        let (inbox, rx) = mpsc::channel(capacity.max(1));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        handler.bind(session_id.clone(), SessionLogger::new(events.clone()));
        tokio::spawn(run_worker(session_id.clone(), handler, rx, cancel.clone()));

        Self {
            session_id,
            inbox,
            events,
            cancel,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Deliver `message` and wait for the handler's reply.
    ///
    /// Notifications and client responses yield `Ok(None)` once processed.
    pub async fn send(
        &self,
        message: JsonRpcMessage,
    ) -> Result<Option<JsonRpcResponse>, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let (reply, response) = oneshot::channel();
        self.inbox
            .send(Inbound { message, reply })
            .await
            .map_err(|_| TransportError::Closed)?;

        tokio::select! {
            result = response => result.map_err(|_| TransportError::Closed),
            _ = self.cancel.cancelled() => Err(TransportError::Closed),
        }
    }

    /// Subscribe to server-initiated messages.
    pub fn subscribe(&self) -> broadcast::Receiver<McpEvent> {
        self.events.subscribe()
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the transport has closed, for whatever reason.
    pub async fn closed(&self) {
        self.cancel.cancelled().await
    }
}

async fn run_worker(
    session_id: String,
    mut handler: McpHandler,
    mut inbox: mpsc::Receiver<Inbound>,
    cancel: CancellationToken,
) {
    // Cancels the token however the worker ends, unwinding included.
    let _closed_on_exit = cancel.clone().drop_guard();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = inbox.recv() => match next {
                Some(inbound) => {
                    let response = handler.handle_message(inbound.message).await;
                    if inbound.reply.send(response).is_err() {
                        warn!("MCP session {}: reply dropped, requester went away", session_id);
                    }
                }
                None => break,
            },
        }
    }

    debug!("MCP session {}: transport worker stopped", session_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::OperationRegistry;
    use reddit_mcp_types::{Implementation, JsonRpcRequest, RequestId};
    use serde_json::json;

    fn handler() -> McpHandler {
        McpHandler::new(
            Implementation {
                name: "test".to_string(),
                version: "0.0.0".to_string(),
                title: None,
            },
            OperationRegistry::new(),
        )
    }

    fn ping(id: i64) -> JsonRpcMessage {
        JsonRpcMessage::Request(JsonRpcRequest::new(RequestId::Number(id), "ping", None))
    }

    #[tokio::test]
    async fn test_send_and_reply() {
        let transport = Transport::spawn("s1".to_string(), handler(), 8);
        let response = transport.send(ping(1)).await.unwrap().unwrap();
        assert_eq!(response.id, Some(RequestId::Number(1)));
        assert_eq!(response.result, Some(json!({})));
    }

    #[tokio::test]
    async fn test_replies_preserve_order() {
        let transport = Arc::new(Transport::spawn("s1".to_string(), handler(), 64));
        for id in 0..20 {
            let response = transport.send(ping(id)).await.unwrap().unwrap();
            assert_eq!(response.id, Some(RequestId::Number(id)));
        }
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let transport = Transport::spawn("s1".to_string(), handler(), 8);
        transport.close();
        transport.closed().await;
        assert!(transport.is_closed());
        assert_eq!(
            transport.send(ping(1)).await.unwrap_err(),
            TransportError::Closed
        );
    }

    #[tokio::test]
    async fn test_logger_respects_level() {
        let transport = Transport::spawn("s1".to_string(), handler(), 8);
        let mut rx = transport.subscribe();
        let logger = SessionLogger::new(transport.events.clone());

        logger.set_level(LoggingLevel::Warning);
        logger.log(LoggingLevel::Info, None, json!("dropped"));
        logger.log(LoggingLevel::Error, Some("test"), json!("kept"));

        let McpEvent::JsonRpc(json) = rx.recv().await.unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["method"], "notifications/message");
        assert_eq!(value["params"]["level"], "error");
        assert_eq!(value["params"]["data"], "kept");
        assert!(rx.try_recv().is_err());
    }
}
