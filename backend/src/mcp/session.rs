//! MCP session management.
//!
//! Manages session lifecycle for MCP Streamable HTTP connections.
//! Sessions are identified by random UUIDs and are only visible to
//! [`McpSessionManager::lookup`] once their `initialize` handshake succeeded.
//!
//! Every published session has a watcher task that removes it from the
//! registry as soon as its transport closes, whatever the cause.

use parking_lot::{Mutex, RwLock as SyncRwLock};
use reddit_mcp_types::{JsonRpcMessage, JsonRpcResponse};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::handler::McpHandler;
use super::transport::{McpEvent, Transport, TransportError};

/// Default capacity of a session's inbound message queue.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle of a session. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Active,
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session transport failed during initialization: {0}")]
    Transport(#[from] TransportError),

    #[error("initialize message produced no response")]
    NoResponse,

    #[error("initialize rejected")]
    Rejected(JsonRpcResponse),

    #[error("session id {0} is already registered")]
    IdCollision(String),
}

/// An MCP session.
#[derive(Debug)]
pub struct McpSession {
    /// Unique session identifier.
    pub id: String,
    /// When the session was created.
    pub created_at: Instant,
    last_activity: Mutex<Instant>,
    state: SyncRwLock<SessionState>,
    transport: Transport,
}

impl McpSession {
    fn new(id: String, transport: Transport) -> Self {
        let now = Instant::now();
        Self {
            id,
            created_at: now,
            last_activity: Mutex::new(now),
            state: SyncRwLock::new(SessionState::Uninitialized),
            transport,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Active and backed by an open transport.
    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active && !self.transport.is_closed()
    }

    /// Forward a message to the session's transport and wait for its reply.
    pub async fn send(
        &self,
        message: JsonRpcMessage,
    ) -> Result<Option<JsonRpcResponse>, TransportError> {
        self.touch();
        let result = self.transport.send(message).await;
        self.touch();
        result
    }

    /// Subscribe to server-initiated messages for SSE streaming.
    pub fn subscribe(&self) -> broadcast::Receiver<McpEvent> {
        self.transport.subscribe()
    }

    /// Resolves once the session's transport has closed.
    pub async fn closed(&self) {
        self.transport.closed().await
    }

    /// Time since the last message was routed to this session.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Get the session age in seconds.
    pub fn age_secs(&self) -> u64 {
        self.created_at.elapsed().as_secs()
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    fn set_state(&self, state: SessionState) {
        let mut current = self.state.write();
        if *current != SessionState::Closed {
            *current = state;
        }
    }

    fn shut_down(&self) {
        self.set_state(SessionState::Closed);
        self.transport.close();
    }
}

/// A session whose handshake has not completed yet.
///
/// Not registered; dropping it closes the provisional transport.
#[derive(Debug)]
pub struct PendingSession {
    session: Arc<McpSession>,
}

impl PendingSession {
    pub fn id(&self) -> &str {
        &self.session.id
    }
}

impl Drop for PendingSession {
    fn drop(&mut self) {
        if self.session.state() != SessionState::Active {
            self.session.shut_down();
        }
    }
}

/// Manager for MCP sessions.
#[derive(Clone)]
pub struct McpSessionManager {
    sessions: Arc<RwLock<HashMap<String, Arc<McpSession>>>>,
    channel_capacity: usize,
}

impl McpSessionManager {
    /// Create a new session manager.
    pub fn new() -> Self {
        Self::with_channel_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_channel_capacity(channel_capacity: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Get an active session by ID.
    pub async fn lookup(&self, id: &str) -> Option<Arc<McpSession>> {
        let sessions = self.sessions.read().await;
        sessions.get(id).filter(|s| s.is_active()).cloned()
    }

    /// Allocate an id and start a transport for `handler`.
    ///
    /// The session stays invisible until [`Self::complete_handshake`] publishes it.
    pub async fn begin_session(&self, handler: McpHandler) -> PendingSession {
        let id = {
            let sessions = self.sessions.read().await;
            loop {
                let candidate = Uuid::new_v4().to_string();
                if !sessions.contains_key(&candidate) {
                    break candidate;
                }
            }
        };
        debug!("Starting provisional MCP session {}", id);
        let transport = Transport::spawn(id.clone(), handler, self.channel_capacity);
        PendingSession {
            session: Arc::new(McpSession::new(id, transport)),
        }
    }

    /// Feed the `initialize` message through the pending session and publish
    /// it if the handshake succeeds.
    pub async fn complete_handshake(
        &self,
        pending: PendingSession,
        initialize: JsonRpcMessage,
    ) -> Result<(String, JsonRpcResponse), SessionError> {
        let session = pending.session.clone();
        let response = session
            .send(initialize)
            .await?
            .ok_or(SessionError::NoResponse)?;
        if response.is_error() {
            return Err(SessionError::Rejected(response));
        }

        {
            let mut sessions = self.sessions.write().await;
            if sessions.contains_key(&session.id) {
                return Err(SessionError::IdCollision(session.id.clone()));
            }
            session.set_state(SessionState::Active);
            sessions.insert(session.id.clone(), session.clone());
        }
        drop(pending);

        self.watch(session.clone());
        info!("Created MCP session: {}", session.id);
        Ok((session.id.clone(), response))
    }

    fn watch(&self, session: Arc<McpSession>) {
        let manager = self.clone();
        tokio::spawn(async move {
            session.closed().await;
            session.set_state(SessionState::Closed);
            manager.remove(&session.id).await;
        });
    }

    /// Remove a session. Removing an unknown id is a no-op.
    pub async fn remove(&self, id: &str) {
        if let Some(session) = self.take(id).await {
            debug!(
                "Removed MCP session {} (age: {}s)",
                id,
                session.age_secs()
            );
        }
    }

    /// Terminate a session. Returns whether it existed.
    pub async fn close(&self, id: &str) -> bool {
        match self.take(id).await {
            Some(_) => {
                info!("Terminated MCP session: {}", id);
                true
            }
            None => false,
        }
    }

    async fn take(&self, id: &str) -> Option<Arc<McpSession>> {
        let session = self.sessions.write().await.remove(id)?;
        session.shut_down();
        Some(session)
    }

    /// Get the number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn session_ids(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    /// Close sessions that have been idle for at least `max_idle`.
    pub async fn close_idle(&self, max_idle: Duration) -> usize {
        let idle: Vec<String> = {
            let sessions = self.sessions.read().await;
            sessions
                .values()
                .filter(|s| s.idle_for() >= max_idle)
                .map(|s| s.id.clone())
                .collect()
        };

        let mut closed = 0;
        for id in idle {
            if let Some(session) = self.take(&id).await {
                info!(
                    "Closed idle MCP session: {} (idle: {}s)",
                    id,
                    session.idle_for().as_secs()
                );
                closed += 1;
            }
        }
        closed
    }

    /// Run [`Self::close_idle`] periodically in the background.
    pub fn spawn_idle_sweep(&self, max_idle: Duration) -> JoinHandle<()> {
        let manager = self.clone();
        let period = (max_idle / 2).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let closed = manager.close_idle(max_idle).await;
                if closed > 0 {
                    debug!("Idle sweep closed {} MCP session(s)", closed);
                }
            }
        })
    }

    /// Close every session.
    pub async fn shutdown(&self) -> usize {
        let drained: Vec<Arc<McpSession>> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().map(|(_, s)| s).collect()
        };
        for session in &drained {
            session.shut_down();
        }
        if !drained.is_empty() {
            warn!("Closed {} MCP session(s) on shutdown", drained.len());
        }
        drained.len()
    }
}

impl Default for McpSessionManager {
    fn default() -> Self {
        Self::new()
    }
}
