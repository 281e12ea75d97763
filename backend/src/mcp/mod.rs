//! MCP (Model Context Protocol) Streamable HTTP support.
//!
//! Each client session owns a [`transport::Transport`] whose worker task
//! feeds JSON-RPC messages, in arrival order, to the session's own
//! [`McpHandler`] and operation registry.
//!
//! ## Endpoints
//!
//! - `POST /mcp` - Send JSON-RPC messages
//! - `GET /mcp` - Open SSE stream for server messages
//! - `DELETE /mcp` - Terminate session
//!
//! ## Session Management
//!
//! Sessions are identified by the `mcp-session-id` header, assigned during
//! initialization and required for subsequent requests.

pub mod handler;
pub mod session;
pub mod transport;

pub use handler::{is_initialize_request, McpHandler};
pub use session::{McpSession, McpSessionManager, PendingSession, SessionError, SessionState};
pub use transport::{McpEvent, SessionLogger, Transport, TransportError};
