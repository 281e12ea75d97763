//! Shared wire types for the Reddit MCP server.
//!
//! This crate contains the JSON-RPC 2.0 envelope, the MCP protocol payloads
//! and the plain HTTP API types used by the backend and its tests.

/// Default port for the MCP server.
pub const DEFAULT_PORT: u16 = 3000;

/// Default server name reported in `serverInfo` and the health probe.
pub const DEFAULT_SERVER_NAME: &str = "reddit-mcp";

/// HTTP header carrying the MCP session identifier.
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

pub mod api;
pub mod jsonrpc;
pub mod mcp;

// Re-export commonly used types
pub use api::HealthResponse;
pub use jsonrpc::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
};
pub use mcp::{
    CallToolResult, Content, GetPromptResult, Implementation, InitializeParams, InitializeResult,
    LoggingLevel, Prompt, PromptArgument, PromptMessage, Resource, ResourceContents,
    ResourceTemplate, ServerCapabilities, Tool,
};
