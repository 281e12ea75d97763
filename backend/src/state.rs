//! Application state management.

use reddit_mcp_types::{Implementation, DEFAULT_SERVER_NAME};

use crate::mcp::{McpHandler, McpSessionManager};
use crate::operations::{self, OperationFactory};
use crate::reddit::{RedditClient, RedditConfig};

/// Shared application state.
///
/// Cheap to clone; every clone refers to the same session registry.
#[derive(Clone)]
pub struct AppState {
    /// Live MCP sessions
    pub sessions: McpSessionManager,
    /// Name and version reported in `serverInfo` and `/health`
    pub server_info: Implementation,
    /// Builds the operation registry bound to each new session
    pub operations: OperationFactory,
}

impl AppState {
    pub fn new(
        sessions: McpSessionManager,
        server_info: Implementation,
        operations: OperationFactory,
    ) -> Self {
        Self {
            sessions,
            server_info,
            operations,
        }
    }

    /// A fresh dispatcher for a new session.
    pub fn new_handler(&self) -> McpHandler {
        McpHandler::new(self.server_info.clone(), (self.operations)())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(
            McpSessionManager::new(),
            Implementation {
                name: DEFAULT_SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
            },
            operations::catalog_factory(RedditClient::new(RedditConfig::default())),
        )
    }
}
