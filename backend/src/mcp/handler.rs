//! MCP JSON-RPC dispatcher.
//!
//! One [`McpHandler`] exists per session. It tracks the session's handshake
//! and routes protocol methods to the session's [`OperationRegistry`].

use futures::FutureExt;
use reddit_mcp_types::jsonrpc::{error_codes, JSONRPC_VERSION};
use reddit_mcp_types::mcp::{
    negotiate_protocol_version, CallToolParams, GetPromptParams, ListChangedCapability,
    ListPromptsResult, ListResourceTemplatesResult, ListResourcesResult, ListToolsResult,
    ReadResourceParams, ResourcesCapability, SetLevelParams,
};
use reddit_mcp_types::{
    CallToolResult, Implementation, InitializeParams, InitializeResult, JsonRpcMessage,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId, ServerCapabilities,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::panic::AssertUnwindSafe;
use tracing::{debug, error, info, warn};

use super::transport::SessionLogger;
use crate::operations::{OperationContext, OperationError, OperationRegistry};

/// Returns true if `value` is a single, well-formed `initialize` request.
pub fn is_initialize_request(value: &Value) -> bool {
    let Some(object) = value.as_object() else {
        return false;
    };
    object.get("jsonrpc").and_then(Value::as_str) == Some(JSONRPC_VERSION)
        && object.get("method").and_then(Value::as_str) == Some("initialize")
        && object
            .get("id")
            .is_some_and(|id| serde_json::from_value::<RequestId>(id.clone()).is_ok())
        && object
            .get("params")
            .is_some_and(|params| serde_json::from_value::<InitializeParams>(params.clone()).is_ok())
}

/// Handshake progress of one session, as seen by the dispatcher.
#[derive(Debug, Clone, Default)]
struct Handshake {
    protocol_version: Option<String>,
    client_info: Option<Implementation>,
    client_ready: bool,
}

/// MCP request handler bound to one session.
pub struct McpHandler {
    server_info: Implementation,
    operations: OperationRegistry,
    session_id: String,
    logger: SessionLogger,
    handshake: Handshake,
}

impl McpHandler {
    pub fn new(server_info: Implementation, operations: OperationRegistry) -> Self {
        Self {
            server_info,
            operations,
            session_id: String::new(),
            logger: SessionLogger::detached(),
            handshake: Handshake::default(),
        }
    }

    /// Attach the handler to its session's id and outbound channel.
    pub fn bind(&mut self, session_id: String, logger: SessionLogger) {
        self.session_id = session_id;
        self.logger = logger;
    }

    /// Whether `initialize` has completed on this session.
    pub fn is_initialized(&self) -> bool {
        self.handshake.protocol_version.is_some()
    }

    /// Handle one inbound message. Only requests produce a response.
    pub async fn handle_message(&mut self, message: JsonRpcMessage) -> Option<JsonRpcResponse> {
        match message {
            JsonRpcMessage::Request(request) => Some(self.handle_request(request).await),
            JsonRpcMessage::Notification(notification) => {
                self.handle_notification(notification);
                None
            }
            JsonRpcMessage::Response(response) => {
                debug!(
                    "MCP session {}: ignoring client response for id {:?}",
                    self.session_id, response.id
                );
                None
            }
        }
    }

    async fn handle_request(&mut self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();
        debug!(
            "MCP session {}: handling method {}",
            self.session_id, request.method
        );

        if request.jsonrpc != JSONRPC_VERSION {
            return JsonRpcResponse::error(
                Some(id),
                error_codes::INVALID_REQUEST,
                "Invalid Request: jsonrpc must be \"2.0\"",
            );
        }

        let params = request.params;
        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(params),
            "ping" => Ok(json!({})),
            "tools/list" => to_result(ListToolsResult {
                tools: self.operations.tools(),
            }),
            "tools/call" => self.handle_call_tool(params).await,
            "resources/list" => to_result(ListResourcesResult {
                resources: self.operations.resources(),
            }),
            "resources/templates/list" => to_result(ListResourceTemplatesResult {
                resource_templates: self.operations.resource_templates(),
            }),
            "resources/read" => self.handle_read_resource(params).await,
            "prompts/list" => to_result(ListPromptsResult {
                prompts: self.operations.prompts(),
            }),
            "prompts/get" => self.handle_get_prompt(params).await,
            "logging/setLevel" => self.handle_set_level(params),
            _ => Err(RpcFailure::new(
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            )),
        };

        match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(failure) => JsonRpcResponse::error(Some(id), failure.code, failure.message),
        }
    }

    fn handle_notification(&mut self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/initialized" => {
                if !self.is_initialized() {
                    warn!(
                        "MCP session {}: initialized notification before initialize",
                        self.session_id
                    );
                }
                self.handshake.client_ready = true;
                let client = self
                    .handshake
                    .client_info
                    .as_ref()
                    .map_or("unknown client", |info| info.name.as_str());
                debug!("MCP session {}: {} ready", self.session_id, client);
            }
            "notifications/cancelled" => {
                // Requests are handled to completion in order; nothing to cancel.
                debug!("MCP session {}: cancellation acknowledged", self.session_id);
            }
            other => debug!(
                "MCP session {}: ignoring notification {}",
                self.session_id, other
            ),
        }
    }

    fn handle_initialize(&mut self, params: Option<Value>) -> Result<Value, RpcFailure> {
        if self.is_initialized() {
            return Err(RpcFailure::new(
                error_codes::INVALID_REQUEST,
                "Invalid Request: Server already initialized",
            ));
        }
        let params: InitializeParams = parse_params(params)?;
        let protocol_version = negotiate_protocol_version(&params.protocol_version);

        info!(
            "MCP session {}: initialize from {} {} (protocol {})",
            self.session_id, params.client_info.name, params.client_info.version, protocol_version
        );

        self.handshake.protocol_version = Some(protocol_version.to_string());
        self.handshake.client_info = Some(params.client_info);

        to_result(InitializeResult {
            protocol_version: protocol_version.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ListChangedCapability::default()),
                resources: Some(ResourcesCapability::default()),
                prompts: Some(ListChangedCapability::default()),
                logging: Some(json!({})),
            },
            server_info: self.server_info.clone(),
            instructions: None,
        })
    }

    async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value, RpcFailure> {
        let params: CallToolParams = parse_params(params)?;
        let tool = self.operations.tool(&params.name).ok_or_else(|| {
            RpcFailure::new(
                error_codes::INVALID_PARAMS,
                format!("Tool {} not found", params.name),
            )
        })?;

        let ctx = self.context();
        let outcome = AssertUnwindSafe(tool.call(params.arguments, &ctx))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(
                    "MCP session {}: tool {} failed: {}",
                    self.session_id, params.name, e
                );
                CallToolResult::error(e.to_string())
            }
            Err(_) => {
                error!(
                    "MCP session {}: tool {} panicked",
                    self.session_id, params.name
                );
                CallToolResult::error(format!("Tool {} failed unexpectedly", params.name))
            }
        };
        to_result(result)
    }

    async fn handle_read_resource(&self, params: Option<Value>) -> Result<Value, RpcFailure> {
        let params: ReadResourceParams = parse_params(params)?;
        let (resource, bindings) =
            self.operations
                .resolve_resource(&params.uri)
                .ok_or_else(|| {
                    RpcFailure::new(
                        error_codes::RESOURCE_NOT_FOUND,
                        format!("Resource {} not found", params.uri),
                    )
                })?;

        let ctx = self.context();
        let outcome = AssertUnwindSafe(resource.read(&params.uri, bindings, &ctx))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(result)) => to_result(result),
            Ok(Err(e)) => Err(self.operation_failure("resource", &params.uri, e)),
            Err(_) => Err(self.operation_panic("resource", &params.uri)),
        }
    }

    async fn handle_get_prompt(&self, params: Option<Value>) -> Result<Value, RpcFailure> {
        let params: GetPromptParams = parse_params(params)?;
        let prompt = self.operations.prompt(&params.name).ok_or_else(|| {
            RpcFailure::new(
                error_codes::INVALID_PARAMS,
                format!("Prompt {} not found", params.name),
            )
        })?;

        let outcome = AssertUnwindSafe(prompt.get(params.arguments))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(result)) => to_result(result),
            Ok(Err(e)) => Err(self.operation_failure("prompt", &params.name, e)),
            Err(_) => Err(self.operation_panic("prompt", &params.name)),
        }
    }

    fn handle_set_level(&self, params: Option<Value>) -> Result<Value, RpcFailure> {
        let params: SetLevelParams = parse_params(params)?;
        self.logger.set_level(params.level);
        debug!(
            "MCP session {}: log level set to {:?}",
            self.session_id, params.level
        );
        Ok(json!({}))
    }

    fn context(&self) -> OperationContext {
        OperationContext {
            session_id: self.session_id.clone(),
            server_info: self.server_info.clone(),
            summary: self.operations.summary(),
            logger: self.logger.clone(),
        }
    }

    fn operation_failure(&self, kind: &str, name: &str, e: OperationError) -> RpcFailure {
        warn!(
            "MCP session {}: {} {} failed: {}",
            self.session_id, kind, name, e
        );
        let code = match e {
            OperationError::InvalidArguments(_) => error_codes::INVALID_PARAMS,
            OperationError::ResourceNotFound(_) => error_codes::RESOURCE_NOT_FOUND,
            _ => error_codes::INTERNAL_ERROR,
        };
        RpcFailure::new(code, e.to_string())
    }

    fn operation_panic(&self, kind: &str, name: &str) -> RpcFailure {
        error!("MCP session {}: {} {} panicked", self.session_id, kind, name);
        RpcFailure::new(
            error_codes::INTERNAL_ERROR,
            format!("Internal error while serving {} {}", kind, name),
        )
    }
}

struct RpcFailure {
    code: i32,
    message: String,
}

impl RpcFailure {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, RpcFailure> {
    let value = params.unwrap_or_else(|| json!({}));
    serde_json::from_value(value)
        .map_err(|e| RpcFailure::new(error_codes::INVALID_PARAMS, format!("Invalid params: {}", e)))
}

fn to_result<T: Serialize>(value: T) -> Result<Value, RpcFailure> {
    serde_json::to_value(value)
        .map_err(|e| RpcFailure::new(error_codes::INTERNAL_ERROR, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::minimal::{EchoTool, GreetingPrompt, ServerInfoResource};
    use crate::operations::ToolHandler;
    use async_trait::async_trait;
    use reddit_mcp_types::Tool;

    struct PanickingTool;

    #[async_trait]
    impl ToolHandler for PanickingTool {
        fn descriptor(&self) -> Tool {
            Tool {
                name: "boom".to_string(),
                title: None,
                description: "Always panics".to_string(),
                input_schema: json!({"type": "object"}),
            }
        }

        async fn call(
            &self,
            _arguments: Option<Value>,
            _ctx: &OperationContext,
        ) -> Result<CallToolResult, OperationError> {
            panic!("boom");
        }
    }

    fn handler() -> McpHandler {
        McpHandler::new(
            Implementation {
                name: "reddit-mcp".to_string(),
                version: "1.0.0".to_string(),
                title: None,
            },
            OperationRegistry::new()
                .with_tool(EchoTool)
                .with_tool(PanickingTool)
                .with_resource(ServerInfoResource)
                .with_prompt(GreetingPrompt),
        )
    }

    fn request(id: i64, method: &str, params: Value) -> JsonRpcMessage {
        JsonRpcMessage::Request(JsonRpcRequest::new(
            RequestId::Number(id),
            method,
            Some(params),
        ))
    }

    fn initialize_params() -> Value {
        json!({
            "protocolVersion": "2025-03-26",
            "capabilities": {},
            "clientInfo": {"name": "test-client", "version": "0.1.0"}
        })
    }

    async fn initialized_handler() -> McpHandler {
        let mut handler = handler();
        let response = handler
            .handle_message(request(0, "initialize", initialize_params()))
            .await
            .unwrap();
        assert!(!response.is_error());
        handler
    }

    #[test]
    fn test_is_initialize_request() {
        assert!(is_initialize_request(&json!({
            "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": initialize_params()
        })));
        // Missing clientInfo.
        assert!(!is_initialize_request(&json!({
            "jsonrpc": "2.0", "id": 1, "method": "initialize",
            "params": {"protocolVersion": "2025-03-26", "capabilities": {}}
        })));
        assert!(!is_initialize_request(&json!({
            "jsonrpc": "2.0", "id": 1, "method": "tools/list"
        })));
        assert!(!is_initialize_request(&json!([{
            "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": initialize_params()
        }])));
    }

    #[tokio::test]
    async fn test_initialize_negotiates_version() {
        let mut handler = handler();
        let response = handler
            .handle_message(request(1, "initialize", initialize_params()))
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], "2025-03-26");
        assert_eq!(result["serverInfo"]["name"], "reddit-mcp");
        assert!(result["capabilities"]["tools"].is_object());
        assert!(handler.is_initialized());
    }

    #[tokio::test]
    async fn test_second_initialize_is_rejected() {
        let mut handler = initialized_handler().await;
        let response = handler
            .handle_message(request(1, "initialize", initialize_params()))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, error_codes::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_notifications_have_no_response() {
        let mut handler = initialized_handler().await;
        let notification = JsonRpcMessage::Notification(JsonRpcNotification::new(
            "notifications/initialized",
            None,
        ));
        assert!(handler.handle_message(notification).await.is_none());
        assert!(handler.handshake.client_ready);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let mut handler = initialized_handler().await;
        let response = handler
            .handle_message(request(2, "bogus/method", json!({})))
            .await
            .unwrap();
        let error = response.error.unwrap();
        assert_eq!(error.code, error_codes::METHOD_NOT_FOUND);
        assert_eq!(response.id, Some(RequestId::Number(2)));
    }

    #[tokio::test]
    async fn test_tools_list_and_call() {
        let mut handler = initialized_handler().await;
        let listed = handler
            .handle_message(request(1, "tools/list", json!({})))
            .await
            .unwrap()
            .result
            .unwrap();
        assert_eq!(listed["tools"].as_array().unwrap().len(), 2);
        assert!(listed["tools"][0]["inputSchema"].is_object());

        let called = handler
            .handle_message(request(
                2,
                "tools/call",
                json!({"name": "echo", "arguments": {"message": "hello"}}),
            ))
            .await
            .unwrap()
            .result
            .unwrap();
        assert_eq!(called["content"][0]["type"], "text");
        assert!(called.get("isError").is_none());
    }

    #[tokio::test]
    async fn test_tool_failures_become_error_results() {
        let mut handler = initialized_handler().await;

        let invalid = handler
            .handle_message(request(1, "tools/call", json!({"name": "echo", "arguments": {}})))
            .await
            .unwrap()
            .result
            .unwrap();
        assert_eq!(invalid["isError"], true);

        let panicked = handler
            .handle_message(request(2, "tools/call", json!({"name": "boom"})))
            .await
            .unwrap()
            .result
            .unwrap();
        assert_eq!(panicked["isError"], true);

        // The handler keeps serving after a panic.
        let pong = handler
            .handle_message(request(3, "ping", json!({})))
            .await
            .unwrap();
        assert_eq!(pong.result, Some(json!({})));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_invalid_params() {
        let mut handler = initialized_handler().await;
        let response = handler
            .handle_message(request(1, "tools/call", json!({"name": "nope"})))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, error_codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_resources() {
        let mut handler = initialized_handler().await;
        let read = handler
            .handle_message(request(1, "resources/read", json!({"uri": "info://server"})))
            .await
            .unwrap()
            .result
            .unwrap();
        assert_eq!(read["contents"][0]["uri"], "info://server");
        assert_eq!(read["contents"][0]["mimeType"], "application/json");

        let missing = handler
            .handle_message(request(2, "resources/read", json!({"uri": "info://nope"})))
            .await
            .unwrap();
        assert_eq!(missing.error.unwrap().code, error_codes::RESOURCE_NOT_FOUND);

        let templates = handler
            .handle_message(request(3, "resources/templates/list", json!({})))
            .await
            .unwrap()
            .result
            .unwrap();
        assert_eq!(templates["resourceTemplates"], json!([]));
    }

    #[tokio::test]
    async fn test_prompts() {
        let mut handler = initialized_handler().await;
        let prompt = handler
            .handle_message(request(
                1,
                "prompts/get",
                json!({"name": "greeting", "arguments": {"name": "Ferris"}}),
            ))
            .await
            .unwrap()
            .result
            .unwrap();
        assert_eq!(prompt["messages"][0]["role"], "user");

        let invalid = handler
            .handle_message(request(
                2,
                "prompts/get",
                json!({"name": "greeting", "arguments": {"style": "rude"}}),
            ))
            .await
            .unwrap();
        assert_eq!(invalid.error.unwrap().code, error_codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_set_level() {
        let mut handler = initialized_handler().await;
        let response = handler
            .handle_message(request(1, "logging/setLevel", json!({"level": "error"})))
            .await
            .unwrap();
        assert_eq!(response.result, Some(json!({})));
        assert_eq!(handler.logger.level(), reddit_mcp_types::LoggingLevel::Error);

        let bad = handler
            .handle_message(request(2, "logging/setLevel", json!({"level": "loud"})))
            .await
            .unwrap();
        assert_eq!(bad.error.unwrap().code, error_codes::INVALID_PARAMS);
    }
}
