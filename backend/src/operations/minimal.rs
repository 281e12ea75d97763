//! The minimal capability set: `echo` tool, `server-info` resource and
//! `greeting` prompt.

use async_trait::async_trait;
use garde::Validate;
use reddit_mcp_types::mcp::ReadResourceResult;
use reddit_mcp_types::{
    CallToolResult, GetPromptResult, LoggingLevel, Prompt, PromptArgument, PromptMessage,
    Resource, ResourceContents, Tool,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

use super::{
    now_rfc3339, parse_arguments, OperationContext, OperationError, PromptHandler,
    ResourceDescriptor, ResourceHandler, ToolHandler,
};

const TRANSPORT_NAME: &str = "Streamable HTTP";

#[derive(Debug, Deserialize, Validate)]
struct EchoArgs {
    #[garde(skip)]
    message: String,
}

/// Echoes the provided message with timestamp and server metadata.
pub struct EchoTool;

#[async_trait]
impl ToolHandler for EchoTool {
    fn descriptor(&self) -> Tool {
        Tool {
            name: "echo".to_string(),
            title: Some("Echo Tool".to_string()),
            description: "Echoes back the provided message with timestamp and server metadata"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "message": {
                        "type": "string",
                        "description": "The message to echo back"
                    }
                },
                "required": ["message"]
            }),
        }
    }

    async fn call(
        &self,
        arguments: Option<Value>,
        ctx: &OperationContext,
    ) -> Result<CallToolResult, OperationError> {
        let args: EchoArgs = parse_arguments(arguments)?;
        ctx.log(LoggingLevel::Debug, json!({"tool": "echo", "length": args.message.len()}));

        let response = json!({
            "input": {
                "original": args.message,
                "length": args.message.chars().count(),
                "type": "string"
            },
            "output": {
                "echoed": format!("Echo: {}", args.message),
                "timestamp": now_rfc3339(),
                "server": ctx.server_info.name,
                "processed": true
            },
            "metadata": {
                "tool": "echo",
                "version": ctx.server_info.version,
                "transport": TRANSPORT_NAME
            }
        });
        Ok(CallToolResult::text(pretty(&response)))
    }
}

/// Describes this server: name, version, features and registered operation counts.
pub struct ServerInfoResource;

#[async_trait]
impl ResourceHandler for ServerInfoResource {
    fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor::Static(Resource {
            uri: "info://server".to_string(),
            name: "server-info".to_string(),
            title: Some("Server Information".to_string()),
            description: Some("Information about this Reddit MCP server".to_string()),
            mime_type: Some("application/json".to_string()),
        })
    }

    async fn read(
        &self,
        uri: &str,
        _params: HashMap<String, String>,
        ctx: &OperationContext,
    ) -> Result<ReadResourceResult, OperationError> {
        let info = json!({
            "name": ctx.server_info.name,
            "version": ctx.server_info.version,
            "description": "An MCP server exposing Reddit posts, comments and communities",
            "timestamp": now_rfc3339(),
            "features": ["reddit-data", "resources", "tools", "prompts", "logging"],
            "uri": uri,
            "capabilities": {
                "resources": ctx.summary.resources,
                "tools": ctx.summary.tools,
                "prompts": ctx.summary.prompts
            },
            "transport": TRANSPORT_NAME,
            "status": "active"
        });
        Ok(json_contents(uri, &info))
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum GreetingStyle {
    Formal,
    Casual,
    #[default]
    Friendly,
}

#[derive(Debug, Deserialize, Validate)]
struct GreetingArgs {
    #[garde(skip)]
    name: Option<String>,
    #[garde(skip)]
    style: Option<GreetingStyle>,
}

/// Generates a personalised greeting prompt.
pub struct GreetingPrompt;

#[async_trait]
impl PromptHandler for GreetingPrompt {
    fn descriptor(&self) -> Prompt {
        Prompt {
            name: "greeting".to_string(),
            title: Some("Personal Greeting".to_string()),
            description: Some(
                "Generate a personalized greeting message for a given name".to_string(),
            ),
            arguments: vec![
                PromptArgument {
                    name: "name".to_string(),
                    description: Some("The name of the person to greet".to_string()),
                    required: false,
                },
                PromptArgument {
                    name: "style".to_string(),
                    description: Some(
                        "The greeting style (optional): formal, casual or friendly".to_string(),
                    ),
                    required: false,
                },
            ],
        }
    }

    async fn get(&self, arguments: Option<Value>) -> Result<GetPromptResult, OperationError> {
        let args: GreetingArgs = parse_arguments(arguments)?;
        let name = args.name.unwrap_or_else(|| "User".to_string());
        let text = match args.style.unwrap_or_default() {
            GreetingStyle::Formal => format!(
                "Please create a formal, professional greeting for {}. Make it respectful and appropriate for business settings.",
                name
            ),
            GreetingStyle::Casual => format!(
                "Please create a casual, relaxed greeting for {}. Make it informal and conversational.",
                name
            ),
            GreetingStyle::Friendly => format!(
                "Please create a warm, personalized greeting for {}. Make it friendly and welcoming.",
                name
            ),
        };
        Ok(GetPromptResult {
            description: None,
            messages: vec![PromptMessage::user(text)],
        })
    }
}

pub(crate) fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Wrap a JSON document as the single `application/json` content of `uri`.
pub(crate) fn json_contents(uri: &str, value: &Value) -> ReadResourceResult {
    ReadResourceResult {
        contents: vec![ResourceContents {
            uri: uri.to_string(),
            mime_type: Some("application/json".to_string()),
            text: pretty(value),
        }],
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::mcp::transport::SessionLogger;
    use crate::operations::CatalogSummary;
    use reddit_mcp_types::Implementation;

    pub(crate) fn test_context() -> OperationContext {
        OperationContext {
            session_id: "test-session".to_string(),
            server_info: Implementation {
                name: "reddit-mcp".to_string(),
                version: "1.0.0".to_string(),
                title: None,
            },
            summary: CatalogSummary {
                tools: 1,
                resources: 1,
                prompts: 1,
            },
            logger: SessionLogger::detached(),
        }
    }

    #[tokio::test]
    async fn test_echo() {
        let result = EchoTool
            .call(Some(json!({"message": "hi there"})), &test_context())
            .await
            .unwrap();
        assert!(!result.is_error);
        let body: Value = serde_json::from_str(result.content[0].as_text()).unwrap();
        assert_eq!(body["output"]["echoed"], "Echo: hi there");
        assert_eq!(body["input"]["length"], 8);
        assert_eq!(body["output"]["server"], "reddit-mcp");
        assert_eq!(body["metadata"]["transport"], "Streamable HTTP");
    }

    #[tokio::test]
    async fn test_echo_requires_message() {
        let err = EchoTool
            .call(Some(json!({})), &test_context())
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_server_info() {
        let result = ServerInfoResource
            .read("info://server", HashMap::new(), &test_context())
            .await
            .unwrap();
        assert_eq!(result.contents.len(), 1);
        let body: Value = serde_json::from_str(&result.contents[0].text).unwrap();
        assert_eq!(body["name"], "reddit-mcp");
        assert_eq!(body["capabilities"]["tools"], 1);
        assert_eq!(body["status"], "active");
    }

    #[tokio::test]
    async fn test_greeting_defaults_and_styles() {
        let default = GreetingPrompt.get(None).await.unwrap();
        assert!(default.messages[0]
            .content
            .as_text()
            .contains("warm, personalized greeting for User"));

        let formal = GreetingPrompt
            .get(Some(json!({"name": "Ada", "style": "formal"})))
            .await
            .unwrap();
        assert!(formal.messages[0]
            .content
            .as_text()
            .contains("formal, professional greeting for Ada"));

        let bad = GreetingPrompt
            .get(Some(json!({"style": "sarcastic"})))
            .await
            .unwrap_err();
        assert!(matches!(bad, OperationError::InvalidArguments(_)));
    }
}
