//! Operation registry: the tools, resources and prompts a session can invoke.
//!
//! Every session gets its own [`OperationRegistry`] instance built by an
//! [`OperationFactory`]. Operations are stateless across invocations; all
//! per-call context arrives through [`OperationContext`].

pub mod minimal;
pub mod reddit_prompts;
pub mod reddit_resources;
pub mod reddit_tools;

use async_trait::async_trait;
use reddit_mcp_types::mcp::ReadResourceResult;
use reddit_mcp_types::{
    CallToolResult, GetPromptResult, Implementation, LoggingLevel, Prompt, Resource,
    ResourceTemplate, Tool,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::mcp::transport::SessionLogger;
use crate::reddit::{RedditClient, RedditError};

/// Failure reported by an operation.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error(transparent)]
    Reddit(#[from] RedditError),

    #[error("{0}")]
    Failed(String),
}

/// Deserialize and validate operation arguments.
///
/// Missing arguments are treated as an empty object so that operations with
/// only optional inputs can be called without `arguments`.
pub fn parse_arguments<T>(arguments: Option<Value>) -> Result<T, OperationError>
where
    T: DeserializeOwned + garde::Validate,
    T::Context: Default,
{
    let value = arguments.unwrap_or_else(|| Value::Object(Default::default()));
    let parsed: T = serde_json::from_value(value)
        .map_err(|e| OperationError::InvalidArguments(e.to_string()))?;
    parsed
        .validate()
        .map_err(|report| OperationError::InvalidArguments(report.to_string()))?;
    Ok(parsed)
}

/// Counts of registered operations, reported by the server-info resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogSummary {
    pub tools: usize,
    pub resources: usize,
    pub prompts: usize,
}

/// Per-invocation context handed to operations.
#[derive(Clone)]
pub struct OperationContext {
    pub session_id: String,
    pub server_info: Implementation,
    pub summary: CatalogSummary,
    pub logger: SessionLogger,
}

impl OperationContext {
    /// Send a `notifications/message` log entry to the session's client.
    pub fn log(&self, level: LoggingLevel, data: Value) {
        self.logger.log(level, Some(&self.server_info.name), data);
    }
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn descriptor(&self) -> Tool;

    async fn call(
        &self,
        arguments: Option<Value>,
        ctx: &OperationContext,
    ) -> Result<CallToolResult, OperationError>;
}

/// How a resource is addressed.
#[derive(Debug, Clone)]
pub enum ResourceDescriptor {
    Static(Resource),
    Template(ResourceTemplate),
}

#[async_trait]
pub trait ResourceHandler: Send + Sync {
    fn descriptor(&self) -> ResourceDescriptor;

    /// Read the resource. `params` holds the variables bound by a template.
    async fn read(
        &self,
        uri: &str,
        params: HashMap<String, String>,
        ctx: &OperationContext,
    ) -> Result<ReadResourceResult, OperationError>;
}

#[async_trait]
pub trait PromptHandler: Send + Sync {
    fn descriptor(&self) -> Prompt;

    async fn get(&self, arguments: Option<Value>) -> Result<GetPromptResult, OperationError>;
}

/// Match `uri` against a level-1 URI template such as `reddit://r/{subreddit}`.
///
/// Variables match one or more characters up to the next literal segment
/// (or `/` when the variable ends the template).
pub fn match_uri_template(template: &str, uri: &str) -> Option<HashMap<String, String>> {
    let mut params = HashMap::new();
    let mut rest_template = template;
    let mut rest_uri = uri;

    while !rest_template.is_empty() {
        match rest_template.find('{') {
            Some(0) => {
                let close = rest_template.find('}')?;
                let name = &rest_template[1..close];
                rest_template = &rest_template[close + 1..];
                let literal_end = rest_template.find('{').unwrap_or(rest_template.len());
                let next_literal = &rest_template[..literal_end];
                let value_len = if next_literal.is_empty() {
                    rest_uri.find('/').unwrap_or(rest_uri.len())
                } else {
                    rest_uri.find(next_literal)?
                };
                if value_len == 0 {
                    return None;
                }
                params.insert(name.to_string(), rest_uri[..value_len].to_string());
                rest_uri = &rest_uri[value_len..];
            }
            Some(start) => {
                let literal = &rest_template[..start];
                rest_uri = rest_uri.strip_prefix(literal)?;
                rest_template = &rest_template[start..];
            }
            None => {
                rest_uri = rest_uri.strip_prefix(rest_template)?;
                rest_template = "";
            }
        }
    }

    rest_uri.is_empty().then_some(params)
}

/// The set of operations bound to one session.
#[derive(Clone, Default)]
pub struct OperationRegistry {
    tools: Vec<Arc<dyn ToolHandler>>,
    resources: Vec<Arc<dyn ResourceHandler>>,
    prompts: Vec<Arc<dyn PromptHandler>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, tool: impl ToolHandler + 'static) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    pub fn with_resource(mut self, resource: impl ResourceHandler + 'static) -> Self {
        self.resources.push(Arc::new(resource));
        self
    }

    pub fn with_prompt(mut self, prompt: impl PromptHandler + 'static) -> Self {
        self.prompts.push(Arc::new(prompt));
        self
    }

    pub fn summary(&self) -> CatalogSummary {
        CatalogSummary {
            tools: self.tools.len(),
            resources: self.resources.len(),
            prompts: self.prompts.len(),
        }
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.tools.iter().map(|t| t.descriptor()).collect()
    }

    pub fn tool(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools
            .iter()
            .find(|t| t.descriptor().name == name)
            .cloned()
    }

    pub fn resources(&self) -> Vec<Resource> {
        self.resources
            .iter()
            .filter_map(|r| match r.descriptor() {
                ResourceDescriptor::Static(resource) => Some(resource),
                ResourceDescriptor::Template(_) => None,
            })
            .collect()
    }

    pub fn resource_templates(&self) -> Vec<ResourceTemplate> {
        self.resources
            .iter()
            .filter_map(|r| match r.descriptor() {
                ResourceDescriptor::Template(template) => Some(template),
                ResourceDescriptor::Static(_) => None,
            })
            .collect()
    }

    /// Find the resource serving `uri`. Static resources win over templates.
    pub fn resolve_resource(
        &self,
        uri: &str,
    ) -> Option<(Arc<dyn ResourceHandler>, HashMap<String, String>)> {
        let exact = self.resources.iter().find(|r| {
            matches!(r.descriptor(), ResourceDescriptor::Static(ref resource) if resource.uri == uri)
        });
        if let Some(handler) = exact {
            return Some((handler.clone(), HashMap::new()));
        }

        self.resources.iter().find_map(|r| match r.descriptor() {
            ResourceDescriptor::Template(template) => {
                match_uri_template(&template.uri_template, uri).map(|params| (r.clone(), params))
            }
            ResourceDescriptor::Static(_) => None,
        })
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.iter().map(|p| p.descriptor()).collect()
    }

    pub fn prompt(&self, name: &str) -> Option<Arc<dyn PromptHandler>> {
        self.prompts
            .iter()
            .find(|p| p.descriptor().name == name)
            .cloned()
    }
}

/// Builds a fresh [`OperationRegistry`] for every new session.
pub type OperationFactory = Arc<dyn Fn() -> OperationRegistry + Send + Sync>;

/// The full catalog: the minimal echo/server-info/greeting set plus the
/// Reddit tools, resources and prompts.
pub fn catalog(reddit: RedditClient) -> OperationRegistry {
    OperationRegistry::new()
        .with_tool(minimal::EchoTool)
        .with_tool(reddit_tools::GetSubredditPosts::new(reddit.clone()))
        .with_tool(reddit_tools::GetPostComments::new(reddit.clone()))
        .with_tool(reddit_tools::GetUserPosts::new(reddit.clone()))
        .with_tool(reddit_tools::SearchPosts::new(reddit.clone()))
        .with_resource(minimal::ServerInfoResource)
        .with_resource(reddit_resources::PopularSubreddits::new(reddit.clone()))
        .with_resource(reddit_resources::TrendingPosts::new(reddit.clone()))
        .with_resource(reddit_resources::SubredditInfo::new(reddit))
        .with_prompt(minimal::GreetingPrompt)
        .with_prompt(reddit_prompts::AnalyzeRedditPost)
        .with_prompt(reddit_prompts::RedditContentCreation)
        .with_prompt(reddit_prompts::SubredditResearch)
}

/// Factory producing [`catalog`] instances that share one HTTP client.
pub fn catalog_factory(reddit: RedditClient) -> OperationFactory {
    Arc::new(move || catalog(reddit.clone()))
}

/// Truncate `text` to `max` characters, appending `...` when shortened.
pub(crate) fn truncate_with_ellipsis(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let mut truncated: String = text.chars().take(max).collect();
        truncated.push_str("...");
        truncated
    } else {
        text.to_string()
    }
}

/// Render a unix timestamp (seconds) as an RFC 3339 UTC string.
pub(crate) fn unix_to_rfc3339(seconds: f64) -> String {
    chrono::DateTime::from_timestamp(seconds as i64, 0)
        .unwrap_or_default()
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Current time as an RFC 3339 UTC string with millisecond precision.
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
