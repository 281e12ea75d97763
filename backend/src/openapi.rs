//! OpenAPI documentation configuration.

use reddit_mcp_types::HealthResponse;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::mcp::mcp_post,
        crate::api::mcp::mcp_get,
        crate::api::mcp::mcp_delete,
        crate::api::health::health,
    ),
    components(schemas(HealthResponse)),
    tags(
        (name = "MCP", description = "Model Context Protocol Streamable HTTP transport"),
        (name = "System", description = "System information endpoints")
    ),
    info(
        title = "Reddit MCP Server API",
        version = "1.0.0",
        description = "MCP server exposing Reddit posts, comments and communities over Streamable HTTP",
        license(
            name = "MIT"
        )
    )
)]
pub struct ApiDoc;
