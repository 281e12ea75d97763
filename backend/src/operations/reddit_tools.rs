//! Reddit data-fetch tools.

use async_trait::async_trait;
use garde::Validate;
use reddit_mcp_types::{CallToolResult, LoggingLevel, Tool};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::minimal::pretty;
use super::{
    parse_arguments, truncate_with_ellipsis, unix_to_rfc3339, OperationContext, OperationError,
    ToolHandler,
};
use crate::reddit::{RedditClient, RedditError, RedditPost};

const PREVIEW_CHARS: usize = 200;
const COMMENT_BODY_CHARS: usize = 500;

fn failed(action: &str, err: RedditError) -> OperationError {
    OperationError::Failed(format!("Failed to {}: {}", action, err))
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingSort {
    #[default]
    Hot,
    New,
    Top,
    Rising,
}

impl ListingSort {
    fn as_str(self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::New => "new",
            Self::Top => "top",
            Self::Rising => "rising",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserSort {
    #[default]
    New,
    Hot,
    Top,
}

impl UserSort {
    fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Hot => "hot",
            Self::Top => "top",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSort {
    #[default]
    Relevance,
    Hot,
    Top,
    New,
    Comments,
}

impl SearchSort {
    fn as_str(self) -> &'static str {
        match self {
            Self::Relevance => "relevance",
            Self::Hot => "hot",
            Self::Top => "top",
            Self::New => "new",
            Self::Comments => "comments",
        }
    }
}

fn post_summary(post: &RedditPost) -> Value {
    json!({
        "id": post.id,
        "title": post.title,
        "author": post.author,
        "subreddit": post.subreddit,
        "score": post.score,
        "comments": post.num_comments,
        "created": unix_to_rfc3339(post.created_utc),
        "url": post.permalink,
        "preview": truncate_with_ellipsis(&post.selftext, PREVIEW_CHARS)
    })
}

// ============================================================================
// get_subreddit_posts
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
struct SubredditPostsArgs {
    #[garde(length(min = 1))]
    subreddit: String,
    #[garde(skip)]
    sort: Option<ListingSort>,
    #[garde(range(min = 1, max = 100))]
    limit: Option<u32>,
}

pub struct GetSubredditPosts {
    reddit: RedditClient,
}

impl GetSubredditPosts {
    pub fn new(reddit: RedditClient) -> Self {
        Self { reddit }
    }
}

#[async_trait]
impl ToolHandler for GetSubredditPosts {
    fn descriptor(&self) -> Tool {
        Tool {
            name: "get_subreddit_posts".to_string(),
            title: Some("Get Subreddit Posts".to_string()),
            description: "Fetch posts from a specific subreddit".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "subreddit": {"type": "string", "description": "Name of the subreddit (without r/)"},
                    "sort": {"type": "string", "enum": ["hot", "new", "top", "rising"], "description": "Sort order for posts"},
                    "limit": {"type": "integer", "minimum": 1, "maximum": 100, "description": "Number of posts to fetch (1-100)"}
                },
                "required": ["subreddit"]
            }),
        }
    }

    async fn call(
        &self,
        arguments: Option<Value>,
        ctx: &OperationContext,
    ) -> Result<CallToolResult, OperationError> {
        let args: SubredditPostsArgs = parse_arguments(arguments)?;
        let sort = args.sort.unwrap_or_default();
        let limit = args.limit.unwrap_or(25);
        ctx.log(
            LoggingLevel::Info,
            json!({"tool": "get_subreddit_posts", "subreddit": args.subreddit, "sort": sort.as_str()}),
        );

        let posts = self
            .reddit
            .get_subreddit_posts(&args.subreddit, sort.as_str(), limit)
            .await
            .map_err(|e| failed("fetch posts", e))?;

        Ok(CallToolResult::text(pretty(&json!({
            "subreddit": args.subreddit,
            "sort": sort.as_str(),
            "count": posts.len(),
            "posts": posts.iter().map(post_summary).collect::<Vec<_>>()
        }))))
    }
}

// ============================================================================
// get_post_comments
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
struct PostCommentsArgs {
    #[garde(length(min = 1))]
    subreddit: String,
    #[garde(length(min = 1))]
    post_id: String,
    #[garde(range(min = 1, max = 500))]
    limit: Option<u32>,
}

pub struct GetPostComments {
    reddit: RedditClient,
}

impl GetPostComments {
    pub fn new(reddit: RedditClient) -> Self {
        Self { reddit }
    }
}

#[async_trait]
impl ToolHandler for GetPostComments {
    fn descriptor(&self) -> Tool {
        Tool {
            name: "get_post_comments".to_string(),
            title: Some("Get Post Comments".to_string()),
            description: "Fetch comments from a specific Reddit post".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "subreddit": {"type": "string", "description": "Name of the subreddit"},
                    "post_id": {"type": "string", "description": "Reddit post ID"},
                    "limit": {"type": "integer", "minimum": 1, "maximum": 500, "description": "Number of comments to fetch (1-500)"}
                },
                "required": ["subreddit", "post_id"]
            }),
        }
    }

    async fn call(
        &self,
        arguments: Option<Value>,
        ctx: &OperationContext,
    ) -> Result<CallToolResult, OperationError> {
        let args: PostCommentsArgs = parse_arguments(arguments)?;
        let limit = args.limit.unwrap_or(100);
        ctx.log(
            LoggingLevel::Info,
            json!({"tool": "get_post_comments", "subreddit": args.subreddit, "post_id": args.post_id}),
        );

        let thread = self
            .reddit
            .get_post_comments(&args.subreddit, &args.post_id, "best", limit)
            .await
            .map_err(|e| failed("fetch comments", e))?;

        let comments: Vec<Value> = thread
            .comments
            .iter()
            .take(limit as usize)
            .map(|comment| {
                json!({
                    "id": comment.id,
                    "author": comment.author,
                    "score": comment.score,
                    "created": unix_to_rfc3339(comment.created_utc),
                    "body": truncate_with_ellipsis(&comment.body, COMMENT_BODY_CHARS),
                    "replies_count": comment.replies.as_ref().map_or(0, Vec::len)
                })
            })
            .collect();

        Ok(CallToolResult::text(pretty(&json!({
            "post_id": args.post_id,
            "subreddit": args.subreddit,
            "title": thread.post.title,
            "comments_count": comments.len(),
            "comments": comments
        }))))
    }
}

// ============================================================================
// get_user_posts
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
struct UserPostsArgs {
    #[garde(length(min = 1))]
    username: String,
    #[garde(skip)]
    sort: Option<UserSort>,
    #[garde(range(min = 1, max = 100))]
    limit: Option<u32>,
}

pub struct GetUserPosts {
    reddit: RedditClient,
}

impl GetUserPosts {
    pub fn new(reddit: RedditClient) -> Self {
        Self { reddit }
    }
}

#[async_trait]
impl ToolHandler for GetUserPosts {
    fn descriptor(&self) -> Tool {
        Tool {
            name: "get_user_posts".to_string(),
            title: Some("Get User Posts".to_string()),
            description: "Fetch posts submitted by a specific Reddit user".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "username": {"type": "string", "description": "Reddit username (without u/)"},
                    "sort": {"type": "string", "enum": ["new", "hot", "top"], "description": "Sort order for posts"},
                    "limit": {"type": "integer", "minimum": 1, "maximum": 100, "description": "Number of posts to fetch (1-100)"}
                },
                "required": ["username"]
            }),
        }
    }

    async fn call(
        &self,
        arguments: Option<Value>,
        ctx: &OperationContext,
    ) -> Result<CallToolResult, OperationError> {
        let args: UserPostsArgs = parse_arguments(arguments)?;
        let sort = args.sort.unwrap_or_default();
        let limit = args.limit.unwrap_or(25);
        ctx.log(
            LoggingLevel::Info,
            json!({"tool": "get_user_posts", "username": args.username}),
        );

        let posts = self
            .reddit
            .get_user_posts(&args.username, sort.as_str(), limit)
            .await
            .map_err(|e| failed("fetch user posts", e))?;

        let posts: Vec<Value> = posts
            .iter()
            .map(|post| {
                json!({
                    "id": post.id,
                    "title": post.title,
                    "subreddit": post.subreddit,
                    "score": post.score,
                    "comments": post.num_comments,
                    "created": unix_to_rfc3339(post.created_utc),
                    "url": post.permalink
                })
            })
            .collect();

        Ok(CallToolResult::text(pretty(&json!({
            "username": args.username,
            "sort": sort.as_str(),
            "count": posts.len(),
            "posts": posts
        }))))
    }
}

// ============================================================================
// search_posts
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
struct SearchPostsArgs {
    #[garde(length(min = 1))]
    query: String,
    #[garde(length(min = 1))]
    subreddit: Option<String>,
    #[garde(skip)]
    sort: Option<SearchSort>,
    #[garde(range(min = 1, max = 100))]
    limit: Option<u32>,
}

pub struct SearchPosts {
    reddit: RedditClient,
}

impl SearchPosts {
    pub fn new(reddit: RedditClient) -> Self {
        Self { reddit }
    }
}

#[async_trait]
impl ToolHandler for SearchPosts {
    fn descriptor(&self) -> Tool {
        Tool {
            name: "search_posts".to_string(),
            title: Some("Search Reddit Posts".to_string()),
            description: "Search for posts across Reddit or within a specific subreddit"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Search query"},
                    "subreddit": {"type": "string", "description": "Limit search to specific subreddit (optional)"},
                    "sort": {"type": "string", "enum": ["relevance", "hot", "top", "new", "comments"], "description": "Sort order for results"},
                    "limit": {"type": "integer", "minimum": 1, "maximum": 100, "description": "Number of results to fetch (1-100)"}
                },
                "required": ["query"]
            }),
        }
    }

    async fn call(
        &self,
        arguments: Option<Value>,
        ctx: &OperationContext,
    ) -> Result<CallToolResult, OperationError> {
        let args: SearchPostsArgs = parse_arguments(arguments)?;
        let sort = args.sort.unwrap_or_default();
        let limit = args.limit.unwrap_or(25);
        ctx.log(
            LoggingLevel::Info,
            json!({"tool": "search_posts", "query": args.query, "subreddit": args.subreddit}),
        );

        let posts = self
            .reddit
            .search_posts(&args.query, args.subreddit.as_deref(), sort.as_str(), limit)
            .await
            .map_err(|e| failed("search posts", e))?;

        Ok(CallToolResult::text(pretty(&json!({
            "query": args.query,
            "subreddit": args.subreddit.as_deref().unwrap_or("all"),
            "sort": sort.as_str(),
            "count": posts.len(),
            "posts": posts.iter().map(post_summary).collect::<Vec<_>>()
        }))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::minimal::tests::test_context;
    use crate::reddit::tests::spawn_fake_reddit;

    fn body(result: &CallToolResult) -> Value {
        serde_json::from_str(result.content[0].as_text()).unwrap()
    }

    #[tokio::test]
    async fn test_get_subreddit_posts_tool() {
        let tool = GetSubredditPosts::new(spawn_fake_reddit().await);
        let result = tool
            .call(Some(json!({"subreddit": "rust"})), &test_context())
            .await
            .unwrap();
        let body = body(&result);
        assert_eq!(body["sort"], "hot");
        assert_eq!(body["count"], 1);
        assert_eq!(
            body["posts"][0]["url"],
            "https://reddit.com/r/rust/comments/abc/post/"
        );
        assert_eq!(body["posts"][0]["created"], "2023-11-14T22:13:20.000Z");
    }

    #[tokio::test]
    async fn test_limit_is_validated() {
        let tool = GetSubredditPosts::new(spawn_fake_reddit().await);
        let err = tool
            .call(
                Some(json!({"subreddit": "rust", "limit": 1000})),
                &test_context(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::InvalidArguments(_)));

        let err = tool
            .call(
                Some(json!({"subreddit": "rust", "sort": "sideways"})),
                &test_context(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_upstream_failure_is_reported() {
        let tool = GetSubredditPosts::new(spawn_fake_reddit().await);
        let err = tool
            .call(Some(json!({"subreddit": "missing"})), &test_context())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to fetch posts: Reddit API error: 404 Not Found"
        );
    }

    #[tokio::test]
    async fn test_get_post_comments_tool() {
        let tool = GetPostComments::new(spawn_fake_reddit().await);
        let result = tool
            .call(
                Some(json!({"subreddit": "rust", "post_id": "abc"})),
                &test_context(),
            )
            .await
            .unwrap();
        let body = body(&result);
        assert_eq!(body["comments_count"], 1);
        assert_eq!(body["comments"][0]["replies_count"], 1);
    }

    #[tokio::test]
    async fn test_search_posts_defaults_to_all() {
        let tool = SearchPosts::new(spawn_fake_reddit().await);
        let result = tool
            .call(Some(json!({"query": "ferris"})), &test_context())
            .await
            .unwrap();
        let body = body(&result);
        assert_eq!(body["subreddit"], "all");
        assert_eq!(body["sort"], "relevance");
    }

    #[tokio::test]
    async fn test_get_user_posts_tool() {
        let tool = GetUserPosts::new(spawn_fake_reddit().await);
        let result = tool
            .call(Some(json!({"username": "ferris", "sort": "top"})), &test_context())
            .await
            .unwrap();
        let body = body(&result);
        assert_eq!(body["sort"], "top");
        assert_eq!(body["posts"][0]["subreddit"], "rust");
    }
}
