//! Reddit-backed resources.

use async_trait::async_trait;
use futures::future::join_all;
use reddit_mcp_types::mcp::ReadResourceResult;
use reddit_mcp_types::{Resource, ResourceTemplate};
use serde_json::json;
use std::collections::HashMap;
use tracing::warn;

use super::minimal::json_contents;
use super::{
    now_rfc3339, truncate_with_ellipsis, unix_to_rfc3339, OperationContext, OperationError,
    ResourceDescriptor, ResourceHandler,
};
use crate::reddit::RedditClient;

const POPULAR_SUBREDDITS: &[&str] = &[
    "AskReddit",
    "funny",
    "worldnews",
    "todayilearned",
    "pics",
    "gaming",
    "movies",
    "music",
    "science",
    "technology",
    "programming",
    "dataisbeautiful",
    "MachineLearning",
    "artificial",
];

/// Summary of well-known communities. Subreddits that fail to load are skipped.
pub struct PopularSubreddits {
    reddit: RedditClient,
}

impl PopularSubreddits {
    pub fn new(reddit: RedditClient) -> Self {
        Self { reddit }
    }
}

#[async_trait]
impl ResourceHandler for PopularSubreddits {
    fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor::Static(Resource {
            uri: "reddit://popular".to_string(),
            name: "popular-subreddits".to_string(),
            title: Some("Popular Subreddits".to_string()),
            description: Some("List of popular Reddit communities".to_string()),
            mime_type: Some("application/json".to_string()),
        })
    }

    async fn read(
        &self,
        uri: &str,
        _params: HashMap<String, String>,
        _ctx: &OperationContext,
    ) -> Result<ReadResourceResult, OperationError> {
        let results = join_all(
            POPULAR_SUBREDDITS
                .iter()
                .map(|sub| self.reddit.get_subreddit_info(sub)),
        )
        .await;

        let subreddits: Vec<_> = results
            .into_iter()
            .zip(POPULAR_SUBREDDITS)
            .filter_map(|(result, sub)| match result {
                Ok(info) => Some(json!({
                    "name": info.display_name,
                    "title": info.title,
                    "subscribers": info.subscribers,
                    "description": truncate_with_ellipsis(&info.description, 200)
                })),
                Err(e) => {
                    warn!("Skipping r/{} in popular subreddits: {}", sub, e);
                    None
                }
            })
            .collect();

        Ok(json_contents(
            uri,
            &json!({
                "popular_subreddits": subreddits,
                "total_count": subreddits.len(),
                "last_updated": now_rfc3339()
            }),
        ))
    }
}

/// Hot posts from r/all.
pub struct TrendingPosts {
    reddit: RedditClient,
}

impl TrendingPosts {
    pub fn new(reddit: RedditClient) -> Self {
        Self { reddit }
    }
}

#[async_trait]
impl ResourceHandler for TrendingPosts {
    fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor::Static(Resource {
            uri: "reddit://trending".to_string(),
            name: "trending-posts".to_string(),
            title: Some("Trending Posts".to_string()),
            description: Some("Hot posts from r/all".to_string()),
            mime_type: Some("application/json".to_string()),
        })
    }

    async fn read(
        &self,
        uri: &str,
        _params: HashMap<String, String>,
        _ctx: &OperationContext,
    ) -> Result<ReadResourceResult, OperationError> {
        let posts = self
            .reddit
            .get_subreddit_posts("all", "hot", 20)
            .await
            .map_err(|e| {
                OperationError::Failed(format!("Failed to fetch trending posts: {}", e))
            })?;

        let trending: Vec<_> = posts
            .iter()
            .map(|post| {
                json!({
                    "title": post.title,
                    "author": post.author,
                    "subreddit": post.subreddit,
                    "score": post.score,
                    "comments": post.num_comments,
                    "permalink": post.permalink,
                    "created": unix_to_rfc3339(post.created_utc)
                })
            })
            .collect();

        Ok(json_contents(
            uri,
            &json!({
                "trending_posts": trending,
                "total_count": trending.len(),
                "last_updated": now_rfc3339()
            }),
        ))
    }
}

/// Recent posts of any subreddit, addressed as `reddit://r/{subreddit}`.
pub struct SubredditInfo {
    reddit: RedditClient,
}

impl SubredditInfo {
    pub fn new(reddit: RedditClient) -> Self {
        Self { reddit }
    }
}

#[async_trait]
impl ResourceHandler for SubredditInfo {
    fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor::Template(ResourceTemplate {
            uri_template: "reddit://r/{subreddit}".to_string(),
            name: "subreddit-info".to_string(),
            title: Some("Subreddit Information".to_string()),
            description: Some("Get information and recent posts from a subreddit".to_string()),
            mime_type: Some("application/json".to_string()),
        })
    }

    async fn read(
        &self,
        uri: &str,
        params: HashMap<String, String>,
        _ctx: &OperationContext,
    ) -> Result<ReadResourceResult, OperationError> {
        let subreddit = params
            .get("subreddit")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                OperationError::InvalidArguments("Subreddit name is required".to_string())
            })?;

        let posts = self
            .reddit
            .get_subreddit_posts(subreddit, "hot", 10)
            .await
            .map_err(|e| {
                OperationError::Failed(format!("Failed to fetch subreddit info: {}", e))
            })?;

        let recent: Vec<_> = posts
            .iter()
            .map(|post| {
                json!({
                    "title": post.title,
                    "author": post.author,
                    "score": post.score,
                    "comments": post.num_comments,
                    "url": post.permalink
                })
            })
            .collect();

        Ok(json_contents(
            uri,
            &json!({
                "subreddit": subreddit,
                "posts_count": recent.len(),
                "recent_posts": recent,
                "timestamp": now_rfc3339()
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::minimal::tests::test_context;
    use crate::reddit::tests::spawn_fake_reddit;
    use serde_json::Value;

    #[tokio::test]
    async fn test_popular_subreddits_skips_failures() {
        let resource = PopularSubreddits::new(spawn_fake_reddit().await);
        let result = resource
            .read("reddit://popular", HashMap::new(), &test_context())
            .await
            .unwrap();
        let body: Value = serde_json::from_str(&result.contents[0].text).unwrap();
        // The fake upstream knows none of the popular communities.
        assert_eq!(body["total_count"], 0);
    }

    #[tokio::test]
    async fn test_trending_posts() {
        let resource = TrendingPosts::new(spawn_fake_reddit().await);
        let result = resource
            .read("reddit://trending", HashMap::new(), &test_context())
            .await
            .unwrap();
        assert_eq!(result.contents[0].uri, "reddit://trending");
        let body: Value = serde_json::from_str(&result.contents[0].text).unwrap();
        assert_eq!(body["total_count"], 1);
    }

    #[tokio::test]
    async fn test_subreddit_info_template() {
        let resource = SubredditInfo::new(spawn_fake_reddit().await);
        let params = HashMap::from([("subreddit".to_string(), "rust".to_string())]);
        let result = resource
            .read("reddit://r/rust", params, &test_context())
            .await
            .unwrap();
        let body: Value = serde_json::from_str(&result.contents[0].text).unwrap();
        assert_eq!(body["subreddit"], "rust");
        assert_eq!(body["posts_count"], 1);
    }
}
