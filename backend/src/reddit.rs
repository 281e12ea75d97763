//! HTTP client for the public Reddit JSON API.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Default Reddit endpoint.
pub const DEFAULT_BASE_URL: &str = "https://www.reddit.com";

/// Default `User-Agent` sent with every request.
pub const DEFAULT_USER_AGENT: &str = "RedditMCP/1.0.0";

/// Error type for Reddit API calls.
#[derive(Debug, thiserror::Error)]
pub enum RedditError {
    #[error("Reddit API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Reddit API error: {status} {reason}")]
    Status { status: u16, reason: String },

    #[error("Unexpected Reddit API response: {0}")]
    UnexpectedResponse(String),
}

pub type Result<T> = std::result::Result<T, RedditError>;

/// Connection settings for [`RedditClient`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedditConfig {
    pub base_url: String,
    pub user_agent: String,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// A Reddit post as exposed to operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedditPost {
    pub id: String,
    pub title: String,
    pub author: String,
    pub score: i64,
    pub num_comments: u64,
    pub created_utc: f64,
    pub subreddit: String,
    pub selftext: String,
    pub url: String,
    /// Absolute link to the post on reddit.com.
    pub permalink: String,
}

/// A comment, with nested replies when Reddit returned them inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedditComment {
    pub id: String,
    pub author: String,
    pub body: String,
    pub score: i64,
    pub created_utc: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replies: Option<Vec<RedditComment>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubredditInfo {
    pub display_name: String,
    pub title: String,
    pub description: String,
    pub subscribers: u64,
    pub active_user_count: u64,
    pub created_utc: f64,
    pub public_description: String,
}

/// A post together with its top-level comments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostWithComments {
    pub post: RedditPost,
    pub comments: Vec<RedditComment>,
}

// Raw API shapes.

#[derive(Debug, Deserialize)]
struct Listing<T> {
    data: ListingData<T>,
}

#[derive(Debug, Deserialize)]
struct ListingData<T> {
    children: Vec<Thing<T>>,
}

#[derive(Debug, Deserialize)]
struct Thing<T> {
    #[serde(default)]
    kind: String,
    data: T,
}

#[derive(Debug, Deserialize)]
struct RawPost {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: u64,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    subreddit: String,
    #[serde(default)]
    selftext: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    permalink: String,
}

impl From<RawPost> for RedditPost {
    fn from(raw: RawPost) -> Self {
        Self {
            id: raw.id,
            title: raw.title,
            author: raw.author,
            score: raw.score,
            num_comments: raw.num_comments,
            created_utc: raw.created_utc,
            subreddit: raw.subreddit,
            selftext: raw.selftext.unwrap_or_default(),
            url: raw.url,
            permalink: format!("https://reddit.com{}", raw.permalink),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawComment {
    id: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    created_utc: f64,
    /// Either an empty string or a nested listing.
    #[serde(default)]
    replies: Value,
}

#[derive(Debug, Deserialize)]
struct RawSubreddit {
    display_name: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    subscribers: Option<u64>,
    #[serde(default)]
    active_user_count: Option<u64>,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    public_description: String,
}

/// HTTP client for the Reddit JSON API.
#[derive(Clone, Debug)]
pub struct RedditClient {
    base_url: String,
    client: Client,
}

impl RedditClient {
    pub fn new(config: RedditConfig) -> Self {
        let client = Client::builder()
            .user_agent(config.user_agent)
            .build()
            .unwrap_or_default();
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// GET `<base><path>.json?<query>` and decode the body.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}.json", self.base_url, path);
        debug!("Reddit request: {} {:?}", url, query);

        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RedditError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }
        Ok(response.json().await?)
    }

    /// Search posts across Reddit, or within one subreddit.
    pub async fn search_posts(
        &self,
        query: &str,
        subreddit: Option<&str>,
        sort: &str,
        limit: u32,
    ) -> Result<Vec<RedditPost>> {
        let path = match subreddit {
            Some(sub) => format!("/r/{}/search", urlencoding::encode(sub)),
            None => "/search".to_string(),
        };
        let listing: Listing<RawPost> = self
            .get_json(
                &path,
                &[
                    ("q", query.to_string()),
                    ("sort", sort.to_string()),
                    ("limit", limit.to_string()),
                    ("restrict_sr", subreddit.is_some().to_string()),
                ],
            )
            .await?;
        Ok(posts_from_listing(listing))
    }

    /// Fetch a subreddit listing (`hot`, `new`, `top`, `rising`).
    pub async fn get_subreddit_posts(
        &self,
        subreddit: &str,
        sort: &str,
        limit: u32,
    ) -> Result<Vec<RedditPost>> {
        let path = format!("/r/{}/{}", urlencoding::encode(subreddit), sort);
        let listing: Listing<RawPost> = self
            .get_json(&path, &[("limit", limit.to_string())])
            .await?;
        Ok(posts_from_listing(listing))
    }

    pub async fn get_subreddit_info(&self, subreddit: &str) -> Result<SubredditInfo> {
        let path = format!("/r/{}/about", urlencoding::encode(subreddit));
        let about: Thing<RawSubreddit> = self.get_json(&path, &[]).await?;
        let raw = about.data;
        Ok(SubredditInfo {
            display_name: raw.display_name,
            title: raw.title,
            description: raw.description,
            subscribers: raw.subscribers.unwrap_or(0),
            active_user_count: raw.active_user_count.unwrap_or(0),
            created_utc: raw.created_utc,
            public_description: raw.public_description,
        })
    }

    pub async fn get_user_posts(
        &self,
        username: &str,
        sort: &str,
        limit: u32,
    ) -> Result<Vec<RedditPost>> {
        let path = format!("/user/{}/submitted", urlencoding::encode(username));
        let listing: Listing<RawPost> = self
            .get_json(
                &path,
                &[("sort", sort.to_string()), ("limit", limit.to_string())],
            )
            .await?;
        Ok(posts_from_listing(listing))
    }

    /// Fetch a post and its comment tree.
    pub async fn get_post_comments(
        &self,
        subreddit: &str,
        post_id: &str,
        sort: &str,
        limit: u32,
    ) -> Result<PostWithComments> {
        let path = format!(
            "/r/{}/comments/{}",
            urlencoding::encode(subreddit),
            urlencoding::encode(post_id)
        );
        let (post_listing, comment_listing): (Listing<RawPost>, Listing<Value>) = self
            .get_json(
                &path,
                &[("sort", sort.to_string()), ("limit", limit.to_string())],
            )
            .await?;

        let post = post_listing
            .data
            .children
            .into_iter()
            .next()
            .map(|thing| RedditPost::from(thing.data))
            .ok_or_else(|| RedditError::UnexpectedResponse("post listing is empty".into()))?;

        Ok(PostWithComments {
            post,
            comments: comments_from_children(comment_listing.data.children),
        })
    }
}

fn posts_from_listing(listing: Listing<RawPost>) -> Vec<RedditPost> {
    listing
        .data
        .children
        .into_iter()
        .map(|thing| RedditPost::from(thing.data))
        .collect()
}

/// Keep `t1` (comment) children; `more` stubs and anything unparsable are skipped.
fn comments_from_children(children: Vec<Thing<Value>>) -> Vec<RedditComment> {
    children
        .into_iter()
        .filter(|thing| thing.kind == "t1")
        .filter_map(|thing| serde_json::from_value::<RawComment>(thing.data).ok())
        .map(|raw| {
            let replies = serde_json::from_value::<Listing<Value>>(raw.replies)
                .ok()
                .map(|listing| comments_from_children(listing.data.children));
            RedditComment {
                id: raw.id,
                author: raw.author,
                body: raw.body,
                score: raw.score,
                created_utc: raw.created_utc,
                replies,
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::{http::Uri, response::IntoResponse, Json, Router};
    use serde_json::json;

    pub(crate) fn post_json(id: &str, title: &str, selftext: &str) -> Value {
        json!({
            "kind": "t3",
            "data": {
                "id": id,
                "title": title,
                "author": "ferris",
                "score": 42,
                "num_comments": 7,
                "created_utc": 1_700_000_000.0,
                "subreddit": "rust",
                "selftext": selftext,
                "url": format!("https://example.com/{}", id),
                "permalink": format!("/r/rust/comments/{}/post/", id)
            }
        })
    }

    async fn fake_reddit(uri: Uri) -> axum::response::Response {
        match uri.path() {
            "/r/rust/hot.json" | "/r/all/hot.json" | "/search.json" | "/r/rust/search.json"
            | "/user/ferris/submitted.json" => Json(json!({
                "kind": "Listing",
                "data": {"children": [post_json("abc", "Hello", "body text")]}
            }))
            .into_response(),
            "/r/rust/about.json" => Json(json!({
                "kind": "t5",
                "data": {
                    "display_name": "rust",
                    "title": "The Rust Programming Language",
                    "description": "A place for all things Rust",
                    "subscribers": 300000,
                    "created_utc": 1_200_000_000.0,
                    "public_description": "Rust!"
                }
            }))
            .into_response(),
            "/r/rust/comments/abc.json" => Json(json!([
                {"kind": "Listing", "data": {"children": [post_json("abc", "Hello", "")]}},
                {"kind": "Listing", "data": {"children": [
                    {"kind": "t1", "data": {
                        "id": "c1", "author": "a", "body": "first", "score": 3,
                        "created_utc": 1_700_000_100.0,
                        "replies": {"kind": "Listing", "data": {"children": [
                            {"kind": "t1", "data": {
                                "id": "c2", "author": "b", "body": "nested", "score": 1,
                                "created_utc": 1_700_000_200.0, "replies": ""
                            }}
                        ]}}
                    }},
                    {"kind": "more", "data": {"count": 10, "children": ["x"]}}
                ]}}
            ]))
            .into_response(),
            _ => axum::http::StatusCode::NOT_FOUND.into_response(),
        }
    }

    /// Start a local stand-in for the Reddit API and return a client pointed at it.
    pub(crate) async fn spawn_fake_reddit() -> RedditClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().fallback(fake_reddit);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        RedditClient::new(RedditConfig {
            base_url: format!("http://{}", addr),
            user_agent: "reddit-mcp-tests".to_string(),
        })
    }

    #[tokio::test]
    async fn test_get_subreddit_posts() {
        let client = spawn_fake_reddit().await;
        let posts = client.get_subreddit_posts("rust", "hot", 10).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "abc");
        assert_eq!(
            posts[0].permalink,
            "https://reddit.com/r/rust/comments/abc/post/"
        );
    }

    #[tokio::test]
    async fn test_search_posts_scoped_and_global() {
        let client = spawn_fake_reddit().await;
        let scoped = client
            .search_posts("ferris", Some("rust"), "relevance", 5)
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        let global = client
            .search_posts("ferris", None, "relevance", 5)
            .await
            .unwrap();
        assert_eq!(global.len(), 1);
    }

    #[tokio::test]
    async fn test_get_subreddit_info_defaults_active_users() {
        let client = spawn_fake_reddit().await;
        let info = client.get_subreddit_info("rust").await.unwrap();
        assert_eq!(info.display_name, "rust");
        assert_eq!(info.subscribers, 300000);
        assert_eq!(info.active_user_count, 0);
    }

    #[tokio::test]
    async fn test_get_post_comments_skips_more_and_nests_replies() {
        let client = spawn_fake_reddit().await;
        let thread = client
            .get_post_comments("rust", "abc", "best", 100)
            .await
            .unwrap();
        assert_eq!(thread.post.id, "abc");
        assert_eq!(thread.comments.len(), 1);
        let replies = thread.comments[0].replies.as_ref().unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].body, "nested");
        assert!(replies[0].replies.is_none());
    }

    #[tokio::test]
    async fn test_status_error() {
        let client = spawn_fake_reddit().await;
        let err = client
            .get_subreddit_posts("doesnotexist", "hot", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, RedditError::Status { status: 404, .. }));
        assert_eq!(err.to_string(), "Reddit API error: 404 Not Found");
    }
}
