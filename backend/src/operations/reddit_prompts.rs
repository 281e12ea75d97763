//! Prompt templates for analysing and writing Reddit content.

use async_trait::async_trait;
use garde::Validate;
use reddit_mcp_types::{GetPromptResult, Prompt, PromptArgument, PromptMessage};
use serde::Deserialize;
use serde_json::Value;

use super::{parse_arguments, OperationError, PromptHandler};

fn argument(name: &str, description: &str, required: bool) -> PromptArgument {
    PromptArgument {
        name: name.to_string(),
        description: Some(description.to_string()),
        required,
    }
}

fn single_message(text: String) -> GetPromptResult {
    GetPromptResult {
        description: None,
        messages: vec![PromptMessage::user(text)],
    }
}

/// `r/<name>` when a subreddit was given, `fallback` otherwise.
fn subreddit_or(subreddit: &str, fallback: &str) -> String {
    if subreddit.is_empty() {
        fallback.to_string()
    } else {
        format!("r/{}", subreddit)
    }
}

// ============================================================================
// analyze_reddit_post
// ============================================================================

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum AnalysisType {
    Sentiment,
    Engagement,
    Topic,
    Controversy,
    Summary,
}

#[derive(Debug, Deserialize, Validate)]
struct AnalyzeArgs {
    #[garde(skip)]
    analysis_type: AnalysisType,
    #[garde(skip)]
    #[serde(default)]
    context: String,
}

pub struct AnalyzeRedditPost;

#[async_trait]
impl PromptHandler for AnalyzeRedditPost {
    fn descriptor(&self) -> Prompt {
        Prompt {
            name: "analyze_reddit_post".to_string(),
            title: Some("Analyze Reddit Post".to_string()),
            description: Some(
                "Generate analysis prompts for Reddit posts and discussions".to_string(),
            ),
            arguments: vec![
                argument(
                    "analysis_type",
                    "Type of analysis to perform: sentiment, engagement, topic, controversy or summary",
                    true,
                ),
                argument("context", "Additional context for the analysis", false),
            ],
        }
    }

    async fn get(&self, arguments: Option<Value>) -> Result<GetPromptResult, OperationError> {
        let args: AnalyzeArgs = parse_arguments(arguments)?;
        let context = &args.context;
        let text = match args.analysis_type {
            AnalysisType::Sentiment => format!("Analyze the sentiment of this Reddit post and its comments. Look for emotional tone, community reaction, and overall mood. Consider both the original post content and the comment responses. {}", context),
            AnalysisType::Engagement => format!("Analyze the engagement patterns of this Reddit post. Examine the score, comment count, response quality, and community interaction patterns. Identify what makes this post engaging or not. {}", context),
            AnalysisType::Topic => format!("Analyze the main topics and themes discussed in this Reddit post and its comments. Identify key subjects, related discussions, and emerging themes in the conversation. {}", context),
            AnalysisType::Controversy => format!("Analyze potential controversial aspects of this Reddit post. Look for divisive opinions, conflicting viewpoints, and heated discussions in the comments. Assess the level of controversy and its sources. {}", context),
            AnalysisType::Summary => format!("Provide a comprehensive summary of this Reddit post and its key discussions. Include the main points, top comments, and overall community response. {}", context),
        };
        Ok(single_message(text.trim_end().to_string()))
    }
}

// ============================================================================
// reddit_content_creation
// ============================================================================

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ContentType {
    PostTitle,
    CommentReply,
    DiscussionStarter,
    AmaQuestions,
}

#[derive(Debug, Deserialize, Validate)]
struct ContentCreationArgs {
    #[garde(skip)]
    content_type: ContentType,
    #[garde(skip)]
    #[serde(default)]
    subreddit: String,
    #[garde(skip)]
    #[serde(default)]
    topic: String,
}

pub struct RedditContentCreation;

#[async_trait]
impl PromptHandler for RedditContentCreation {
    fn descriptor(&self) -> Prompt {
        Prompt {
            name: "reddit_content_creation".to_string(),
            title: Some("Reddit Content Creation".to_string()),
            description: Some("Generate prompts for creating Reddit content".to_string()),
            arguments: vec![
                argument(
                    "content_type",
                    "Type of content to create: post_title, comment_reply, discussion_starter or ama_questions",
                    true,
                ),
                argument("subreddit", "Target subreddit", false),
                argument("topic", "Specific topic or theme", false),
            ],
        }
    }

    async fn get(&self, arguments: Option<Value>) -> Result<GetPromptResult, OperationError> {
        let args: ContentCreationArgs = parse_arguments(arguments)?;
        let for_subreddit = if args.subreddit.is_empty() {
            String::new()
        } else {
            format!(" for r/{}", args.subreddit)
        };
        let topic = &args.topic;
        let about = |prefix: &str| {
            if topic.is_empty() {
                String::new()
            } else {
                format!(" {} {}", prefix, topic)
            }
        };

        let text = match args.content_type {
            ContentType::PostTitle => format!(
                "Create an engaging Reddit post title{}{}. Make it attention-grabbing but not clickbait, following Reddit best practices for titles.",
                for_subreddit,
                about("about")
            ),
            ContentType::CommentReply => format!(
                "Write a thoughtful Reddit comment reply{}. Make it constructive, informative, and engaging while following Reddit etiquette.",
                about("regarding")
            ),
            ContentType::DiscussionStarter => format!(
                "Create a discussion-starting Reddit post{}{}. Include thought-provoking questions that encourage community engagement.",
                for_subreddit,
                about("about")
            ),
            ContentType::AmaQuestions => format!(
                "Generate interesting and respectful questions for a Reddit AMA (Ask Me Anything){}. Make them engaging and likely to get good responses.",
                about("with someone involved in")
            ),
        };
        Ok(single_message(text))
    }
}

// ============================================================================
// subreddit_research
// ============================================================================

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ResearchType {
    CommunityCulture,
    PostingGuidelines,
    TrendingTopics,
    UserBehavior,
}

#[derive(Debug, Deserialize, Validate)]
struct ResearchArgs {
    #[garde(skip)]
    research_type: ResearchType,
    #[garde(skip)]
    #[serde(default)]
    subreddit: String,
}

pub struct SubredditResearch;

#[async_trait]
impl PromptHandler for SubredditResearch {
    fn descriptor(&self) -> Prompt {
        Prompt {
            name: "subreddit_research".to_string(),
            title: Some("Subreddit Research".to_string()),
            description: Some(
                "Generate prompts for researching and understanding subreddit communities"
                    .to_string(),
            ),
            arguments: vec![
                argument(
                    "research_type",
                    "Type of research to conduct: community_culture, posting_guidelines, trending_topics or user_behavior",
                    true,
                ),
                argument("subreddit", "Specific subreddit to research", false),
            ],
        }
    }

    async fn get(&self, arguments: Option<Value>) -> Result<GetPromptResult, OperationError> {
        let args: ResearchArgs = parse_arguments(arguments)?;
        let target = subreddit_or(&args.subreddit, "this subreddit");
        let text = match args.research_type {
            ResearchType::CommunityCulture => format!("Analyze the community culture and dynamics of {}. Look at communication styles, shared values, common interests, and unwritten rules that guide community behavior.", target),
            ResearchType::PostingGuidelines => format!("Research and summarize the posting guidelines and rules for {}. Include both formal rules and informal community expectations for successful posting.", target),
            ResearchType::TrendingTopics => format!("Identify trending topics and popular discussion themes in {}. Look for recurring subjects, hot button issues, and emerging trends in the community.", target),
            ResearchType::UserBehavior => format!("Analyze user behavior patterns in {}. Examine posting frequency, engagement levels, comment quality, and how users interact with each other.", target),
        };
        Ok(single_message(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_analyze_requires_analysis_type() {
        let err = AnalyzeRedditPost.get(None).await.unwrap_err();
        assert!(matches!(err, OperationError::InvalidArguments(_)));

        let result = AnalyzeRedditPost
            .get(Some(json!({"analysis_type": "sentiment"})))
            .await
            .unwrap();
        assert!(result.messages[0]
            .content
            .as_text()
            .starts_with("Analyze the sentiment"));
    }

    #[tokio::test]
    async fn test_content_creation_interpolates_optional_arguments() {
        let result = RedditContentCreation
            .get(Some(json!({
                "content_type": "post_title",
                "subreddit": "rust",
                "topic": "async"
            })))
            .await
            .unwrap();
        assert!(result.messages[0]
            .content
            .as_text()
            .starts_with("Create an engaging Reddit post title for r/rust about async."));

        let bare = RedditContentCreation
            .get(Some(json!({"content_type": "comment_reply"})))
            .await
            .unwrap();
        assert!(bare.messages[0]
            .content
            .as_text()
            .starts_with("Write a thoughtful Reddit comment reply. "));
    }

    #[tokio::test]
    async fn test_subreddit_research_fallback_target() {
        let result = SubredditResearch
            .get(Some(json!({"research_type": "user_behavior"})))
            .await
            .unwrap();
        assert!(result.messages[0]
            .content
            .as_text()
            .contains("user behavior patterns in this subreddit."));
    }
}
