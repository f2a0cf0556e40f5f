use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of content a post batch was generated from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    Product,
    News,
}

impl BatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchKind::Product => "product",
            BatchKind::News => "news",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "product" => Some(BatchKind::Product),
            "news" => Some(BatchKind::News),
            _ => None,
        }
    }
}

/// Lifecycle of a pending blog draft.
///
/// `Pending` drafts wait for review. Approval moves them to one of the two
/// queued states; the outbox worker pushes queued drafts to the CMS. A
/// `QueuedDraft` blog is removed once handed off, a `QueuedPublish` blog
/// ends up `Published` with its public URL recorded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    Pending,
    QueuedDraft,
    QueuedPublish,
    Published,
}

impl PublishStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStatus::Pending => "pending",
            PublishStatus::QueuedDraft => "queued_draft",
            PublishStatus::QueuedPublish => "queued_publish",
            PublishStatus::Published => "published",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PublishStatus::Pending),
            "queued_draft" => Some(PublishStatus::QueuedDraft),
            "queued_publish" => Some(PublishStatus::QueuedPublish),
            "published" => Some(PublishStatus::Published),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutboxKind {
    PublishBlog,
}

impl OutboxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxKind::PublishBlog => "publish_blog",
        }
    }
}

/// The copied-by record on a claimable item. Written at most once, never
/// cleared or overwritten.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claim {
    pub copied_by: String,
    pub copied_at: DateTime<Utc>,
}

/// One generated post inside a batch. `content` is immutable after batch
/// creation; `claim` is the only field that ever changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostItem {
    pub seq: i64,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_article_index: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim: Option<Claim>,
}

impl PostItem {
    pub fn is_claimed(&self) -> bool {
        self.claim.is_some()
    }
}

/// An article a news batch was generated from. Kept so the team can share
/// the source link alongside the post.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceArticle {
    pub title: String,
    pub link: String,
}

/// A persisted generation run: metadata plus the ordered item sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostBatch {
    pub id: i64,
    pub kind: BatchKind,
    pub source_name: String,
    pub source_url: String,
    pub source_articles: Vec<SourceArticle>,
    pub posts: Vec<PostItem>,
    pub created_at: DateTime<Utc>,
}

/// A generated blog draft awaiting review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingBlog {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub category: String,
    pub excerpt: String,
    pub body_markdown: String,
    pub body_rich_text: serde_json::Value,
    pub tags: Vec<String>,
    pub read_time: String,
    pub author_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkedin_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim: Option<Claim>,
    pub publish_status: PublishStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
