//! Database view models used by repositories.
//!
//! Keep these structs focused on the data returned by queries. Business logic
//! should live in higher layers.

use crate::model::PublishStatus;

/// Blog slice used by the outbox worker when pushing a queued draft to the
/// CMS. `body_rich_text` stays raw JSON; only the CMS cares about its shape.
#[derive(Debug, Clone)]
pub struct BlogForOutbox {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub category: String,
    pub excerpt: String,
    pub body_rich_text: String,
    pub tags: Vec<String>,
    pub read_time: String,
    pub author_id: String,
    pub publish_status: PublishStatus,
    pub published_by: Option<String>,
}

/// Input for creating one item at batch-creation time. Items can only be
/// created together with their batch; there is no append path.
#[derive(Debug, Clone)]
pub struct NewPostItem {
    pub content: String,
    pub hook: Option<String>,
    pub image_url: Option<String>,
    pub source_article_index: Option<i64>,
}

/// Input for creating a pending blog draft.
#[derive(Debug, Clone)]
pub struct NewPendingBlog {
    pub title: String,
    pub slug: String,
    pub category: String,
    pub excerpt: String,
    pub body_markdown: String,
    pub body_rich_text: String,
    pub tags: Vec<String>,
    pub read_time: String,
    pub author_id: String,
    pub linkedin_content: Option<String>,
}
