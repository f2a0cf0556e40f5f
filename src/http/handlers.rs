//! Request handlers for the admin API.

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use futures::future::join_all;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use super::{ApiError, AppState, JsonBody};
use crate::blog as blog_content;
use crate::claim::{self, ClaimOutcome};
use crate::db::{self, model::NewPendingBlog, model::NewPostItem};
use crate::genai::{
    build_blog_prompt, build_news_posts_prompt, build_product_posts_prompt, parse_blog_payload,
    parse_post_options, PostOption,
};
use crate::model::{BatchKind, PublishStatus, SourceArticle};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// Claiming
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub batch_id: i64,
    pub item_index: i64,
    pub copied_by: String,
}

/// First-copy-wins claim of one generated post. Conflicts are an expected
/// outcome, not a failure: the 409 body names the current holder.
#[instrument(skip_all)]
pub async fn claim_post_copy(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ClaimRequest>,
) -> Result<Json<Value>, ApiError> {
    let outcome = claim::claim(
        state.store.as_ref(),
        req.batch_id,
        req.item_index,
        &req.copied_by,
    )
    .await?;
    match outcome {
        ClaimOutcome::Claimed => Ok(Json(json!({ "ok": true }))),
        ClaimOutcome::AlreadyClaimed { copied_by } => Err(ApiError::already_claimed(copied_by)),
    }
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

#[instrument(skip_all)]
pub async fn list_batches(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let batches = db::list_post_batches(&state.pool).await?;
    Ok(Json(json!({ "batches": batches })))
}

#[derive(Debug, Deserialize)]
pub struct NewPostInput {
    pub content: String,
    #[serde(default)]
    pub hook: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub source_article_index: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBatchRequest {
    pub kind: BatchKind,
    pub source_name: String,
    pub source_url: String,
    pub posts: Vec<NewPostInput>,
    #[serde(default)]
    pub source_articles: Vec<SourceArticle>,
}

#[instrument(skip_all)]
pub async fn create_batch(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateBatchRequest>,
) -> Result<Json<Value>, ApiError> {
    let source_name = req.source_name.trim();
    let source_url = req.source_url.trim();
    if source_name.is_empty() || source_url.is_empty() {
        return Err(ApiError::invalid_argument(
            "source_name and source_url are required",
        ));
    }

    // Drop empty posts before checking the batch is non-empty, so a payload
    // of all-blank posts is rejected the same way as no posts at all.
    let items: Vec<NewPostItem> = req
        .posts
        .into_iter()
        .filter(|p| !p.content.trim().is_empty())
        .map(|p| NewPostItem {
            content: p.content,
            hook: p.hook.filter(|h| !h.trim().is_empty()),
            image_url: p.image_url.filter(|u| !u.trim().is_empty()),
            source_article_index: p.source_article_index.filter(|i| *i >= 0),
        })
        .collect();
    if items.is_empty() {
        return Err(ApiError::invalid_argument(
            "at least one post with content is required",
        ));
    }

    let batch_id = db::insert_post_batch(
        &state.pool,
        req.kind,
        source_name,
        source_url,
        &items,
        &req.source_articles,
    )
    .await?;
    let batch = db::get_post_batch(&state.pool, batch_id)
        .await?
        .ok_or_else(|| ApiError::internal_error("batch vanished after insert"))?;
    info!(batch_id, kind = req.kind.as_str(), items = batch.posts.len(), "batch saved");
    Ok(Json(json!({ "ok": true, "batch": batch })))
}

#[instrument(skip_all)]
pub async fn delete_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    if db::delete_post_batch(&state.pool, batch_id).await? {
        Ok(Json(json!({ "ok": true })))
    } else {
        Err(ApiError::not_found("batch not found"))
    }
}

#[instrument(skip_all)]
pub async fn delete_unclaimed_items(
    State(state): State<AppState>,
    Path(batch_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    match db::delete_unclaimed_items(&state.pool, batch_id).await? {
        Some(removed) => Ok(Json(json!({ "ok": true, "removed": removed }))),
        None => Err(ApiError::not_found("batch not found")),
    }
}

// ---------------------------------------------------------------------------
// Post generation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct GenerateProductPostsRequest {
    pub product_name: String,
    pub product_url: String,
}

/// Generate promo post options for a product page. The options are returned
/// to the admin for review; saving them as a batch is a separate request.
#[instrument(skip_all)]
pub async fn generate_product_posts(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<GenerateProductPostsRequest>,
) -> Result<Json<Value>, ApiError> {
    let product_name = req.product_name.trim();
    let product_url = req.product_url.trim();
    if product_name.is_empty() || product_url.is_empty() {
        return Err(ApiError::invalid_argument(
            "product_name and product_url are required",
        ));
    }
    let url = Url::parse(product_url)
        .map_err(|_| ApiError::invalid_argument("invalid product URL"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ApiError::invalid_argument("URL must be http or https"));
    }

    let html = state
        .fetcher
        .fetch(&url)
        .await
        .map_err(|err| ApiError::invalid_argument(format!("failed to fetch URL: {err}")))?;
    let context = crate::extract::extract_page_content(&html).as_context();

    let prompt = build_product_posts_prompt(product_name, product_url, &context);
    let text = state.generator.generate(&prompt).await?;
    let posts = parse_post_options(&text);
    if posts.is_empty() {
        return Err(ApiError::internal_error(
            "could not generate any post variations, please try again",
        ));
    }
    Ok(Json(json!({ "ok": true, "posts": posts })))
}

#[derive(Debug, Deserialize)]
pub struct GenerateNewsPostsRequest {
    pub news_category: String,
    pub articles: Vec<SourceArticle>,
}

/// Generate one commentary post per source article. Articles whose
/// generation fails are skipped; the request only fails when nothing at all
/// could be generated.
#[instrument(skip_all)]
pub async fn generate_news_posts(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<GenerateNewsPostsRequest>,
) -> Result<Json<Value>, ApiError> {
    let news_category = req.news_category.trim().to_string();
    if news_category.is_empty() {
        return Err(ApiError::invalid_argument("news_category is required"));
    }
    let articles: Vec<SourceArticle> = req
        .articles
        .into_iter()
        .filter(|a| !a.title.trim().is_empty() && !a.link.trim().is_empty())
        .collect();
    if articles.is_empty() {
        return Err(ApiError::invalid_argument(
            "at least one article with title and link is required",
        ));
    }

    let generations = articles.iter().enumerate().map(|(index, article)| {
        let generator = state.generator.clone();
        let prompt = build_news_posts_prompt(&news_category, &article.title, &article.link);
        async move {
            let text = generator.generate(&prompt).await?;
            anyhow::Ok((index, parse_post_options(&text)))
        }
    });

    let mut posts: Vec<Value> = Vec::new();
    for result in join_all(generations).await {
        match result {
            Ok((index, options)) => {
                posts.extend(options.into_iter().map(|p: PostOption| {
                    json!({
                        "content": p.content,
                        "hook": p.hook,
                        "source_article_index": index,
                    })
                }));
            }
            Err(err) => warn!(?err, "news post generation failed for one article"),
        }
    }
    if posts.is_empty() {
        return Err(ApiError::internal_error(
            "could not generate any posts from the supplied articles",
        ));
    }
    Ok(Json(json!({ "ok": true, "posts": posts, "source_articles": articles })))
}

// ---------------------------------------------------------------------------
// Blogs
// ---------------------------------------------------------------------------

#[instrument(skip_all)]
pub async fn list_blogs(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let blogs = db::list_pending_blogs(&state.pool).await?;
    Ok(Json(json!({ "blogs": blogs })))
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateBlogRequest {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub author_id: Option<String>,
}

#[instrument(skip_all)]
pub async fn generate_blog(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<GenerateBlogRequest>,
) -> Result<Json<Value>, ApiError> {
    let idea_index = db::next_idea_index(&state.pool).await?;
    let category = blog_content::pick_category(
        req.category.as_deref(),
        &state.blog.categories,
        idea_index,
    )
    .to_string();

    let prompt = build_blog_prompt(&category, idea_index);
    let text = state.generator.generate(&prompt).await?;
    let payload = parse_blog_payload(&text)
        .map_err(|err| ApiError::internal_error(format!("blog generation failed: {err}")))?;

    let slug = blog_content::slugify(&payload.title);
    let read_time = blog_content::read_time(blog_content::count_words(&payload.body));
    let rich_text = blog_content::markdown_to_rich_text(&payload.body);
    let author_id = req
        .author_id
        .filter(|a| !a.trim().is_empty())
        .unwrap_or_else(|| state.blog.default_author_id.clone());

    let blog = NewPendingBlog {
        title: payload.title.clone(),
        slug: slug.clone(),
        category,
        excerpt: payload.excerpt,
        body_markdown: payload.body,
        body_rich_text: rich_text.to_string(),
        tags: payload.tags,
        read_time,
        author_id,
        linkedin_content: payload.linkedin_content,
    };
    let pending_id = db::insert_pending_blog(&state.pool, &blog).await?;
    info!(pending_id, slug, "blog draft saved for review");
    Ok(Json(json!({
        "ok": true,
        "pending_id": pending_id,
        "slug": slug,
        "title": blog.title,
        "status": "pending",
    })))
}

#[derive(Debug, Deserialize)]
pub struct ApproveBlogRequest {
    #[serde(default)]
    pub publish_status: Option<String>,
    #[serde(default)]
    pub published_by: Option<String>,
}

/// Approve a pending blog: record the requested terminal state and queue the
/// CMS push. Drafts default to a draft handoff.
#[instrument(skip_all)]
pub async fn approve_blog(
    State(state): State<AppState>,
    Path(blog_id): Path<i64>,
    JsonBody(req): JsonBody<ApproveBlogRequest>,
) -> Result<Json<Value>, ApiError> {
    let status = match req.publish_status.as_deref().unwrap_or("draft") {
        "draft" => PublishStatus::QueuedDraft,
        "published" => PublishStatus::QueuedPublish,
        other => {
            return Err(ApiError::invalid_argument(format!(
                "publish_status must be \"draft\" or \"published\", got \"{other}\""
            )))
        }
    };
    let published_by = req
        .published_by
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());

    if db::get_pending_blog(&state.pool, blog_id).await?.is_none() {
        return Err(ApiError::not_found("pending blog not found"));
    }
    let queued = db::queue_blog_publish(&state.pool, blog_id, status, published_by).await?;
    if !queued {
        return Err(ApiError::already_queued(
            "this blog post was already approved",
        ));
    }
    Ok(Json(json!({ "ok": true, "status": status })))
}

#[derive(Debug, Deserialize)]
pub struct CopyBlogRequest {
    pub copied_by: String,
}

/// First-copy-wins claim of a blog's LinkedIn promo text.
#[instrument(skip_all)]
pub async fn copy_blog(
    State(state): State<AppState>,
    Path(blog_id): Path<i64>,
    JsonBody(req): JsonBody<CopyBlogRequest>,
) -> Result<Json<Value>, ApiError> {
    let copied_by = req.copied_by.trim();
    if copied_by.is_empty() {
        return Err(ApiError::invalid_argument("copied_by is required"));
    }

    let blog = db::get_pending_blog(&state.pool, blog_id)
        .await?
        .ok_or_else(|| ApiError::not_found("pending blog not found"))?;
    if blog.linkedin_content.is_none() {
        return Err(ApiError::invalid_argument("no LinkedIn content to copy"));
    }
    if let Some(existing) = blog.claim {
        return Err(ApiError::already_claimed(existing.copied_by));
    }

    let won = db::claim_blog_copy(&state.pool, blog_id, copied_by, Utc::now()).await?;
    if won {
        return Ok(Json(json!({ "ok": true })));
    }
    // Lost the race between read and write; name the winner.
    let holder = db::get_pending_blog(&state.pool, blog_id)
        .await?
        .and_then(|b| b.claim)
        .map(|c| c.copied_by)
        .unwrap_or_else(|| "another team member".to_string());
    Err(ApiError::already_claimed(holder))
}

#[instrument(skip_all)]
pub async fn delete_blog(
    State(state): State<AppState>,
    Path(blog_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    if db::delete_pending_blog(&state.pool, blog_id).await? {
        Ok(Json(json!({ "ok": true })))
    } else {
        Err(ApiError::not_found("pending blog not found"))
    }
}
