use super::model::{BlogForOutbox, NewPendingBlog, NewPostItem};
use crate::model::{
    BatchKind, Claim, OutboxKind, PendingBlog, PostBatch, PostItem, PublishStatus, SourceArticle,
};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, Transaction};
use sqlx::{Sqlite, SqlitePool};
use tracing::instrument;

pub type Pool = SqlitePool;
type OutboxItem = (i64, String, i64, i32);

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys=ON;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    // Pass through non-sqlite schemes
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }

    // In-memory URLs like sqlite::memory: or sqlite::memory:?cache=shared
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    // Strip prefix and optional //
    let rest = &url["sqlite:".len()..];
    let (_had_slashes, path_with_query) = if let Some(r) = rest.strip_prefix("//") {
        (true, r)
    } else {
        (false, rest)
    };

    // Separate query string if any
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        // nothing to normalize
        return url.to_string();
    }

    // Expand leading ~/ to HOME
    let expanded_path = if let Some(rest) = path_part.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            format!("{}/{}", home.trim_end_matches('/'), rest)
        } else {
            path_part.to_string()
        }
    } else {
        path_part.to_string()
    };

    // Ensure parent directory exists if any
    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    // Rebuild URL, prefer sqlite:// form
    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Post batches
// ---------------------------------------------------------------------------

/// Insert a batch with its full item sequence in one transaction. Items get
/// seq 0..N in the order given; that addressing is fixed for the batch's life.
#[instrument(skip_all)]
pub async fn insert_post_batch(
    pool: &Pool,
    kind: BatchKind,
    source_name: &str,
    source_url: &str,
    items: &[NewPostItem],
    articles: &[SourceArticle],
) -> Result<i64> {
    let mut tx = pool.begin().await?;
    let batch_id: i64 = sqlx::query(
        "INSERT INTO post_batches (kind, source_name, source_url) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(kind.as_str())
    .bind(source_name)
    .bind(source_url)
    .fetch_one(&mut *tx)
    .await?
    .get("id");

    for (seq, item) in items.iter().enumerate() {
        sqlx::query(
            "INSERT INTO batch_items (batch_id, seq, content, hook, image_url, source_article_index) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(batch_id)
        .bind(seq as i64)
        .bind(&item.content)
        .bind(&item.hook)
        .bind(&item.image_url)
        .bind(item.source_article_index)
        .execute(&mut *tx)
        .await?;
    }

    for (seq, article) in articles.iter().enumerate() {
        sqlx::query("INSERT INTO source_articles (batch_id, seq, title, link) VALUES (?, ?, ?, ?)")
            .bind(batch_id)
            .bind(seq as i64)
            .bind(&article.title)
            .bind(&article.link)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(batch_id)
}

#[instrument(skip_all)]
pub async fn get_post_batch(pool: &Pool, batch_id: i64) -> Result<Option<PostBatch>> {
    let row = sqlx::query(
        "SELECT id, kind, source_name, source_url, created_at FROM post_batches WHERE id = ?",
    )
    .bind(batch_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    Ok(Some(hydrate_batch(pool, row).await?))
}

/// All batches with items and claim state, newest first.
#[instrument(skip_all)]
pub async fn list_post_batches(pool: &Pool) -> Result<Vec<PostBatch>> {
    let rows = sqlx::query(
        "SELECT id, kind, source_name, source_url, created_at FROM post_batches \
         ORDER BY datetime(created_at) DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;

    let mut batches = Vec::with_capacity(rows.len());
    for row in rows {
        batches.push(hydrate_batch(pool, row).await?);
    }
    Ok(batches)
}

async fn hydrate_batch(pool: &Pool, row: sqlx::sqlite::SqliteRow) -> Result<PostBatch> {
    let id: i64 = row.get("id");
    let kind_str: String = row.get("kind");
    let kind = BatchKind::parse(&kind_str)
        .ok_or_else(|| anyhow!("batch {} has unknown kind {}", id, kind_str))?;

    let item_rows = sqlx::query(
        "SELECT seq, content, hook, image_url, source_article_index, copied_by, copied_at \
         FROM batch_items WHERE batch_id = ? ORDER BY seq ASC",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let posts = item_rows
        .into_iter()
        .map(|r| {
            let copied_by: Option<String> = r.get("copied_by");
            let copied_at: Option<DateTime<Utc>> = r.get("copied_at");
            let claim = match (copied_by, copied_at) {
                (Some(copied_by), Some(copied_at)) => Some(Claim {
                    copied_by,
                    copied_at,
                }),
                _ => None,
            };
            PostItem {
                seq: r.get("seq"),
                content: r.get("content"),
                hook: r.get("hook"),
                image_url: r.get("image_url"),
                source_article_index: r.get("source_article_index"),
                claim,
            }
        })
        .collect();

    let article_rows =
        sqlx::query("SELECT title, link FROM source_articles WHERE batch_id = ? ORDER BY seq ASC")
            .bind(id)
            .fetch_all(pool)
            .await?;
    let source_articles = article_rows
        .into_iter()
        .map(|r| SourceArticle {
            title: r.get("title"),
            link: r.get("link"),
        })
        .collect();

    Ok(PostBatch {
        id,
        kind,
        source_name: row.get("source_name"),
        source_url: row.get("source_url"),
        source_articles,
        posts,
        created_at: row.get("created_at"),
    })
}

/// Conditional claim write: succeeds only if the addressed item is still
/// unclaimed. SQLite serializes writers, so at most one concurrent caller
/// observes `true` for a given (batch_id, seq).
#[instrument(skip_all)]
pub async fn claim_batch_item(
    pool: &Pool,
    batch_id: i64,
    seq: i64,
    copied_by: &str,
    copied_at: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE batch_items SET copied_by = ?, copied_at = ? \
         WHERE batch_id = ? AND seq = ? AND copied_by IS NULL",
    )
    .bind(copied_by)
    .bind(copied_at)
    .bind(batch_id)
    .bind(seq)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Administrative whole-batch delete. Claimed items are not protected here.
#[instrument(skip_all)]
pub async fn delete_post_batch(pool: &Pool, batch_id: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM batch_items WHERE batch_id = ?")
        .bind(batch_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM source_articles WHERE batch_id = ?")
        .bind(batch_id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM post_batches WHERE id = ?")
        .bind(batch_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(result.rows_affected() == 1)
}

/// Delete only the unclaimed items of a batch. Surviving rows keep their seq,
/// so claimed items stay addressable at their original index. Returns the
/// number of items removed, or None if the batch does not exist.
#[instrument(skip_all)]
pub async fn delete_unclaimed_items(pool: &Pool, batch_id: i64) -> Result<Option<u64>> {
    let mut tx = pool.begin().await?;
    let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM post_batches WHERE id = ?")
        .bind(batch_id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Ok(None);
    }
    let result = sqlx::query("DELETE FROM batch_items WHERE batch_id = ? AND copied_by IS NULL")
        .bind(batch_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(Some(result.rows_affected()))
}

// ---------------------------------------------------------------------------
// Pending blogs
// ---------------------------------------------------------------------------

#[instrument(skip_all)]
pub async fn insert_pending_blog(pool: &Pool, blog: &NewPendingBlog) -> Result<i64> {
    let tags = serde_json::to_string(&blog.tags)?;
    let rec = sqlx::query(
        "INSERT INTO pending_blogs \
         (title, slug, category, excerpt, body_markdown, body_rich_text, tags, read_time, author_id, linkedin_content) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(&blog.title)
    .bind(&blog.slug)
    .bind(&blog.category)
    .bind(&blog.excerpt)
    .bind(&blog.body_markdown)
    .bind(&blog.body_rich_text)
    .bind(tags)
    .bind(&blog.read_time)
    .bind(&blog.author_id)
    .bind(&blog.linkedin_content)
    .fetch_one(pool)
    .await?;
    Ok(rec.get("id"))
}

#[instrument(skip_all)]
pub async fn list_pending_blogs(pool: &Pool) -> Result<Vec<PendingBlog>> {
    let rows = sqlx::query(
        "SELECT * FROM pending_blogs ORDER BY datetime(created_at) DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(row_to_blog).collect()
}

#[instrument(skip_all)]
pub async fn get_pending_blog(pool: &Pool, blog_id: i64) -> Result<Option<PendingBlog>> {
    let row = sqlx::query("SELECT * FROM pending_blogs WHERE id = ?")
        .bind(blog_id)
        .fetch_optional(pool)
        .await?;
    row.map(row_to_blog).transpose()
}

fn row_to_blog(row: sqlx::sqlite::SqliteRow) -> Result<PendingBlog> {
    let id: i64 = row.get("id");
    let status_str: String = row.get("publish_status");
    let publish_status = PublishStatus::parse(&status_str)
        .ok_or_else(|| anyhow!("blog {} has unknown publish status {}", id, status_str))?;

    let tags_raw: String = row.get("tags");
    let tags: Vec<String> = serde_json::from_str(&tags_raw)
        .with_context(|| format!("blog {} has malformed tags", id))?;
    let rich_raw: String = row.get("body_rich_text");
    let body_rich_text: serde_json::Value = serde_json::from_str(&rich_raw)
        .with_context(|| format!("blog {} has malformed rich text body", id))?;

    let copied_by: Option<String> = row.get("copied_by");
    let copied_at: Option<DateTime<Utc>> = row.get("copied_at");
    let claim = match (copied_by, copied_at) {
        (Some(copied_by), Some(copied_at)) => Some(Claim {
            copied_by,
            copied_at,
        }),
        _ => None,
    };

    Ok(PendingBlog {
        id,
        title: row.get("title"),
        slug: row.get("slug"),
        category: row.get("category"),
        excerpt: row.get("excerpt"),
        body_markdown: row.get("body_markdown"),
        body_rich_text,
        tags,
        read_time: row.get("read_time"),
        author_id: row.get("author_id"),
        linkedin_content: row.get("linkedin_content"),
        claim,
        publish_status,
        published_url: row.get("published_url"),
        published_by: row.get("published_by"),
        published_at: row.get("published_at"),
        created_at: row.get("created_at"),
    })
}

#[instrument(skip_all)]
pub async fn delete_pending_blog(pool: &Pool, blog_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM pending_blogs WHERE id = ?")
        .bind(blog_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Conditional claim of a blog's LinkedIn promo text: same first-copy-wins
/// write as `claim_batch_item`, one row instead of one (batch, seq) pair.
#[instrument(skip_all)]
pub async fn claim_blog_copy(
    pool: &Pool,
    blog_id: i64,
    copied_by: &str,
    copied_at: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE pending_blogs SET copied_by = ?, copied_at = ? \
         WHERE id = ? AND copied_by IS NULL",
    )
    .bind(copied_by)
    .bind(copied_at)
    .bind(blog_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Approve a pending blog: record the requested terminal state and enqueue
/// the CMS push. Returns false when the blog does not exist or is no longer
/// pending (already queued or published).
#[instrument(skip_all)]
pub async fn queue_blog_publish(
    pool: &Pool,
    blog_id: i64,
    status: PublishStatus,
    published_by: Option<&str>,
) -> Result<bool> {
    debug_assert!(matches!(
        status,
        PublishStatus::QueuedDraft | PublishStatus::QueuedPublish
    ));
    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        "UPDATE pending_blogs SET publish_status = ?, published_by = ? \
         WHERE id = ? AND publish_status = 'pending'",
    )
    .bind(status.as_str())
    .bind(published_by)
    .bind(blog_id)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() != 1 {
        return Ok(false);
    }
    enqueue_outbox_tx(&mut tx, OutboxKind::PublishBlog, blog_id, Utc::now()).await?;
    tx.commit().await?;
    Ok(true)
}

pub async fn fetch_blog_for_outbox(pool: &Pool, blog_id: i64) -> Result<BlogForOutbox> {
    let row = sqlx::query(
        "SELECT id, title, slug, category, excerpt, body_rich_text, tags, read_time, author_id, \
                publish_status, published_by \
         FROM pending_blogs WHERE id = ?",
    )
    .bind(blog_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Err(anyhow!("blog {} not found", blog_id));
    };

    let status_str: String = row.get("publish_status");
    let publish_status = PublishStatus::parse(&status_str)
        .ok_or_else(|| anyhow!("blog {} has unknown publish status {}", blog_id, status_str))?;
    let tags_raw: String = row.get("tags");
    let tags: Vec<String> = serde_json::from_str(&tags_raw).unwrap_or_default();

    Ok(BlogForOutbox {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
        category: row.get("category"),
        excerpt: row.get("excerpt"),
        body_rich_text: row.get("body_rich_text"),
        tags,
        read_time: row.get("read_time"),
        author_id: row.get("author_id"),
        publish_status,
        published_by: row.get("published_by"),
    })
}

#[instrument(skip_all)]
pub async fn mark_blog_published(
    pool: &Pool,
    blog_id: i64,
    cms_document_id: &str,
    published_url: &str,
    published_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE pending_blogs SET publish_status = 'published', cms_document_id = ?, \
         published_url = ?, published_at = ? WHERE id = ?",
    )
    .bind(cms_document_id)
    .bind(published_url)
    .bind(published_at)
    .bind(blog_id)
    .execute(pool)
    .await
    .context("failed to persist published blog state")?;
    Ok(())
}

/// Advance the idea-rotation cursor: 1 → 2 → 3 → 4 → 5 → 1 → ...
/// Returns the index to use for the next generation.
#[instrument(skip_all)]
pub async fn next_idea_index(pool: &Pool) -> Result<i64> {
    let mut tx = pool.begin().await?;
    let last: i64 = sqlx::query_scalar("SELECT last_index FROM idea_rotation WHERE id = 1")
        .fetch_one(&mut *tx)
        .await?;
    let next = (last % 5) + 1;
    sqlx::query("UPDATE idea_rotation SET last_index = ? WHERE id = 1")
        .bind(next)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(next)
}

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

#[instrument(skip_all)]
pub async fn enqueue_outbox(
    pool: &Pool,
    kind: OutboxKind,
    ref_id: i64,
    due_at: DateTime<Utc>,
) -> Result<i64> {
    let mut tx = pool.begin().await?;
    let id = enqueue_outbox_tx(&mut tx, kind, ref_id, due_at).await?;
    tx.commit().await?;
    Ok(id)
}

async fn enqueue_outbox_tx(
    tx: &mut Transaction<'_, Sqlite>,
    kind: OutboxKind,
    ref_id: i64,
    due_at: DateTime<Utc>,
) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO outbox (kind, ref_id, attempt, due_at) VALUES (?, ?, 0, ?) RETURNING id",
    )
    .bind(kind.as_str())
    .bind(ref_id)
    .bind(due_at)
    .fetch_one(&mut **tx)
    .await?;
    Ok(rec.get("id"))
}

#[instrument(skip_all)]
pub async fn next_due_outbox(pool: &Pool) -> Result<Option<OutboxItem>> {
    let row = sqlx::query(
        "SELECT id, kind, ref_id, attempt FROM outbox \
         WHERE datetime(due_at) <= CURRENT_TIMESTAMP ORDER BY datetime(due_at) ASC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;
    if let Some(row) = row {
        let id: i64 = row.get("id");
        let kind: String = row.get("kind");
        let ref_id: i64 = row.get("ref_id");
        let attempt: i32 = row.get("attempt");
        Ok(Some((id, kind, ref_id, attempt)))
    } else {
        Ok(None)
    }
}

#[instrument(skip_all)]
pub async fn delete_outbox(pool: &Pool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM outbox WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn backoff_outbox_with_cap(
    pool: &Pool,
    id: i64,
    attempt: i32,
    max_cap_secs: i64,
) -> Result<()> {
    // Exponential backoff: 5s * 2^attempt, capped.
    let secs = (5_i64) * (1_i64 << attempt.min(10));
    let cap = if max_cap_secs <= 0 {
        secs
    } else {
        max_cap_secs
    };
    let secs = secs.min(cap);
    sqlx::query(
        "UPDATE outbox SET attempt = ?, due_at = datetime('now', ? || ' seconds') WHERE id = ?",
    )
    .bind(attempt + 1)
    .bind(secs)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn count_remaining_outbox_tasks(pool: &Pool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
