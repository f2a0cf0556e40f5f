use crate::cms::CmsService;
use crate::db;
use crate::model::PublishStatus;
use anyhow::{anyhow, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, instrument, warn};

/// Process at most one due outbox task. Returns Ok(true) when a task was
/// attempted (successfully or not), Ok(false) when the queue was idle.
#[instrument(skip_all)]
pub async fn process_next_task(
    pool: &SqlitePool,
    cms: &dyn CmsService,
    site_base_url: &str,
    max_backoff_secs: i64,
) -> Result<bool> {
    if let Some((id, kind, ref_id, attempt)) = db::next_due_outbox(pool).await? {
        let res = match kind.as_str() {
            "publish_blog" => push_blog(pool, cms, site_base_url, ref_id).await,
            other => Err(anyhow!("unknown outbox task kind {}", other)),
        };
        match res {
            Ok(_) => {
                db::delete_outbox(pool, id).await?;
                info!(id, kind, ref_id, "outbox task succeeded");
            }
            Err(err) => {
                warn!(
                    ?err,
                    id, kind, ref_id, attempt, "outbox task failed; backoff"
                );
                db::backoff_outbox_with_cap(pool, id, attempt, max_backoff_secs).await?;
            }
        }
        return Ok(true);
    }
    Ok(false)
}

/// Push one queued blog to the CMS and record the terminal state: a draft
/// handoff removes the pending row, a publish marks it with its public URL.
async fn push_blog(
    pool: &SqlitePool,
    cms: &dyn CmsService,
    site_base_url: &str,
    blog_id: i64,
) -> Result<()> {
    let blog = db::fetch_blog_for_outbox(pool, blog_id).await?;

    match blog.publish_status {
        PublishStatus::QueuedDraft => {
            let document_id = cms.create_blog_post(&blog, None).await?;
            info!(blog_id, document_id, "blog handed to CMS as draft");
            db::delete_pending_blog(pool, blog_id).await?;
            Ok(())
        }
        PublishStatus::QueuedPublish => {
            let published_at = Utc::now();
            let document_id = cms.create_blog_post(&blog, Some(published_at)).await?;
            let published_url = format!(
                "{}/blog/{}",
                site_base_url.trim_end_matches('/'),
                blog.slug
            );
            db::mark_blog_published(pool, blog_id, &document_id, &published_url, published_at)
                .await?;
            info!(blog_id, document_id, published_url, "blog published");
            Ok(())
        }
        // A stale task for a blog that is no longer queued is dropped rather
        // than retried forever.
        PublishStatus::Pending | PublishStatus::Published => {
            warn!(blog_id, status = blog.publish_status.as_str(), "skipping stale publish task");
            Ok(())
        }
    }
}
