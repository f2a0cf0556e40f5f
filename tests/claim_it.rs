//! Claim arbitration against the real SQLite-backed store.

use contentbot::claim::{claim, ClaimError, ClaimOutcome};
use contentbot::db::{self, model::NewPostItem};
use contentbot::model::BatchKind;
use contentbot::store::SqliteBatchStore;

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

fn items(n: usize) -> Vec<NewPostItem> {
    (0..n)
        .map(|i| NewPostItem {
            content: format!("post #{i}"),
            hook: None,
            image_url: None,
            source_article_index: None,
        })
        .collect()
}

#[tokio::test]
async fn first_copy_wins_end_to_end() {
    let pool = setup_pool().await;
    let store = SqliteBatchStore::new(pool.clone());
    let batch_id = db::insert_post_batch(
        &pool,
        BatchKind::Product,
        "Widget",
        "https://example.com/widget",
        &items(2),
        &[],
    )
    .await
    .unwrap();

    assert_eq!(
        claim(&store, batch_id, 0, "alice").await.unwrap(),
        ClaimOutcome::Claimed
    );
    assert_eq!(
        claim(&store, batch_id, 0, "bob").await.unwrap(),
        ClaimOutcome::AlreadyClaimed {
            copied_by: "alice".into()
        }
    );
    assert_eq!(
        claim(&store, batch_id, 1, "bob").await.unwrap(),
        ClaimOutcome::Claimed
    );

    // The claim is durable and attributed.
    let batch = db::get_post_batch(&pool, batch_id).await.unwrap().unwrap();
    assert_eq!(batch.posts[0].claim.as_ref().unwrap().copied_by, "alice");
    assert_eq!(batch.posts[1].claim.as_ref().unwrap().copied_by, "bob");
}

#[tokio::test]
async fn out_of_range_and_missing_batch() {
    let pool = setup_pool().await;
    let store = SqliteBatchStore::new(pool.clone());
    let batch_id = db::insert_post_batch(
        &pool,
        BatchKind::News,
        "AI",
        "https://news.example.com",
        &items(2),
        &[],
    )
    .await
    .unwrap();

    assert!(matches!(
        claim(&store, batch_id, 5, "alice").await.unwrap_err(),
        ClaimError::NotFound
    ));
    assert!(matches!(
        claim(&store, batch_id + 100, 0, "alice").await.unwrap_err(),
        ClaimError::NotFound
    ));
    assert!(matches!(
        claim(&store, batch_id, 0, "   ").await.unwrap_err(),
        ClaimError::InvalidArgument(_)
    ));
}

#[tokio::test]
async fn unclaimed_delete_does_not_disturb_claimed_index() {
    let pool = setup_pool().await;
    let store = SqliteBatchStore::new(pool.clone());
    let batch_id = db::insert_post_batch(
        &pool,
        BatchKind::News,
        "AI",
        "https://news.example.com",
        &items(3),
        &[],
    )
    .await
    .unwrap();

    claim(&store, batch_id, 2, "alice").await.unwrap();
    db::delete_unclaimed_items(&pool, batch_id).await.unwrap();

    // A claim addressed to the surviving item's original index still finds
    // it, and still reports the original holder.
    assert_eq!(
        claim(&store, batch_id, 2, "bob").await.unwrap(),
        ClaimOutcome::AlreadyClaimed {
            copied_by: "alice".into()
        }
    );
    // The removed indices now read as missing resources.
    assert!(matches!(
        claim(&store, batch_id, 0, "bob").await.unwrap_err(),
        ClaimError::NotFound
    ));
}
