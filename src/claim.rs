//! First-copy-wins arbitration for generated posts.
//!
//! A batch item can be claimed by exactly one team member. The arbiter reads
//! the batch, rejects obviously invalid requests without touching the store's
//! write path, and otherwise attempts the store's conditional write. Losing a
//! race and finding the item already claimed surface identically as
//! [`ClaimOutcome::AlreadyClaimed`]; the loser must not retry, only report
//! the conflict upward.

use chrono::Utc;
use thiserror::Error;

use crate::store::{BatchStore, StoreError};

/// Result of a claim attempt that reached a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This caller's conditional write was accepted; the claim is recorded.
    Claimed,
    /// The item already belongs to `copied_by`: either it was claimed before
    /// this attempt looked, or a concurrent claimant won the write race.
    AlreadyClaimed { copied_by: String },
}

#[derive(Debug, Error)]
pub enum ClaimError {
    /// Malformed request, rejected before any store access. Never retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The batch does not exist, or the index is out of range for its item
    /// sequence. The two are deliberately indistinguishable.
    #[error("batch or item not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Attempt to claim the item at `item_index` of `batch_id` for `copied_by`.
///
/// Exactly one successful claim per item, ever; claims are never cleared or
/// overwritten. A repeat attempt by the original winner gets
/// `AlreadyClaimed` naming themselves, so a retry after an unacknowledged
/// success is still observably safe.
pub async fn claim(
    store: &dyn BatchStore,
    batch_id: i64,
    item_index: i64,
    copied_by: &str,
) -> Result<ClaimOutcome, ClaimError> {
    if batch_id <= 0 {
        return Err(ClaimError::InvalidArgument("batch_id must be positive"));
    }
    if item_index < 0 {
        return Err(ClaimError::InvalidArgument("item_index must be >= 0"));
    }
    let copied_by = copied_by.trim();
    if copied_by.is_empty() {
        return Err(ClaimError::InvalidArgument("copied_by must be non-empty"));
    }

    let batch = store
        .get_batch(batch_id)
        .await?
        .ok_or(ClaimError::NotFound)?;
    // Address by seq, not by position: unclaimed-only deletes may leave
    // holes, and surviving items keep their original addresses.
    let item = batch
        .posts
        .iter()
        .find(|p| p.seq == item_index)
        .ok_or(ClaimError::NotFound)?;

    // Already claimed: report the holder without attempting a write.
    if let Some(existing) = &item.claim {
        return Ok(ClaimOutcome::AlreadyClaimed {
            copied_by: existing.copied_by.clone(),
        });
    }

    let won = store
        .claim_item(batch_id, item_index, copied_by, Utc::now())
        .await?;
    if won {
        return Ok(ClaimOutcome::Claimed);
    }

    // Lost the race between our read and our write. Re-read once to name the
    // winner; no further claim attempt is made.
    let batch = store
        .get_batch(batch_id)
        .await?
        .ok_or(ClaimError::NotFound)?;
    match batch
        .posts
        .iter()
        .find(|p| p.seq == item_index)
        .and_then(|item| item.claim.as_ref())
    {
        Some(existing) => Ok(ClaimOutcome::AlreadyClaimed {
            copied_by: existing.copied_by.clone(),
        }),
        // Claims are append-only, so a failed conditional write implies the
        // item is claimed unless the batch itself was deleted underneath us.
        None => Err(ClaimError::Store(StoreError::Unavailable(anyhow::anyhow!(
            "conditional claim write failed but item {} of batch {} reads unclaimed",
            item_index,
            batch_id
        )))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BatchKind, Claim, PostBatch, PostItem};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// In-memory store with a real compare-and-set, plus write/read counters
    /// so tests can assert which store primitives a claim touched.
    #[derive(Default)]
    struct MemoryStore {
        batches: Mutex<Vec<PostBatch>>,
        reads: AtomicUsize,
        writes: AtomicUsize,
        fail_next_write: AtomicUsize,
    }

    impl MemoryStore {
        fn with_batch(posts: Vec<PostItem>) -> Self {
            let store = Self::default();
            {
                let mut guard = store.batches.try_lock().unwrap();
                guard.push(PostBatch {
                    id: 1,
                    kind: BatchKind::Product,
                    source_name: "Widget".into(),
                    source_url: "https://example.com/widget".into(),
                    source_articles: vec![],
                    posts,
                    created_at: Utc::now(),
                });
            }
            store
        }

        fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }
    }

    fn unclaimed(seq: i64) -> PostItem {
        PostItem {
            seq,
            content: format!("post #{seq}"),
            hook: None,
            image_url: None,
            source_article_index: None,
            claim: None,
        }
    }

    fn claimed(seq: i64, by: &str) -> PostItem {
        PostItem {
            claim: Some(Claim {
                copied_by: by.into(),
                copied_at: Utc::now(),
            }),
            ..unclaimed(seq)
        }
    }

    #[async_trait]
    impl BatchStore for MemoryStore {
        async fn get_batch(&self, batch_id: i64) -> Result<Option<PostBatch>, StoreError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let guard = self.batches.lock().await;
            Ok(guard.iter().find(|b| b.id == batch_id).cloned())
        }

        async fn claim_item(
            &self,
            batch_id: i64,
            item_index: i64,
            copied_by: &str,
            copied_at: DateTime<Utc>,
        ) -> Result<bool, StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.fail_next_write.load(Ordering::SeqCst) > 0 {
                self.fail_next_write.fetch_sub(1, Ordering::SeqCst);
                return Err(StoreError::Unavailable(anyhow::anyhow!("injected outage")));
            }
            let mut guard = self.batches.lock().await;
            let Some(batch) = guard.iter_mut().find(|b| b.id == batch_id) else {
                return Ok(false);
            };
            let Some(item) = batch.posts.iter_mut().find(|p| p.seq == item_index) else {
                return Ok(false);
            };
            if item.claim.is_some() {
                return Ok(false);
            }
            item.claim = Some(Claim {
                copied_by: copied_by.into(),
                copied_at,
            });
            Ok(true)
        }
    }

    #[tokio::test]
    async fn first_claim_wins_second_sees_holder() {
        let store = MemoryStore::with_batch(vec![unclaimed(0), unclaimed(1)]);

        let outcome = claim(&store, 1, 0, "alice").await.unwrap();
        assert_eq!(outcome, ClaimOutcome::Claimed);

        let outcome = claim(&store, 1, 0, "bob").await.unwrap();
        assert_eq!(
            outcome,
            ClaimOutcome::AlreadyClaimed {
                copied_by: "alice".into()
            }
        );

        let outcome = claim(&store, 1, 1, "bob").await.unwrap();
        assert_eq!(outcome, ClaimOutcome::Claimed);
    }

    #[tokio::test]
    async fn repeat_observation_never_writes() {
        let store = MemoryStore::with_batch(vec![claimed(0, "alice")]);

        for _ in 0..5 {
            let outcome = claim(&store, 1, 0, "bob").await.unwrap();
            assert_eq!(
                outcome,
                ClaimOutcome::AlreadyClaimed {
                    copied_by: "alice".into()
                }
            );
        }
        assert_eq!(store.writes(), 0);

        // The original winner's retry looks the same and is also a no-op.
        let outcome = claim(&store, 1, 0, "alice").await.unwrap();
        assert_eq!(
            outcome,
            ClaimOutcome::AlreadyClaimed {
                copied_by: "alice".into()
            }
        );
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn out_of_range_index_is_not_found() {
        let store = MemoryStore::with_batch(vec![unclaimed(0), unclaimed(1)]);
        let err = claim(&store, 1, 5, "alice").await.unwrap_err();
        assert!(matches!(err, ClaimError::NotFound));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn missing_batch_is_not_found() {
        let store = MemoryStore::with_batch(vec![unclaimed(0)]);
        let err = claim(&store, 42, 0, "alice").await.unwrap_err();
        assert!(matches!(err, ClaimError::NotFound));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_the_store() {
        let store = MemoryStore::with_batch(vec![unclaimed(0)]);

        let err = claim(&store, 1, 0, "   ").await.unwrap_err();
        assert!(matches!(err, ClaimError::InvalidArgument(_)));
        let err = claim(&store, 0, 0, "alice").await.unwrap_err();
        assert!(matches!(err, ClaimError::InvalidArgument(_)));
        let err = claim(&store, 1, -1, "alice").await.unwrap_err();
        assert!(matches!(err, ClaimError::InvalidArgument(_)));

        assert_eq!(store.reads.load(Ordering::SeqCst), 0);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn claimant_name_is_trimmed() {
        let store = MemoryStore::with_batch(vec![unclaimed(0)]);
        claim(&store, 1, 0, "  alice  ").await.unwrap();

        let batch = store.get_batch(1).await.unwrap().unwrap();
        assert_eq!(batch.posts[0].claim.as_ref().unwrap().copied_by, "alice");
    }

    #[tokio::test]
    async fn store_outage_is_not_a_conflict() {
        let store = MemoryStore::with_batch(vec![unclaimed(0)]);
        store.fail_next_write.store(1, Ordering::SeqCst);

        let err = claim(&store, 1, 0, "alice").await.unwrap_err();
        assert!(matches!(err, ClaimError::Store(_)));

        // The failed attempt left no claim behind; a retry from scratch wins.
        let outcome = claim(&store, 1, 0, "alice").await.unwrap();
        assert_eq!(outcome, ClaimOutcome::Claimed);
    }

    #[tokio::test]
    async fn fifty_concurrent_claimants_one_winner() {
        let store = Arc::new(MemoryStore::with_batch(vec![unclaimed(0)]));

        let mut tasks = Vec::new();
        for i in 0..50 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                claim(store.as_ref(), 1, 0, &format!("member-{i}")).await
            }));
        }

        let mut wins = 0;
        let mut conflicts = 0;
        let mut holders = std::collections::HashSet::new();
        for task in tasks {
            match task.await.unwrap().unwrap() {
                ClaimOutcome::Claimed => wins += 1,
                ClaimOutcome::AlreadyClaimed { copied_by } => {
                    conflicts += 1;
                    holders.insert(copied_by);
                }
            }
        }

        assert_eq!(wins, 1);
        assert_eq!(conflicts, 49);
        // Every loser saw the same winner.
        assert_eq!(holders.len(), 1);
        let batch = store.get_batch(1).await.unwrap().unwrap();
        assert_eq!(
            &batch.posts[0].claim.as_ref().unwrap().copied_by,
            holders.iter().next().unwrap()
        );
    }
}
