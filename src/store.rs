//! Storage seam for the claim path.
//!
//! The arbiter in [`crate::claim`] is written against this trait rather than
//! the SQL repository so its contract can be exercised with an in-memory
//! store and so the conditional-write requirement is explicit: `claim_item`
//! must be atomic with respect to concurrent callers targeting the same
//! (batch, seq) pair. The SQLite implementation gets that from a single
//! `UPDATE ... WHERE copied_by IS NULL` statement; no in-process lock is
//! involved.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db::{self, Pool};
use crate::model::PostBatch;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Transient storage failure. Distinct from every logical claim outcome;
    /// callers may retry the whole operation from scratch.
    #[error("store unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
}

#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Load a batch with its full item sequence. No side effects.
    async fn get_batch(&self, batch_id: i64) -> Result<Option<PostBatch>, StoreError>;

    /// Conditional claim write for one item. Returns true iff the item was
    /// still unclaimed and this call recorded the claim; at most one of any
    /// set of racing callers observes true.
    async fn claim_item(
        &self,
        batch_id: i64,
        item_index: i64,
        copied_by: &str,
        copied_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}

/// Production store backed by the SQLite repository.
#[derive(Debug, Clone)]
pub struct SqliteBatchStore {
    pool: Pool,
}

impl SqliteBatchStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BatchStore for SqliteBatchStore {
    async fn get_batch(&self, batch_id: i64) -> Result<Option<PostBatch>, StoreError> {
        db::get_post_batch(&self.pool, batch_id)
            .await
            .map_err(StoreError::Unavailable)
    }

    async fn claim_item(
        &self,
        batch_id: i64,
        item_index: i64,
        copied_by: &str,
        copied_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        db::claim_batch_item(&self.pool, batch_id, item_index, copied_by, copied_at)
            .await
            .map_err(StoreError::Unavailable)
    }
}
