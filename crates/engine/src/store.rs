//! Pending-item store — the authoritative record of what has been sent.

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use courier_common::types::PendingItem;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("item {0} not found or already sent")]
    NotUpdated(i64),

    #[error("store call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Queue of items awaiting dispatch.
#[async_trait]
pub trait PendingItemStore: Send + Sync {
    /// Up to `limit` unsent items, oldest first.
    async fn select_oldest_unsent(&self, limit: usize) -> Result<Vec<PendingItem>, StoreError>;

    /// Flip an unsent item to sent, recording the endpoint's delivery id.
    async fn mark_sent(&self, id: i64, delivery_id: &str) -> Result<(), StoreError>;
}

/// Postgres-backed store over the `pending_items` table.
#[derive(Clone)]
pub struct PgItemStore {
    pool: PgPool,
}

impl PgItemStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PendingItemStore for PgItemStore {
    async fn select_oldest_unsent(&self, limit: usize) -> Result<Vec<PendingItem>, StoreError> {
        let items: Vec<PendingItem> = sqlx::query_as(
            r#"
            SELECT * FROM pending_items
            WHERE sent = false
            ORDER BY created_at ASC, id ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    async fn mark_sent(&self, id: i64, delivery_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE pending_items
            SET sent = true, delivery_id = $2, updated_at = NOW()
            WHERE id = $1 AND sent = false
            "#,
        )
        .bind(id)
        .bind(delivery_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotUpdated(id));
        }

        Ok(())
    }
}
