//! Audit log writer — append-only record of control events and per-item outcomes.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;

use courier_common::error::AppError;
use courier_common::types::{AuditRecord, NewAuditRecord};

/// Upper bound on records returned by one [`AuditLog::recent`] call.
pub const MAX_FETCH_LIMIT: i64 = 1000;

#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append a record. Fire-and-forget: failures are logged by the
    /// implementation and never reach the caller.
    async fn append(&self, record: NewAuditRecord);

    /// Most recent records first.
    async fn recent(&self, limit: i64) -> Result<Vec<AuditRecord>, AppError>;
}

/// Clamp a caller-supplied limit into `1..=MAX_FETCH_LIMIT`.
pub fn clamp_limit(limit: i64) -> i64 {
    limit.clamp(1, MAX_FETCH_LIMIT)
}

/// Append with a time bound. An append that outlives `limit` is abandoned and
/// logged; the record is lost.
pub async fn append_within(audit: &dyn AuditLog, record: NewAuditRecord, limit: Duration) {
    let operation = record.operation;
    if tokio::time::timeout(limit, audit.append(record)).await.is_err() {
        tracing::error!(%operation, timeout = ?limit, "Audit append timed out");
    }
}

/// Postgres-backed audit log over the `dispatch_audit_log` table.
#[derive(Clone)]
pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLog for PgAuditLog {
    async fn append(&self, record: NewAuditRecord) {
        let result = sqlx::query(
            r#"
            INSERT INTO dispatch_audit_log (operation, item_ids, item_count, succeeded, description)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.operation.to_string())
        .bind(&record.item_ids)
        .bind(record.item_count())
        .bind(record.succeeded)
        .bind(&record.description)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::error!(
                operation = %record.operation,
                item_ids = ?record.item_ids,
                error = %e,
                "Failed to append audit record"
            );
        }
    }

    async fn recent(&self, limit: i64) -> Result<Vec<AuditRecord>, AppError> {
        let records: Vec<AuditRecord> = sqlx::query_as(
            r#"
            SELECT * FROM dispatch_audit_log
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(clamp_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
