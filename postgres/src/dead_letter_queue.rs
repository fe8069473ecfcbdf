//! Dead Letter Queue (DLQ) for stock adjustments the ledger rejected.
//!
//! The stock worker parks an adjustment here when applying it would leave the
//! ledger inconsistent (missing product, negative stock). Operators list the
//! pending entries, fix the ledger, and mark each entry resolved or discarded.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use ordersystem_core::{DeadLetterSink, LedgerError, OrderId, ProductId, StockAdjustment};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::StoreError;

/// Status of a parked adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DLQStatus {
    /// Awaiting investigation
    Pending,
    /// An operator is working on it
    Processing,
    /// The ledger was corrected
    Resolved,
    /// Permanently dropped
    Discarded,
}

impl DLQStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Resolved => "resolved",
            Self::Discarded => "discarded",
        }
    }

    /// Parse status from database string.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] for an unknown status.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "resolved" => Ok(Self::Resolved),
            "discarded" => Ok(Self::Discarded),
            _ => Err(StoreError::Corrupt(format!("Invalid DLQ status: {s}"))),
        }
    }
}

/// A parked adjustment plus failure metadata.
#[derive(Debug, Clone)]
pub struct FailedAdjustment {
    /// DLQ entry ID
    pub id: i64,
    /// Adjustment event ID
    pub event_id: Uuid,
    /// Product the adjustment targeted
    pub product_id: ProductId,
    /// Signed delta that could not be applied
    pub quantity_delta: i64,
    /// Adjustment reason label (`order_placed`, ...)
    pub reason: String,
    /// Originating order, if any
    pub order_id: Option<OrderId>,
    /// When the adjustment was emitted
    pub occurred_at: DateTime<Utc>,
    /// Why the ledger rejected it
    pub error_message: String,
    /// How many times it was parked (redeliveries re-park)
    pub failure_count: i32,
    /// First rejection
    pub first_failed_at: DateTime<Utc>,
    /// Latest rejection
    pub last_failed_at: DateTime<Utc>,
    /// Current status
    pub status: DLQStatus,
    /// When it was resolved or discarded
    pub resolved_at: Option<DateTime<Utc>>,
    /// Who resolved it
    pub resolved_by: Option<String>,
    /// Resolution notes
    pub resolution_notes: Option<String>,
}

const COLUMNS: &str = r"
    id, event_id, product_id, quantity_delta, reason, order_id, occurred_at,
    error_message, failure_count, first_failed_at, last_failed_at, status,
    resolved_at, resolved_by, resolution_notes
";

/// `PostgreSQL`-backed dead-letter queue on `failed_stock_events`.
///
/// # Example
///
/// ```no_run
/// use ordersystem_postgres::{DLQStatus, DeadLetterQueue};
///
/// # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let dlq = DeadLetterQueue::new(pool);
///
/// let pending = dlq.list_pending(100).await?;
/// println!("Pending failures: {}", pending.len());
///
/// dlq.update_status(pending[0].id, DLQStatus::Processing).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DeadLetterQueue {
    pool: PgPool,
}

impl DeadLetterQueue {
    /// Create a new Dead Letter Queue with the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Park an adjustment. Parking the same event again bumps its failure
    /// count instead of adding a second entry.
    ///
    /// Returns the DLQ entry ID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert fails.
    pub async fn add_entry(
        &self,
        adjustment: &StockAdjustment,
        error_message: &str,
    ) -> Result<i64, StoreError> {
        let (id,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO failed_stock_events (
                event_id, product_id, quantity_delta, reason, order_id,
                occurred_at, error_message
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (event_id) DO UPDATE
            SET failure_count = failed_stock_events.failure_count + 1,
                last_failed_at = now(),
                error_message = EXCLUDED.error_message
            RETURNING id
            ",
        )
        .bind(adjustment.event_id)
        .bind(adjustment.product_id.get())
        .bind(adjustment.quantity_delta)
        .bind(adjustment.reason.as_str())
        .bind(adjustment.order_id.map(|id| id.as_uuid()))
        .bind(adjustment.occurred_at)
        .bind(error_message)
        .fetch_one(&self.pool)
        .await?;

        tracing::warn!(
            dlq_id = id,
            event_id = %adjustment.event_id,
            product_id = %adjustment.product_id,
            error = error_message,
            "Adjustment added to Dead Letter Queue"
        );
        metrics::counter!("stock_dlq_added_total", "reason" => adjustment.reason.as_str())
            .increment(1);

        Ok(id)
    }

    /// List pending entries, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails or a row cannot be decoded.
    pub async fn list_pending(&self, limit: usize) -> Result<Vec<FailedAdjustment>, StoreError> {
        self.list_by_status(DLQStatus::Pending, limit).await
    }

    /// List entries by status, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails or a row cannot be decoded.
    pub async fn list_by_status(
        &self,
        status: DLQStatus,
        limit: usize,
    ) -> Result<Vec<FailedAdjustment>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM failed_stock_events
             WHERE status = $1
             ORDER BY first_failed_at ASC
             LIMIT $2"
        ))
        .bind(status.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_failed_adjustment).collect()
    }

    /// Get one entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails or the entry does
    /// not exist.
    pub async fn get_by_id(&self, id: i64) -> Result<FailedAdjustment, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM failed_stock_events WHERE id = $1"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_failed_adjustment(&row)
    }

    /// Update the status of an entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the update fails.
    pub async fn update_status(&self, id: i64, status: DLQStatus) -> Result<(), StoreError> {
        sqlx::query("UPDATE failed_stock_events SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        tracing::info!(dlq_id = id, status = status.as_str(), "DLQ entry status updated");
        Ok(())
    }

    /// Mark an entry resolved after the ledger was corrected.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the update fails.
    pub async fn mark_resolved(
        &self,
        id: i64,
        resolved_by: &str,
        notes: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r"
            UPDATE failed_stock_events
            SET status = 'resolved',
                resolved_at = now(),
                resolved_by = $1,
                resolution_notes = $2
            WHERE id = $3
            ",
        )
        .bind(resolved_by)
        .bind(notes)
        .bind(id)
        .execute(&self.pool)
        .await?;

        tracing::info!(dlq_id = id, resolved_by, "DLQ entry marked as resolved");
        metrics::counter!("stock_dlq_resolved_total").increment(1);
        Ok(())
    }

    /// Mark an entry permanently dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the update fails.
    pub async fn mark_discarded(&self, id: i64, reason: &str) -> Result<(), StoreError> {
        sqlx::query(
            r"
            UPDATE failed_stock_events
            SET status = 'discarded',
                resolved_at = now(),
                resolution_notes = $1
            WHERE id = $2
            ",
        )
        .bind(reason)
        .bind(id)
        .execute(&self.pool)
        .await?;

        tracing::warn!(dlq_id = id, reason, "DLQ entry marked as discarded");
        metrics::counter!("stock_dlq_discarded_total").increment(1);
        Ok(())
    }

    /// Number of pending entries, for health checks.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn count_pending(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM failed_stock_events WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    fn row_to_failed_adjustment(row: &PgRow) -> Result<FailedAdjustment, StoreError> {
        let status: String = row.try_get("status")?;
        let order_id: Option<Uuid> = row.try_get("order_id")?;

        Ok(FailedAdjustment {
            id: row.try_get("id")?,
            event_id: row.try_get("event_id")?,
            product_id: ProductId::new(row.try_get("product_id")?),
            quantity_delta: row.try_get("quantity_delta")?,
            reason: row.try_get("reason")?,
            order_id: order_id.map(OrderId::from_uuid),
            occurred_at: row.try_get("occurred_at")?,
            error_message: row.try_get("error_message")?,
            failure_count: row.try_get("failure_count")?,
            first_failed_at: row.try_get("first_failed_at")?,
            last_failed_at: row.try_get("last_failed_at")?,
            status: DLQStatus::parse(&status)?,
            resolved_at: row.try_get("resolved_at")?,
            resolved_by: row.try_get("resolved_by")?,
            resolution_notes: row.try_get("resolution_notes")?,
        })
    }
}

impl DeadLetterSink for DeadLetterQueue {
    fn park<'a>(
        &'a self,
        adjustment: &'a StockAdjustment,
        reason: &'a str,
    ) -> BoxFuture<'a, Result<(), LedgerError>> {
        Box::pin(async move {
            self.add_entry(adjustment, reason)
                .await
                .map(|_| ())
                .map_err(|e| LedgerError::Unavailable(e.to_string()))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn dlq_status_roundtrip() {
        for status in &[
            DLQStatus::Pending,
            DLQStatus::Processing,
            DLQStatus::Resolved,
            DLQStatus::Discarded,
        ] {
            let s = status.as_str();
            let parsed = DLQStatus::parse(s).expect("valid status should parse");
            assert_eq!(*status, parsed);
        }
    }

    #[test]
    fn dlq_status_invalid() {
        assert!(matches!(
            DLQStatus::parse("invalid"),
            Err(StoreError::Corrupt(_))
        ));
    }
}
