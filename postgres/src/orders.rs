//! Orders on the `orderings` and `order_details` tables.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use ordersystem_core::{
    LegacyOrderStore, MemberId, MemberIdentity, OrderDetail, OrderDetailId, OrderId,
    OrderRepository, OrderStatus, Ordering, ProductId, RepositoryError, StatusChangeId,
};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use crate::is_foreign_key_violation;

const ORDER_COLUMNS: &str = "id, member_id, member_email, order_status, created_at";

/// Order store.
///
/// An order and its details are written in one READ COMMITTED transaction;
/// an insert that finds its id already stored is checked against the stored
/// order instead of failing. Status changes are conditional updates, which
/// makes cancellation a compare-and-set, and record the id of the change so a
/// retried change succeeds.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn save(&self, ordering: &Ordering) -> Result<OrderId, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;
        if !insert_order(&mut tx, ordering).await? {
            drop(tx);
            return self.confirm_saved(ordering).await;
        }
        tx.commit().await.map_err(unavailable)?;

        tracing::debug!(
            order_id = %ordering.id(),
            details = ordering.details().len(),
            "Order saved"
        );
        Ok(ordering.id())
    }

    /// The id is already stored: a retry of a save that committed is a
    /// success, anything else is an id collision.
    async fn confirm_saved(&self, ordering: &Ordering) -> Result<OrderId, RepositoryError> {
        let stored = self.find_order(ordering.id()).await?;
        if stored.member().id == ordering.member().id && stored.details() == ordering.details() {
            tracing::debug!(order_id = %ordering.id(), "Order already saved");
            return Ok(ordering.id());
        }
        Err(duplicate(ordering.id()))
    }

    /// Check stock, write it back, and insert the order, all in one
    /// transaction and without row locks.
    ///
    /// Two sessions can both read the same `stock_quantity` before either
    /// writes; the later write then overwrites the earlier one.
    async fn place_checked(&self, ordering: &Ordering) -> Result<OrderId, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        for detail in ordering.details() {
            let row: Option<(i64,)> =
                sqlx::query_as("SELECT stock_quantity FROM products WHERE id = $1")
                    .bind(detail.product_id.get())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(unavailable)?;
            let (available,) = row.ok_or(RepositoryError::ProductNotFound(detail.product_id))?;

            let requested = i64::from(detail.quantity);
            if available < requested {
                // Dropping the transaction rolls back earlier lines
                return Err(RepositoryError::InsufficientStock {
                    product_id: detail.product_id,
                    requested: detail.quantity,
                    available,
                });
            }

            sqlx::query("UPDATE products SET stock_quantity = $2, updated_at = now() WHERE id = $1")
                .bind(detail.product_id.get())
                .bind(available - requested)
                .execute(&mut *tx)
                .await
                .map_err(unavailable)?;
        }

        if !insert_order(&mut tx, ordering).await? {
            // Dropping the transaction rolls back the stock writes
            return Err(duplicate(ordering.id()));
        }
        tx.commit().await.map_err(unavailable)?;
        Ok(ordering.id())
    }

    async fn load(&self, rows: Vec<PgRow>) -> Result<Vec<Ordering>, RepositoryError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(corrupt)?;

        let detail_rows = sqlx::query(
            r"
            SELECT ordering_id, id, product_id, quantity
            FROM order_details
            WHERE ordering_id = ANY($1)
            ORDER BY ordering_id, position
            ",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        let mut details: HashMap<Uuid, Vec<OrderDetail>> = HashMap::new();
        for row in &detail_rows {
            let ordering_id: Uuid = row.try_get("ordering_id").map_err(corrupt)?;
            details
                .entry(ordering_id)
                .or_default()
                .push(detail_from_row(row)?);
        }

        rows.iter()
            .map(|row| {
                let id: Uuid = row.try_get("id").map_err(corrupt)?;
                order_from_row(row, details.remove(&id).unwrap_or_default())
            })
            .collect()
    }
}

/// Insert the order and its details; `false` if the id already exists.
async fn insert_order(
    conn: &mut PgConnection,
    ordering: &Ordering,
) -> Result<bool, RepositoryError> {
    let inserted = sqlx::query(
        r"
        INSERT INTO orderings (id, member_id, member_email, order_status, created_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (id) DO NOTHING
        ",
    )
    .bind(ordering.id().as_uuid())
    .bind(ordering.member().id.as_uuid())
    .bind(&ordering.member().email)
    .bind(ordering.status().as_str())
    .bind(ordering.created_at())
    .execute(&mut *conn)
    .await
    .map_err(unavailable)?
    .rows_affected();
    if inserted == 0 {
        return Ok(false);
    }

    for (position, detail) in (0_i32..).zip(ordering.details()) {
        sqlx::query(
            r"
            INSERT INTO order_details (id, ordering_id, position, product_id, quantity)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(detail.id.as_uuid())
        .bind(ordering.id().as_uuid())
        .bind(position)
        .bind(detail.product_id.get())
        .bind(i64::from(detail.quantity))
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                RepositoryError::ProductNotFound(detail.product_id)
            } else {
                unavailable(e)
            }
        })?;
    }
    Ok(true)
}

fn detail_from_row(row: &PgRow) -> Result<OrderDetail, RepositoryError> {
    let quantity: i64 = row.try_get("quantity").map_err(corrupt)?;
    Ok(OrderDetail {
        id: OrderDetailId::from_uuid(row.try_get("id").map_err(corrupt)?),
        product_id: ProductId::new(row.try_get("product_id").map_err(corrupt)?),
        quantity: u32::try_from(quantity)
            .map_err(|_| RepositoryError::Corrupt(format!("quantity {quantity} out of range")))?,
    })
}

fn order_from_row(row: &PgRow, details: Vec<OrderDetail>) -> Result<Ordering, RepositoryError> {
    let status: String = row.try_get("order_status").map_err(corrupt)?;
    let status = OrderStatus::parse(&status)
        .ok_or_else(|| RepositoryError::Corrupt(format!("unknown order status {status}")))?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(corrupt)?;

    Ok(Ordering::restore(
        OrderId::from_uuid(row.try_get("id").map_err(corrupt)?),
        MemberIdentity {
            id: MemberId::from_uuid(row.try_get("member_id").map_err(corrupt)?),
            email: row.try_get("member_email").map_err(corrupt)?,
        },
        status,
        details,
        created_at,
    ))
}

fn unavailable(err: sqlx::Error) -> RepositoryError {
    RepositoryError::Unavailable(err.to_string())
}

fn duplicate(order_id: OrderId) -> RepositoryError {
    RepositoryError::Corrupt(format!("order id {order_id} already used by a different order"))
}

fn corrupt(err: sqlx::Error) -> RepositoryError {
    RepositoryError::Corrupt(err.to_string())
}

impl OrderRepository for PostgresOrderStore {
    fn save_order<'a>(
        &'a self,
        ordering: &'a Ordering,
    ) -> BoxFuture<'a, Result<OrderId, RepositoryError>> {
        Box::pin(self.save(ordering))
    }

    fn find_order(&self, order_id: OrderId) -> BoxFuture<'_, Result<Ordering, RepositoryError>> {
        Box::pin(async move {
            let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orderings WHERE id = $1"))
                .bind(order_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(unavailable)?
                .ok_or(RepositoryError::NotFound(order_id))?;
            self.load(vec![row])
                .await?
                .pop()
                .ok_or(RepositoryError::NotFound(order_id))
        })
    }

    fn find_orders_by_member(
        &self,
        member_id: MemberId,
    ) -> BoxFuture<'_, Result<Vec<Ordering>, RepositoryError>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {ORDER_COLUMNS} FROM orderings WHERE member_id = $1 ORDER BY created_at, id"
            ))
            .bind(member_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;
            self.load(rows).await
        })
    }

    fn find_all_orders(&self) -> BoxFuture<'_, Result<Vec<Ordering>, RepositoryError>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {ORDER_COLUMNS} FROM orderings ORDER BY created_at, id"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;
            self.load(rows).await
        })
    }

    fn transition_status(
        &self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        change_id: StatusChangeId,
    ) -> BoxFuture<'_, Result<(), RepositoryError>> {
        Box::pin(async move {
            let changed = sqlx::query(
                r"
                UPDATE orderings
                SET order_status = $3, status_change_id = $4, updated_at = now()
                WHERE id = $1
                  AND (order_status = $2 OR (order_status = $3 AND status_change_id = $4))
                ",
            )
            .bind(order_id.as_uuid())
            .bind(from.as_str())
            .bind(to.as_str())
            .bind(change_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(unavailable)?
            .rows_affected();

            if changed == 1 {
                return Ok(());
            }

            let actual: Option<(String,)> =
                sqlx::query_as("SELECT order_status FROM orderings WHERE id = $1")
                    .bind(order_id.as_uuid())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(unavailable)?;
            let (actual,) = actual.ok_or(RepositoryError::NotFound(order_id))?;
            let actual = OrderStatus::parse(&actual)
                .ok_or_else(|| RepositoryError::Corrupt(format!("unknown order status {actual}")))?;
            Err(RepositoryError::StatusConflict {
                order_id,
                expected: from,
                actual,
            })
        })
    }
}

impl LegacyOrderStore for PostgresOrderStore {
    fn place_order_checked<'a>(
        &'a self,
        ordering: &'a Ordering,
    ) -> BoxFuture<'a, Result<OrderId, RepositoryError>> {
        Box::pin(self.place_checked(ordering))
    }
}
