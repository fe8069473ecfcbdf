//! Product ledger on the `products` table.

use futures::future::BoxFuture;
use ordersystem_core::ledger::ApplyOutcome;
use ordersystem_core::{
    CatalogError, LedgerError, Product, ProductCatalog, ProductId, ProductLedger, StockAdjustment,
};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

/// Durable product ledger.
///
/// Each adjustment is applied in its own transaction that both records the
/// `event_id` in `applied_stock_events` and updates `products.stock_quantity`,
/// so a redelivered adjustment is recognized and skipped. The update is
/// guarded so stock never goes below zero; an adjustment that would do so is
/// rejected as an inconsistency and the transaction rolls back.
#[derive(Clone)]
pub struct PostgresProductLedger {
    pool: PgPool,
}

impl PostgresProductLedger {
    /// Create a ledger over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a product, or replace its name, category, and stock.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unavailable`] if the write fails.
    pub async fn upsert_product(&self, product: &Product) -> Result<(), LedgerError> {
        sqlx::query(
            r"
            INSERT INTO products (id, name, category, stock_quantity)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                category = EXCLUDED.category,
                stock_quantity = EXCLUDED.stock_quantity,
                updated_at = now()
            ",
        )
        .bind(product.id.get())
        .bind(&product.name)
        .bind(product.category.as_deref())
        .bind(product.stock_quantity)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn apply(&self, adjustment: &StockAdjustment) -> Result<ApplyOutcome, LedgerError> {
        let product_id = adjustment.product_id;
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        let recorded = sqlx::query(
            r"
            INSERT INTO applied_stock_events (event_id, product_id, quantity_delta)
            VALUES ($1, $2, $3)
            ON CONFLICT (event_id) DO NOTHING
            ",
        )
        .bind(adjustment.event_id)
        .bind(product_id.get())
        .bind(adjustment.quantity_delta)
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?
        .rows_affected();

        if recorded == 0 {
            tx.rollback().await.map_err(unavailable)?;
            return Ok(ApplyOutcome::Duplicate);
        }

        let updated: Option<(i64,)> = sqlx::query_as(
            r"
            UPDATE products
            SET stock_quantity = stock_quantity + $2, updated_at = now()
            WHERE id = $1 AND stock_quantity + $2 >= 0
            RETURNING stock_quantity
            ",
        )
        .bind(product_id.get())
        .bind(adjustment.quantity_delta)
        .fetch_optional(&mut *tx)
        .await
        .map_err(unavailable)?;

        if let Some((stock_quantity,)) = updated {
            tx.commit().await.map_err(unavailable)?;
            return Ok(ApplyOutcome::Applied { stock_quantity });
        }

        let current: Option<(i64,)> =
            sqlx::query_as("SELECT stock_quantity FROM products WHERE id = $1")
                .bind(product_id.get())
                .fetch_optional(&mut *tx)
                .await
                .map_err(unavailable)?;
        tx.rollback().await.map_err(unavailable)?;

        let reason = match current {
            None => "product does not exist".to_string(),
            Some((stock,)) => format!(
                "delta {} would leave stock at {}",
                adjustment.quantity_delta,
                stock + adjustment.quantity_delta
            ),
        };
        Err(LedgerError::Inconsistency { product_id, reason })
    }
}

fn unavailable(err: sqlx::Error) -> LedgerError {
    LedgerError::Unavailable(err.to_string())
}

fn product_from_row(row: &PgRow) -> Result<Product, sqlx::Error> {
    Ok(Product {
        id: ProductId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        stock_quantity: row.try_get("stock_quantity")?,
    })
}

impl ProductLedger for PostgresProductLedger {
    fn apply_adjustment<'a>(
        &'a self,
        adjustment: &'a StockAdjustment,
    ) -> BoxFuture<'a, Result<ApplyOutcome, LedgerError>> {
        Box::pin(self.apply(adjustment))
    }

    fn stock_quantity(&self, product_id: ProductId) -> BoxFuture<'_, Result<i64, LedgerError>> {
        Box::pin(async move {
            let row: Option<(i64,)> =
                sqlx::query_as("SELECT stock_quantity FROM products WHERE id = $1")
                    .bind(product_id.get())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(unavailable)?;
            row.map(|(stock,)| stock)
                .ok_or_else(|| LedgerError::Inconsistency {
                    product_id,
                    reason: "product does not exist".to_string(),
                })
        })
    }

    fn list_products(&self) -> BoxFuture<'_, Result<Vec<Product>, LedgerError>> {
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT id, name, category, stock_quantity FROM products ORDER BY id",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;
            rows.iter()
                .map(product_from_row)
                .collect::<Result<_, _>>()
                .map_err(unavailable)
        })
    }
}

impl ProductCatalog for PostgresProductLedger {
    fn find_product(&self, product_id: ProductId) -> BoxFuture<'_, Result<Product, CatalogError>> {
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT id, name, category, stock_quantity FROM products WHERE id = $1",
            )
            .bind(product_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?
            .ok_or(CatalogError::NotFound(product_id))?;
            product_from_row(&row).map_err(|e| CatalogError::Unavailable(e.to_string()))
        })
    }
}
