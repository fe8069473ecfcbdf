//! Order listings.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use ordersystem_core::{
    CatalogError, MemberResolver, OrderDetailId, OrderError, OrderId, OrderRepository,
    OrderStatus, Ordering, Principal, ProductCatalog, ProductId,
};

/// One order as shown in listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListView {
    /// Order ID
    pub id: OrderId,
    /// Who placed it
    pub member_email: String,
    /// `ORDERED` or `CANCELED`
    pub order_status: OrderStatus,
    /// Lines in placement order
    pub order_details: Vec<OrderDetailView>,
}

/// One order line as shown in listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetailView {
    /// Detail ID
    pub detail_id: OrderDetailId,
    /// Product name at listing time
    pub product_name: String,
    /// Ordered quantity
    pub product_count: u32,
}

/// Read-side queries over persisted orders.
pub struct OrderQueryService {
    orders: Arc<dyn OrderRepository>,
    catalog: Arc<dyn ProductCatalog>,
    members: Arc<dyn MemberResolver>,
}

impl OrderQueryService {
    /// Create a query service.
    #[must_use]
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        catalog: Arc<dyn ProductCatalog>,
        members: Arc<dyn MemberResolver>,
    ) -> Self {
        Self {
            orders,
            catalog,
            members,
        }
    }

    /// Every order, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::StoreUnavailable`] if the order store or the
    /// catalog cannot be read.
    pub async fn list_all(&self) -> Result<Vec<OrderListView>, OrderError> {
        let orders = self.orders.find_all_orders().await?;
        self.project(&orders).await
    }

    /// The caller's own orders, oldest first.
    ///
    /// # Errors
    ///
    /// - [`OrderError::Unauthenticated`] / [`OrderError::MemberNotFound`]
    /// - [`OrderError::StoreUnavailable`] if a store cannot be read
    pub async fn my_orders(&self, principal: &Principal) -> Result<Vec<OrderListView>, OrderError> {
        let member = self.members.resolve_current_member(principal).await?;
        let orders = self.orders.find_orders_by_member(member.id).await?;
        self.project(&orders).await
    }

    async fn project(&self, orders: &[Ordering]) -> Result<Vec<OrderListView>, OrderError> {
        let mut names: HashMap<ProductId, String> = HashMap::new();
        let mut views = Vec::with_capacity(orders.len());

        for ordering in orders {
            let mut order_details = Vec::with_capacity(ordering.details().len());
            for detail in ordering.details() {
                let product_name = match names.get(&detail.product_id) {
                    Some(name) => name.clone(),
                    None => {
                        let name = self.product_name(detail.product_id).await?;
                        names.insert(detail.product_id, name.clone());
                        name
                    }
                };
                order_details.push(OrderDetailView {
                    detail_id: detail.id,
                    product_name,
                    product_count: detail.quantity,
                });
            }
            views.push(OrderListView {
                id: ordering.id(),
                member_email: ordering.member().email.clone(),
                order_status: ordering.status(),
                order_details,
            });
        }
        Ok(views)
    }

    /// Products removed from the catalog still list under a placeholder name.
    async fn product_name(&self, product_id: ProductId) -> Result<String, OrderError> {
        match self.catalog.find_product(product_id).await {
            Ok(product) => Ok(product.name),
            Err(CatalogError::NotFound(_)) => Ok(format!("unknown product {product_id}")),
            Err(e) => Err(e.into()),
        }
    }
}
