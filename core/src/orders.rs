//! Order persistence and caller identity.

use futures::future::BoxFuture;

use crate::error::{MemberError, RepositoryError};
use crate::types::{
    MemberId, MemberIdentity, OrderId, OrderStatus, Ordering, Principal, StatusChangeId,
};

/// Order aggregate storage.
pub trait OrderRepository: Send + Sync {
    /// Persist a new order and all of its details in one durable write.
    ///
    /// Saving an order whose id is already stored with the same member and
    /// details succeeds without writing, so a save whose reply was lost can
    /// be retried.
    ///
    /// # Errors
    ///
    /// - [`RepositoryError::Unavailable`] if the write fails
    /// - [`RepositoryError::Corrupt`] if the id is taken by a different order
    fn save_order<'a>(
        &'a self,
        ordering: &'a Ordering,
    ) -> BoxFuture<'a, Result<OrderId, RepositoryError>>;

    /// Load one order with its details.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NotFound`] for an unknown order.
    fn find_order(&self, order_id: OrderId) -> BoxFuture<'_, Result<Ordering, RepositoryError>>;

    /// Orders placed by one member, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Unavailable`] if the store cannot be read.
    fn find_orders_by_member(
        &self,
        member_id: MemberId,
    ) -> BoxFuture<'_, Result<Vec<Ordering>, RepositoryError>>;

    /// Every order, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Unavailable`] if the store cannot be read.
    fn find_all_orders(&self) -> BoxFuture<'_, Result<Vec<Ordering>, RepositoryError>>;

    /// Compare-and-set the status: succeeds only if the stored status is
    /// `from`, or if it is already `to` through the same `change_id`.
    ///
    /// # Errors
    ///
    /// - [`RepositoryError::NotFound`] for an unknown order
    /// - [`RepositoryError::StatusConflict`] if the stored status is not `from`
    ///   and was not set by `change_id`
    fn transition_status(
        &self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        change_id: StatusChangeId,
    ) -> BoxFuture<'_, Result<(), RepositoryError>>;
}

/// The naive single-transaction placement path.
///
/// Reads each product's ledger stock without a row lock, compares, writes the
/// reduced value, and inserts the order, all in one transaction. Concurrent
/// calls can lose updates; this path exists as a baseline for comparison.
pub trait LegacyOrderStore: Send + Sync {
    /// Check stock and place the order in one transaction.
    ///
    /// # Errors
    ///
    /// - [`RepositoryError::InsufficientStock`] if any line exceeds the stock
    ///   read (the whole transaction rolls back)
    /// - [`RepositoryError::ProductNotFound`] for an unknown product
    /// - [`RepositoryError::Unavailable`] if the store cannot be reached
    fn place_order_checked<'a>(
        &'a self,
        ordering: &'a Ordering,
    ) -> BoxFuture<'a, Result<OrderId, RepositoryError>>;
}

/// Maps the authenticated principal to a member.
pub trait MemberResolver: Send + Sync {
    /// Resolve the caller.
    ///
    /// # Errors
    ///
    /// - [`MemberError::Unauthenticated`] for a blank principal
    /// - [`MemberError::NotFound`] if no member has this login
    fn resolve_current_member<'a>(
        &'a self,
        principal: &'a Principal,
    ) -> BoxFuture<'a, Result<MemberIdentity, MemberError>>;
}
