//! Per-request record of speculative counter decrements.

use ordersystem_core::{ProductId, StockAdjustment};

/// One admitted line: the counter was decremented and, once `consumed` is
/// set, the matching consumption event was published.
#[derive(Debug)]
pub(crate) struct Reservation {
    pub(crate) product_id: ProductId,
    pub(crate) quantity: u32,
    pub(crate) consumed: Option<StockAdjustment>,
}

/// Reservations made so far by one create request, in line order.
#[derive(Debug, Default)]
pub(crate) struct Reservations {
    entries: Vec<Reservation>,
}

impl Reservations {
    /// Record a successful decrement.
    pub(crate) fn reserve(&mut self, product_id: ProductId, quantity: u32) {
        self.entries.push(Reservation {
            product_id,
            quantity,
            consumed: None,
        });
    }

    /// Attach the published consumption event to the latest reservation.
    pub(crate) fn mark_published(&mut self, event: StockAdjustment) {
        if let Some(last) = self.entries.last_mut() {
            last.consumed = Some(event);
        }
    }

    /// Newest first, the order compensation runs in.
    pub(crate) fn newest_first(&self) -> impl Iterator<Item = &Reservation> {
        self.entries.iter().rev()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordersystem_core::OrderId;

    #[test]
    fn compensation_order_is_reversed() {
        let mut reservations = Reservations::default();
        reservations.reserve(ProductId::new(1), 2);
        reservations.mark_published(StockAdjustment::consume(
            ProductId::new(1),
            2,
            OrderId::new(),
            chrono::Utc::now(),
        ));
        reservations.reserve(ProductId::new(2), 1);

        let order: Vec<_> = reservations
            .newest_first()
            .map(|r| (r.product_id.get(), r.consumed.is_some()))
            .collect();
        assert_eq!(order, vec![(2, false), (1, true)]);
        assert_eq!(reservations.len(), 2);
    }
}
