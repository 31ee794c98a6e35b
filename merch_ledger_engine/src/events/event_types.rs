use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderId, OrderStatusType};

/// Published when a payment or verification takes an order to `PAID`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub order: Order,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Published whenever the fulfillment status of an order changes, including reversals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChangedEvent {
    pub old_status: OrderStatusType,
    pub order: Order,
}

impl OrderStatusChangedEvent {
    pub fn new(old_status: OrderStatusType, order: Order) -> Self {
        Self { old_status, order }
    }
}

/// A cache entry that a presentation layer may be holding and should drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheKey {
    Order(OrderId),
    OrderList,
    OrderPayments(OrderId),
    PaymentList,
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Order(id) => write!(f, "order:{}", id.value()),
            CacheKey::OrderList => write!(f, "orders:list"),
            CacheKey::OrderPayments(id) => write!(f, "payments:order:{}", id.value()),
            CacheKey::PaymentList => write!(f, "payments:list"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheInvalidationEvent {
    pub keys: Vec<CacheKey>,
}

impl CacheInvalidationEvent {
    /// The keys touched by any change to an order's payments.
    pub fn for_payment_change(order_id: OrderId) -> Self {
        Self {
            keys: vec![
                CacheKey::Order(order_id),
                CacheKey::OrderList,
                CacheKey::OrderPayments(order_id),
                CacheKey::PaymentList,
            ],
        }
    }

    pub fn for_order_change(order_id: OrderId) -> Self {
        Self { keys: vec![CacheKey::Order(order_id), CacheKey::OrderList] }
    }

    pub fn for_new_order() -> Self {
        Self { keys: vec![CacheKey::OrderList] }
    }

    pub fn key_strings(&self) -> Vec<String> {
        self.keys.iter().map(|k| k.to_string()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    OrderPaid(OrderPaidEvent),
    OrderStatusChanged(OrderStatusChangedEvent),
    CacheInvalidation(CacheInvalidationEvent),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cache_keys_render_as_cache_tags() {
        let ev = CacheInvalidationEvent::for_payment_change(OrderId(42));
        assert_eq!(ev.key_strings(), vec!["order:42", "orders:list", "payments:order:42", "payments:list"]);
        assert_eq!(CacheInvalidationEvent::for_order_change(OrderId(7)).key_strings(), vec!["order:7", "orders:list"]);
        assert_eq!(CacheInvalidationEvent::for_new_order().key_strings(), vec!["orders:list"]);
    }
}
