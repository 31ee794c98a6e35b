use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{NewAuditEntry, NewOrder, Order, OrderId, OrderStatusType, PaymentId, UserId},
    events::{CacheInvalidationEvent, EventProducers, OrderStatusChangedEvent},
    ledger_api::gatekeeper::Gatekeeper,
    ledger_objects::{OrderQueryFilter, OrderStatusChange, OrderWithItems, PaymentReversed},
    ledger_rules,
    traits::{
        AuditLog,
        LedgerDatabase,
        LedgerError,
        LedgerOperation,
        NotificationDispatcher,
        OrderConfirmationEmail,
        OrderStatusEmail,
        PaymentEmailStatus,
        PaymentStatusEmail,
        PermissionGate,
    },
};

/// `FulfillmentApi` manages the order side of the ledger: checkout, the fulfillment lifecycle, admin reversals and
/// archival.
pub struct FulfillmentApi<B, G, A, N> {
    db: B,
    gatekeeper: Gatekeeper<G, A>,
    notifier: N,
    producers: EventProducers,
}

impl<B, G, A, N> Debug for FulfillmentApi<B, G, A, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FulfillmentApi")
    }
}

impl<B, G, A, N> FulfillmentApi<B, G, A, N> {
    pub fn new(db: B, gatekeeper: Gatekeeper<G, A>, notifier: N, producers: EventProducers) -> Self {
        Self { db, gatekeeper, notifier, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B, G, A, N> FulfillmentApi<B, G, A, N>
where
    B: LedgerDatabase,
    G: PermissionGate,
    A: AuditLog,
    N: NotificationDispatcher,
{
    /// Checks out a new order. The order starts life as `PENDING` with a payment status of `PENDING`.
    pub async fn create_order(&self, actor: &UserId, order: NewOrder) -> Result<OrderWithItems, LedgerError> {
        let subject = format!("checkout for {}", order.customer_id);
        let result = self
            .gatekeeper
            .authorized(actor, LedgerOperation::CreateOrder, subject, async {
                ledger_rules::validate_new_order(&order)?;
                self.db.insert_order(actor, order.clone()).await
            })
            .await?;
        let created = &result.order;
        info!("📦️ Order {} created for {} ({} items, {})", created.id, created.customer_id, result.items.len(), created.total_amount);
        let entry = NewAuditEntry::new(&created.customer_id, actor, "Order Created")
            .with_system_text(format!("Order {} created by {}", created.id, created.customer_name))
            .with_user_text("Order created successfully");
        self.gatekeeper.record(entry).await;
        if let Err(e) = self.notifier.send_order_confirmation_email(OrderConfirmationEmail::from(created)).await {
            self.gatekeeper.record_notification_failure(actor, created, "Order", &e).await;
        }
        self.producers.publish_cache_invalidation(CacheInvalidationEvent::for_new_order()).await;
        Ok(result)
    }

    /// Moves an order along its fulfillment lifecycle.
    ///
    /// Orders only move forward, except that any order that is not yet delivered may be cancelled. Delivering an order
    /// opens a customer survey for it.
    pub async fn update_order_status(
        &self,
        actor: &UserId,
        order_id: OrderId,
        new_status: OrderStatusType,
    ) -> Result<OrderStatusChange, LedgerError> {
        let result = self
            .gatekeeper
            .authorized(
                actor,
                LedgerOperation::UpdateOrderStatus,
                format!("order {order_id} to {new_status}"),
                self.db.update_order_status(actor, order_id, new_status),
            )
            .await?;
        let OrderStatusChange { old_status, order, survey } = &result;
        info!("📦️ Order {order_id} moved from {old_status} to {} by {actor}", order.status);
        let entry = NewAuditEntry::new(&order.customer_id, actor, "Order Status Updated")
            .with_system_text(format!("Order {order_id} status changed from {old_status} to {} by {actor}", order.status))
            .with_user_text(format!("Your order is now {}.", order.status));
        self.gatekeeper.record(entry).await;
        let mut email = OrderStatusEmail::for_order(order);
        email.survey_id = survey.as_ref().map(|s| s.id);
        if let Err(e) = self.notifier.send_order_status_email(email).await {
            self.gatekeeper.record_notification_failure(actor, order, "Order", &e).await;
        }
        self.producers.publish_order_status_changed(OrderStatusChangedEvent::new(*old_status, order.clone())).await;
        self.producers.publish_cache_invalidation(CacheInvalidationEvent::for_order_change(order_id)).await;
        Ok(result)
    }

    /// Refunds whatever is left of a charge and rolls the order back.
    ///
    /// Orders that are `READY` or `DELIVERED` go back to `PROCESSING`. The payment status becomes `PENDING` if nothing
    /// remains collected on the order, and `DOWNPAYMENT` otherwise.
    pub async fn reverse_payment(
        &self,
        actor: &UserId,
        order_id: OrderId,
        payment_id: PaymentId,
        reason: &str,
    ) -> Result<PaymentReversed, LedgerError> {
        let result = self
            .gatekeeper
            .authorized(
                actor,
                LedgerOperation::ReversePayment,
                format!("payment {payment_id} on order {order_id}"),
                self.db.reverse_payment(actor, order_id, payment_id, reason),
            )
            .await?;
        let PaymentReversed { old_status, order, original, refund } = &result;
        let amount = refund.amount.abs();
        info!("📦️ Payment {payment_id} on order {order_id} reversed by {actor}. {amount} refunded.");
        let entry = NewAuditEntry::new(&order.customer_id, actor, "Payment Reversed")
            .with_system_text(format!(
                "Reversed {amount} of payment {} for order {order_id}. Order is now {}/{}. Reason: {reason}",
                original.id, order.payment_status, order.status
            ))
            .with_user_text(format!("A refund of {amount} has been issued for your order. Reason: {reason}"));
        self.gatekeeper.record(entry).await;
        let email = PaymentStatusEmail::for_order(order, amount, PaymentEmailStatus::Refunded).with_refund_reason(reason);
        if let Err(e) = self.notifier.send_payment_status_email(email).await {
            self.gatekeeper.record_notification_failure(actor, order, "Payment", &e).await;
        }
        if *old_status != order.status {
            self.producers.publish_order_status_changed(OrderStatusChangedEvent::new(*old_status, order.clone())).await;
        }
        self.producers.publish_cache_invalidation(CacheInvalidationEvent::for_payment_change(order_id)).await;
        Ok(result)
    }

    /// Soft-deletes an order. Archived orders accept no further payments, but their history is kept.
    pub async fn archive_order(&self, actor: &UserId, order_id: OrderId) -> Result<Order, LedgerError> {
        let order = self
            .gatekeeper
            .authorized(actor, LedgerOperation::ArchiveOrder, format!("order {order_id}"), self.db.archive_order(actor, order_id))
            .await?;
        info!("📦️ Order {order_id} archived by {actor}");
        let entry = NewAuditEntry::new(&order.customer_id, actor, "Order Archived")
            .with_system_text(format!("Order {order_id} archived by {actor}"))
            .with_user_text("Your order has been archived.");
        self.gatekeeper.record(entry).await;
        self.producers.publish_cache_invalidation(CacheInvalidationEvent::for_order_change(order_id)).await;
        Ok(order)
    }

    pub async fn order_by_id(&self, actor: &UserId, order_id: OrderId) -> Result<Option<OrderWithItems>, LedgerError> {
        self.gatekeeper
            .authorized(actor, LedgerOperation::ReadOrders, format!("order {order_id}"), async {
                match self.db.fetch_order(order_id).await? {
                    Some(order) => {
                        let items = self.db.fetch_order_items(order_id).await?;
                        Ok(Some(OrderWithItems { order, items }))
                    },
                    None => Ok(None),
                }
            })
            .await
    }

    pub async fn orders(&self, actor: &UserId, filter: OrderQueryFilter) -> Result<Vec<Order>, LedgerError> {
        trace!("📦️ {actor} is searching orders with {filter:?}");
        self.gatekeeper.authorized(actor, LedgerOperation::ReadOrders, "order search", self.db.search_orders(filter)).await
    }
}
