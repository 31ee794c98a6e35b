use std::fmt::Debug;

use log::*;

use crate::{
    config::LedgerConfig,
    db_types::{NewAuditEntry, NewPayment, Order, OrderId, Payment, PaymentId, PaymentStatus, UserId},
    events::{CacheInvalidationEvent, EventProducers, OrderPaidEvent},
    ledger_api::gatekeeper::Gatekeeper,
    ledger_objects::{
        OrderLedgerSummary,
        PaymentDeclined,
        PaymentRecorded,
        PaymentVerified,
        RefundRecorded,
        RefundRequest,
        TransactionDetails,
    },
    ledger_rules,
    traits::{
        AuditLog,
        LedgerDatabase,
        LedgerError,
        LedgerOperation,
        NotificationDispatcher,
        OrderStatusEmail,
        PaymentEmailStatus,
        PaymentStatusEmail,
        PermissionGate,
    },
};

/// `PaymentLedgerApi` records payments against orders, verifies or rejects pending payments, and issues refunds.
///
/// The ledger state is changed by the backend in a single transaction. Everything else (audit entries for successful
/// calls, customer emails, cache hints and [`OrderPaidEvent`]s) happens after that transaction has committed, and a
/// failure in any of those steps never undoes the payment.
pub struct PaymentLedgerApi<B, G, A, N> {
    db: B,
    gatekeeper: Gatekeeper<G, A>,
    notifier: N,
    producers: EventProducers,
    reject_duplicate_transaction_ids: bool,
}

impl<B, G, A, N> Debug for PaymentLedgerApi<B, G, A, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentLedgerApi")
    }
}

impl<B, G, A, N> PaymentLedgerApi<B, G, A, N> {
    pub fn new(db: B, gatekeeper: Gatekeeper<G, A>, notifier: N, producers: EventProducers) -> Self {
        Self { db, gatekeeper, notifier, producers, reject_duplicate_transaction_ids: false }
    }

    pub fn with_config(mut self, config: &LedgerConfig) -> Self {
        self.reject_duplicate_transaction_ids = config.reject_duplicate_transaction_ids;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B, G, A, N> PaymentLedgerApi<B, G, A, N>
where
    B: LedgerDatabase,
    G: PermissionGate,
    A: AuditLog,
    N: NotificationDispatcher,
{
    /// Records a new charge against an order.
    ///
    /// The payment is rejected, and nothing is written, if it would take the amount collected on the order past the
    /// order total. Offsite payments that arrive as `PENDING` are stored but leave the order untouched until they are
    /// validated with [`Self::validate_payment`].
    pub async fn process_payment(&self, actor: &UserId, payment: NewPayment) -> Result<PaymentRecorded, LedgerError> {
        let subject = format!("order {}", payment.order_id);
        let result = self
            .gatekeeper
            .authorized(actor, LedgerOperation::ProcessPayment, subject, async {
                ledger_rules::validate_new_payment(&payment)?;
                self.db.record_payment(actor, payment.clone()).await
            })
            .await?;
        let PaymentRecorded { order, payment: recorded, fully_paid, order_updated } = &result;
        let amount = recorded.amount;
        info!("💰️ Payment {} of {amount} recorded for order {} by {actor}", recorded.id, order.id);
        if *order_updated {
            let paid_note = if *fully_paid { " Order is now fully paid." } else { "" };
            let entry = NewAuditEntry::new(&order.customer_id, actor, "Payment Processed Successfully")
                .with_system_text(format!(
                    "Payment of {amount} processed for order {} via {}. Status: {}.{paid_note}",
                    order.id, recorded.payment_method, recorded.payment_status
                ))
                .with_user_text(format!(
                    "Payment of {amount} has been processed successfully{}",
                    if *fully_paid { ". Your order is now fully paid." } else { "." }
                ));
            self.gatekeeper.record(entry).await;
            let status = match recorded.payment_status {
                PaymentStatus::Verified => PaymentEmailStatus::Verified,
                _ => PaymentEmailStatus::Submitted,
            };
            self.send_payment_email(actor, order, PaymentStatusEmail::for_order(order, amount, status)).await;
        } else {
            let entry = NewAuditEntry::new(&order.customer_id, actor, "Offsite Payment Submitted")
                .with_system_text(format!(
                    "Offsite payment of {amount} submitted for order {} via {}. Awaiting verification.",
                    order.id, recorded.payment_method
                ))
                .with_user_text(format!(
                    "Your payment submission of {amount} has been received and is awaiting verification by our team."
                ));
            self.gatekeeper.record(entry).await;
            let email = PaymentStatusEmail::for_order(order, amount, PaymentEmailStatus::Submitted);
            self.send_payment_email(actor, order, email).await;
        }
        self.producers.publish_cache_invalidation(CacheInvalidationEvent::for_payment_change(order.id)).await;
        if *fully_paid {
            self.producers.publish_order_paid(OrderPaidEvent::new(order.clone())).await;
        }
        Ok(result)
    }

    /// Refunds part or all of a verified charge by appending a negative refund row to the ledger.
    ///
    /// Refunds never change the fulfillment status of the order. Use [`crate::FulfillmentApi::reverse_payment`] to
    /// refund a payment and roll the order back.
    pub async fn refund_payment(&self, actor: &UserId, request: RefundRequest) -> Result<RefundRecorded, LedgerError> {
        let subject = format!("payment {}", request.payment_id);
        let result = self
            .gatekeeper
            .authorized(actor, LedgerOperation::RefundPayment, subject, self.db.record_refund(actor, &request))
            .await?;
        let RefundRecorded { order, original, refund } = &result;
        let amount = request.amount;
        let reason = &request.reason;
        info!("💰️ {amount} refunded from payment {} on order {} by {actor}", original.id, order.id);
        let entry = NewAuditEntry::new(&order.customer_id, actor, "Payment Refunded Successfully")
            .with_system_text(format!(
                "Refunded {amount} from payment {} for order {}. Refund row {}. Reason: {reason}",
                original.id, order.id, refund.id
            ))
            .with_user_text(format!("Refund of {amount} has been processed successfully. Reason: {reason}"));
        self.gatekeeper.record(entry).await;
        let email =
            PaymentStatusEmail::for_order(order, amount, PaymentEmailStatus::Refunded).with_refund_reason(reason.as_str());
        self.send_payment_email(actor, order, email).await;
        self.producers.publish_cache_invalidation(CacheInvalidationEvent::for_payment_change(order.id)).await;
        Ok(result)
    }

    /// Moves a pending payment to `VERIFIED` and re-evaluates the order.
    ///
    /// If the order is fully paid as a result, the customer receives an order-status email; otherwise a
    /// payment-verified email.
    pub async fn validate_payment(
        &self,
        actor: &UserId,
        order_id: OrderId,
        payment_id: PaymentId,
        details: TransactionDetails,
    ) -> Result<PaymentVerified, LedgerError> {
        let subject = format!("payment {payment_id} on order {order_id}");
        let reject_duplicates = self.reject_duplicate_transaction_ids;
        let result = self
            .gatekeeper
            .authorized(
                actor,
                LedgerOperation::ValidatePayment,
                subject,
                self.db.verify_payment(actor, order_id, payment_id, &details, reject_duplicates),
            )
            .await?;
        let PaymentVerified { order, payment, fully_paid } = &result;
        info!("💰️ Payment {payment_id} on order {order_id} validated by {actor}");
        let txid = payment.transaction_id.as_deref().unwrap_or("none");
        let entry = NewAuditEntry::new(&order.customer_id, actor, "Payment Validated Successfully")
            .with_system_text(format!(
                "Validated payment of {} for order {order_id}. Payment ID: {payment_id}. Transaction ID: {txid}",
                payment.amount
            ))
            .with_user_text("Payment has been validated successfully.");
        self.gatekeeper.record(entry).await;
        if *fully_paid {
            if let Err(e) = self.notifier.send_order_status_email(OrderStatusEmail::for_order(order)).await {
                self.gatekeeper.record_notification_failure(actor, order, "Order", &e).await;
            }
        } else {
            let email = PaymentStatusEmail::for_order(order, payment.amount, PaymentEmailStatus::Verified);
            self.send_payment_email(actor, order, email).await;
        }
        self.producers.publish_cache_invalidation(CacheInvalidationEvent::for_payment_change(order_id)).await;
        if *fully_paid {
            self.producers.publish_order_paid(OrderPaidEvent::new(order.clone())).await;
        }
        Ok(result)
    }

    /// Moves a pending payment to `DECLINED`. The order's payment and fulfillment status are left as they are.
    pub async fn reject_payment(
        &self,
        actor: &UserId,
        order_id: OrderId,
        payment_id: PaymentId,
        reason: &str,
    ) -> Result<PaymentDeclined, LedgerError> {
        let subject = format!("payment {payment_id} on order {order_id}");
        let result = self
            .gatekeeper
            .authorized(
                actor,
                LedgerOperation::RejectPayment,
                subject,
                self.db.decline_payment(actor, order_id, payment_id, reason),
            )
            .await?;
        let PaymentDeclined { order, payment } = &result;
        info!("💰️ Payment {payment_id} on order {order_id} rejected by {actor}");
        let entry = NewAuditEntry::new(&order.customer_id, actor, "Payment Rejected")
            .with_system_text(format!(
                "Rejected payment for order {order_id}. Payment ID: {payment_id}. Reason: {reason}"
            ))
            .with_user_text(format!("Payment has been rejected. Reason: {reason}"));
        self.gatekeeper.record(entry).await;
        let email = PaymentStatusEmail::for_order(order, payment.amount, PaymentEmailStatus::Declined);
        self.send_payment_email(actor, order, email).await;
        self.producers.publish_cache_invalidation(CacheInvalidationEvent::for_payment_change(order_id)).await;
        Ok(result)
    }

    pub async fn payment_by_id(&self, actor: &UserId, payment_id: PaymentId) -> Result<Option<Payment>, LedgerError> {
        self.gatekeeper
            .authorized(actor, LedgerOperation::ReadPayments, format!("payment {payment_id}"), self.db.fetch_payment(payment_id))
            .await
    }

    pub async fn payments_for_order(&self, actor: &UserId, order_id: OrderId) -> Result<Vec<Payment>, LedgerError> {
        self.gatekeeper
            .authorized(
                actor,
                LedgerOperation::ReadPayments,
                format!("order {order_id}"),
                self.db.fetch_payments_for_order(order_id),
            )
            .await
    }

    pub async fn payments_for_customer(&self, actor: &UserId, customer_id: &UserId) -> Result<Vec<Payment>, LedgerError> {
        self.gatekeeper
            .authorized(
                actor,
                LedgerOperation::ReadPayments,
                format!("customer {customer_id}"),
                self.db.fetch_payments_for_customer(customer_id),
            )
            .await
    }

    /// Totals for an order, computed from its payments at the time of the call.
    pub async fn order_ledger_summary(&self, actor: &UserId, order_id: OrderId) -> Result<OrderLedgerSummary, LedgerError> {
        self.gatekeeper
            .authorized(actor, LedgerOperation::ReadPayments, format!("order {order_id}"), async {
                let order = self.db.fetch_order(order_id).await?.ok_or(LedgerError::OrderNotFound(order_id))?;
                let payments = self.db.fetch_payments_for_order(order_id).await?;
                Ok(OrderLedgerSummary::new(&order, &payments))
            })
            .await
    }

    async fn send_payment_email(&self, actor: &UserId, order: &Order, email: PaymentStatusEmail) {
        trace!("📬️ Sending {} payment email for order {}", email.status, order.id);
        if let Err(e) = self.notifier.send_payment_status_email(email).await {
            self.gatekeeper.record_notification_failure(actor, order, "Payment", &e).await;
        }
    }
}
