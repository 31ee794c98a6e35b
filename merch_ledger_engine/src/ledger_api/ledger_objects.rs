use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{
        CustomerSurvey,
        Money,
        Order,
        OrderId,
        OrderItem,
        OrderPaymentStatus,
        OrderStatusType,
        Payment,
        PaymentId,
        PaymentKind,
        PaymentStatus,
        UserId,
    },
    ledger_rules,
};

//--------------------------------------     Requests     ---------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    pub payment_id: PaymentId,
    pub amount: Money,
    pub reason: String,
}

impl RefundRequest {
    pub fn new<S: Into<String>>(payment_id: PaymentId, amount: Money, reason: S) -> Self {
        Self { payment_id, amount, reason: reason.into() }
    }
}

/// Provenance details that staff attach to a payment when they verify it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionDetails {
    pub transaction_id: Option<String>,
    pub reference_no: Option<String>,
    pub payment_provider: Option<String>,
}

impl TransactionDetails {
    pub fn new<S: Into<String>>(transaction_id: S) -> Self {
        Self { transaction_id: Some(transaction_id.into()), ..Default::default() }
    }

    pub fn with_reference_no<S: Into<String>>(mut self, reference_no: S) -> Self {
        self.reference_no = Some(reference_no.into());
        self
    }

    pub fn with_provider<S: Into<String>>(mut self, provider: S) -> Self {
        self.payment_provider = Some(provider.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderQueryFilter {
    pub customer_id: Option<UserId>,
    pub status: Option<Vec<OrderStatusType>>,
    pub payment_status: Option<Vec<OrderPaymentStatus>>,
    pub include_archived: bool,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl OrderQueryFilter {
    pub fn with_customer_id<U: Into<UserId>>(mut self, customer_id: U) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn with_payment_status(mut self, status: OrderPaymentStatus) -> Self {
        self.payment_status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn including_archived(mut self) -> Self {
        self.include_archived = true;
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    /// Returns at most `limit` orders, skipping the first `offset`.
    pub fn paginate(mut self, limit: i64, offset: i64) -> Self {
        self.limit = Some(limit.max(0));
        self.offset = Some(offset.max(0));
        self
    }
}

//--------------------------------------     Results     ---------------------------------------------------------

/// The outcome of `process_payment`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecorded {
    /// The order after the payment was applied
    pub order: Order,
    pub payment: Payment,
    /// Verified payments (including this one, if verified) now cover the order total
    pub fully_paid: bool,
    /// False for offsite payments awaiting verification, which leave the order untouched
    pub order_updated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRecorded {
    pub order: Order,
    pub original: Payment,
    pub refund: Payment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentVerified {
    pub order: Order,
    pub payment: Payment,
    pub fully_paid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentDeclined {
    pub order: Order,
    pub payment: Payment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusChange {
    pub old_status: OrderStatusType,
    pub order: Order,
    /// The survey placeholder, when the order has been delivered
    pub survey: Option<CustomerSurvey>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReversed {
    pub old_status: OrderStatusType,
    pub order: Order,
    pub original: Payment,
    pub refund: Payment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// A read-only view of where an order stands financially.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLedgerSummary {
    pub order_id: OrderId,
    pub total_amount: Money,
    /// Sum of verified charges
    pub verified_total: Money,
    /// Sum of charges still awaiting verification
    pub pending_total: Money,
    /// Sum of refunds, as a positive amount
    pub refunded_total: Money,
    /// Verified charges less refunds
    pub net_paid: Money,
    /// What the customer still owes
    pub outstanding: Money,
    pub payment_status: OrderPaymentStatus,
    pub status: OrderStatusType,
    pub payment_count: usize,
}

impl OrderLedgerSummary {
    pub fn new(order: &Order, payments: &[Payment]) -> Self {
        let verified_total = ledger_rules::verified_total(payments);
        let refunded_total = ledger_rules::refunded_total(payments);
        let pending_total = payments
            .iter()
            .filter(|p| p.kind == PaymentKind::Charge && p.payment_status == PaymentStatus::Pending)
            .map(|p| p.amount)
            .sum();
        let net_paid = verified_total - refunded_total;
        let outstanding = if net_paid >= order.total_amount { Money::ZERO } else { order.total_amount - net_paid };
        Self {
            order_id: order.id,
            total_amount: order.total_amount,
            verified_total,
            pending_total,
            refunded_total,
            net_paid,
            outstanding,
            payment_status: order.payment_status,
            status: order.status,
            payment_count: payments.len(),
        }
    }
}
