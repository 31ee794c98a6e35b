use thiserror::Error;

use crate::{
    db_types::{
        Money,
        NewOrder,
        NewPayment,
        Order,
        OrderId,
        OrderItem,
        OrderStatusType,
        Payment,
        PaymentId,
        PaymentStatus,
        UserId,
    },
    ledger_objects::{
        OrderQueryFilter,
        OrderStatusChange,
        OrderWithItems,
        PaymentDeclined,
        PaymentRecorded,
        PaymentReversed,
        PaymentVerified,
        RefundRecorded,
        RefundRequest,
        TransactionDetails,
    },
    traits::LedgerOperation,
};

/// SQLite result codes that mean "another connection holds the lock; try again".
/// SQLITE_BUSY, SQLITE_LOCKED, SQLITE_BUSY_RECOVERY, SQLITE_LOCKED_SHAREDCACHE, SQLITE_BUSY_SNAPSHOT
const RETRYABLE_SQLITE_CODES: [&str; 5] = ["5", "6", "261", "262", "517"];

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("User {user} is not authorized to {operation}")]
    Unauthorized { user: UserId, operation: LedgerOperation },
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Payment {0} does not exist")]
    PaymentNotFound(PaymentId),
    #[error("Payments on order {order_id} would total {total_paid}, which exceeds the order total of {total_amount}")]
    AmountExceedsTotal { order_id: OrderId, total_paid: Money, total_amount: Money },
    #[error("Invalid refund. {0}")]
    InvalidRefundAmount(String),
    #[error("Payment amounts must be positive. Got {0}")]
    InvalidAmount(Money),
    #[error("New payments must be PENDING or VERIFIED. Got {0}")]
    InvalidPaymentStatus(PaymentStatus),
    #[error("Payment {payment_id} cannot move from {from} to {to}")]
    IllegalPaymentTransition { payment_id: PaymentId, from: PaymentStatus, to: PaymentStatus },
    #[error("Payment {payment_id} does not belong to order {order_id}")]
    PaymentOrderMismatch { payment_id: PaymentId, order_id: OrderId },
    #[error("Transaction id {0} has already been used for a verified payment")]
    DuplicateTransaction(String),
    #[error("Invalid order. {0}")]
    InvalidOrder(String),
    #[error("The requested order change would result in a no-op.")]
    OrderModificationNoOp,
    #[error("Orders cannot move from {from} to {to}")]
    OrderTransitionForbidden { from: OrderStatusType, to: OrderStatusType },
    #[error("The order was modified by a concurrent transaction: {0}")]
    WriteConflict(String),
    #[error("Could not read or write the ledger: {0}")]
    PersistenceFailure(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        let retryable = e
            .as_database_error()
            .and_then(|db_err| db_err.code())
            .map(|code| RETRYABLE_SQLITE_CODES.contains(&&*code))
            .unwrap_or(false);
        if retryable {
            LedgerError::WriteConflict(e.to_string())
        } else {
            LedgerError::PersistenceFailure(e.to_string())
        }
    }
}

impl LedgerError {
    /// Text that is safe to show to a customer. Database details are never included.
    pub fn user_message(&self) -> String {
        match self {
            LedgerError::Unauthorized { operation, .. } => format!("You are not authorized to {operation}."),
            LedgerError::OrderNotFound(_) => "Order not found.".into(),
            LedgerError::PaymentNotFound(_) => "Payment not found.".into(),
            LedgerError::AmountExceedsTotal { .. } => "Payment amount exceeds order total.".into(),
            LedgerError::InvalidRefundAmount(_) => "Refund amount cannot exceed the original payment amount.".into(),
            LedgerError::InvalidAmount(_) => "Payment amount must be greater than zero.".into(),
            LedgerError::InvalidPaymentStatus(_) => "New payments must be pending or verified.".into(),
            LedgerError::IllegalPaymentTransition { from, .. } => {
                format!("This payment has already been processed (it is {from}).")
            },
            LedgerError::PaymentOrderMismatch { .. } => "Payment does not belong to this order.".into(),
            LedgerError::DuplicateTransaction(_) => "This transaction has already been processed.".into(),
            LedgerError::InvalidOrder(reason) => reason.clone(),
            LedgerError::OrderModificationNoOp => "The order already has that status.".into(),
            LedgerError::OrderTransitionForbidden { from, to } => format!("An order that is {from} cannot be {to}."),
            LedgerError::WriteConflict(_) | LedgerError::PersistenceFailure(_) => {
                "An error occurred while updating the ledger. Please try again.".into()
            },
        }
    }

    /// The short failure description used in audit log reasons, e.g. "Amount Exceeds Total".
    pub fn audit_reason(&self) -> &'static str {
        match self {
            LedgerError::Unauthorized { .. } => "Unauthorized",
            LedgerError::OrderNotFound(_) => "Order Not Found",
            LedgerError::PaymentNotFound(_) => "Payment Not Found",
            LedgerError::AmountExceedsTotal { .. } => "Amount Exceeds Total",
            LedgerError::InvalidRefundAmount(_) => "Invalid Amount",
            LedgerError::InvalidAmount(_) => "Invalid Amount",
            LedgerError::InvalidPaymentStatus(_) => "Invalid Payment Status",
            LedgerError::IllegalPaymentTransition { .. } => "Payment Already Processed",
            LedgerError::PaymentOrderMismatch { .. } => "Payment Order Mismatch",
            LedgerError::DuplicateTransaction(_) => "Duplicate Transaction",
            LedgerError::InvalidOrder(_) => "Invalid Order",
            LedgerError::OrderModificationNoOp => "No Change",
            LedgerError::OrderTransitionForbidden { .. } => "Transition Forbidden",
            LedgerError::WriteConflict(_) => "Write Conflict",
            LedgerError::PersistenceFailure(_) => "Database Error",
        }
    }

    /// Errors that come from the storage layer rather than from the caller's request.
    pub fn is_internal(&self) -> bool {
        matches!(self, LedgerError::WriteConflict(_) | LedgerError::PersistenceFailure(_))
    }
}

/// This trait defines the atomic ledger operations that a storage backend must provide.
///
/// Every mutating method runs as a single transaction: it locks the order, reads the order and all its payments,
/// applies the rules in [`crate::ledger_rules`], and writes the result. Either everything is written, or nothing is.
/// Authorization, auditing of successful calls, notifications and events are *not* the backend's concern; they are
/// handled by the APIs in [`crate::ledger_api`].
#[allow(async_fn_in_trait)]
pub trait LedgerDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Creates the order and its line items. The order starts out `PENDING` / `PENDING`.
    async fn insert_order(&self, actor: &UserId, order: NewOrder) -> Result<OrderWithItems, LedgerError>;

    /// Fetches the order, including archived orders.
    async fn fetch_order(&self, order_id: OrderId) -> Result<Option<Order>, LedgerError>;

    async fn fetch_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, LedgerError>;

    /// Orders matching the filter, oldest first.
    async fn search_orders(&self, filter: OrderQueryFilter) -> Result<Vec<Order>, LedgerError>;

    async fn fetch_payment(&self, payment_id: PaymentId) -> Result<Option<Payment>, LedgerError>;

    /// All ledger entries for the order (charges and refunds), in the order they were recorded.
    async fn fetch_payments_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>, LedgerError>;

    async fn fetch_payments_for_customer(&self, customer_id: &UserId) -> Result<Vec<Payment>, LedgerError>;

    /// Records a new charge against an order.
    ///
    /// * The sum of the verified payments plus the new amount may not exceed the order total.
    /// * Offsite payments that are still pending are stored, but leave the order untouched.
    /// * Otherwise the order becomes `PAID` (and moves from `PENDING` to `PROCESSING`) when fully paid, or
    ///   `DOWNPAYMENT` when not.
    async fn record_payment(&self, actor: &UserId, payment: NewPayment) -> Result<PaymentRecorded, LedgerError>;

    /// Records a refund row against an earlier charge and re-derives the order's payment status. The order's
    /// fulfillment status is not changed.
    async fn record_refund(&self, actor: &UserId, request: &RefundRequest) -> Result<RefundRecorded, LedgerError>;

    /// Moves a pending charge to `VERIFIED` and advances the order the same way [`Self::record_payment`] does.
    ///
    /// If `reject_duplicates` is set, the transaction id may not already be attached to another verified payment.
    async fn verify_payment(
        &self,
        actor: &UserId,
        order_id: OrderId,
        payment_id: PaymentId,
        details: &TransactionDetails,
        reject_duplicates: bool,
    ) -> Result<PaymentVerified, LedgerError>;

    /// Moves a pending charge to `DECLINED`. The order is not changed.
    async fn decline_payment(
        &self,
        actor: &UserId,
        order_id: OrderId,
        payment_id: PaymentId,
        reason: &str,
    ) -> Result<PaymentDeclined, LedgerError>;

    /// Applies a manual fulfillment transition. Reaching `DELIVERED` creates the customer survey placeholder.
    async fn update_order_status(
        &self,
        actor: &UserId,
        order_id: OrderId,
        new_status: OrderStatusType,
    ) -> Result<OrderStatusChange, LedgerError>;

    /// Refunds whatever remains of a charge, and winds the order back to `PROCESSING` if it was ready or delivered.
    async fn reverse_payment(
        &self,
        actor: &UserId,
        order_id: OrderId,
        payment_id: PaymentId,
        reason: &str,
    ) -> Result<PaymentReversed, LedgerError>;

    /// Sets the soft-delete flag on the order.
    async fn archive_order(&self, actor: &UserId, order_id: OrderId) -> Result<Order, LedgerError>;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn user_messages_hide_database_details() {
        let err = LedgerError::PersistenceFailure("disk I/O error at /var/db/secret.db".into());
        assert!(!err.user_message().contains("secret"));
        assert!(err.is_internal());
        let err = LedgerError::AmountExceedsTotal {
            order_id: OrderId(7),
            total_paid: Money::from_pesos(550),
            total_amount: Money::from_pesos(500),
        };
        assert_eq!(err.user_message(), "Payment amount exceeds order total.");
        assert_eq!(
            err.to_string(),
            "Payments on order #7 would total ₱550.00, which exceeds the order total of ₱500.00"
        );
        assert_eq!(err.audit_reason(), "Amount Exceeds Total");
    }

    #[test]
    fn non_database_errors_are_not_retryable() {
        let err = LedgerError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, LedgerError::PersistenceFailure(_)));
    }
}
