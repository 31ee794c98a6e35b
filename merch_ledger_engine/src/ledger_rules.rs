//! The money rules of the ledger.
//!
//! These functions are pure: they take an order and the full set of its payments, as read inside the current
//! transaction, and decide what may be written. Backends call them between reading and writing, so the rules are
//! identical whatever the storage engine.
//!
//! Two totals are used, and they are deliberately different:
//! * the **collected total** (verified charges less refunds) gates new payments and verifications, so an order can
//!   never be over-paid;
//! * the **net total** (sum of every payment amount except declined ones) decides whether an order is fully refunded.
use crate::{
    db_types::{
        Money,
        NewOrder,
        NewPayment,
        Order,
        OrderPaymentStatus,
        OrderStatusType,
        Payment,
        PaymentKind,
        PaymentStatus,
    },
    traits::LedgerError,
};

/// Sum of all verified charges.
pub fn verified_total(payments: &[Payment]) -> Money {
    payments.iter().filter(|p| p.is_verified_charge()).map(|p| p.amount).sum()
}

/// Sum of all refunds, as a positive amount.
pub fn refunded_total(payments: &[Payment]) -> Money {
    -payments.iter().filter(|p| p.is_refund()).map(|p| p.amount).sum::<Money>()
}

/// Money actually held for the order: verified charges less refunds.
pub fn collected_total(payments: &[Payment]) -> Money {
    verified_total(payments) - refunded_total(payments)
}

/// Charges less refunds, over every payment on the order that has not been declined.
pub fn net_total(payments: &[Payment]) -> Money {
    payments.iter().filter(|p| p.payment_status != PaymentStatus::Declined).map(|p| p.amount).sum()
}

/// Checks a new order at checkout and returns its total.
pub fn validate_new_order(order: &NewOrder) -> Result<Money, LedgerError> {
    if order.items.is_empty() {
        return Err(LedgerError::InvalidOrder("An order needs at least one item.".into()));
    }
    if let Some(item) = order.items.iter().find(|i| i.quantity <= 0) {
        return Err(LedgerError::InvalidOrder(format!("Quantity for {} must be at least 1.", item.variant_id)));
    }
    if let Some(item) = order.items.iter().find(|i| i.unit_price.is_negative()) {
        return Err(LedgerError::InvalidOrder(format!("Price for {} cannot be negative.", item.variant_id)));
    }
    if order.discount.is_negative() {
        return Err(LedgerError::InvalidOrder("Discounts cannot be negative.".into()));
    }
    let total =
        order.total_amount().ok_or_else(|| LedgerError::InvalidOrder("The order total is too large.".into()))?;
    if !total.is_positive() {
        return Err(LedgerError::InvalidOrder("The order total must be greater than zero.".into()));
    }
    Ok(total)
}

/// Basic shape checks on a new payment, before anything is read from the database.
pub fn validate_new_payment(payment: &NewPayment) -> Result<(), LedgerError> {
    if !payment.amount.is_positive() {
        return Err(LedgerError::InvalidAmount(payment.amount));
    }
    match payment.payment_status {
        PaymentStatus::Pending | PaymentStatus::Verified => Ok(()),
        status => Err(LedgerError::InvalidPaymentStatus(status)),
    }
}

/// Checks that adding `amount` to the money already collected for `order` does not exceed the order total.
///
/// Returns the candidate total paid.
pub fn check_payment_fits(order: &Order, collected: Money, amount: Money) -> Result<Money, LedgerError> {
    let total_paid = collected.checked_add(amount).ok_or(LedgerError::InvalidAmount(amount))?;
    if total_paid > order.total_amount {
        return Err(LedgerError::AmountExceedsTotal {
            order_id: order.id,
            total_paid,
            total_amount: order.total_amount,
        });
    }
    Ok(total_paid)
}

/// The order state that results from the verified payments reaching `total_paid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub payment_status: OrderPaymentStatus,
    pub status: OrderStatusType,
    pub fully_paid: bool,
}

/// Applies the payment advancement rule: a fully paid order is `PAID`, anything less is a `DOWNPAYMENT`. A fully paid
/// order that is still `PENDING` moves on to `PROCESSING`. Other fulfillment states are left alone.
pub fn settle_order(order: &Order, total_paid: Money) -> Settlement {
    let fully_paid = total_paid == order.total_amount;
    let payment_status = if fully_paid { OrderPaymentStatus::Paid } else { OrderPaymentStatus::Downpayment };
    let status = if fully_paid && order.status == OrderStatusType::Pending {
        OrderStatusType::Processing
    } else {
        order.status
    };
    Settlement { payment_status, status, fully_paid }
}

/// How much of `original` can still be refunded, given the refunds already recorded against it.
pub fn refundable_remainder(original: &Payment, payments: &[Payment]) -> Money {
    let already_refunded: Money =
        payments.iter().filter(|p| p.is_refund() && p.refund_of == Some(original.id)).map(|p| p.amount.abs()).sum();
    original.amount - already_refunded
}

/// Checks a refund of `amount` against `original`.
pub fn check_refund(original: &Payment, payments: &[Payment], amount: Money) -> Result<(), LedgerError> {
    if original.kind != PaymentKind::Charge {
        return Err(LedgerError::InvalidRefundAmount(format!("{} is a refund and cannot itself be refunded", original.id)));
    }
    if original.payment_status != PaymentStatus::Verified {
        return Err(LedgerError::InvalidRefundAmount(format!(
            "{} is {} and has not been collected",
            original.id, original.payment_status
        )));
    }
    if !amount.is_positive() {
        return Err(LedgerError::InvalidRefundAmount(format!("Refund amount must be positive, got {amount}")));
    }
    let remainder = refundable_remainder(original, payments);
    if amount > remainder {
        return Err(LedgerError::InvalidRefundAmount(format!(
            "Refund of {amount} exceeds the refundable amount {remainder} of payment {} (original amount {})",
            original.id, original.amount
        )));
    }
    Ok(())
}

/// The payment status of an order after a customer refund, where `payments` includes the new refund row.
pub fn payment_status_after_refund(payments: &[Payment]) -> OrderPaymentStatus {
    if net_total(payments) <= Money::ZERO {
        OrderPaymentStatus::Refunded
    } else {
        OrderPaymentStatus::Downpayment
    }
}

/// The payment status of an order after an admin reversal, where `payments` includes the new refund row.
pub fn payment_status_after_reversal(payments: &[Payment]) -> OrderPaymentStatus {
    if collected_total(payments) <= Money::ZERO {
        OrderPaymentStatus::Pending
    } else {
        OrderPaymentStatus::Downpayment
    }
}

/// Orders that were ready or delivered go back to processing when their payment is reversed.
pub fn status_after_reversal(status: OrderStatusType) -> OrderStatusType {
    match status {
        OrderStatusType::Ready | OrderStatusType::Delivered => OrderStatusType::Processing,
        other => other,
    }
}

/// Checks a manual fulfillment transition.
///
/// | From \ To   | PENDING | PROCESSING | READY | DELIVERED | CANCELLED |
/// |-------------|---------|------------|-------|-----------|-----------|
/// | PENDING     | no-op   | ok         | ok    | ok        | ok        |
/// | PROCESSING  | err     | no-op      | ok    | ok        | ok        |
/// | READY       | err     | err        | no-op | ok        | ok        |
/// | DELIVERED   | err     | err        | err   | no-op     | err       |
/// | CANCELLED   | err     | err        | err   | err       | no-op     |
pub fn check_transition(from: OrderStatusType, to: OrderStatusType) -> Result<(), LedgerError> {
    if from == to {
        return Err(LedgerError::OrderModificationNoOp);
    }
    let allowed = match (from.stage(), to.stage()) {
        _ if from.is_terminal() => false,
        // anything that has not been delivered can be cancelled
        (Some(_), None) => true,
        (Some(f), Some(t)) => t > f,
        _ => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(LedgerError::OrderTransitionForbidden { from, to })
    }
}
