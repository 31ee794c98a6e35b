use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{Money, NewPayment, Order, OrderId, Payment, PaymentId, PaymentKind, PaymentStatus, UserId},
    ledger_objects::TransactionDetails,
    traits::LedgerError,
};

/// Appends a charge to the ledger for `order`. The paying customer is always the order's customer.
pub async fn insert_charge(
    payment: &NewPayment,
    order: &Order,
    actor: &UserId,
    conn: &mut SqliteConnection,
) -> Result<Payment, LedgerError> {
    let payment: Payment = sqlx::query_as(
        r#"
        INSERT INTO payments (
            order_id,
            user_id,
            processed_by_id,
            kind,
            amount,
            payment_status,
            payment_method,
            payment_site,
            transaction_id,
            reference_no,
            memo,
            payment_provider
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING *;
        "#,
    )
    .bind(order.id)
    .bind(&order.customer_id)
    .bind(actor)
    .bind(PaymentKind::Charge)
    .bind(payment.amount)
    .bind(payment.payment_status)
    .bind(payment.payment_method)
    .bind(payment.payment_site)
    .bind(&payment.transaction_id)
    .bind(&payment.reference_no)
    .bind(&payment.memo)
    .bind(&payment.payment_provider)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Payment {} of {} recorded against order {} ({})", payment.id, payment.amount, order.id, payment.payment_status);
    Ok(payment)
}

/// Appends a refund row for `original`. The row carries the negated amount and copies the order, customer, method, site
/// and transaction provenance (transaction id, reference number, provider) of the original charge.
pub async fn insert_refund(
    original: &Payment,
    amount: Money,
    memo: &str,
    actor: &UserId,
    conn: &mut SqliteConnection,
) -> Result<Payment, LedgerError> {
    let refund: Payment = sqlx::query_as(
        r#"
        INSERT INTO payments (
            order_id,
            user_id,
            processed_by_id,
            kind,
            amount,
            payment_status,
            payment_method,
            payment_site,
            transaction_id,
            reference_no,
            memo,
            payment_provider,
            refund_of
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING *;
        "#,
    )
    .bind(original.order_id)
    .bind(&original.user_id)
    .bind(actor)
    .bind(PaymentKind::Refund)
    .bind(-amount)
    .bind(PaymentStatus::Refunded)
    .bind(original.payment_method)
    .bind(original.payment_site)
    .bind(&original.transaction_id)
    .bind(&original.reference_no)
    .bind(memo)
    .bind(&original.payment_provider)
    .bind(original.id)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Refund {} of {} recorded against payment {}", refund.id, refund.amount, original.id);
    Ok(refund)
}

pub async fn fetch_payment(payment_id: PaymentId, conn: &mut SqliteConnection) -> Result<Option<Payment>, sqlx::Error> {
    let payment =
        sqlx::query_as("SELECT * FROM payments WHERE id = $1").bind(payment_id).fetch_optional(conn).await?;
    Ok(payment)
}

pub async fn fetch_payments_for_order(
    order_id: OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<Payment>, sqlx::Error> {
    let payments = sqlx::query_as("SELECT * FROM payments WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(payments)
}

pub async fn fetch_payments_for_customer(
    customer_id: &UserId,
    conn: &mut SqliteConnection,
) -> Result<Vec<Payment>, sqlx::Error> {
    let payments = sqlx::query_as("SELECT * FROM payments WHERE user_id = $1 ORDER BY created_at ASC, id ASC")
        .bind(customer_id)
        .fetch_all(conn)
        .await?;
    Ok(payments)
}

/// Returns the id of a verified payment (other than `exclude`) that already carries `txid`, if there is one.
pub async fn verified_payment_with_txid(
    txid: &str,
    exclude: PaymentId,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentId>, sqlx::Error> {
    let id: Option<(PaymentId,)> = sqlx::query_as(
        "SELECT id FROM payments WHERE transaction_id = $1 AND payment_status = 'VERIFIED' AND id <> $2 LIMIT 1",
    )
    .bind(txid)
    .bind(exclude)
    .fetch_optional(conn)
    .await?;
    Ok(id.map(|(id,)| id))
}

/// Moves a pending payment to `VERIFIED`, attaching the transaction details and replacing the memo.
///
/// The `payment_status = 'PENDING'` guard makes the status change a compare-and-set.
pub async fn mark_verified(
    payment_id: PaymentId,
    details: &TransactionDetails,
    memo: &str,
    actor: &UserId,
    conn: &mut SqliteConnection,
) -> Result<Payment, LedgerError> {
    let updated: Option<Payment> = sqlx::query_as(
        r#"
        UPDATE payments SET
            payment_status = 'VERIFIED',
            transaction_id = COALESCE($1, transaction_id),
            reference_no = COALESCE($2, reference_no),
            payment_provider = COALESCE($3, payment_provider),
            processed_by_id = $4,
            memo = $5,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $6 AND payment_status = 'PENDING'
        RETURNING *
        "#,
    )
    .bind(&details.transaction_id)
    .bind(&details.reference_no)
    .bind(&details.payment_provider)
    .bind(actor)
    .bind(memo)
    .bind(payment_id)
    .fetch_optional(conn)
    .await?;
    trace!("🗃️ Payment {payment_id} verification write: {}", updated.is_some());
    updated.ok_or_else(|| LedgerError::WriteConflict(format!("Payment {payment_id} is no longer pending")))
}

/// Moves a pending payment to `DECLINED`, replacing the memo.
pub async fn mark_declined(
    payment_id: PaymentId,
    memo: &str,
    actor: &UserId,
    conn: &mut SqliteConnection,
) -> Result<Payment, LedgerError> {
    let updated: Option<Payment> = sqlx::query_as(
        r#"
        UPDATE payments SET
            payment_status = 'DECLINED',
            processed_by_id = $1,
            memo = $2,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $3 AND payment_status = 'PENDING'
        RETURNING *
        "#,
    )
    .bind(actor)
    .bind(memo)
    .bind(payment_id)
    .fetch_optional(conn)
    .await?;
    trace!("🗃️ Payment {payment_id} rejection write: {}", updated.is_some());
    updated.ok_or_else(|| LedgerError::WriteConflict(format!("Payment {payment_id} is no longer pending")))
}

/// Appends a line to an existing memo, pipe-separated.
pub fn append_memo(memo: Option<&str>, line: &str) -> String {
    match memo.map(str::trim).filter(|m| !m.is_empty()) {
        Some(existing) => format!("{existing} | {line}"),
        None => line.to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::append_memo;

    #[test]
    fn memo_lines_accumulate() {
        assert_eq!(append_memo(None, "Payment rejected: blurry receipt"), "Payment rejected: blurry receipt");
        assert_eq!(append_memo(Some("  "), "validated"), "validated");
        assert_eq!(append_memo(Some("GCash ref 1234"), "validated"), "GCash ref 1234 | validated");
    }
}
