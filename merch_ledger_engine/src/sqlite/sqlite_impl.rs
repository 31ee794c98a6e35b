//! `SqliteDatabase` is a concrete implementation of a merchandise ledger backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements the [`LedgerDatabase`], [`PermissionGate`] and
//! [`AuditLog`] traits.
//!
//! ## Concurrency
//! Every mutating method opens a transaction whose first statement bumps the target order's `version`. That write
//! takes SQLite's database-wide write lock up front, so two payments against the same order are strictly serialized:
//! the second one reads the first one's row before deciding anything. Connections wait `busy_timeout` for the lock;
//! if SQLite still reports the database as busy, or the final order write finds the version has moved, the whole
//! transaction is run again, up to `max_tx_retries` times.
use std::{fmt::Debug, future::Future, time::Duration};

use log::*;
use rand::Rng;
use sqlx::SqlitePool;

use super::db::{audit, capabilities, new_pool, orders, payments, surveys};
use crate::{
    config::LedgerConfig,
    db_types::{
        AuditLogEntry,
        NewAuditEntry,
        NewOrder,
        NewPayment,
        Order,
        OrderId,
        OrderItem,
        OrderStatusType,
        Payment,
        PaymentId,
        PaymentKind,
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
    ledger_rules,
    traits::{AuditLog, AuditLogError, Capability, LedgerDatabase, LedgerError, PermissionGate, PermissionGateError},
};

const DEFAULT_MAX_TX_RETRIES: u32 = 5;
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const RETRY_BASE_DELAY_MS: u64 = 10;

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
    max_tx_retries: u32,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the default busy timeout and retry settings.
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections, DEFAULT_BUSY_TIMEOUT).await?;
        Ok(Self { url: url.to_string(), pool, max_tx_retries: DEFAULT_MAX_TX_RETRIES })
    }

    pub async fn new_with_config(config: &LedgerConfig) -> Result<Self, sqlx::Error> {
        let pool = new_pool(&config.database_url, config.max_connections, config.busy_timeout).await?;
        Ok(Self { url: config.database_url.clone(), pool, max_tx_retries: config.max_tx_retries.max(1) })
    }

    /// Returns a reference to the database connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&mut self) -> Result<(), sqlx::Error> {
        self.pool.close().await;
        Ok(())
    }

    /// Brings the schema up to date.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Ledger migrations are up to date");
        Ok(())
    }

    pub async fn grant_capabilities(&self, user_id: &UserId, caps: &[Capability]) -> Result<(), PermissionGateError> {
        let mut conn = self.pool.acquire().await?;
        capabilities::grant_capabilities(user_id, caps, &mut conn).await?;
        Ok(())
    }

    pub async fn revoke_capabilities(&self, user_id: &UserId, caps: &[Capability]) -> Result<u64, PermissionGateError> {
        let mut conn = self.pool.acquire().await?;
        let removed = capabilities::revoke_capabilities(user_id, caps, &mut conn).await?;
        Ok(removed)
    }

    /// Runs `op` until it succeeds, fails with something other than a write conflict, or runs out of attempts.
    ///
    /// `op` must open (and commit) its own transaction, so that each attempt starts from a clean slate.
    async fn with_retries<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Err(LedgerError::WriteConflict(reason)) if attempt < self.max_tx_retries => {
                    let jitter = rand::thread_rng().gen_range(0..RETRY_BASE_DELAY_MS);
                    let delay = RETRY_BASE_DELAY_MS * 2u64.pow(attempt.min(8)) + jitter;
                    warn!("🗃️ {label}: attempt {attempt} lost a write race ({reason}). Retrying in {delay}ms");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                },
                Err(LedgerError::WriteConflict(reason)) => {
                    error!("🗃️ {label}: giving up after {attempt} attempts. {reason}");
                    return Err(LedgerError::PersistenceFailure(format!(
                        "{label} could not complete after {attempt} attempts: {reason}"
                    )));
                },
                result => return result,
            }
        }
    }

    async fn insert_order_once(&self, actor: &UserId, order: &NewOrder) -> Result<OrderWithItems, LedgerError> {
        let total_amount = ledger_rules::validate_new_order(order)?;
        let mut tx = self.pool.begin().await?;
        let inserted = orders::insert_order(order, total_amount, actor, &mut tx).await?;
        let items = orders::insert_order_items(inserted.id, &order.items, &mut tx).await?;
        tx.commit().await?;
        Ok(OrderWithItems { order: inserted, items })
    }

    async fn record_payment_once(&self, actor: &UserId, payment: &NewPayment) -> Result<PaymentRecorded, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let order =
            orders::lock_order(payment.order_id, &mut tx).await?.ok_or(LedgerError::OrderNotFound(payment.order_id))?;
        let existing = payments::fetch_payments_for_order(order.id, &mut tx).await?;
        let collected = ledger_rules::collected_total(&existing);
        let total_paid = ledger_rules::check_payment_fits(&order, collected, payment.amount)?;
        let recorded = payments::insert_charge(payment, &order, actor, &mut tx).await?;
        if payment.is_offsite_pending() {
            tx.commit().await?;
            trace!("🗃️ Offsite payment {} is awaiting verification. Order {} is unchanged.", recorded.id, order.id);
            return Ok(PaymentRecorded { order, payment: recorded, fully_paid: false, order_updated: false });
        }
        let settlement = ledger_rules::settle_order(&order, total_paid);
        let order = orders::update_order_state(&order, settlement.payment_status, settlement.status, actor, &mut tx).await?;
        tx.commit().await?;
        Ok(PaymentRecorded { order, payment: recorded, fully_paid: settlement.fully_paid, order_updated: true })
    }

    async fn record_refund_once(&self, actor: &UserId, request: &RefundRequest) -> Result<RefundRecorded, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order_for_payment(request.payment_id, &mut tx)
            .await?
            .ok_or(LedgerError::PaymentNotFound(request.payment_id))?;
        let original = payments::fetch_payment(request.payment_id, &mut tx)
            .await?
            .ok_or(LedgerError::PaymentNotFound(request.payment_id))?;
        let mut all = payments::fetch_payments_for_order(order.id, &mut tx).await?;
        ledger_rules::check_refund(&original, &all, request.amount)?;
        let memo = format!("Refund for payment {}. Reason: {}", original.id.value(), request.reason);
        let refund = payments::insert_refund(&original, request.amount, &memo, actor, &mut tx).await?;
        all.push(refund.clone());
        let payment_status = ledger_rules::payment_status_after_refund(&all);
        // refunds never move the fulfillment status
        let order = orders::update_order_state(&order, payment_status, order.status, actor, &mut tx).await?;
        tx.commit().await?;
        Ok(RefundRecorded { order, original, refund })
    }

    /// Locks the order and loads the payment, checking that the payment is a pending charge on that order.
    async fn lock_pending_payment(
        order_id: OrderId,
        payment_id: PaymentId,
        target: PaymentStatus,
        conn: &mut sqlx::SqliteConnection,
    ) -> Result<(Order, Payment), LedgerError> {
        let order = orders::lock_order(order_id, &mut *conn).await?.ok_or(LedgerError::OrderNotFound(order_id))?;
        let payment =
            payments::fetch_payment(payment_id, &mut *conn).await?.ok_or(LedgerError::PaymentNotFound(payment_id))?;
        if payment.order_id != order.id {
            return Err(LedgerError::PaymentOrderMismatch { payment_id, order_id });
        }
        if payment.kind != PaymentKind::Charge || payment.payment_status != PaymentStatus::Pending {
            return Err(LedgerError::IllegalPaymentTransition { payment_id, from: payment.payment_status, to: target });
        }
        Ok((order, payment))
    }

    async fn verify_payment_once(
        &self,
        actor: &UserId,
        order_id: OrderId,
        payment_id: PaymentId,
        details: &TransactionDetails,
        reject_duplicates: bool,
    ) -> Result<PaymentVerified, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let (order, payment) = Self::lock_pending_payment(order_id, payment_id, PaymentStatus::Verified, &mut tx).await?;
        if reject_duplicates {
            let txid = details.transaction_id.as_deref().or(payment.transaction_id.as_deref());
            if let Some(txid) = txid {
                if let Some(other) = payments::verified_payment_with_txid(txid, payment_id, &mut tx).await? {
                    debug!("🗃️ Transaction id {txid} is already attached to verified payment {other}");
                    return Err(LedgerError::DuplicateTransaction(txid.to_string()));
                }
            }
        }
        let existing = payments::fetch_payments_for_order(order.id, &mut tx).await?;
        let collected = ledger_rules::collected_total(&existing);
        let total_paid = ledger_rules::check_payment_fits(&order, collected, payment.amount)?;
        let memo = payments::append_memo(payment.memo.as_deref(), &format!("Payment validated by {actor}"));
        let payment = payments::mark_verified(payment_id, details, &memo, actor, &mut tx).await?;
        let settlement = ledger_rules::settle_order(&order, total_paid);
        let order = orders::update_order_state(&order, settlement.payment_status, settlement.status, actor, &mut tx).await?;
        tx.commit().await?;
        Ok(PaymentVerified { order, payment, fully_paid: settlement.fully_paid })
    }

    async fn decline_payment_once(
        &self,
        actor: &UserId,
        order_id: OrderId,
        payment_id: PaymentId,
        reason: &str,
    ) -> Result<PaymentDeclined, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let (order, payment) = Self::lock_pending_payment(order_id, payment_id, PaymentStatus::Declined, &mut tx).await?;
        let memo = payments::append_memo(payment.memo.as_deref(), &format!("Payment rejected: {reason}"));
        let payment = payments::mark_declined(payment_id, &memo, actor, &mut tx).await?;
        tx.commit().await?;
        Ok(PaymentDeclined { order, payment })
    }

    async fn update_order_status_once(
        &self,
        actor: &UserId,
        order_id: OrderId,
        new_status: OrderStatusType,
    ) -> Result<OrderStatusChange, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order(order_id, &mut tx).await?.ok_or(LedgerError::OrderNotFound(order_id))?;
        let old_status = order.status;
        ledger_rules::check_transition(old_status, new_status)?;
        let order = orders::update_order_state(&order, order.payment_status, new_status, actor, &mut tx).await?;
        let survey = if new_status == OrderStatusType::Delivered {
            Some(surveys::fetch_or_create_survey(order.id, &mut tx).await?)
        } else {
            None
        };
        tx.commit().await?;
        Ok(OrderStatusChange { old_status, order, survey })
    }

    async fn reverse_payment_once(
        &self,
        actor: &UserId,
        order_id: OrderId,
        payment_id: PaymentId,
        reason: &str,
    ) -> Result<PaymentReversed, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order(order_id, &mut tx).await?.ok_or(LedgerError::OrderNotFound(order_id))?;
        let original =
            payments::fetch_payment(payment_id, &mut tx).await?.ok_or(LedgerError::PaymentNotFound(payment_id))?;
        if original.order_id != order.id {
            return Err(LedgerError::PaymentOrderMismatch { payment_id, order_id });
        }
        let mut all = payments::fetch_payments_for_order(order.id, &mut tx).await?;
        let remainder = ledger_rules::refundable_remainder(&original, &all);
        ledger_rules::check_refund(&original, &all, remainder)?;
        let memo = format!("Payment reversed by {actor}. Reason: {reason}");
        let refund = payments::insert_refund(&original, remainder, &memo, actor, &mut tx).await?;
        all.push(refund.clone());
        let old_status = order.status;
        let payment_status = ledger_rules::payment_status_after_reversal(&all);
        let status = ledger_rules::status_after_reversal(old_status);
        let order = orders::update_order_state(&order, payment_status, status, actor, &mut tx).await?;
        tx.commit().await?;
        Ok(PaymentReversed { old_status, order, original, refund })
    }

    async fn archive_order_once(&self, actor: &UserId, order_id: OrderId) -> Result<Order, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order(order_id, &mut tx).await?.ok_or(LedgerError::OrderNotFound(order_id))?;
        let order = orders::set_archived(&order, actor, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }
}

impl LedgerDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, actor: &UserId, order: NewOrder) -> Result<OrderWithItems, LedgerError> {
        self.with_retries("insert_order", || self.insert_order_once(actor, &order)).await
    }

    async fn fetch_order(&self, order_id: OrderId) -> Result<Option<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let items = orders::fetch_order_items(order_id, &mut conn).await?;
        Ok(items)
    }

    async fn search_orders(&self, filter: OrderQueryFilter) -> Result<Vec<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(filter, &mut conn).await?;
        Ok(orders)
    }

    async fn fetch_payment(&self, payment_id: PaymentId) -> Result<Option<Payment>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let payment = payments::fetch_payment(payment_id, &mut conn).await?;
        Ok(payment)
    }

    async fn fetch_payments_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let payments = payments::fetch_payments_for_order(order_id, &mut conn).await?;
        Ok(payments)
    }

    async fn fetch_payments_for_customer(&self, customer_id: &UserId) -> Result<Vec<Payment>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let payments = payments::fetch_payments_for_customer(customer_id, &mut conn).await?;
        Ok(payments)
    }

    async fn record_payment(&self, actor: &UserId, payment: NewPayment) -> Result<PaymentRecorded, LedgerError> {
        self.with_retries("record_payment", || self.record_payment_once(actor, &payment)).await
    }

    async fn record_refund(&self, actor: &UserId, request: &RefundRequest) -> Result<RefundRecorded, LedgerError> {
        self.with_retries("record_refund", || self.record_refund_once(actor, request)).await
    }

    async fn verify_payment(
        &self,
        actor: &UserId,
        order_id: OrderId,
        payment_id: PaymentId,
        details: &TransactionDetails,
        reject_duplicates: bool,
    ) -> Result<PaymentVerified, LedgerError> {
        self.with_retries("verify_payment", || {
            self.verify_payment_once(actor, order_id, payment_id, details, reject_duplicates)
        })
        .await
    }

    async fn decline_payment(
        &self,
        actor: &UserId,
        order_id: OrderId,
        payment_id: PaymentId,
        reason: &str,
    ) -> Result<PaymentDeclined, LedgerError> {
        self.with_retries("decline_payment", || self.decline_payment_once(actor, order_id, payment_id, reason)).await
    }

    async fn update_order_status(
        &self,
        actor: &UserId,
        order_id: OrderId,
        new_status: OrderStatusType,
    ) -> Result<OrderStatusChange, LedgerError> {
        self.with_retries("update_order_status", || self.update_order_status_once(actor, order_id, new_status)).await
    }

    async fn reverse_payment(
        &self,
        actor: &UserId,
        order_id: OrderId,
        payment_id: PaymentId,
        reason: &str,
    ) -> Result<PaymentReversed, LedgerError> {
        self.with_retries("reverse_payment", || self.reverse_payment_once(actor, order_id, payment_id, reason)).await
    }

    async fn archive_order(&self, actor: &UserId, order_id: OrderId) -> Result<Order, LedgerError> {
        self.with_retries("archive_order", || self.archive_order_once(actor, order_id)).await
    }
}

impl PermissionGate for SqliteDatabase {
    async fn check(&self, user_id: &UserId, required: &[Capability]) -> Result<bool, PermissionGateError> {
        let mut conn = self.pool.acquire().await?;
        let allowed = capabilities::has_capabilities(user_id, required, &mut conn).await?;
        Ok(allowed)
    }
}

impl AuditLog for SqliteDatabase {
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditLogEntry, AuditLogError> {
        let mut conn = self.pool.acquire().await?;
        let entry = audit::insert_audit_entry(entry, &mut conn).await?;
        trace!("🗃️ Audit entry #{} recorded: {}", entry.id, entry.reason);
        Ok(entry)
    }

    async fn entries_for_user(&self, user_id: &UserId) -> Result<Vec<AuditLogEntry>, AuditLogError> {
        let mut conn = self.pool.acquire().await?;
        let entries = audit::entries_for_user(user_id, &mut conn).await?;
        Ok(entries)
    }
}
