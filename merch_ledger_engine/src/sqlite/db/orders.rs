use log::{debug, trace};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    db_types::{
        Money,
        NewOrder,
        NewOrderItem,
        Order,
        OrderId,
        OrderItem,
        OrderPaymentStatus,
        OrderStatusType,
        PaymentId,
        UserId,
    },
    ledger_objects::OrderQueryFilter,
    traits::LedgerError,
};

/// `CURRENT_TIMESTAMP` renders timestamps like this, so range filters must be bound in the same format.
const SQLITE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Inserts a new order. This is not atomic. Embed the call inside a transaction, together with
/// [`insert_order_items`], and pass `&mut *tx` as the connection argument.
pub async fn insert_order(
    order: &NewOrder,
    total_amount: Money,
    actor: &UserId,
    conn: &mut SqliteConnection,
) -> Result<Order, LedgerError> {
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                customer_id,
                customer_name,
                customer_email,
                processed_by_id,
                total_amount,
                customer_notes
            ) VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(&order.customer_id)
    .bind(&order.customer_name)
    .bind(&order.customer_email)
    .bind(actor)
    .bind(total_amount)
    .bind(&order.customer_notes)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Order {} inserted for customer {} with total {}", order.id, order.customer_id, order.total_amount);
    Ok(order)
}

pub async fn insert_order_items(
    order_id: OrderId,
    items: &[NewOrderItem],
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderItem>, LedgerError> {
    let mut result = Vec::with_capacity(items.len());
    for item in items {
        let row: OrderItem = sqlx::query_as(
            "INSERT INTO order_items (order_id, variant_id, quantity, unit_price) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(order_id)
        .bind(&item.variant_id)
        .bind(item.quantity)
        .bind(item.unit_price)
        .fetch_one(&mut *conn)
        .await?;
        result.push(row);
    }
    trace!("🗃️ {} line items saved for order {order_id}", result.len());
    Ok(result)
}

pub async fn fetch_order(order_id: OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(order_id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_items(order_id: OrderId, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, sqlx::Error> {
    let items =
        sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id").bind(order_id).fetch_all(conn).await?;
    Ok(items)
}

/// Takes the write lock on the order and returns the freshly locked row.
///
/// This must be the first statement of every transaction that mutates an order or its payments. Bumping `version`
/// is a write, so SQLite grants the transaction its write lock *before* anything is read, and concurrent mutations of
/// the same order are serialized. Archived orders are treated as missing.
pub async fn lock_order(order_id: OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        "UPDATE orders SET version = version + 1 WHERE id = $1 AND is_deleted = 0 RETURNING *",
    )
    .bind(order_id)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// As for [`lock_order`], but locates the order through one of its payments. Archived orders are included, since a
/// refund on an archived order is still legitimate.
pub async fn lock_order_for_payment(
    payment_id: PaymentId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
        UPDATE orders SET version = version + 1
        WHERE id = (SELECT order_id FROM payments WHERE id = $1)
        RETURNING *
        "#,
    )
    .bind(payment_id)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Writes the derived order state. The update only succeeds if `version` still matches the row that was locked at the
/// start of the transaction; otherwise a [`LedgerError::WriteConflict`] is returned and the caller should retry.
pub async fn update_order_state(
    order: &Order,
    payment_status: OrderPaymentStatus,
    status: OrderStatusType,
    actor: &UserId,
    conn: &mut SqliteConnection,
) -> Result<Order, LedgerError> {
    let updated: Option<Order> = sqlx::query_as(
        r#"
        UPDATE orders SET
            payment_status = $1,
            status = $2,
            processed_by_id = $3,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $4 AND version = $5
        RETURNING *
        "#,
    )
    .bind(payment_status)
    .bind(status)
    .bind(actor)
    .bind(order.id)
    .bind(order.version)
    .fetch_optional(conn)
    .await?;
    match updated {
        Some(o) => {
            trace!("🗃️ Order {} is now {}/{} (v{})", o.id, o.payment_status, o.status, o.version);
            Ok(o)
        },
        None => Err(LedgerError::WriteConflict(format!(
            "Order {} changed since version {} was read",
            order.id, order.version
        ))),
    }
}

pub async fn set_archived(order: &Order, actor: &UserId, conn: &mut SqliteConnection) -> Result<Order, LedgerError> {
    let updated: Option<Order> = sqlx::query_as(
        r#"
        UPDATE orders SET is_deleted = 1, processed_by_id = $1, updated_at = CURRENT_TIMESTAMP
        WHERE id = $2 AND version = $3
        RETURNING *
        "#,
    )
    .bind(actor)
    .bind(order.id)
    .bind(order.version)
    .fetch_optional(conn)
    .await?;
    updated.ok_or_else(|| LedgerError::WriteConflict(format!("Order {} changed while being archived", order.id)))
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
///
/// Resulting orders are ordered by `created_at` (then `id`) in ascending order
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM orders WHERE 1=1");
    if !query.include_archived {
        builder.push(" AND is_deleted = 0");
    }
    if let Some(cid) = query.customer_id {
        builder.push(" AND customer_id = ");
        builder.push_bind(cid);
    }
    if let Some(statuses) = query.status.filter(|s| !s.is_empty()) {
        builder.push(" AND status IN (");
        let mut list = builder.separated(", ");
        for status in statuses {
            list.push_bind(status);
        }
        list.push_unseparated(")");
    }
    if let Some(statuses) = query.payment_status.filter(|s| !s.is_empty()) {
        builder.push(" AND payment_status IN (");
        let mut list = builder.separated(", ");
        for status in statuses {
            list.push_bind(status);
        }
        list.push_unseparated(")");
    }
    if let Some(since) = query.since {
        builder.push(" AND created_at >= ");
        builder.push_bind(since.format(SQLITE_TIMESTAMP_FORMAT).to_string());
    }
    if let Some(until) = query.until {
        builder.push(" AND created_at <= ");
        builder.push_bind(until.format(SQLITE_TIMESTAMP_FORMAT).to_string());
    }
    builder.push(" ORDER BY created_at ASC, id ASC");
    match (query.limit, query.offset) {
        (Some(limit), offset) => {
            builder.push(" LIMIT ");
            builder.push_bind(limit);
            builder.push(" OFFSET ");
            builder.push_bind(offset.unwrap_or(0));
        },
        (None, Some(offset)) => {
            builder.push(" LIMIT -1 OFFSET ");
            builder.push_bind(offset);
        },
        (None, None) => {},
    }
    trace!("🗃️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("🗃️ Order search returned {} results", orders.len());
    Ok(orders)
}
