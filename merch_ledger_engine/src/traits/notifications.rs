use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{Money, Order, OrderId, OrderStatusType};

#[derive(Debug, Clone, Error)]
pub enum NotificationError {
    #[error("The notification could not be delivered: {0}")]
    DeliveryFailed(String),
    #[error("The notification could not be rendered: {0}")]
    RenderFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentEmailStatus {
    Submitted,
    Verified,
    Refunded,
    Declined,
}

impl Display for PaymentEmailStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentEmailStatus::Submitted => "submitted",
            PaymentEmailStatus::Verified => "verified",
            PaymentEmailStatus::Refunded => "refunded",
            PaymentEmailStatus::Declined => "declined",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatusEmail {
    pub order_id: OrderId,
    pub customer_name: String,
    pub customer_email: String,
    pub amount: Money,
    pub status: PaymentEmailStatus,
    pub refund_reason: Option<String>,
}

impl PaymentStatusEmail {
    pub fn for_order(order: &Order, amount: Money, status: PaymentEmailStatus) -> Self {
        Self {
            order_id: order.id,
            customer_name: order.customer_name.clone(),
            customer_email: order.customer_email.clone(),
            amount,
            status,
            refund_reason: None,
        }
    }

    pub fn with_refund_reason<S: Into<String>>(mut self, reason: S) -> Self {
        self.refund_reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusEmail {
    pub order_id: OrderId,
    pub customer_name: String,
    pub customer_email: String,
    pub new_status: OrderStatusType,
    /// Set when the order is delivered and a customer survey is waiting
    pub survey_id: Option<i64>,
}

impl OrderStatusEmail {
    pub fn for_order(order: &Order) -> Self {
        Self {
            order_id: order.id,
            customer_name: order.customer_name.clone(),
            customer_email: order.customer_email.clone(),
            new_status: order.status,
            survey_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfirmationEmail {
    pub order_id: OrderId,
    pub customer_name: String,
    pub customer_email: String,
    pub total_amount: Money,
}

impl From<&Order> for OrderConfirmationEmail {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            customer_name: order.customer_name.clone(),
            customer_email: order.customer_email.clone(),
            total_amount: order.total_amount,
        }
    }
}

/// Delivers customer-facing emails. Delivery is best effort: the ledger logs failures and carries on.
#[allow(async_fn_in_trait)]
pub trait NotificationDispatcher {
    async fn send_payment_status_email(&self, email: PaymentStatusEmail) -> Result<(), NotificationError>;

    async fn send_order_status_email(&self, email: OrderStatusEmail) -> Result<(), NotificationError>;

    async fn send_order_confirmation_email(&self, email: OrderConfirmationEmail) -> Result<(), NotificationError>;
}
