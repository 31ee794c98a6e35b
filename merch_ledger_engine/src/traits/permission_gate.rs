use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::UserId;

#[derive(Debug, Clone, Error)]
pub enum PermissionGateError {
    #[error("The permission store could not be reached: {0}")]
    DatabaseError(String),
    #[error("Unknown capability: {0}")]
    UnknownCapability(String),
}

impl From<sqlx::Error> for PermissionGateError {
    fn from(e: sqlx::Error) -> Self {
        PermissionGateError::DatabaseError(e.to_string())
    }
}

/// A single permission that a user may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    PaymentsCreate,
    PaymentsRead,
    PaymentsUpdate,
    OrdersCreate,
    OrdersRead,
    OrdersUpdate,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::PaymentsCreate,
        Capability::PaymentsRead,
        Capability::PaymentsUpdate,
        Capability::OrdersCreate,
        Capability::OrdersRead,
        Capability::OrdersUpdate,
    ];

    /// The key under which the capability is stored, e.g. `payments.create`
    pub fn key(&self) -> &'static str {
        match self {
            Capability::PaymentsCreate => "payments.create",
            Capability::PaymentsRead => "payments.read",
            Capability::PaymentsUpdate => "payments.update",
            Capability::OrdersCreate => "orders.create",
            Capability::OrdersRead => "orders.read",
            Capability::OrdersUpdate => "orders.update",
        }
    }
}

impl Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl std::str::FromStr for Capability {
    type Err = PermissionGateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .iter()
            .find(|c| c.key() == s.trim())
            .copied()
            .ok_or_else(|| PermissionGateError::UnknownCapability(s.to_string()))
    }
}

/// Every gated entry point of the ledger. Each operation knows which capabilities it requires and how it is described
/// in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerOperation {
    CreateOrder,
    ProcessPayment,
    RefundPayment,
    ValidatePayment,
    RejectPayment,
    UpdateOrderStatus,
    ReversePayment,
    ArchiveOrder,
    ReadOrders,
    ReadPayments,
}

impl LedgerOperation {
    pub fn required_capabilities(&self) -> &'static [Capability] {
        use Capability::*;
        match self {
            LedgerOperation::CreateOrder => &[OrdersCreate],
            LedgerOperation::ProcessPayment => &[PaymentsCreate],
            LedgerOperation::RefundPayment | LedgerOperation::ValidatePayment | LedgerOperation::RejectPayment => {
                &[PaymentsRead, PaymentsUpdate]
            },
            LedgerOperation::UpdateOrderStatus | LedgerOperation::ArchiveOrder => &[OrdersUpdate],
            LedgerOperation::ReversePayment => &[OrdersUpdate, PaymentsUpdate],
            LedgerOperation::ReadOrders => &[OrdersRead],
            LedgerOperation::ReadPayments => &[PaymentsRead],
        }
    }

    /// The prefix used for audit log reasons, e.g. "Payment Refund" gives "Payment Refund Failed - Not Found".
    pub fn audit_label(&self) -> &'static str {
        match self {
            LedgerOperation::CreateOrder => "Order Creation",
            LedgerOperation::ProcessPayment => "Payment Processing",
            LedgerOperation::RefundPayment => "Payment Refund",
            LedgerOperation::ValidatePayment => "Payment Validation",
            LedgerOperation::RejectPayment => "Payment Rejection",
            LedgerOperation::UpdateOrderStatus => "Order Status Update",
            LedgerOperation::ReversePayment => "Payment Reversal",
            LedgerOperation::ArchiveOrder => "Order Archival",
            LedgerOperation::ReadOrders => "Order Lookup",
            LedgerOperation::ReadPayments => "Payment Lookup",
        }
    }

    /// Read operations are not audited on success or on ordinary failures.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, LedgerOperation::ReadOrders | LedgerOperation::ReadPayments)
    }
}

impl Display for LedgerOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LedgerOperation::CreateOrder => "create an order",
            LedgerOperation::ProcessPayment => "process a payment",
            LedgerOperation::RefundPayment => "refund a payment",
            LedgerOperation::ValidatePayment => "validate a payment",
            LedgerOperation::RejectPayment => "reject a payment",
            LedgerOperation::UpdateOrderStatus => "update an order status",
            LedgerOperation::ReversePayment => "reverse a payment",
            LedgerOperation::ArchiveOrder => "archive an order",
            LedgerOperation::ReadOrders => "read orders",
            LedgerOperation::ReadPayments => "read payments",
        };
        f.write_str(s)
    }
}

/// Decides whether a user may perform an action. The ledger never authenticates users itself.
#[allow(async_fn_in_trait)]
pub trait PermissionGate {
    /// Returns `true` only if the user holds *every* capability in `required`.
    async fn check(&self, user_id: &UserId, required: &[Capability]) -> Result<bool, PermissionGateError>;
}
