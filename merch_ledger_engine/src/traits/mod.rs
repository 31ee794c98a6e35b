//! # Ledger backend and collaborator contracts
//!
//! * [`LedgerDatabase`] defines the atomic ledger operations a storage backend must provide. Each mutating call is a
//!   single transaction that applies the rules in [`crate::ledger_rules`].
//! * [`PermissionGate`] decides whether a user holds the [`Capability`]s that a [`LedgerOperation`] requires.
//! * [`AuditLog`] records an entry for every attempted mutation, successful or not.
//! * [`NotificationDispatcher`] delivers payment and order status emails to customers.
mod audit_log;
mod ledger_database;
mod notifications;
mod permission_gate;

pub use audit_log::{AuditLog, AuditLogError};
pub use ledger_database::{LedgerDatabase, LedgerError};
pub use notifications::{
    NotificationDispatcher,
    NotificationError,
    OrderConfirmationEmail,
    OrderStatusEmail,
    PaymentEmailStatus,
    PaymentStatusEmail,
};
pub use permission_gate::{Capability, LedgerOperation, PermissionGate, PermissionGateError};
