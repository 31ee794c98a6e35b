//! Merch Ledger Engine
//!
//! The payment ledger and order-fulfillment state machine for the merchandise store. It records payments against
//! orders, makes sure an order can never be over-paid, derives each order's payment status and fulfillment status from
//! its payments, and handles refunds, payment verification and rejection.
//!
//! The library is divided into these sections:
//! 1. Storage ([`mod@sqlite`]). Every mutation is a single SQLite transaction that takes the write lock first, so
//!    concurrent payments against the same order are serialized. Backends implement [`LedgerDatabase`].
//! 2. The ledger rules ([`mod@ledger_rules`]). Pure functions that decide what a transaction may write.
//! 3. The public API ([`PaymentLedgerApi`] and [`FulfillmentApi`]). Every call is checked against a
//!    [`PermissionGate`], audit-logged through an [`AuditLog`], and followed by best-effort customer emails through a
//!    [`NotificationDispatcher`].
//!
//! The engine also publishes events (order paid, order status changed, cache invalidation hints) that you can
//! subscribe to with [`events::EventHooks`].
pub mod config;
pub mod db_types;
pub mod events;
pub mod helpers;
mod ledger_api;
pub mod ledger_rules;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use config::{ConfigError, LedgerConfig};
pub use ledger_api::{
    fulfillment_api::FulfillmentApi,
    gatekeeper::Gatekeeper,
    ledger_objects,
    payment_ledger_api::PaymentLedgerApi,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{AuditLog, LedgerDatabase, LedgerError, NotificationDispatcher, PermissionGate};
