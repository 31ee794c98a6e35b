//! The public face of the ledger.
//!
//! Backends implement [`crate::traits::LedgerDatabase`] and do the transactional work. The APIs in this module wrap
//! them with everything that happens around a transaction:
//! * every call goes through the [`gatekeeper::Gatekeeper`], which checks capabilities and audit-logs denials and
//!   failures,
//! * successful calls are audit-logged and trigger best-effort customer emails,
//! * cache invalidation hints and order events are published through [`crate::events::EventProducers`].
//!
//! [`payment_ledger_api::PaymentLedgerApi`] covers payments and refunds. [`fulfillment_api::FulfillmentApi`] covers
//! order creation, fulfillment status, admin reversals and archival.
pub mod fulfillment_api;
pub mod gatekeeper;
pub mod ledger_objects;
pub mod payment_ledger_api;
