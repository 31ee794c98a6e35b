//! SQLite backend for the merchandise ledger.
//!
//! [`SqliteDatabase`] implements [`crate::traits::LedgerDatabase`], [`crate::traits::PermissionGate`] and
//! [`crate::traits::AuditLog`] on top of a single connection pool.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
