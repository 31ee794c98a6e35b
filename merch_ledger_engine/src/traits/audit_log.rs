use thiserror::Error;

use crate::db_types::{AuditLogEntry, NewAuditEntry, UserId};

#[derive(Debug, Clone, Error)]
pub enum AuditLogError {
    #[error("Could not write to the audit log: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for AuditLogError {
    fn from(e: sqlx::Error) -> Self {
        AuditLogError::DatabaseError(e.to_string())
    }
}

/// An append-only log of who did what. Each entry carries an operator-facing and a customer-facing description.
#[allow(async_fn_in_trait)]
pub trait AuditLog {
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditLogEntry, AuditLogError>;

    /// Entries about the given user, oldest first.
    async fn entries_for_user(&self, user_id: &UserId) -> Result<Vec<AuditLogEntry>, AuditLogError>;
}
