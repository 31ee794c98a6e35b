//! In-memory stand-ins for the ledger's external collaborators.
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicI64, Ordering},
        Arc,
        Mutex,
    },
};

use chrono::Utc;
use log::*;

use crate::{
    db_types::{AuditLogEntry, NewAuditEntry, UserId},
    traits::{
        AuditLog,
        AuditLogError,
        Capability,
        NotificationDispatcher,
        NotificationError,
        OrderConfirmationEmail,
        OrderStatusEmail,
        PaymentStatusEmail,
        PermissionGate,
        PermissionGateError,
    },
};

/// A permission gate with a fixed table of grants.
#[derive(Debug, Clone, Default)]
pub struct StaticPermissionGate {
    grants: HashMap<UserId, HashSet<Capability>>,
    unavailable: bool,
}

impl StaticPermissionGate {
    pub fn with_capabilities<U: Into<UserId>>(mut self, user: U, caps: &[Capability]) -> Self {
        self.grants.entry(user.into()).or_default().extend(caps.iter().copied());
        self
    }

    /// Every check fails, as if the permission store were offline.
    pub fn failing(mut self) -> Self {
        self.unavailable = true;
        self
    }
}

impl PermissionGate for StaticPermissionGate {
    async fn check(&self, user_id: &UserId, required: &[Capability]) -> Result<bool, PermissionGateError> {
        if self.unavailable {
            return Err(PermissionGateError::DatabaseError("permission store is offline".into()));
        }
        let held = self.grants.get(user_id);
        Ok(required.iter().all(|c| held.map(|h| h.contains(c)).unwrap_or(false)))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryAuditLog {
    entries: Arc<Mutex<Vec<AuditLogEntry>>>,
    next_id: Arc<AtomicI64>,
}

impl MemoryAuditLog {
    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.reason).collect()
    }
}

impl AuditLog for MemoryAuditLog {
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditLogEntry, AuditLogError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let entry = AuditLogEntry {
            id,
            user_id: entry.user_id,
            created_by_id: entry.created_by_id,
            reason: entry.reason,
            system_text: entry.system_text,
            user_text: entry.user_text,
            created_at: Utc::now(),
        };
        let mut entries =
            self.entries.lock().map_err(|e| AuditLogError::DatabaseError(format!("audit log poisoned: {e}")))?;
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn entries_for_user(&self, user_id: &UserId) -> Result<Vec<AuditLogEntry>, AuditLogError> {
        Ok(self.entries().into_iter().filter(|e| &e.user_id == user_id).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentEmail {
    PaymentStatus(PaymentStatusEmail),
    OrderStatus(OrderStatusEmail),
    OrderConfirmation(OrderConfirmationEmail),
}

/// Keeps every email it is asked to send. Flip [`RecordingNotifier::set_failing`] to simulate a mail outage; failed
/// sends are not recorded.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<SentEmail>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingNotifier {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn payment_emails(&self) -> Vec<PaymentStatusEmail> {
        self.sent()
            .into_iter()
            .filter_map(|e| match e {
                SentEmail::PaymentStatus(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn order_status_emails(&self) -> Vec<OrderStatusEmail> {
        self.sent()
            .into_iter()
            .filter_map(|e| match e {
                SentEmail::OrderStatus(o) => Some(o),
                _ => None,
            })
            .collect()
    }

    fn deliver(&self, email: SentEmail) -> Result<(), NotificationError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotificationError::DeliveryFailed("SMTP relay refused the connection".into()));
        }
        trace!("📬️ Recording email {email:?}");
        let mut sent = self.sent.lock().map_err(|e| NotificationError::DeliveryFailed(e.to_string()))?;
        sent.push(email);
        Ok(())
    }
}

impl NotificationDispatcher for RecordingNotifier {
    async fn send_payment_status_email(&self, email: PaymentStatusEmail) -> Result<(), NotificationError> {
        self.deliver(SentEmail::PaymentStatus(email))
    }

    async fn send_order_status_email(&self, email: OrderStatusEmail) -> Result<(), NotificationError> {
        self.deliver(SentEmail::OrderStatus(email))
    }

    async fn send_order_confirmation_email(&self, email: OrderConfirmationEmail) -> Result<(), NotificationError> {
        self.deliver(SentEmail::OrderConfirmation(email))
    }
}
