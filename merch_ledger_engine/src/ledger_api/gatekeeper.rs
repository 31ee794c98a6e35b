use std::{fmt::Display, future::Future};

use log::*;

use crate::{
    db_types::{NewAuditEntry, Order, UserId},
    traits::{AuditLog, LedgerError, LedgerOperation, NotificationError, PermissionGate},
};

/// The single entry point through which every ledger call passes.
///
/// [`Gatekeeper::authorized`] checks that the actor holds the capabilities the operation requires before the operation
/// is run. Denied attempts and failed mutations are written to the audit log here, so that no API method has to
/// remember to do it.
#[derive(Clone)]
pub struct Gatekeeper<G, A> {
    gate: G,
    audit_log: A,
}

impl<G, A> Gatekeeper<G, A>
where
    G: PermissionGate,
    A: AuditLog,
{
    pub fn new(gate: G, audit_log: A) -> Self {
        Self { gate, audit_log }
    }

    pub fn audit_log(&self) -> &A {
        &self.audit_log
    }

    /// A gate that cannot answer is treated as a denial.
    pub async fn is_allowed(&self, actor: &UserId, operation: LedgerOperation) -> bool {
        match self.gate.check(actor, operation.required_capabilities()).await {
            Ok(allowed) => allowed,
            Err(e) => {
                error!("🔐️ Could not check whether {actor} may {operation}. Denying access. {e}");
                false
            },
        }
    }

    /// Runs `action` on behalf of `actor` if, and only if, the actor may perform `operation`.
    ///
    /// `action` is a future and is not polled until the permission check has passed. `subject` names the order or
    /// payment being acted on, for the audit log.
    pub async fn authorized<T, Fut, S>(
        &self,
        actor: &UserId,
        operation: LedgerOperation,
        subject: S,
        action: Fut,
    ) -> Result<T, LedgerError>
    where
        Fut: Future<Output = Result<T, LedgerError>>,
        S: Display,
    {
        if !self.is_allowed(actor, operation).await {
            warn!("🔐️ {actor} attempted to {operation} ({subject}) without permission");
            let err = LedgerError::Unauthorized { user: actor.clone(), operation };
            let entry = NewAuditEntry::new(actor, actor, failure_reason(operation, &err))
                .with_system_text(format!("Unauthorized attempt by {actor} to {operation} ({subject})"))
                .with_user_text(err.user_message());
            self.record(entry).await;
            return Err(err);
        }
        trace!("🔐️ {actor} may {operation}");
        match action.await {
            Ok(v) => Ok(v),
            Err(err) => {
                if err.is_internal() {
                    error!("🔐️ {actor} could not {operation} ({subject}). {err}");
                } else {
                    debug!("🔐️ {actor} could not {operation} ({subject}). {err}");
                }
                if operation.is_mutation() {
                    let entry = NewAuditEntry::new(actor, actor, failure_reason(operation, &err))
                        .with_system_text(format!("{actor} failed to {operation} ({subject}): {err}"))
                        .with_user_text(err.user_message());
                    self.record(entry).await;
                }
                Err(err)
            },
        }
    }

    /// Appends an entry to the audit log. A failing audit log never undoes a committed change, so errors are only
    /// logged.
    pub async fn record(&self, entry: NewAuditEntry) {
        let reason = entry.reason.clone();
        if let Err(e) = self.audit_log.append(entry).await {
            error!("🔐️ Could not write '{reason}' to the audit log. {e}");
        }
    }

    /// `topic` is "Payment" or "Order", and names the kind of email that failed.
    pub async fn record_notification_failure(&self, actor: &UserId, order: &Order, topic: &str, err: &NotificationError) {
        warn!("📬️ {topic} notification for order {} could not be sent. {err}", order.id);
        let lower = topic.to_lowercase();
        let entry = NewAuditEntry::new(&order.customer_id, actor, format!("{topic} Notification Email Error"))
            .with_system_text(format!("Error sending {lower} notification email for order {}: {err}", order.id))
            .with_user_text(format!("An error occurred while sending the {lower} notification email."));
        self.record(entry).await;
    }
}

/// e.g. "Payment Refund Failed - Payment Not Found"
pub fn failure_reason(operation: LedgerOperation, err: &LedgerError) -> String {
    format!("{} Failed - {}", operation.audit_label(), err.audit_reason())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        db_types::OrderId,
        test_utils::mocks::{MemoryAuditLog, StaticPermissionGate},
        traits::Capability,
    };

    fn gatekeeper(gate: StaticPermissionGate) -> (Gatekeeper<StaticPermissionGate, MemoryAuditLog>, MemoryAuditLog) {
        let log = MemoryAuditLog::default();
        (Gatekeeper::new(gate, log.clone()), log)
    }

    #[tokio::test]
    async fn denied_calls_never_run_the_action() {
        let (gk, log) = gatekeeper(StaticPermissionGate::default());
        let alice = UserId::from("alice");
        let mut ran = false;
        let res: Result<(), LedgerError> = gk
            .authorized(&alice, LedgerOperation::ProcessPayment, "order #1", async {
                ran = true;
                Ok(())
            })
            .await;
        assert!(matches!(res, Err(LedgerError::Unauthorized { .. })));
        assert!(!ran);
        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reason, "Payment Processing Failed - Unauthorized");
        assert_eq!(entries[0].user_text, "You are not authorized to process a payment.");
    }

    #[tokio::test]
    async fn partial_capabilities_are_not_enough() {
        let gate = StaticPermissionGate::default().with_capabilities("bob", &[Capability::PaymentsRead]);
        let (gk, _log) = gatekeeper(gate);
        let bob = UserId::from("bob");
        assert!(!gk.is_allowed(&bob, LedgerOperation::RefundPayment).await);
        assert!(gk.is_allowed(&bob, LedgerOperation::ReadPayments).await);
    }

    #[tokio::test]
    async fn a_broken_gate_denies() {
        let gate = StaticPermissionGate::default().with_capabilities("carol", &Capability::ALL).failing();
        let (gk, log) = gatekeeper(gate);
        let carol = UserId::from("carol");
        let res: Result<u32, LedgerError> =
            gk.authorized(&carol, LedgerOperation::ArchiveOrder, OrderId(3), async { Ok(1) }).await;
        assert!(matches!(res, Err(LedgerError::Unauthorized { .. })));
        assert_eq!(log.entries().len(), 1);
    }

    #[tokio::test]
    async fn failed_mutations_are_audited_but_failed_reads_are_not() {
        let gate = StaticPermissionGate::default().with_capabilities("dave", &Capability::ALL);
        let (gk, log) = gatekeeper(gate);
        let dave = UserId::from("dave");
        let res: Result<(), LedgerError> = gk
            .authorized(&dave, LedgerOperation::ValidatePayment, "order #9", async {
                Err(LedgerError::OrderNotFound(OrderId(9)))
            })
            .await;
        assert!(matches!(res, Err(LedgerError::OrderNotFound(_))));
        let res: Result<(), LedgerError> = gk
            .authorized(&dave, LedgerOperation::ReadOrders, "order #9", async {
                Err(LedgerError::OrderNotFound(OrderId(9)))
            })
            .await;
        assert!(res.is_err());
        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reason, "Payment Validation Failed - Order Not Found");
        assert_eq!(entries[0].user_text, "Order not found.");
    }

    #[tokio::test]
    async fn internal_errors_stay_out_of_user_text() {
        let gate = StaticPermissionGate::default().with_capabilities("erin", &Capability::ALL);
        let (gk, log) = gatekeeper(gate);
        let erin = UserId::from("erin");
        let _ = gk
            .authorized::<(), _, _>(&erin, LedgerOperation::ProcessPayment, "order #2", async {
                Err(LedgerError::PersistenceFailure("disk I/O error at page 77".into()))
            })
            .await;
        let entries = log.entries();
        assert!(entries[0].system_text.contains("disk I/O error"));
        assert!(!entries[0].user_text.contains("disk I/O error"));
    }
}
