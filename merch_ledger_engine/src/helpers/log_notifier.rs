use log::*;
use serde::Serialize;

use crate::traits::{
    NotificationDispatcher,
    NotificationError,
    OrderConfirmationEmail,
    OrderStatusEmail,
    PaymentStatusEmail,
};

/// A [`NotificationDispatcher`] that writes each email to the log instead of sending it. Useful when no mail relay is
/// configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl LogNotifier {
    fn log_payload<T: Serialize>(kind: &str, recipient: &str, payload: &T) -> Result<(), NotificationError> {
        let body = serde_json::to_string(payload).map_err(|e| NotificationError::RenderFailed(e.to_string()))?;
        info!("📬️ {kind} email for {recipient}");
        trace!("📬️ {body}");
        Ok(())
    }
}

impl NotificationDispatcher for LogNotifier {
    async fn send_payment_status_email(&self, email: PaymentStatusEmail) -> Result<(), NotificationError> {
        Self::log_payload("Payment status", &email.customer_email, &email)
    }

    async fn send_order_status_email(&self, email: OrderStatusEmail) -> Result<(), NotificationError> {
        Self::log_payload("Order status", &email.customer_email, &email)
    }

    async fn send_order_confirmation_email(&self, email: OrderConfirmationEmail) -> Result<(), NotificationError> {
        Self::log_payload("Order confirmation", &email.customer_email, &email)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{db_types::OrderId, traits::PaymentEmailStatus};

    #[tokio::test]
    async fn log_notifier_always_delivers() {
        let email = PaymentStatusEmail {
            order_id: OrderId(12),
            customer_name: "Bea Santos".into(),
            customer_email: "bea@example.com".into(),
            amount: crate::db_types::Money::from_pesos(250),
            status: PaymentEmailStatus::Submitted,
            refund_reason: None,
        };
        assert!(LogNotifier.send_payment_status_email(email).await.is_ok());
    }
}
