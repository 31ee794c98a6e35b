use std::str::FromStr;

use cucumber::{then, when};
use merch_ledger_engine::{
    db_types::{
        Money,
        NewOrder,
        NewOrderItem,
        NewPayment,
        OrderPaymentStatus,
        OrderStatusType,
        PaymentKind,
        PaymentMethod,
        PaymentSite,
        PaymentStatus,
        UserId,
    },
    ledger_objects::{RefundRequest, TransactionDetails},
    traits::{AuditLog, LedgerDatabase, PaymentEmailStatus},
};

use crate::cucumber::LedgerWorld;

fn money(s: &str) -> Money {
    Money::from_str(s).expect("Not a valid amount")
}

#[when(expr = "customer '{word}' checks out order {word} for {word}")]
async fn checkout(world: &mut LedgerWorld, customer: String, name: String, total: String) {
    let order = NewOrder::new(customer.as_str(), "Test Customer", format!("{customer}@example.com"))
        .with_item(NewOrderItem::new("tee-m", 1, money(&total)));
    let created = world.system().fulfillment.create_order(&world.staff(), order).await.expect("Error creating order");
    world.orders.insert(name, created.order.id);
}

#[when(expr = "a verified cash payment {word} of {word} is recorded on order {word}")]
async fn verified_payment(world: &mut LedgerWorld, payment: String, amount: String, order: String) {
    let p = NewPayment::new(world.order_id(&order), money(&amount), PaymentMethod::Cash, PaymentSite::Onsite);
    let recorded = world.system().payments.process_payment(&world.staff(), p).await.expect("Error processing payment");
    world.payments.insert(payment, recorded.payment.id);
}

#[when(expr = "a pending GCash payment {word} of {word} is submitted for order {word}")]
async fn offsite_payment(world: &mut LedgerWorld, payment: String, amount: String, order: String) {
    let p = NewPayment::new(world.order_id(&order), money(&amount), PaymentMethod::Gcash, PaymentSite::Offsite)
        .with_status(PaymentStatus::Pending)
        .with_reference_no(format!("REF-{payment}"));
    let recorded = world.system().payments.process_payment(&world.staff(), p).await.expect("Error submitting payment");
    world.payments.insert(payment, recorded.payment.id);
}

#[when(expr = "a verified cash payment of {word} is attempted on order {word}")]
async fn attempt_payment(world: &mut LedgerWorld, amount: String, order: String) {
    let p = NewPayment::new(world.order_id(&order), money(&amount), PaymentMethod::Cash, PaymentSite::Onsite);
    world.last_error = world.system().payments.process_payment(&world.staff(), p).await.err();
}

#[when(expr = "{word} is refunded from payment {word} because {string}")]
async fn refund(world: &mut LedgerWorld, amount: String, payment: String, reason: String) {
    let request = RefundRequest::new(world.payment_id(&payment), money(&amount), reason);
    world.last_error = world.system().payments.refund_payment(&world.staff(), request).await.err();
}

#[when(expr = "payment {word} on order {word} is validated with transaction id {word}")]
async fn validate(world: &mut LedgerWorld, payment: String, order: String, txid: String) {
    let details = TransactionDetails::new(txid);
    let (order_id, payment_id) = (world.order_id(&order), world.payment_id(&payment));
    world.last_error =
        world.system().payments.validate_payment(&world.staff(), order_id, payment_id, details).await.err();
}

#[when(expr = "payment {word} on order {word} is rejected because {string}")]
async fn reject(world: &mut LedgerWorld, payment: String, order: String, reason: String) {
    let (order_id, payment_id) = (world.order_id(&order), world.payment_id(&payment));
    world.last_error = world.system().payments.reject_payment(&world.staff(), order_id, payment_id, &reason).await.err();
}

#[when(expr = "order {word} is moved to {word}")]
async fn move_order(world: &mut LedgerWorld, order: String, status: String) {
    let status = OrderStatusType::from_str(&status).expect("Not a valid order status");
    let order_id = world.order_id(&order);
    world.last_error = world.system().fulfillment.update_order_status(&world.staff(), order_id, status).await.err();
}

#[when(expr = "payment {word} on order {word} is reversed because {string}")]
async fn reverse(world: &mut LedgerWorld, payment: String, order: String, reason: String) {
    let (order_id, payment_id) = (world.order_id(&order), world.payment_id(&payment));
    world.last_error =
        world.system().fulfillment.reverse_payment(&world.staff(), order_id, payment_id, &reason).await.err();
}

#[then(expr = "order {word} has payment status {word} and status {word}")]
async fn check_order(world: &mut LedgerWorld, order: String, payment_status: String, status: String) {
    let order = world.system().db.fetch_order(world.order_id(&order)).await.unwrap().expect("Order does not exist");
    assert_eq!(order.payment_status, OrderPaymentStatus::from_str(&payment_status).unwrap());
    assert_eq!(order.status, OrderStatusType::from_str(&status).unwrap());
}

#[then(expr = "order {word} has {int} payment row(s)")]
async fn check_row_count(world: &mut LedgerWorld, order: String, count: usize) {
    let payments = world.system().db.fetch_payments_for_order(world.order_id(&order)).await.unwrap();
    assert_eq!(payments.len(), count);
}

#[then(expr = "the last row on order {word} is a refund of {word} for payment {word}")]
async fn check_refund_row(world: &mut LedgerWorld, order: String, amount: String, payment: String) {
    let payments = world.system().db.fetch_payments_for_order(world.order_id(&order)).await.unwrap();
    let last = payments.last().expect("No payments on order");
    assert_eq!(last.kind, PaymentKind::Refund);
    assert_eq!(last.amount, money(&amount));
    assert_eq!(last.refund_of, Some(world.payment_id(&payment)));
}

#[then(expr = "payment {word} is {word}")]
async fn check_payment_status(world: &mut LedgerWorld, payment: String, status: String) {
    let payment = world.system().db.fetch_payment(world.payment_id(&payment)).await.unwrap().expect("No payment");
    assert_eq!(payment.payment_status, PaymentStatus::from_str(&status).unwrap());
}

#[then(expr = "the call succeeds")]
async fn check_success(world: &mut LedgerWorld) {
    if let Some(e) = &world.last_error {
        panic!("Expected success, but got {e}");
    }
}

#[then(expr = "the call fails with {word}")]
async fn check_failure(world: &mut LedgerWorld, variant: String) {
    let err = world.last_error.take().expect("Expected the call to fail");
    let name = format!("{err:?}");
    assert!(name.starts_with(&variant), "Expected {variant}, but got {name}");
}

#[then(expr = "the customer was sent a {word} payment email for {word}")]
async fn check_payment_email(world: &mut LedgerWorld, status: String, amount: String) {
    let status = match status.as_str() {
        "submitted" => PaymentEmailStatus::Submitted,
        "verified" => PaymentEmailStatus::Verified,
        "refunded" => PaymentEmailStatus::Refunded,
        "declined" => PaymentEmailStatus::Declined,
        s => panic!("Unknown email status {s}"),
    };
    let emails = world.system().notifier.payment_emails();
    let last = emails.last().expect("No payment emails were sent");
    assert_eq!(last.status, status);
    assert_eq!(last.amount, money(&amount));
}

#[then(expr = "the audit log for '{word}' ends with {string}")]
async fn check_audit(world: &mut LedgerWorld, user: String, reason: String) {
    let entries = world.system().db.entries_for_user(&UserId::from(user.as_str())).await.unwrap();
    let last = entries.last().expect("Audit log is empty");
    assert_eq!(last.reason, reason);
}
