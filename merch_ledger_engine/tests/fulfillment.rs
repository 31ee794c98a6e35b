use merch_ledger_engine::{
    db_types::{Money, NewOrder, NewOrderItem, OrderPaymentStatus, OrderStatusType, PaymentStatus},
    ledger_objects::OrderQueryFilter,
    LedgerDatabase,
    LedgerError,
};

use crate::support::{user, TestLedger, ADMIN, CASHIER, CUSTOMER};

mod support;

#[tokio::test]
async fn checkout_computes_the_total() {
    let ledger = TestLedger::new().await;
    let order = NewOrder::new(CUSTOMER, "Alice Cruz", "alice@example.com")
        .with_item(NewOrderItem::new("tee-s", 2, Money::from_pesos(450)))
        .with_item(NewOrderItem::new("sticker", 3, Money::from_centavos(2550)))
        .with_discount(Money::from_pesos(100))
        .with_notes("Pick up on Friday");
    let created = ledger.fulfillment.create_order(&user(CUSTOMER), order).await.unwrap();
    assert_eq!(created.order.total_amount, Money::from_centavos(87_650));
    assert_eq!(created.items.len(), 2);
    assert_eq!(created.order.payment_status, OrderPaymentStatus::Pending);
    assert_eq!(created.order.status, OrderStatusType::Pending);
    assert_eq!(ledger.audit_reasons(CUSTOMER).await, vec!["Order Created"]);

    let fetched = ledger.fulfillment.order_by_id(&user(ADMIN), created.order.id).await.unwrap().unwrap();
    assert_eq!(fetched.items, created.items);

    let empty = NewOrder::new(CUSTOMER, "Alice Cruz", "alice@example.com");
    let err = ledger.fulfillment.create_order(&user(CUSTOMER), empty).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidOrder(_)));
    ledger.tear_down().await;
}

#[tokio::test]
async fn orders_move_forward_only() {
    let ledger = TestLedger::new().await;
    let order = ledger.order_for(500).await;
    let admin = user(ADMIN);

    let change = ledger.fulfillment.update_order_status(&admin, order.id, OrderStatusType::Ready).await.unwrap();
    assert_eq!(change.old_status, OrderStatusType::Pending);
    assert_eq!(change.order.status, OrderStatusType::Ready);
    assert!(change.survey.is_none());

    let err = ledger.fulfillment.update_order_status(&admin, order.id, OrderStatusType::Ready).await.unwrap_err();
    assert!(matches!(err, LedgerError::OrderModificationNoOp));
    let err = ledger.fulfillment.update_order_status(&admin, order.id, OrderStatusType::Processing).await.unwrap_err();
    assert!(matches!(err, LedgerError::OrderTransitionForbidden { .. }));

    let delivered = ledger.fulfillment.update_order_status(&admin, order.id, OrderStatusType::Delivered).await.unwrap();
    let survey = delivered.survey.expect("Delivery should open a survey");
    assert_eq!(survey.order_id, order.id);
    let email = ledger.notifier.order_status_emails().pop().unwrap();
    assert_eq!(email.new_status, OrderStatusType::Delivered);
    assert_eq!(email.survey_id, Some(survey.id));

    let err = ledger.fulfillment.update_order_status(&admin, order.id, OrderStatusType::Cancelled).await.unwrap_err();
    assert!(matches!(err, LedgerError::OrderTransitionForbidden { .. }));
    // the cashier may take payments but not move orders
    let other = ledger.order_for(100).await;
    let err = ledger.fulfillment.update_order_status(&user(CASHIER), other.id, OrderStatusType::Cancelled).await.unwrap_err();
    assert!(matches!(err, LedgerError::Unauthorized { .. }));
    let cancelled = ledger.fulfillment.update_order_status(&admin, other.id, OrderStatusType::Cancelled).await.unwrap();
    assert_eq!(cancelled.order.status, OrderStatusType::Cancelled);
    ledger.tear_down().await;
}

#[tokio::test]
async fn reversal_rolls_a_delivered_order_back() {
    let ledger = TestLedger::new().await;
    let admin = user(ADMIN);
    let order = ledger.order_for(1000).await;
    let paid = ledger.pay(order.id, 1000).await;
    ledger.fulfillment.update_order_status(&admin, order.id, OrderStatusType::Delivered).await.unwrap();

    let reversed =
        ledger.fulfillment.reverse_payment(&admin, order.id, paid.payment.id, "Item recalled").await.unwrap();
    assert_eq!(reversed.old_status, OrderStatusType::Delivered);
    assert_eq!(reversed.order.status, OrderStatusType::Processing);
    assert_eq!(reversed.order.payment_status, OrderPaymentStatus::Pending);
    assert_eq!(reversed.refund.amount, Money::from_pesos(-1000));
    assert_eq!(reversed.refund.payment_status, PaymentStatus::Refunded);

    let err = ledger.fulfillment.reverse_payment(&admin, order.id, paid.payment.id, "Again").await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidRefundAmount(_)));

    // the money came back out, so the order can be paid again
    let repaid = ledger.pay(order.id, 1000).await;
    assert_eq!(repaid.order.payment_status, OrderPaymentStatus::Paid);
    assert_eq!(repaid.order.status, OrderStatusType::Processing);
    ledger.tear_down().await;
}

#[tokio::test]
async fn partial_reversal_leaves_a_downpayment() {
    let ledger = TestLedger::new().await;
    let admin = user(ADMIN);
    let order = ledger.order_for(1000).await;
    let first = ledger.pay(order.id, 600).await;
    ledger.pay(order.id, 400).await;
    ledger.fulfillment.update_order_status(&admin, order.id, OrderStatusType::Ready).await.unwrap();
    let reversed = ledger.fulfillment.reverse_payment(&admin, order.id, first.payment.id, "Double charge").await.unwrap();
    assert_eq!(reversed.order.payment_status, OrderPaymentStatus::Downpayment);
    assert_eq!(reversed.order.status, OrderStatusType::Processing);
    assert_eq!(reversed.refund.amount, Money::from_pesos(-600));
    ledger.tear_down().await;
}

#[tokio::test]
async fn archived_orders_take_no_payments() {
    let ledger = TestLedger::new().await;
    let admin = user(ADMIN);
    let keep = ledger.order_for(300).await;
    let archive = ledger.order_for(400).await;
    let archived = ledger.fulfillment.archive_order(&admin, archive.id).await.unwrap();
    assert!(archived.is_deleted);

    let payment = merch_ledger_engine::db_types::NewPayment::new(
        archive.id,
        Money::from_pesos(10),
        merch_ledger_engine::db_types::PaymentMethod::Cash,
        merch_ledger_engine::db_types::PaymentSite::Onsite,
    );
    let err = ledger.payments.process_payment(&user(CASHIER), payment).await.unwrap_err();
    assert!(matches!(err, LedgerError::OrderNotFound(_)));

    let visible = ledger.fulfillment.orders(&admin, OrderQueryFilter::default()).await.unwrap();
    assert_eq!(visible.iter().map(|o| o.id).collect::<Vec<_>>(), vec![keep.id]);
    let all = ledger.fulfillment.orders(&admin, OrderQueryFilter::default().including_archived()).await.unwrap();
    assert_eq!(all.len(), 2);
    // the row is still there
    assert!(ledger.db.fetch_order(archive.id).await.unwrap().is_some());
    ledger.tear_down().await;
}

#[tokio::test]
async fn order_search_filters() {
    let ledger = TestLedger::new().await;
    let admin = user(ADMIN);
    let a = ledger.order_for(100).await;
    let b = ledger.order_for(200).await;
    let c = ledger.order_for(300).await;
    ledger.pay(b.id, 50).await;
    ledger.pay(c.id, 300).await;

    let paid = OrderQueryFilter::default().with_payment_status(OrderPaymentStatus::Paid);
    let res = ledger.fulfillment.orders(&admin, paid).await.unwrap();
    assert_eq!(res.iter().map(|o| o.id).collect::<Vec<_>>(), vec![c.id]);

    let open = OrderQueryFilter::default()
        .with_payment_status(OrderPaymentStatus::Pending)
        .with_payment_status(OrderPaymentStatus::Downpayment);
    let res = ledger.fulfillment.orders(&admin, open).await.unwrap();
    assert_eq!(res.iter().map(|o| o.id).collect::<Vec<_>>(), vec![a.id, b.id]);

    let page = OrderQueryFilter::default().with_customer_id(CUSTOMER).paginate(2, 1);
    let res = ledger.fulfillment.orders(&admin, page).await.unwrap();
    assert_eq!(res.iter().map(|o| o.id).collect::<Vec<_>>(), vec![b.id, c.id]);

    let processing = OrderQueryFilter::default().with_status(OrderStatusType::Processing);
    assert_eq!(ledger.fulfillment.orders(&admin, processing).await.unwrap().len(), 1);
    let nobody = OrderQueryFilter::default().with_customer_id("bob");
    assert!(ledger.fulfillment.orders(&admin, nobody).await.unwrap().is_empty());
    ledger.tear_down().await;
}
