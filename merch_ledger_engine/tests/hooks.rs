use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use log::*;
use merch_ledger_engine::{
    db_types::{OrderStatusType, PaymentId},
    events::{EventHandlers, EventHooks},
    LedgerConfig,
};

use crate::support::{user, TestLedger, ADMIN};

mod support;

#[derive(Default, Clone)]
struct Recorder {
    seen: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    fn push(&self, s: String) {
        self.seen.lock().unwrap().push(s);
    }

    /// Hooks run concurrently, so the order of arrival is not meaningful.
    fn seen(&self) -> Vec<String> {
        let mut seen = self.seen.lock().unwrap().clone();
        seen.sort();
        seen
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hooks_fire_after_commit() {
    let paid = Recorder::default();
    let status = Recorder::default();
    let cache = Recorder::default();
    let mut hooks = EventHooks::default();
    let p = paid.clone();
    hooks.on_order_paid(move |ev| {
        info!("🪝️ Order paid: {}", ev.order.id);
        p.push(ev.order.id.to_string());
        async {}.boxed()
    });
    let s = status.clone();
    hooks.on_order_status_changed(move |ev| {
        s.push(format!("{}->{}", ev.old_status, ev.order.status));
        async {}.boxed()
    });
    let c = cache.clone();
    hooks.on_cache_invalidation(move |ev| {
        for key in ev.key_strings() {
            c.push(key);
        }
        async {}.boxed()
    });

    let config = LedgerConfig::default();
    let handlers = EventHandlers::new(config.event_buffer_size, hooks);
    let producers = handlers.producers();
    let tasks = handlers.start_handlers();
    let ledger = TestLedger::with_config(config, producers).await;

    let order = ledger.order_for(500).await;
    let half = ledger.pay(order.id, 250).await;
    let rest = ledger.pay(order.id, 250).await;
    assert!(rest.fully_paid);
    let admin = user(ADMIN);
    ledger.fulfillment.update_order_status(&admin, order.id, OrderStatusType::Ready).await.unwrap();
    ledger.fulfillment.reverse_payment(&admin, order.id, half.payment.id, "Customer changed their mind").await.unwrap();
    // a failed call publishes nothing
    assert!(ledger.fulfillment.reverse_payment(&admin, order.id, PaymentId(777), "Nope").await.is_err());

    ledger.tear_down().await;
    for task in tasks {
        task.await.unwrap();
    }

    let id = order.id.to_string();
    assert_eq!(paid.seen(), vec![id.clone()]);
    // the move to PROCESSING on full payment is reported as an order-paid event
    assert_eq!(status.seen(), vec!["PROCESSING->READY".to_string(), "READY->PROCESSING".to_string()]);
    let cache = cache.seen();
    let order_key = format!("order:{}", order.id.value());
    // checkout, two payments, a status change and a reversal
    assert_eq!(cache.iter().filter(|k| *k == "orders:list").count(), 5);
    assert_eq!(cache.iter().filter(|k| **k == order_key).count(), 4);
    assert_eq!(cache.iter().filter(|k| k.starts_with("payments:order:")).count(), 3);
}
