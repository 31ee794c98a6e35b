#![allow(dead_code)]
use log::*;
use merch_ledger_engine::{
    db_types::{Money, NewOrder, NewOrderItem, NewPayment, Order, OrderId, PaymentMethod, PaymentSite, UserId},
    events::EventProducers,
    ledger_objects::PaymentRecorded,
    test_utils::{
        mocks::RecordingNotifier,
        prepare_env::{prepare_test_env, random_db_path},
    },
    traits::{AuditLog, Capability},
    FulfillmentApi,
    Gatekeeper,
    LedgerConfig,
    LedgerDatabase,
    PaymentLedgerApi,
    SqliteDatabase,
};
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub type Payments = PaymentLedgerApi<SqliteDatabase, SqliteDatabase, SqliteDatabase, RecordingNotifier>;
pub type Fulfillment = FulfillmentApi<SqliteDatabase, SqliteDatabase, SqliteDatabase, RecordingNotifier>;

pub const ADMIN: &str = "admin";
pub const CASHIER: &str = "cashier";
pub const CUSTOMER: &str = "alice";

/// A fresh SQLite ledger with both APIs wired to it. The database doubles as permission gate and audit log.
pub struct TestLedger {
    pub url: String,
    pub db: SqliteDatabase,
    pub payments: Payments,
    pub fulfillment: Fulfillment,
    pub notifier: RecordingNotifier,
}

impl TestLedger {
    pub async fn new() -> Self {
        Self::with_config(LedgerConfig::default(), EventProducers::default()).await
    }

    pub async fn with_config(config: LedgerConfig, producers: EventProducers) -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let config = LedgerConfig { database_url: url.clone(), ..config };
        let db = SqliteDatabase::new_with_config(&config).await.expect("Error connecting to test database");
        db.grant_capabilities(&UserId::from(ADMIN), &Capability::ALL).await.expect("Error granting capabilities");
        db.grant_capabilities(&UserId::from(CASHIER), &[
            Capability::PaymentsCreate,
            Capability::PaymentsRead,
            Capability::PaymentsUpdate,
        ])
        .await
        .expect("Error granting capabilities");
        db.grant_capabilities(&UserId::from(CUSTOMER), &[Capability::OrdersCreate])
            .await
            .expect("Error granting capabilities");
        let notifier = RecordingNotifier::default();
        let gatekeeper = Gatekeeper::new(db.clone(), db.clone());
        let payments = PaymentLedgerApi::new(db.clone(), gatekeeper.clone(), notifier.clone(), producers.clone())
            .with_config(&config);
        let fulfillment = FulfillmentApi::new(db.clone(), gatekeeper, notifier.clone(), producers);
        debug!("🚀️ Test ledger ready at {url}");
        Self { url, db, payments, fulfillment, notifier }
    }

    /// Checks out a single-item order for the test customer.
    pub async fn order_for(&self, pesos: i64) -> Order {
        let order = NewOrder::new(CUSTOMER, "Alice Cruz", "alice@example.com")
            .with_item(NewOrderItem::new("hoodie-l", 1, Money::from_pesos(pesos)));
        self.fulfillment.create_order(&user(CUSTOMER), order).await.expect("Error creating order").order
    }

    pub async fn pay(&self, order_id: OrderId, pesos: i64) -> PaymentRecorded {
        let payment = NewPayment::new(order_id, Money::from_pesos(pesos), PaymentMethod::Cash, PaymentSite::Onsite);
        self.payments.process_payment(&user(CASHIER), payment).await.expect("Error processing payment")
    }

    pub async fn submit_offsite(&self, order_id: OrderId, pesos: i64) -> PaymentRecorded {
        let payment = NewPayment::new(order_id, Money::from_pesos(pesos), PaymentMethod::Gcash, PaymentSite::Offsite)
            .with_status(merch_ledger_engine::db_types::PaymentStatus::Pending)
            .with_reference_no("GC-REF-001");
        self.payments.process_payment(&user(CASHIER), payment).await.expect("Error submitting payment")
    }

    pub async fn order(&self, order_id: OrderId) -> Order {
        self.db.fetch_order(order_id).await.expect("Error fetching order").expect("Order does not exist")
    }

    pub async fn audit_reasons(&self, user_id: &str) -> Vec<String> {
        self.db
            .entries_for_user(&user(user_id))
            .await
            .expect("Error reading audit log")
            .into_iter()
            .map(|e| e.reason)
            .collect()
    }

    pub async fn tear_down(mut self) {
        if let Err(e) = self.db.close().await {
            error!("🚀️ Failed to close database: {e}");
        }
        if let Err(e) = Sqlite::drop_database(&self.url).await {
            warn!("🚀️ Could not remove test database {}: {e}", self.url);
        }
    }
}

pub fn user(id: &str) -> UserId {
    UserId::from(id)
}
