use std::collections::HashMap;

use cucumber::World;
use log::*;
use merch_ledger_engine::{
    db_types::{OrderId, PaymentId, UserId},
    test_utils::{
        mocks::RecordingNotifier,
        prepare_env::{create_database, random_db_path, run_migrations},
    },
    traits::Capability,
    FulfillmentApi,
    Gatekeeper,
    LedgerError,
    PaymentLedgerApi,
    SqliteDatabase,
};

pub type Payments = PaymentLedgerApi<SqliteDatabase, SqliteDatabase, SqliteDatabase, RecordingNotifier>;
pub type Fulfillment = FulfillmentApi<SqliteDatabase, SqliteDatabase, SqliteDatabase, RecordingNotifier>;

pub const STAFF: &str = "staff";

#[derive(Default, Debug, World)]
pub struct LedgerWorld {
    pub system: Option<LedgerSystem>,
    /// Orders and payments are referred to by name in the feature files
    pub orders: HashMap<String, OrderId>,
    pub payments: HashMap<String, PaymentId>,
    pub last_error: Option<LedgerError>,
}

#[derive(Debug)]
pub struct LedgerSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub payments: Payments,
    pub fulfillment: Fulfillment,
    pub notifier: RecordingNotifier,
}

impl LedgerWorld {
    pub fn system(&self) -> &LedgerSystem {
        self.system.as_ref().expect("Ledger not initialised")
    }

    pub fn order_id(&self, name: &str) -> OrderId {
        *self.orders.get(name).unwrap_or_else(|| panic!("No order called {name}"))
    }

    pub fn payment_id(&self, name: &str) -> PaymentId {
        *self.payments.get(name).unwrap_or_else(|| panic!("No payment called {name}"))
    }

    pub fn staff(&self) -> UserId {
        UserId::from(STAFF)
    }
}

impl LedgerSystem {
    pub async fn new() -> Self {
        let url = random_db_path();
        create_database(&url).await;
        run_migrations(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
        db.grant_capabilities(&UserId::from(STAFF), &Capability::ALL).await.expect("Error granting capabilities");
        debug!("Created database: {url}");
        let notifier = RecordingNotifier::default();
        let gatekeeper = Gatekeeper::new(db.clone(), db.clone());
        let payments = PaymentLedgerApi::new(db.clone(), gatekeeper.clone(), notifier.clone(), Default::default());
        let fulfillment = FulfillmentApi::new(db.clone(), gatekeeper, notifier.clone(), Default::default());
        Self { db_path: url, db, payments, fulfillment, notifier }
    }
}
