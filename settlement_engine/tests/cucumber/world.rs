use std::fmt::Debug;

use cucumber::World;
use log::*;
use settlement_engine::{
    checkout_objects::PaymentIntentResult,
    events::EventProducers,
    settlement::reconciler::ReconcileOutcome,
    test_utils::{
        fixtures::{seed_marketplace, Marketplace},
        prepare_env::fresh_database,
        MockGateway,
    },
    traits::CheckoutRecord,
    OrderFlowApi,
    PaymentIntentApi,
    PayoutApi,
    SettlementError,
    SqliteDatabase,
    WebhookReconciler,
};

#[derive(Default, Debug, World)]
pub struct SettlementWorld {
    pub system: Option<SettlementSystem>,
    pub checkout: Option<CheckoutRecord>,
    pub intent: Option<PaymentIntentResult>,
    pub last_outcome: Option<ReconcileOutcome>,
    pub last_error: Option<SettlementError>,
}

impl SettlementWorld {
    pub fn system(&self) -> &SettlementSystem {
        self.system.as_ref().expect("Marketplace not initialised")
    }

    pub fn checkout(&self) -> &CheckoutRecord {
        self.checkout.as_ref().expect("No checkout has been made")
    }

    pub fn intent(&self) -> &PaymentIntentResult {
        self.intent.as_ref().expect("No payment intent has been created")
    }
}

pub struct SettlementSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub gateway: MockGateway,
    pub market: Marketplace,
    pub orders: OrderFlowApi<SqliteDatabase, MockGateway>,
    pub intents: PaymentIntentApi<SqliteDatabase, MockGateway>,
    pub reconciler: WebhookReconciler<SqliteDatabase, MockGateway>,
    pub payouts: PayoutApi<SqliteDatabase, MockGateway>,
}

impl Debug for SettlementSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SettlementSystem ({})", self.db_path)
    }
}

impl SettlementSystem {
    pub async fn new(stock: i64) -> Self {
        let (db, db_path) = fresh_database(5).await;
        debug!("🚀️ Created database: {db_path}");
        let market = seed_marketplace(&db, stock).await;
        let gateway = MockGateway::new();
        let producers = EventProducers::default();
        let orders = OrderFlowApi::new(db.clone(), gateway.clone(), producers.clone());
        let intents = PaymentIntentApi::new(db.clone(), gateway.clone());
        let reconciler = WebhookReconciler::new(db.clone(), gateway.clone(), producers.clone());
        let payouts = PayoutApi::new(db.clone(), gateway.clone(), producers);
        Self { db_path, db, gateway, market, orders, intents, reconciler, payouts }
    }
}
