mod mocks;

use mocks::MockPaymentProvider;
use settlement_engine::{
    checkout_objects::{PaymentIntentResult, Requester},
    db_types::{Money, OrderPaymentStatus, OrderStatusType, PaymentStatus, PayoutStatus, RefundStatus, SplitStatus},
    events::EventProducers,
    settlement::ReconcileStatus,
    test_utils::{
        fixtures::{checkout_request, seed_marketplace, Marketplace},
        prepare_env::{fresh_database, remove_database},
        MockGateway,
        MockOperation,
        MOCK_SIGNATURE,
    },
    traits::{CheckoutRecord, GatewayError, GatewayEvent, GatewayEventKind},
    CatalogManagement,
    ErrorKind,
    OrderFlowApi,
    PaymentIntentApi,
    PayoutApi,
    PayoutManagement,
    SettlementDatabase,
    SettlementError,
    SqliteDatabase,
    WebhookReconciler,
};

struct TestSystem {
    db: SqliteDatabase,
    url: String,
    gateway: MockGateway,
    market: Marketplace,
    orders: OrderFlowApi<SqliteDatabase, MockGateway>,
    intents: PaymentIntentApi<SqliteDatabase, MockGateway>,
    reconciler: WebhookReconciler<SqliteDatabase, MockGateway>,
}

impl TestSystem {
    async fn new() -> Self {
        let (db, url) = fresh_database(5).await;
        let market = seed_marketplace(&db, 10).await;
        let gateway = MockGateway::new();
        let producers = EventProducers::default();
        let orders = OrderFlowApi::new(db.clone(), gateway.clone(), producers.clone());
        let intents = PaymentIntentApi::new(db.clone(), gateway.clone());
        let reconciler = WebhookReconciler::new(db.clone(), gateway.clone(), producers);
        Self { db, url, gateway, market, orders, intents, reconciler }
    }

    async fn checkout(&self) -> CheckoutRecord {
        self.orders.checkout(checkout_request("alice", self.market.standard_cart("alice"))).await.unwrap()
    }

    async fn checkout_and_intent(&self) -> (CheckoutRecord, PaymentIntentResult) {
        let record = self.checkout().await;
        let intent = self.intents.create_payment_intent(record.parent.id, "alice").await.unwrap();
        (record, intent)
    }

    async fn shutdown(self) {
        remove_database(self.db, &self.url).await;
    }
}

fn succeeded(event_id: &str, intent: &str) -> GatewayEvent {
    GatewayEvent::new(event_id, GatewayEventKind::PaymentSucceeded {
        payment_intent_id: intent.into(),
        charge_id: Some("ch_1".into()),
        payment_method: Some("card".into()),
    })
}

fn refunded(event_id: &str, intent: &str, refund_id: &str, amount: i64) -> GatewayEvent {
    GatewayEvent::new(event_id, GatewayEventKind::RefundSucceeded {
        payment_intent_id: intent.into(),
        refund_id: refund_id.into(),
        amount: Money::from(amount),
    })
}

#[tokio::test]
async fn payment_intent_records_splits() {
    let sys = TestSystem::new().await;
    let (record, intent) = sys.checkout_and_intent().await;
    assert!(!intent.reused);
    assert_eq!(intent.amount, Money::from(13_000));
    assert!(intent.client_secret.is_some());

    let payment = sys.db.fetch_payment(intent.payment_id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.splits.len(), 2);
    assert_eq!(payment.splits.iter().map(|s| s.amount).sum::<Money>(), payment.amount);
    assert_eq!(payment.total_commission, Money::from(2_400));
    let split_a = &payment.splits[0];
    assert_eq!(split_a.connected_account_id, "acct_sam");
    assert_eq!(split_a.platform_commission, Money::from(2_200));
    assert_eq!(split_a.seller_payout, Money::from(8_800));
    assert!(payment.splits.iter().all(|s| s.status == SplitStatus::Pending));

    let parent = sys.db.fetch_order(record.parent.id).await.unwrap().unwrap();
    assert_eq!(parent.payment_id, Some(payment.id));
    let subs = sys.db.fetch_sub_orders(record.parent.id).await.unwrap();
    assert!(subs.iter().all(|s| s.payment_id == Some(payment.id)));
    sys.shutdown().await;
}

#[tokio::test]
async fn open_intents_are_reused() {
    let sys = TestSystem::new().await;
    let (record, first) = sys.checkout_and_intent().await;
    let second = sys.intents.create_payment_intent(record.parent.id, "alice").await.unwrap();
    assert!(second.reused);
    assert_eq!(second.payment_intent_id, first.payment_intent_id);
    assert_eq!(sys.gateway.call_count(MockOperation::CreateIntent), 1);
    sys.shutdown().await;
}

#[tokio::test]
async fn intent_preconditions() {
    let sys = TestSystem::new().await;
    let record = sys.checkout().await;
    let err = sys.intents.create_payment_intent(record.parent.id, "bob").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    let err = sys.intents.create_payment_intent(record.sub_orders[0].id, "alice").await.unwrap_err();
    assert!(matches!(err, SettlementError::NotAParentOrder(_)));
    let err = sys.intents.create_payment_intent(12_345, "alice").await.unwrap_err();
    assert!(matches!(err, SettlementError::OrderNotFound(12_345)));
    sys.shutdown().await;
}

#[tokio::test]
async fn unpayable_seller_blocks_the_intent() {
    let sys = TestSystem::new().await;
    let record = sys.checkout().await;
    sys.db.update_payouts_enabled("acct_bea", false).await.unwrap();
    let err = sys.intents.create_payment_intent(record.parent.id, "alice").await.unwrap_err();
    assert!(matches!(err, SettlementError::SellerNotPayable(id) if id == sys.market.shop_b.id));
    assert_eq!(sys.gateway.call_count(MockOperation::CreateIntent), 0);
    assert!(sys.db.fetch_payments_for_order(record.parent.id).await.unwrap().is_empty());
    sys.shutdown().await;
}

#[tokio::test]
async fn gateway_outage_persists_nothing() {
    let sys = TestSystem::new().await;
    let record = sys.checkout().await;
    let order_id = record.parent.id;
    let mut gateway = MockPaymentProvider::new();
    gateway
        .expect_create_payment_intent()
        .withf(move |request| request.order_id == order_id && request.amount == Money::from(13_000))
        .times(1)
        .returning(|_| Err(GatewayError::Unavailable("503".into())));
    let intents = PaymentIntentApi::new(sys.db.clone(), gateway);
    let err = intents.create_payment_intent(record.parent.id, "alice").await.unwrap_err();
    assert!(matches!(err, SettlementError::GatewayUnavailable(_)));
    assert!(err.is_retryable());
    assert!(sys.db.fetch_payments_for_order(record.parent.id).await.unwrap().is_empty());

    // Retrying once the gateway is back creates the intent
    let intent = sys.intents.create_payment_intent(record.parent.id, "alice").await.unwrap();
    assert!(!intent.reused);
    sys.shutdown().await;
}

#[tokio::test]
async fn failed_intent_that_cannot_be_cancelled_is_not_replaced() {
    let sys = TestSystem::new().await;
    let record = sys.checkout().await;
    let mut gateway = MockPaymentProvider::new();
    gateway.expect_create_payment_intent().times(1).returning(|_| Ok(mocks::intent("pi_first")));
    gateway
        .expect_cancel_payment_intent()
        .withf(|intent_id| intent_id == "pi_first")
        .times(1)
        .returning(|_| Err(GatewayError::Unavailable("timeout".into())));
    let intents = PaymentIntentApi::new(sys.db.clone(), gateway);
    intents.create_payment_intent(record.parent.id, "alice").await.unwrap();
    let failed = GatewayEvent::new("evt_f", GatewayEventKind::PaymentFailed {
        payment_intent_id: "pi_first".into(),
        reason: "declined".into(),
    });
    sys.reconciler.handle_event(failed).await.unwrap();

    let err = intents.create_payment_intent(record.parent.id, "alice").await.unwrap_err();
    assert!(matches!(err, SettlementError::GatewayUnavailable(_)));
    let payments = sys.db.fetch_payments_for_order(record.parent.id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Failed);
    sys.shutdown().await;
}

#[tokio::test]
async fn payment_success_marks_every_order_paid_once() {
    let sys = TestSystem::new().await;
    let (record, intent) = sys.checkout_and_intent().await;
    let event = succeeded("evt_1", &intent.payment_intent_id);

    let outcome = sys.reconciler.handle_event(event.clone()).await.unwrap();
    assert_eq!(outcome.status, ReconcileStatus::Applied);
    let payment = outcome.payment.unwrap();
    assert_eq!(payment.status, PaymentStatus::Succeeded);
    assert!(payment.paid_at.is_some());
    assert_eq!(payment.charge_id.as_deref(), Some("ch_1"));
    assert!(payment.splits.iter().all(|s| s.status == SplitStatus::Paid));
    for order in sys.db.fetch_checkout(record.parent.id).await.unwrap().unwrap().all_orders() {
        assert_eq!(order.status, OrderStatusType::Paid);
        assert_eq!(order.payment_status, OrderPaymentStatus::Paid);
    }
    let payouts = sys.db.fetch_payouts_for_payment(payment.id).await.unwrap();
    assert_eq!(payouts.len(), 2);

    let outcome = sys.reconciler.handle_event(event).await.unwrap();
    assert_eq!(outcome.status, ReconcileStatus::Duplicate);
    let again = outcome.payment.unwrap();
    assert_eq!(again.version, payment.version);
    assert_eq!(sys.db.fetch_payouts_for_payment(payment.id).await.unwrap().len(), 2);

    // A different delivery of the same news only records its id
    let outcome = sys.reconciler.handle_event(succeeded("evt_2", &intent.payment_intent_id)).await.unwrap();
    assert_eq!(outcome.status, ReconcileStatus::RecordedOnly);
    assert_eq!(outcome.payment.unwrap().webhook_events, vec!["evt_1".to_string(), "evt_2".to_string()]);

    let err = sys.intents.create_payment_intent(record.parent.id, "alice").await.unwrap_err();
    assert!(matches!(err, SettlementError::OrderAlreadyPaid(_)));
    sys.shutdown().await;
}

#[tokio::test]
async fn webhooks_are_authenticated_before_parsing() {
    let sys = TestSystem::new().await;
    let (_, intent) = sys.checkout_and_intent().await;
    let payload = serde_json::to_vec(&succeeded("evt_1", &intent.payment_intent_id)).unwrap();

    let err = sys.reconciler.handle_webhook(&payload, "t=1,v1=forged").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authenticity);
    let payment = sys.db.fetch_payment(intent.payment_id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);

    let err = sys.reconciler.handle_webhook(b"{not json", MOCK_SIGNATURE).await.unwrap_err();
    assert!(matches!(err, SettlementError::MalformedEvent(_)));

    let outcome = sys.reconciler.handle_webhook(&payload, MOCK_SIGNATURE).await.unwrap();
    assert_eq!(outcome.status, ReconcileStatus::Applied);
    sys.shutdown().await;
}

#[tokio::test]
async fn unknown_payments_and_event_types() {
    let sys = TestSystem::new().await;
    let err = sys.reconciler.handle_event(succeeded("evt_x", "pi_unknown")).await.unwrap_err();
    assert!(matches!(err, SettlementError::PaymentNotFound(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let event = GatewayEvent::new("evt_y", GatewayEventKind::Unhandled { event_type: "customer.created".into() });
    let outcome = sys.reconciler.handle_event(event).await.unwrap();
    assert_eq!(outcome.status, ReconcileStatus::Ignored);
    assert!(outcome.payment.is_none());
    sys.shutdown().await;
}

#[tokio::test]
async fn refund_before_success_is_rejected() {
    let sys = TestSystem::new().await;
    let (record, intent) = sys.checkout_and_intent().await;
    let before = sys.db.fetch_payment(intent.payment_id).await.unwrap().unwrap();

    let err = sys.reconciler.handle_event(refunded("evt_r", &intent.payment_intent_id, "re_1", 1_000)).await.unwrap_err();
    assert!(matches!(err, SettlementError::InvalidEventSequence(_)));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let after = sys.db.fetch_payment(intent.payment_id).await.unwrap().unwrap();
    assert_eq!(after, before);
    let parent = sys.db.fetch_order(record.parent.id).await.unwrap().unwrap();
    assert_eq!(parent.status, OrderStatusType::PendingPayment);

    // Once the success arrives, the redelivered refund goes through
    sys.reconciler.handle_event(succeeded("evt_s", &intent.payment_intent_id)).await.unwrap();
    let outcome = sys.reconciler.handle_event(refunded("evt_r", &intent.payment_intent_id, "re_1", 1_000)).await.unwrap();
    assert_eq!(outcome.status, ReconcileStatus::Applied);
    sys.shutdown().await;
}

#[tokio::test]
async fn partial_then_full_refund() {
    let sys = TestSystem::new().await;
    let (record, intent) = sys.checkout_and_intent().await;
    let pi = intent.payment_intent_id.as_str();
    sys.reconciler.handle_event(succeeded("evt_1", pi)).await.unwrap();

    let outcome = sys.reconciler.handle_event(refunded("evt_2", pi, "re_1", 4_000)).await.unwrap();
    let payment = outcome.payment.unwrap();
    assert_eq!(payment.status, PaymentStatus::Succeeded);
    assert_eq!(payment.refunded_amount, Money::from(4_000));
    assert_eq!(payment.refunds.len(), 1);
    assert_eq!(payment.refunds[0].status, RefundStatus::Succeeded);
    let parent = sys.db.fetch_order(record.parent.id).await.unwrap().unwrap();
    assert_eq!(parent.status, OrderStatusType::Paid);
    assert_eq!(parent.payment_status, OrderPaymentStatus::PartiallyRefunded);

    // The same refund under a new event id is not counted twice
    let outcome = sys.reconciler.handle_event(refunded("evt_3", pi, "re_1", 4_000)).await.unwrap();
    assert_eq!(outcome.status, ReconcileStatus::RecordedOnly);
    assert_eq!(outcome.payment.unwrap().refunded_amount, Money::from(4_000));

    let err = sys.reconciler.handle_event(refunded("evt_4", pi, "re_2", 9_001)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integrity);

    let outcome = sys.reconciler.handle_event(refunded("evt_5", pi, "re_2", 9_000)).await.unwrap();
    let payment = outcome.payment.unwrap();
    assert_eq!(payment.status, PaymentStatus::Refunded);
    assert_eq!(payment.refunded_amount, payment.amount);
    assert!(payment.splits.iter().all(|s| s.status == SplitStatus::Refunded));
    for order in sys.db.fetch_checkout(record.parent.id).await.unwrap().unwrap().all_orders() {
        assert_eq!(order.status, OrderStatusType::Refunded);
        assert_eq!(order.payment_status, OrderPaymentStatus::Refunded);
    }
    let payouts = sys.db.fetch_payouts_for_payment(payment.id).await.unwrap();
    assert!(payouts.iter().all(|p| p.status == PayoutStatus::Cancelled));
    sys.shutdown().await;
}

#[tokio::test]
async fn failed_payments_can_be_retried() {
    let sys = TestSystem::new().await;
    let (record, intent) = sys.checkout_and_intent().await;
    let pi = intent.payment_intent_id.as_str();
    let failed =
        GatewayEvent::new("evt_f", GatewayEventKind::PaymentFailed { payment_intent_id: pi.into(), reason: "declined".into() });

    let outcome = sys.reconciler.handle_event(failed).await.unwrap();
    assert!(outcome.requires_new_payment_method);
    let payment = outcome.payment.unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert_eq!(payment.failure_reason.as_deref(), Some("declined"));
    let parent = sys.db.fetch_order(record.parent.id).await.unwrap().unwrap();
    assert_eq!(parent.status, OrderStatusType::PendingPayment);
    assert_eq!(parent.payment_status, OrderPaymentStatus::Failed);

    let retry = sys.intents.create_payment_intent(record.parent.id, "alice").await.unwrap();
    assert!(!retry.reused);
    assert_ne!(retry.payment_intent_id, intent.payment_intent_id);
    // The failed intent is cancelled before it is replaced
    assert_eq!(sys.gateway.cancelled_intents(), vec![intent.payment_intent_id.clone()]);
    let first = sys.db.fetch_payment(intent.payment_id).await.unwrap().unwrap();
    assert_eq!(first.status, PaymentStatus::Cancelled);
    let parent = sys.db.fetch_order(record.parent.id).await.unwrap().unwrap();
    assert_eq!(parent.payment_id, Some(retry.payment_id));

    let outcome = sys.reconciler.handle_event(succeeded("evt_s", &retry.payment_intent_id)).await.unwrap();
    assert_eq!(outcome.status, ReconcileStatus::Applied);
    let parent = sys.db.fetch_order(record.parent.id).await.unwrap().unwrap();
    assert_eq!(parent.status, OrderStatusType::Paid);
    sys.shutdown().await;
}

#[tokio::test]
async fn late_success_on_a_replaced_intent_is_refunded() {
    let sys = TestSystem::new().await;
    let (record, first) = sys.checkout_and_intent().await;
    let pi_a = first.payment_intent_id.as_str();
    let failed =
        GatewayEvent::new("evt_f", GatewayEventKind::PaymentFailed { payment_intent_id: pi_a.into(), reason: "declined".into() });
    sys.reconciler.handle_event(failed).await.unwrap();
    let retry = sys.intents.create_payment_intent(record.parent.id, "alice").await.unwrap();
    let pi_b = retry.payment_intent_id.as_str();

    // The customer had already been charged on the first intent
    let outcome = sys.reconciler.handle_event(succeeded("evt_sa", pi_a)).await.unwrap();
    assert_eq!(outcome.status, ReconcileStatus::Applied);
    let a = outcome.payment.unwrap();
    assert_eq!(a.status, PaymentStatus::Succeeded);
    assert!(a.splits.iter().all(|s| s.status == SplitStatus::Pending));
    assert_eq!(a.refunds.len(), 1);
    assert_eq!(a.refunds[0].status, RefundStatus::Pending);
    assert_eq!(a.refunds[0].amount, Money::from(13_000));
    assert_eq!(sys.gateway.call_count(MockOperation::Refund), 1);
    assert!(sys.db.fetch_payouts_for_payment(a.id).await.unwrap().is_empty());
    let parent = sys.db.fetch_order(record.parent.id).await.unwrap().unwrap();
    assert_eq!(parent.status, OrderStatusType::PendingPayment);
    assert_eq!(parent.payment_id, Some(retry.payment_id));

    sys.reconciler.handle_event(succeeded("evt_sb", pi_b)).await.unwrap();
    let parent = sys.db.fetch_order(record.parent.id).await.unwrap().unwrap();
    assert_eq!(parent.status, OrderStatusType::Paid);
    let payouts = sys.db.fetch_payouts_for_payment(retry.payment_id).await.unwrap();
    assert_eq!(payouts.len(), 2);
    assert_eq!(payouts.iter().map(|p| p.amount).sum::<Money>(), Money::from(10_600));

    // Neither accrual nor the sweep will pay sellers out of the superseded charge
    let payout_api = PayoutApi::new(sys.db.clone(), sys.gateway.clone(), EventProducers::default());
    let err = payout_api.accrue_payouts_for_payment(a.id).await.unwrap_err();
    assert!(matches!(err, SettlementError::PaymentSuperseded(id) if id == a.id));
    assert_eq!(payout_api.sweep_missing_payouts().await.unwrap(), 0);
    let mut all = sys.db.fetch_payouts_for_shop(sys.market.shop_a.id).await.unwrap();
    all.extend(sys.db.fetch_payouts_for_shop(sys.market.shop_b.id).await.unwrap());
    assert_eq!(all.len(), 2);

    // The refund confirmation settles the first payment and leaves the paid order alone
    let refund_id = a.refunds[0].refund_id.clone();
    let outcome = sys.reconciler.handle_event(refunded("evt_ra", pi_a, &refund_id, 13_000)).await.unwrap();
    assert_eq!(outcome.payment.unwrap().status, PaymentStatus::Refunded);
    let parent = sys.db.fetch_order(record.parent.id).await.unwrap().unwrap();
    assert_eq!(parent.status, OrderStatusType::Paid);
    assert_eq!(parent.payment_status, OrderPaymentStatus::Paid);
    let payouts = sys.db.fetch_payouts_for_payment(retry.payment_id).await.unwrap();
    assert!(payouts.iter().all(|p| p.status == PayoutStatus::Pending));
    sys.shutdown().await;
}

#[tokio::test]
async fn success_after_cancellation_is_refunded() {
    let sys = TestSystem::new().await;
    let (record, intent) = sys.checkout_and_intent().await;
    sys.orders.cancel_order(record.parent.id, &Requester::customer("alice"), "changed my mind").await.unwrap();

    let outcome = sys.reconciler.handle_event(succeeded("evt_s", &intent.payment_intent_id)).await.unwrap();
    let payment = outcome.payment.unwrap();
    assert_eq!(payment.status, PaymentStatus::Succeeded);
    assert_eq!(payment.refunds.len(), 1);
    assert_eq!(sys.gateway.call_count(MockOperation::Refund), 1);
    assert!(sys.db.fetch_payouts_for_payment(payment.id).await.unwrap().is_empty());
    let parent = sys.db.fetch_order(record.parent.id).await.unwrap().unwrap();
    assert_eq!(parent.status, OrderStatusType::Cancelled);
    sys.shutdown().await;
}

#[tokio::test]
async fn failure_after_success_is_ignored() {
    let sys = TestSystem::new().await;
    let (_, intent) = sys.checkout_and_intent().await;
    let pi = intent.payment_intent_id.as_str();
    sys.reconciler.handle_event(succeeded("evt_s", pi)).await.unwrap();
    let failed =
        GatewayEvent::new("evt_f", GatewayEventKind::PaymentFailed { payment_intent_id: pi.into(), reason: "late".into() });
    let outcome = sys.reconciler.handle_event(failed).await.unwrap();
    assert_eq!(outcome.status, ReconcileStatus::RecordedOnly);
    assert_eq!(outcome.payment.unwrap().status, PaymentStatus::Succeeded);
    sys.shutdown().await;
}

#[tokio::test]
async fn cancelling_a_paid_order_requests_a_refund() {
    let sys = TestSystem::new().await;
    let (record, intent) = sys.checkout_and_intent().await;
    let pi = intent.payment_intent_id.as_str();
    sys.reconciler.handle_event(succeeded("evt_s", pi)).await.unwrap();

    let orders =
        sys.orders.cancel_order(record.parent.id, &Requester::customer("alice"), "arrived too late").await.unwrap();
    assert!(orders.iter().all(|o| o.status == OrderStatusType::Cancelled));
    assert_eq!(sys.gateway.call_count(MockOperation::Refund), 1);
    let payment = sys.db.fetch_payment(intent.payment_id).await.unwrap().unwrap();
    assert_eq!(payment.refunds.len(), 1);
    assert_eq!(payment.refunds[0].status, RefundStatus::Pending);
    assert_eq!(payment.refunds[0].amount, Money::from(13_000));
    assert_eq!(payment.refunded_amount, Money::from(0));
    assert_eq!(sys.db.fetch_product(sys.market.lamp.id).await.unwrap().unwrap().stock, 10);
    // The sellers are no longer owed anything
    let payouts = sys.db.fetch_payouts_for_payment(intent.payment_id).await.unwrap();
    assert_eq!(payouts.len(), 2);
    assert!(payouts.iter().all(|p| p.status == PayoutStatus::Cancelled));
    let payout_api = PayoutApi::new(sys.db.clone(), sys.gateway.clone(), EventProducers::default());
    let err = payout_api.process_payout(payouts[0].id).await.unwrap_err();
    assert!(matches!(err, SettlementError::PayoutNotPending(_)));
    assert_eq!(sys.gateway.call_count(MockOperation::Transfer), 0);

    // The gateway confirms the refund. Cancelled orders keep their status.
    let refund_id = payment.refunds[0].refund_id.clone();
    let outcome = sys.reconciler.handle_event(refunded("evt_r", pi, &refund_id, 13_000)).await.unwrap();
    let payment = outcome.payment.unwrap();
    assert_eq!(payment.status, PaymentStatus::Refunded);
    assert_eq!(payment.refunds[0].status, RefundStatus::Succeeded);
    assert_eq!(payment.refunds[0].reason.as_deref(), Some("arrived too late"));
    let parent = sys.db.fetch_order(record.parent.id).await.unwrap().unwrap();
    assert_eq!(parent.status, OrderStatusType::Cancelled);
    assert_eq!(parent.payment_status, OrderPaymentStatus::Refunded);
    sys.shutdown().await;
}

#[tokio::test]
async fn account_updates_toggle_payouts() {
    let sys = TestSystem::new().await;
    let event = GatewayEvent::new("evt_a", GatewayEventKind::AccountUpdated {
        account_id: "acct_bea".into(),
        payouts_enabled: false,
    });
    let outcome = sys.reconciler.handle_event(event).await.unwrap();
    assert_eq!(outcome.status, ReconcileStatus::Applied);
    let shop = sys.db.fetch_shop(sys.market.shop_b.id).await.unwrap().unwrap();
    assert!(!shop.payouts_enabled);
    sys.shutdown().await;
}
