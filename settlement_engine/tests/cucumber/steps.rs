use std::time::Duration;

use cucumber::{then, when};
use settlement_engine::{
    checkout_objects::{Cart, Requester},
    db_types::{Money, OrderStatusType, PaymentStatus, PayoutStatus},
    test_utils::fixtures::{cart_item, checkout_request},
    traits::{GatewayEvent, GatewayEventKind},
    CatalogManagement,
    PayoutManagement,
    SettlementDatabase,
};

use crate::cucumber::SettlementWorld;

//------------------------------------------------   Checkout   --------------------------------------------------------

#[when(expr = "{word} checks out the standard cart")]
async fn checkout_standard_cart(world: &mut SettlementWorld, customer: String) {
    let cart = world.system().market.standard_cart(&customer);
    checkout(world, &customer, cart).await;
}

#[when(expr = "{word} checks out {int} lamp(s)")]
async fn checkout_lamps(world: &mut SettlementWorld, customer: String, quantity: i64) {
    let cart = Cart::new(customer.as_str()).with_item(cart_item(&world.system().market.lamp, quantity));
    checkout(world, &customer, cart).await;
}

async fn checkout(world: &mut SettlementWorld, customer: &str, cart: Cart) {
    match world.system().orders.checkout(checkout_request(customer, cart)).await {
        Ok(record) => {
            world.checkout = Some(record);
            world.last_error = None;
        },
        Err(e) => world.last_error = Some(e),
    }
}

#[then(expr = "the checkout is split into {int} sub-orders")]
async fn check_sub_orders(world: &mut SettlementWorld, count: usize) {
    assert_eq!(world.checkout().sub_orders.len(), count, "Wrong number of sub-orders");
}

#[then(expr = "the order total is {int} cents")]
async fn check_order_total(world: &mut SettlementWorld, total: i64) {
    let checkout = world.checkout();
    assert_eq!(checkout.parent.total, Money::from(total), "Parent total is incorrect");
    let sum = checkout.sub_orders.iter().map(|o| o.total).sum::<Money>();
    assert_eq!(sum, checkout.parent.total, "Sub-order totals do not add up");
}

#[then(expr = "the request fails with {word}")]
async fn check_failure(world: &mut SettlementWorld, name: String) {
    let err = world.last_error.as_ref().expect("The request did not fail");
    assert!(format!("{err:?}").starts_with(&name), "Expected {name}, got {err:?}");
}

#[then(expr = "there are {int} lamps in stock")]
async fn check_lamp_stock(world: &mut SettlementWorld, stock: i64) {
    let system = world.system();
    let lamp = system.db.fetch_product(system.market.lamp.id).await.expect("Error fetching product").expect("No lamp");
    assert_eq!(lamp.stock, stock, "Lamp stock is incorrect");
}

//------------------------------------------------   Payment    --------------------------------------------------------

#[when(expr = "{word} creates a payment intent")]
async fn create_intent(world: &mut SettlementWorld, customer: String) {
    let order_id = world.checkout().parent.id;
    match world.system().intents.create_payment_intent(order_id, &customer).await {
        Ok(intent) => {
            world.intent = Some(intent);
            world.last_error = None;
        },
        Err(e) => world.last_error = Some(e),
    }
}

#[then(expr = "the payment intent is for {int} cents with an application fee of {int} cents")]
async fn check_intent(world: &mut SettlementWorld, amount: i64, fee: i64) {
    let intent = world.intent();
    assert_eq!(intent.amount, Money::from(amount), "Intent amount is incorrect");
    let payment = fetch_payment(world).await;
    assert_eq!(payment.total_commission, Money::from(fee), "Application fee is incorrect");
}

#[when(expr = "the gateway sends {word} confirming the payment")]
async fn payment_succeeded(world: &mut SettlementWorld, event_id: String) {
    let kind = GatewayEventKind::PaymentSucceeded {
        payment_intent_id: world.intent().payment_intent_id.clone(),
        charge_id: Some(format!("ch_{event_id}")),
        payment_method: Some("card".into()),
    };
    send_event(world, GatewayEvent::new(event_id, kind)).await;
}

#[when(expr = "the gateway sends {word} declining the payment with {string}")]
async fn payment_failed(world: &mut SettlementWorld, event_id: String, reason: String) {
    let kind =
        GatewayEventKind::PaymentFailed { payment_intent_id: world.intent().payment_intent_id.clone(), reason };
    send_event(world, GatewayEvent::new(event_id, kind)).await;
}

#[when(expr = "the gateway sends {word} refunding {int} cents as {word}")]
async fn refund_succeeded(world: &mut SettlementWorld, event_id: String, amount: i64, refund_id: String) {
    let kind = GatewayEventKind::RefundSucceeded {
        payment_intent_id: world.intent().payment_intent_id.clone(),
        refund_id,
        amount: Money::from(amount),
    };
    send_event(world, GatewayEvent::new(event_id, kind)).await;
}

async fn send_event(world: &mut SettlementWorld, event: GatewayEvent) {
    match world.system().reconciler.handle_event(event).await {
        Ok(outcome) => {
            world.last_outcome = Some(outcome);
            world.last_error = None;
        },
        Err(e) => world.last_error = Some(e),
    }
}

#[then(expr = "the webhook outcome is {word}")]
async fn check_outcome(world: &mut SettlementWorld, status: String) {
    let outcome = world.last_outcome.as_ref().expect("No webhook has been handled");
    assert_eq!(format!("{:?}", outcome.status), status, "Webhook outcome is incorrect");
}

#[then(expr = "the payment status is {word}")]
async fn check_payment_status(world: &mut SettlementWorld, status: String) {
    let payment = fetch_payment(world).await;
    assert_eq!(payment.status, PaymentStatus::from(status), "Payment status is incorrect");
}

#[then(expr = "{int} cents of the payment have been refunded")]
async fn check_refunded(world: &mut SettlementWorld, amount: i64) {
    let payment = fetch_payment(world).await;
    assert_eq!(payment.refunded_amount, Money::from(amount), "Refunded amount is incorrect");
}

async fn fetch_payment(world: &SettlementWorld) -> settlement_engine::db_types::Payment {
    let payment_id = world.intent().payment_id;
    world.system().db.fetch_payment(payment_id).await.expect("Error fetching payment").expect("Payment does not exist")
}

//------------------------------------------------   Orders     --------------------------------------------------------

#[then(expr = "the order status is {word}")]
async fn check_order_status(world: &mut SettlementWorld, status: String) {
    let order_id = world.checkout().parent.id;
    let order = world.system().db.fetch_order(order_id).await.expect("Error fetching order").expect("No such order");
    assert_eq!(order.status, OrderStatusType::from(status), "Order status is incorrect");
}

#[then(expr = "every sub-order has status {word}")]
async fn check_sub_order_status(world: &mut SettlementWorld, status: String) {
    let expected = OrderStatusType::from(status);
    let parent_id = world.checkout().parent.id;
    let subs = world.system().db.fetch_sub_orders(parent_id).await.expect("Error fetching sub-orders");
    assert!(!subs.is_empty());
    for sub in subs {
        assert_eq!(sub.status, expected, "Sub-order {} has the wrong status", sub.order_number);
    }
}

#[when(expr = "sam marks their sub-order as {word}")]
async fn seller_updates_sub_order(world: &mut SettlementWorld, status: String) {
    let system = world.system();
    let shop_id = system.market.shop_a.id;
    let sub = world.checkout().sub_orders.iter().find(|o| o.shop_id == Some(shop_id)).expect("No sub-order for shop A");
    let seller = Requester::seller("sam", vec![shop_id]);
    let result = system.orders.update_fulfilment_status(sub.id, OrderStatusType::from(status), &seller).await;
    world.last_error = result.err();
}

#[when(expr = "{word} cancels the order")]
async fn cancel_order(world: &mut SettlementWorld, customer: String) {
    let order_id = world.checkout().parent.id;
    let result = world.system().orders.cancel_order(order_id, &Requester::customer(customer), "changed my mind").await;
    world.last_error = result.err();
}

//------------------------------------------------   Payouts    --------------------------------------------------------

#[then(expr = "{int} payout(s) is/are {word}")]
async fn check_payouts(world: &mut SettlementWorld, count: usize, status: String) {
    let expected = PayoutStatus::from(status);
    let payouts = world
        .system()
        .db
        .fetch_payouts_for_payment(world.intent().payment_id)
        .await
        .expect("Error fetching payouts");
    let n = payouts.iter().filter(|p| p.status == expected).count();
    assert_eq!(n, count, "Expected {count} {expected} payouts in {payouts:?}");
}

#[when("the pending payouts are processed")]
async fn process_payouts(world: &mut SettlementWorld) {
    let system = world.system();
    let payouts =
        system.db.fetch_payouts_for_payment(world.intent().payment_id).await.expect("Error fetching payouts");
    for payout in payouts.into_iter().filter(|p| p.status == PayoutStatus::Pending) {
        system.payouts.process_payout(payout.id).await.expect("Error processing payout");
    }
}

#[when(expr = "I pause for {int}ms")]
async fn pause(_world: &mut SettlementWorld, ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
