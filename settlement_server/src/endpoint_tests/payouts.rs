use actix_web::{http::StatusCode, test::TestRequest};
use serde_json::{json, Value};
use settlement_engine::{
    db_types::{NewShop, PayoutStatus},
    test_utils::{MockOperation, MOCK_SIGNATURE},
    traits::{GatewayError, GatewayEvent, GatewayEventKind},
    CatalogManagement,
    PayoutManagement,
};

use super::helpers::*;
use crate::{auth::Role, routes::SIGNATURE_HEADER};

/// Checks out the standard cart for alice and pays for it. Returns the parent order and payment ids.
async fn paid_checkout(app: &TestApp) -> (i64, i64) {
    let order_id = app.checkout("alice").await;
    let req = TestRequest::post().uri("/payments/create-intent").set_json(json!({ "order_id": order_id }));
    let intent = app.call_json(Some(&customer_token("alice")), req, StatusCode::OK).await;
    let event = GatewayEvent::new("evt_paid", GatewayEventKind::PaymentSucceeded {
        payment_intent_id: intent["payment_intent_id"].as_str().unwrap().into(),
        charge_id: None,
        payment_method: None,
    });
    let req = TestRequest::post()
        .uri("/payments/webhook")
        .insert_header((SIGNATURE_HEADER, MOCK_SIGNATURE))
        .set_payload(serde_json::to_vec(&event).unwrap());
    let outcome = app.call_json(None, req, StatusCode::OK).await;
    assert_eq!(outcome["status"], "Applied");
    (order_id, intent["payment_id"].as_i64().unwrap())
}

fn sub_order_for(record: &Value, shop_id: i64) -> i64 {
    record["sub_orders"]
        .as_array()
        .unwrap()
        .iter()
        .find(|o| o["shop_id"] == shop_id)
        .and_then(|o| o["id"].as_i64())
        .expect("No sub-order for shop")
}

#[actix_web::test]
async fn sellers_fulfil_their_own_sub_orders() {
    let app = TestApp::new().await;
    let (order_id, _) = paid_checkout(&app).await;
    let uri = format!("/api/orders/{order_id}");
    let record = app.call_json(Some(&admin_token()), TestRequest::get().uri(&uri), StatusCode::OK).await;
    let sam_sub = sub_order_for(&record, app.market.shop_a.id);
    let bea_sub = sub_order_for(&record, app.market.shop_b.id);
    let status_req = |id: i64, status: &str| {
        TestRequest::patch().uri(&format!("/api/orders/{id}/status")).set_json(json!({ "status": status }))
    };

    let (status, _) = app.call(Some(&app.seller_token()), status_req(bea_sub, "Processing")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.call(Some(&app.seller_token()), status_req(sam_sub, "Shipped")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let (status, _) = app.call(Some(&app.seller_token()), status_req(order_id, "Processing")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let order = app.call_json(Some(&app.seller_token()), status_req(sam_sub, "Processing"), StatusCode::OK).await;
    assert_eq!(order["status"], "Processing");
    let bea = issue_token("bea", vec![Role::Seller], vec![app.market.shop_b.id]);
    app.call_json(Some(&bea), status_req(bea_sub, "Processing"), StatusCode::OK).await;
    let record = app.call_json(Some(&admin_token()), TestRequest::get().uri(&uri), StatusCode::OK).await;
    assert_eq!(record["parent"]["status"], "Processing");
    app.tear_down().await;
}

#[actix_web::test]
async fn admins_process_and_cancel_payouts() {
    let app = TestApp::new().await;
    let (_, payment_id) = paid_checkout(&app).await;
    let payouts = app.db.fetch_payouts_for_payment(payment_id).await.unwrap();
    assert_eq!(payouts.len(), 2);
    assert!(payouts.iter().all(|p| p.status == PayoutStatus::Pending));

    let uri = format!("/api/payouts/{}/process", payouts[0].id);
    let payout = app.call_json(Some(&admin_token()), TestRequest::post().uri(&uri), StatusCode::OK).await;
    assert_eq!(payout["status"], "Paid");
    assert_eq!(payout["transfer_id"], "tr_mock_2");
    // Already paid
    let (status, _) = app.call(Some(&admin_token()), TestRequest::post().uri(&uri)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let uri = format!("/api/payouts/{}/cancel", payouts[1].id);
    let req = TestRequest::post().uri(&uri).set_json(json!({ "reason": "seller dispute" }));
    let (status, _) = app.call(Some(&app.seller_token()), req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let req = TestRequest::post().uri(&uri).set_json(json!({ "reason": "seller dispute" }));
    let payout = app.call_json(Some(&admin_token()), req, StatusCode::OK).await;
    assert_eq!(payout["status"], "Cancelled");
    assert_eq!(app.gateway.call_count(MockOperation::Transfer), 1);
    app.tear_down().await;
}

#[actix_web::test]
async fn refused_transfers_mark_the_payout_failed() {
    let app = TestApp::new().await;
    let (_, payment_id) = paid_checkout(&app).await;
    let payouts = app.db.fetch_payouts_for_payment(payment_id).await.unwrap();
    app.gateway.fail(MockOperation::Transfer, GatewayError::Rejected("insufficient platform balance".into()));
    let uri = format!("/api/payouts/{}/process", payouts[0].id);
    let payout = app.call_json(Some(&admin_token()), TestRequest::post().uri(&uri), StatusCode::OK).await;
    assert_eq!(payout["status"], "Failed");
    app.tear_down().await;
}

#[actix_web::test]
async fn sellers_onboard_their_own_shops() {
    let app = TestApp::new().await;
    let shop = app.db.insert_shop(NewShop::new("olu", "Olu's Pots")).await.unwrap();
    let uri = format!("/api/shops/{}/onboard", shop.id);
    let body = json!({ "email": "olu@example.com", "country": "PT" });

    let (status, _) = app.call(Some(&app.seller_token()), TestRequest::post().uri(&uri).set_json(&body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.call(Some(&customer_token("olu")), TestRequest::post().uri(&uri).set_json(&body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let olu = issue_token("olu", vec![Role::Seller], vec![shop.id]);
    let onboarded = app.call_json(Some(&olu), TestRequest::post().uri(&uri).set_json(&body), StatusCode::OK).await;
    assert_eq!(onboarded["connected_account_id"], "acct_mock_1");
    assert_eq!(onboarded["payouts_enabled"], true);
    // Onboarding twice returns the existing account
    app.call_json(Some(&admin_token()), TestRequest::post().uri(&uri).set_json(&body), StatusCode::OK).await;
    assert_eq!(app.gateway.call_count(MockOperation::ConnectAccount), 1);

    let (status, _) =
        app.call(Some(&admin_token()), TestRequest::post().uri("/api/shops/9999/onboard").set_json(&body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    app.tear_down().await;
}
