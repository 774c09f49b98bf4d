use actix_web::{http::StatusCode, test::TestRequest};
use serde_json::{json, Value};
use settlement_engine::{
    db_types::Money,
    test_utils::MOCK_SIGNATURE,
    traits::{GatewayEvent, GatewayEventKind},
};

use super::helpers::*;
use crate::routes::SIGNATURE_HEADER;

async fn create_intent(app: &TestApp, customer: &str, order_id: i64) -> (StatusCode, String) {
    let req = TestRequest::post().uri("/payments/create-intent").set_json(json!({ "order_id": order_id }));
    app.call(Some(&customer_token(customer)), req).await
}

fn webhook(event: &GatewayEvent, signature: Option<&str>) -> TestRequest {
    let req = TestRequest::post().uri("/payments/webhook").set_payload(serde_json::to_vec(event).unwrap());
    match signature {
        Some(sig) => req.insert_header((SIGNATURE_HEADER, sig)),
        None => req,
    }
}

fn succeeded(event_id: &str, intent_id: &str) -> GatewayEvent {
    GatewayEvent::new(event_id, GatewayEventKind::PaymentSucceeded {
        payment_intent_id: intent_id.into(),
        charge_id: Some("ch_1".into()),
        payment_method: Some("card".into()),
    })
}

#[actix_web::test]
async fn payment_intents_are_created_once() {
    let app = TestApp::new().await;
    let order_id = app.checkout("alice").await;
    let (status, body) = create_intent(&app, "alice", order_id).await;
    assert_eq!(status, StatusCode::OK, "was: {body}");
    let intent: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(intent["payment_intent_id"], "pi_mock_1");
    assert_eq!(intent["client_secret"], "pi_mock_1_secret");
    assert_eq!(intent["amount"], 13_000);
    assert_eq!(intent["reused"], false);

    let (_, body) = create_intent(&app, "alice", order_id).await;
    let again: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(again["payment_id"], intent["payment_id"]);
    assert_eq!(again["reused"], true);

    let (status, _) = create_intent(&app, "bob", order_id).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = create_intent(&app, "alice", 9_999).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    app.tear_down().await;
}

#[actix_web::test]
async fn webhooks_must_be_signed() {
    let app = TestApp::new().await;
    let event = succeeded("evt_1", "pi_mock_1");
    let (status, _) = app.call(None, webhook(&event, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, body) = app.call(None, webhook(&event, Some("t=1,v1=forged"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "was: {body}");
    let req = TestRequest::post()
        .uri("/payments/webhook")
        .insert_header((SIGNATURE_HEADER, MOCK_SIGNATURE))
        .set_payload("{not json");
    let (status, _) = app.call(None, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    app.tear_down().await;
}

#[actix_web::test]
async fn events_for_unknown_payments_are_retried() {
    let app = TestApp::new().await;
    let event = succeeded("evt_1", "pi_unknown");
    let (status, _) = app.call(None, webhook(&event, Some(MOCK_SIGNATURE))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let event = GatewayEvent::new("evt_2", GatewayEventKind::Unhandled { event_type: "customer.created".into() });
    let outcome = app.call_json(None, webhook(&event, Some(MOCK_SIGNATURE)), StatusCode::OK).await;
    assert_eq!(outcome["status"], "Ignored");
    app.tear_down().await;
}

#[actix_web::test]
async fn payment_success_pays_the_checkout_once() {
    let app = TestApp::new().await;
    let order_id = app.checkout("alice").await;
    let (_, body) = create_intent(&app, "alice", order_id).await;
    let intent: Value = serde_json::from_str(&body).unwrap();
    let intent_id = intent["payment_intent_id"].as_str().unwrap();

    let event = succeeded("evt_1", intent_id);
    let outcome = app.call_json(None, webhook(&event, Some(MOCK_SIGNATURE)), StatusCode::OK).await;
    assert_eq!(outcome["status"], "Applied");
    assert_eq!(outcome["payment"]["status"], "Succeeded");
    let outcome = app.call_json(None, webhook(&event, Some(MOCK_SIGNATURE)), StatusCode::OK).await;
    assert_eq!(outcome["status"], "Duplicate");

    let uri = format!("/api/orders/{order_id}");
    let record = app.call_json(Some(&customer_token("alice")), TestRequest::get().uri(&uri), StatusCode::OK).await;
    assert_eq!(record["parent"]["status"], "Paid");
    assert!(record["sub_orders"].as_array().unwrap().iter().all(|o| o["status"] == "Paid"));

    // A paid order can't be paid for again
    let (status, _) = create_intent(&app, "alice", order_id).await;
    assert_eq!(status, StatusCode::CONFLICT);
    app.tear_down().await;
}

#[actix_web::test]
async fn refunds_before_success_are_out_of_order() {
    let app = TestApp::new().await;
    let order_id = app.checkout("alice").await;
    let (_, body) = create_intent(&app, "alice", order_id).await;
    let intent: Value = serde_json::from_str(&body).unwrap();
    let refund = GatewayEvent::new("evt_refund", GatewayEventKind::RefundSucceeded {
        payment_intent_id: intent["payment_intent_id"].as_str().unwrap().into(),
        refund_id: "re_1".into(),
        amount: Money::from(13_000),
    });
    let (status, _) = app.call(None, webhook(&refund, Some(MOCK_SIGNATURE))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    app.tear_down().await;
}
