use actix_web::{http::StatusCode, test::TestRequest};
use serde_json::json;
use settlement_engine::CatalogManagement;

use super::helpers::*;
use crate::auth::Role;

#[actix_web::test]
async fn checkout_splits_the_cart_per_shop() {
    let app = TestApp::new().await;
    let req = TestRequest::post().uri("/api/checkout").set_json(app.standard_cart());
    let record = app.call_json(Some(&customer_token("alice")), req, StatusCode::CREATED).await;
    assert_eq!(record["parent"]["total"], 13_000);
    assert_eq!(record["parent"]["customer_id"], "alice");
    assert_eq!(record["parent"]["status"], "PendingPayment");
    let subs = record["sub_orders"].as_array().unwrap();
    assert_eq!(subs.len(), 2);
    let sum = subs.iter().map(|o| o["total"].as_i64().unwrap()).sum::<i64>();
    assert_eq!(sum, 13_000);
    assert_eq!(record["items"].as_array().unwrap().len(), 3);
    app.tear_down().await;
}

#[actix_web::test]
async fn bad_carts_are_rejected() {
    let app = TestApp::new().await;
    let alice = customer_token("alice");
    let mut cart = app.standard_cart();
    cart["items"] = json!([]);
    let (status, _) = app.call(Some(&alice), TestRequest::post().uri("/api/checkout").set_json(&cart)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    cart["items"] = json!([{ "product_id": app.market.lamp.id, "quantity": 11 }]);
    let (status, body) = app.call(Some(&alice), TestRequest::post().uri("/api/checkout").set_json(&cart)).await;
    assert_eq!(status, StatusCode::CONFLICT, "was: {body}");
    let lamp = app.db.fetch_product(app.market.lamp.id).await.unwrap().unwrap();
    assert_eq!(lamp.stock, 10);

    cart["items"] = json!([{ "product_id": 9_999, "quantity": 1 }]);
    let (status, _) = app.call(Some(&alice), TestRequest::post().uri("/api/checkout").set_json(&cart)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) =
        app.call(Some(&alice), TestRequest::post().uri("/api/checkout").set_json(json!({"items": "lamp"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    app.tear_down().await;
}

#[actix_web::test]
async fn orders_are_visible_to_their_parties() {
    let app = TestApp::new().await;
    let order_id = app.checkout("alice").await;
    let uri = format!("/api/orders/{order_id}");

    let record = app.call_json(Some(&customer_token("alice")), TestRequest::get().uri(&uri), StatusCode::OK).await;
    assert_eq!(record["parent"]["id"], order_id);
    let record = app.call_json(Some(&app.seller_token()), TestRequest::get().uri(&uri), StatusCode::OK).await;
    assert_eq!(record["sub_orders"].as_array().unwrap().len(), 2);
    app.call_json(Some(&admin_token()), TestRequest::get().uri(&uri), StatusCode::OK).await;

    let (status, _) = app.call(Some(&customer_token("bob")), TestRequest::get().uri(&uri)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let stranger = issue_token("olu", vec![Role::Seller], vec![app.market.shop_b.id + 100]);
    let (status, _) = app.call(Some(&stranger), TestRequest::get().uri(&uri)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.call(Some(&admin_token()), TestRequest::get().uri("/api/orders/9999")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    app.tear_down().await;
}

#[actix_web::test]
async fn cancelling_an_unpaid_order_restores_stock() {
    let app = TestApp::new().await;
    let order_id = app.checkout("alice").await;
    let lamp = app.db.fetch_product(app.market.lamp.id).await.unwrap().unwrap();
    assert_eq!(lamp.stock, 9);

    let req = TestRequest::post().uri(&format!("/api/orders/{order_id}/cancel")).set_json(json!({"reason": "oops"}));
    let (status, _) = app.call(Some(&customer_token("bob")), req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let req = TestRequest::post().uri(&format!("/api/orders/{order_id}/cancel")).set_json(json!({"reason": "oops"}));
    let orders = app.call_json(Some(&customer_token("alice")), req, StatusCode::OK).await;
    let orders = orders.as_array().unwrap();
    assert_eq!(orders.len(), 3);
    assert!(orders.iter().all(|o| o["status"] == "Cancelled"));
    let lamp = app.db.fetch_product(app.market.lamp.id).await.unwrap().unwrap();
    assert_eq!(lamp.stock, 10);
    app.tear_down().await;
}

#[actix_web::test]
async fn unpaid_sub_orders_cannot_be_fulfilled() {
    let app = TestApp::new().await;
    let order_id = app.checkout("alice").await;
    let uri = format!("/api/orders/{order_id}");
    let record = app.call_json(Some(&admin_token()), TestRequest::get().uri(&uri), StatusCode::OK).await;
    let sub_id = record["sub_orders"]
        .as_array()
        .unwrap()
        .iter()
        .find(|o| o["shop_id"] == app.market.shop_a.id)
        .and_then(|o| o["id"].as_i64())
        .unwrap();
    let req = TestRequest::patch()
        .uri(&format!("/api/orders/{sub_id}/status"))
        .set_json(json!({"status": "Processing"}));
    let (status, body) = app.call(Some(&app.seller_token()), req).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "was: {body}");
    app.tear_down().await;
}
