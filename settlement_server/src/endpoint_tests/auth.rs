use actix_web::{http::StatusCode, test::TestRequest};
use chrono::Duration;

use super::helpers::*;
use crate::auth::{JwtClaims, Role, TokenIssuer};

#[actix_web::test]
async fn health_check_needs_no_token() {
    let app = TestApp::new().await;
    let (status, body) = app.call(None, TestRequest::get().uri("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
    app.tear_down().await;
}

#[actix_web::test]
async fn api_routes_need_a_token() {
    let app = TestApp::new().await;
    let (status, body) = app.call(None, TestRequest::get().uri("/api/orders/1")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("No access token was provided."), "was: {body}");
    let (status, _) = app.call(None, TestRequest::post().uri("/payments/create-intent").set_json(1)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    app.tear_down().await;
}

#[actix_web::test]
async fn malformed_tokens_are_rejected() {
    let app = TestApp::new().await;
    let (status, body) = app.call(Some("made up nonsense"), TestRequest::get().uri("/health")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Access token is not in the correct format."), "was: {body}");

    let req = TestRequest::get().uri("/api/orders/1").insert_header(("Authorization", "Basic c2FtOnNlY3JldA=="));
    let (status, _) = app.call(None, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    app.tear_down().await;
}

#[actix_web::test]
async fn expired_and_forged_tokens_are_rejected() {
    let app = TestApp::new().await;
    let claims = JwtClaims::new("alice", vec![Role::Customer], vec![], Duration::minutes(-10));
    let expired = TokenIssuer::new(&get_auth_config()).issue_token(&claims).unwrap();
    let (status, body) = app.call(Some(&expired), TestRequest::get().uri("/api/orders/1")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("Access token is invalid."), "was: {body}");

    let claims = JwtClaims::new("alice", vec![Role::Admin], vec![], Duration::hours(1));
    let other = crate::config::AuthConfig::new("not-the-servers-secret-but-long-enough");
    let forged = TokenIssuer::new(&other).issue_token(&claims).unwrap();
    let (status, _) = app.call(Some(&forged), TestRequest::get().uri("/api/orders/1")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    app.tear_down().await;
}

#[actix_web::test]
async fn routes_check_roles() {
    let app = TestApp::new().await;
    let alice = customer_token("alice");
    let req = TestRequest::post().uri("/api/payouts/1/process");
    let (status, body) = app.call(Some(&alice), req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.contains("Insufficient Permissions."), "was: {body}");

    // Sellers can't check out, customers can't move sub-orders along
    let req = TestRequest::post().uri("/api/checkout").set_json(app.standard_cart());
    let (status, _) = app.call(Some(&app.seller_token()), req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let req = TestRequest::patch().uri("/api/orders/1/status").set_json(serde_json::json!({"status": "Shipped"}));
    let (status, _) = app.call(Some(&alice), req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // An admin gets past the ACL and hits the missing payout
    let (status, _) = app.call(Some(&admin_token()), TestRequest::post().uri("/api/payouts/1/process")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    app.tear_down().await;
}
