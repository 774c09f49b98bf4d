use actix_web::{
    body::MessageBody,
    http::{header::AUTHORIZATION, StatusCode},
    test,
    test::TestRequest,
    App,
};
use chrono::Duration;
use log::debug;
use serde_json::Value;
use settlement_engine::{
    events::EventProducers,
    test_utils::{
        fixtures::{seed_marketplace, Marketplace},
        prepare_env::{fresh_database, remove_database},
        MockGateway,
    },
    SqliteDatabase,
};

use crate::{
    auth::{JwtClaims, Role, TokenIssuer},
    config::AuthConfig,
    middleware::JwtAuthMiddlewareFactory,
    server::configure_services,
};

// DO NOT re-use this secret anywhere.
pub fn get_auth_config() -> AuthConfig {
    AuthConfig::new("endpoint-test-secret-0123456789abcdef")
}

pub fn issue_token(sub: &str, roles: Vec<Role>, shop_ids: Vec<i64>) -> String {
    let claims = JwtClaims::new(sub, roles, shop_ids, Duration::hours(1));
    TokenIssuer::new(&get_auth_config()).issue_token(&claims).expect("Failed to sign token")
}

pub fn customer_token(sub: &str) -> String {
    issue_token(sub, vec![Role::Customer], vec![])
}

pub fn admin_token() -> String {
    issue_token("root", vec![Role::Admin], vec![])
}

/// A seeded marketplace behind a fully wired app. See `test_utils::fixtures` for what is in stock.
pub struct TestApp {
    pub db: SqliteDatabase,
    pub url: String,
    pub market: Marketplace,
    pub gateway: MockGateway,
}

impl TestApp {
    pub async fn new() -> Self {
        let (db, url) = fresh_database(5).await;
        let market = seed_marketplace(&db, 10).await;
        Self { db, url, market, gateway: MockGateway::new() }
    }

    pub fn seller_token(&self) -> String {
        issue_token("sam", vec![Role::Seller], vec![self.market.shop_a.id])
    }

    /// Sends the request through the JWT middleware and all routes, returning the status and body. Errors raised by
    /// middleware are rendered the same way the server would render them.
    pub async fn call(&self, token: Option<&str>, req: TestRequest) -> (StatusCode, String) {
        let req = match token {
            Some(token) => req.insert_header((AUTHORIZATION, format!("Bearer {token}"))),
            None => req,
        };
        let db = self.db.clone();
        let gateway = self.gateway.clone();
        let app = App::new()
            .wrap(JwtAuthMiddlewareFactory::new(get_auth_config()))
            .configure(move |cfg| configure_services(cfg, db, gateway, EventProducers::default(), "EUR"));
        let service = test::init_service(app).await;
        let (status, body) = match test::try_call_service(&service, req.to_request()).await {
            Ok(res) => {
                let status = res.status();
                (status, test::read_body(res).await)
            },
            Err(e) => {
                let res = e.error_response();
                (res.status(), res.into_body().try_into_bytes().unwrap_or_default())
            },
        };
        let body = String::from_utf8_lossy(&body).into_owned();
        debug!("Response: {status} {body}");
        (status, body)
    }

    /// As [`TestApp::call`], for requests that are expected to succeed with a JSON body.
    pub async fn call_json(&self, token: Option<&str>, req: TestRequest, expected: StatusCode) -> Value {
        let (status, body) = self.call(token, req).await;
        assert_eq!(status, expected, "Unexpected response: {body}");
        serde_json::from_str(&body).expect("Response is not JSON")
    }

    /// Checks out the standard cart (lamp, 2 mugs, notebook) for `customer` and returns the parent order id.
    pub async fn checkout(&self, customer: &str) -> i64 {
        let req = TestRequest::post().uri("/api/checkout").set_json(self.standard_cart());
        let record = self.call_json(Some(&customer_token(customer)), req, StatusCode::CREATED).await;
        record["parent"]["id"].as_i64().expect("No parent order id")
    }

    pub fn standard_cart(&self) -> Value {
        serde_json::json!({
            "items": [
                { "product_id": self.market.lamp.id, "quantity": 1 },
                { "product_id": self.market.mug.id, "quantity": 2 },
                { "product_id": self.market.notebook.id, "quantity": 1 },
            ],
            "shipping_address": {
                "name": "Alice Smith",
                "line1": "1 Main Street",
                "city": "Lisbon",
                "postal_code": "1000-001",
                "country": "PT"
            }
        })
    }

    pub async fn tear_down(self) {
        remove_database(self.db, &self.url).await;
    }
}
