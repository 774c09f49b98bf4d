//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests:
//! ```nocompile
//!     fn my_handler() -> impl Responder {
//!         std::thread::sleep(Duration::from_secs(5)); // <-- Bad practice! Will cause the current worker thread to
//! hang!
//!     }
//! ```
//! For this reason, any long, non-cpu-bound operation (e.g. I/O, database operations, etc.) should be expressed as
//! futures or asynchronous functions. Async handlers get executed concurrently by worker threads and thus don’t block
//! execution:
//!
//! ```nocompile
//!     async fn my_handler() -> impl Responder {
//!         tokio::time::sleep(Duration::from_secs(5)).await; // <-- Ok. Worker thread will handle other requests here
//!     }
//! ```
use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use log::*;
use serde::{Deserialize, Serialize};
use settlement_engine::{
    checkout_objects::{CartLine, CheckoutRequest},
    db_types::{Address, OrderStatusType},
    CatalogManagement,
    OnboardingApi,
    OrderFlowApi,
    PaymentGateway,
    PaymentIntentApi,
    PayoutApi,
    PayoutManagement,
    SettlementDatabase,
    SettlementError,
    WebhookReconciler,
};

use crate::{
    auth::{JwtClaims, Role},
    errors::ServerError,
};

/// The header Stripe signs webhook deliveries with.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro.
// Every API is generic over a backend `B` and a payment gateway `G`. The bounds on `B` are listed after `impl`, and
// the optional `requires` list names the roles that may call the route (any one of them will do).
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl [$($bounds:ty),+] $(requires [$($roles:expr),+])?) => {
        paste::paste! { pub struct [<$name:camel Route>]<B, G>(core::marker::PhantomData<fn() -> (B, G)>);}
        paste::paste! { impl<B, G> [<$name:camel Route>]<B, G> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> (B, G)>)
            }
        }}
        paste::paste! { impl<B, G> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<B, G>
        where
            B: $($bounds +)+ 'static,
            G: settlement_engine::PaymentGateway + 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<B, G>);
                $(let res = res.wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+]));)?
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Payments  ----------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIntentParams {
    pub order_id: i64,
}

route!(create_intent => Post "/payments/create-intent" impl [SettlementDatabase] requires [Role::Customer]);
/// Opens (or re-uses) the payment intent for one of the caller's checkouts. The response carries the client secret
/// the storefront needs to confirm the payment with the gateway.
pub async fn create_intent<B, G>(
    claims: JwtClaims,
    body: web::Json<CreateIntentParams>,
    api: web::Data<PaymentIntentApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    G: PaymentGateway,
{
    let order_id = body.order_id;
    debug!("💻️ POST create-intent for order {order_id} by {}", claims.sub);
    let intent = api.create_payment_intent(order_id, &claims.sub).await.map_err(|e| {
        debug!("💻️ Could not create a payment intent for order {order_id}. {e}");
        e
    })?;
    Ok(HttpResponse::Ok().json(intent))
}

route!(webhook => Post "/payments/webhook" impl [SettlementDatabase, PayoutManagement]);
/// Gateway notifications. There is no access token here: the payload is authenticated by its signature header, and
/// must be passed on as the exact bytes received.
///
/// Any non-2xx response makes the gateway redeliver the event later.
pub async fn webhook<B, G>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<WebhookReconciler<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase + PayoutManagement,
    G: PaymentGateway,
{
    trace!("💻️ Received webhook request");
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| SettlementError::InvalidSignature(format!("No {SIGNATURE_HEADER} header")))?;
    let outcome = api.handle_webhook(body.as_ref(), signature).await.map_err(|e| {
        warn!("💻️ Webhook delivery was not processed. {e}");
        e
    })?;
    info!("💻️ Webhook event {} ({}) handled: {:?}", outcome.event_id, outcome.event_type, outcome.status);
    Ok(HttpResponse::Ok().json(outcome))
}

//----------------------------------------------   Orders  ----------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutParams {
    pub items: Vec<CartLine>,
    pub shipping_address: Address,
    #[serde(default)]
    pub billing_address: Option<Address>,
}

route!(checkout => Post "/checkout" impl [SettlementDatabase] requires [Role::Customer]);
pub async fn checkout<B, G>(
    claims: JwtClaims,
    body: web::Json<CheckoutParams>,
    api: web::Data<OrderFlowApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    G: PaymentGateway,
{
    debug!("💻️ POST checkout of {} lines for {}", body.items.len(), claims.sub);
    let params = body.into_inner();
    let cart = api.build_cart(&claims.sub, &params.items).await?;
    let request = CheckoutRequest {
        customer_id: claims.sub,
        cart,
        shipping_address: params.shipping_address,
        billing_address: params.billing_address,
    };
    let record = api.checkout(request).await?;
    Ok(HttpResponse::Created().json(record))
}

route!(order_by_id => Get "/orders/{id}" impl [SettlementDatabase] requires [Role::Customer, Role::Seller, Role::Admin]);
pub async fn order_by_id<B, G>(
    claims: JwtClaims,
    path: web::Path<i64>,
    api: web::Data<OrderFlowApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    G: PaymentGateway,
{
    let order_id = path.into_inner();
    debug!("💻️ GET order {order_id} for {}", claims.sub);
    let record = api.order_details(order_id, &claims.requester()).await?;
    Ok(HttpResponse::Ok().json(record))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelParams {
    pub reason: String,
}

route!(cancel_order => Post "/orders/{id}/cancel" impl [SettlementDatabase] requires [Role::Customer, Role::Admin]);
pub async fn cancel_order<B, G>(
    claims: JwtClaims,
    path: web::Path<i64>,
    body: web::Json<CancelParams>,
    api: web::Data<OrderFlowApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    G: PaymentGateway,
{
    let order_id = path.into_inner();
    info!("💻️ Cancel request for order {order_id} from {}: {}", claims.sub, body.reason);
    let orders = api.cancel_order(order_id, &claims.requester(), &body.reason).await?;
    Ok(HttpResponse::Ok().json(orders))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusParams {
    pub status: OrderStatusType,
}

route!(order_status => Patch "/orders/{id}/status" impl [SettlementDatabase] requires [Role::Seller, Role::Admin]);
pub async fn order_status<B, G>(
    claims: JwtClaims,
    path: web::Path<i64>,
    body: web::Json<StatusParams>,
    api: web::Data<OrderFlowApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase,
    G: PaymentGateway,
{
    let order_id = path.into_inner();
    debug!("💻️ PATCH order {order_id} to {} by {}", body.status, claims.sub);
    let order = api.update_fulfilment_status(order_id, body.status, &claims.requester()).await?;
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------   Shops  ----------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardParams {
    pub email: String,
    pub country: String,
}

route!(onboard_shop => Post "/shops/{id}/onboard" impl [CatalogManagement] requires [Role::Seller, Role::Admin]);
/// Creates the shop's connected account on the gateway. Sellers may only onboard their own shops.
pub async fn onboard_shop<B, G>(
    claims: JwtClaims,
    path: web::Path<i64>,
    body: web::Json<OnboardParams>,
    api: web::Data<OnboardingApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: CatalogManagement,
    G: PaymentGateway,
{
    let shop_id = path.into_inner();
    if !claims.has_role(Role::Admin) && !claims.operates_shop(shop_id) {
        debug!("💻️ {} tried to onboard shop {shop_id}, which they do not operate", claims.sub);
        return Err(SettlementError::Forbidden(format!("Shop {shop_id} belongs to another seller")).into());
    }
    info!("💻️ Onboarding shop {shop_id} for {}", claims.sub);
    let shop = api.onboard_shop(shop_id, &body.email, &body.country).await?;
    Ok(HttpResponse::Ok().json(shop))
}

//----------------------------------------------   Payouts  ----------------------------------------------------
route!(process_payout => Post "/payouts/{id}/process" impl [SettlementDatabase, PayoutManagement] requires [Role::Admin]);
pub async fn process_payout<B, G>(
    claims: JwtClaims,
    path: web::Path<i64>,
    api: web::Data<PayoutApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase + PayoutManagement,
    G: PaymentGateway,
{
    let payout_id = path.into_inner();
    info!("💻️ {} requested payout {payout_id} to be processed", claims.sub);
    let payout = api.process_payout(payout_id).await?;
    Ok(HttpResponse::Ok().json(payout))
}

route!(cancel_payout => Post "/payouts/{id}/cancel" impl [SettlementDatabase, PayoutManagement] requires [Role::Admin]);
pub async fn cancel_payout<B, G>(
    claims: JwtClaims,
    path: web::Path<i64>,
    body: web::Json<CancelParams>,
    api: web::Data<PayoutApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase + PayoutManagement,
    G: PaymentGateway,
{
    let payout_id = path.into_inner();
    info!("💻️ {} cancelled payout {payout_id}: {}", claims.sub, body.reason);
    let payout = api.cancel_payout(payout_id, &body.reason).await?;
    Ok(HttpResponse::Ok().json(payout))
}
