use std::{future::Future, pin::Pin, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use settlement_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    OnboardingApi,
    OrderFlowApi,
    PaymentGateway,
    PaymentIntentApi,
    PayoutApi,
    SqliteDatabase,
    WebhookReconciler,
};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    integrations::stripe::StripeGateway,
    middleware::JwtAuthMiddlewareFactory,
    payout_worker::start_payout_worker,
    routes::{
        health,
        CancelOrderRoute,
        CancelPayoutRoute,
        CheckoutRoute,
        CreateIntentRoute,
        OnboardShopRoute,
        OrderByIdRoute,
        OrderStatusRoute,
        ProcessPayoutRoute,
        WebhookRoute,
    },
};

const EVENT_BUFFER_SIZE: usize = 25;

type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, config.database_max_connections)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let gateway = StripeGateway::new(config.stripe_config.clone())?;
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, logging_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let _worker = start_payout_worker(db.clone(), gateway.clone(), producers.clone(), config.payout_sweep_interval);
    let srv = create_server_instance(config, db, gateway, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance<G>(
    config: ServerConfig,
    db: SqliteDatabase,
    gateway: G,
    producers: EventProducers,
) -> Result<Server, ServerError>
where
    G: PaymentGateway + Send + 'static,
{
    let srv = HttpServer::new(move || {
        let db = db.clone();
        let gateway = gateway.clone();
        let producers = producers.clone();
        let currency = config.currency.clone();
        App::new()
            .wrap(JwtAuthMiddlewareFactory::new(config.auth.clone()))
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("mkt::access_log"))
            .configure(move |cfg| configure_services(cfg, db, gateway, producers, &currency))
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// Registers the settlement APIs and every route. The caller is responsible for wrapping the app in
/// [`JwtAuthMiddlewareFactory`], without which all authenticated routes answer 401.
pub fn configure_services<G>(
    cfg: &mut web::ServiceConfig,
    db: SqliteDatabase,
    gateway: G,
    producers: EventProducers,
    currency: &str,
) where
    G: PaymentGateway + 'static,
{
    let orders_api = OrderFlowApi::new(db.clone(), gateway.clone(), producers.clone()).with_currency(currency);
    let intents_api = PaymentIntentApi::new(db.clone(), gateway.clone());
    let reconciler = WebhookReconciler::new(db.clone(), gateway.clone(), producers.clone());
    let payouts_api = PayoutApi::new(db.clone(), gateway.clone(), producers);
    let onboarding_api = OnboardingApi::new(db, gateway);
    let api_scope = web::scope("/api")
        .service(CheckoutRoute::<SqliteDatabase, G>::new())
        .service(OrderByIdRoute::<SqliteDatabase, G>::new())
        .service(CancelOrderRoute::<SqliteDatabase, G>::new())
        .service(OrderStatusRoute::<SqliteDatabase, G>::new())
        .service(OnboardShopRoute::<SqliteDatabase, G>::new())
        .service(ProcessPayoutRoute::<SqliteDatabase, G>::new())
        .service(CancelPayoutRoute::<SqliteDatabase, G>::new());
    cfg.app_data(web::Data::new(orders_api))
        .app_data(web::Data::new(intents_api))
        .app_data(web::Data::new(reconciler))
        .app_data(web::Data::new(payouts_api))
        .app_data(web::Data::new(onboarding_api))
        .service(health)
        .service(CreateIntentRoute::<SqliteDatabase, G>::new())
        .service(WebhookRoute::<SqliteDatabase, G>::new())
        .service(api_scope);
}

/// Default event hooks for the server: an audit trail in the logs.
pub fn logging_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks
        .on_order_created(|ev| {
            Box::pin(async move {
                info!(
                    "📬️ Checkout {} created for {}: {} sub-orders, total {}",
                    ev.checkout.parent.order_number,
                    ev.checkout.parent.customer_id,
                    ev.checkout.sub_orders.len(),
                    ev.checkout.parent.total
                );
            }) as HookFuture
        })
        .on_order_paid(|ev| {
            Box::pin(async move {
                info!("📬️ Order {} paid by payment #{}", ev.order.order_number, ev.payment_id);
            }) as HookFuture
        })
        .on_order_cancelled(|ev| {
            Box::pin(async move {
                info!("📬️ Order {} cancelled: {}", ev.order.order_number, ev.reason);
            }) as HookFuture
        })
        .on_payment_failed(|ev| {
            Box::pin(async move {
                let reason = ev.payment.failure_reason.as_deref().unwrap_or("unknown");
                warn!("📬️ Payment #{} ({}) failed: {reason}", ev.payment.id, ev.payment.payment_intent_id);
            }) as HookFuture
        })
        .on_payment_refunded(|ev| {
            Box::pin(async move {
                let kind = if ev.is_full_refund() { "Full" } else { "Partial" };
                info!("📬️ {kind} refund {} of {} on payment #{}", ev.refund_id, ev.amount, ev.payment.id);
            }) as HookFuture
        })
        .on_payout_accrued(|ev| {
            Box::pin(async move {
                debug!("📬️ Payout #{} of {} accrued for shop #{}", ev.payout.id, ev.payout.amount, ev.payout.shop_id);
            }) as HookFuture
        });
    hooks
}
