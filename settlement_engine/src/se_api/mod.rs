//! # Settlement engine public API
//!
//! The `se_api` module exposes the programmatic API for the settlement engine. As with the backend traits, the API is
//! modular so that clients can pick the parts they need.
//!
//! * [`order_flow_api`] turns carts into checkouts (a parent order plus one sub-order per shop), and handles fulfilment
//!   updates and cancellations.
//! * [`payment_intent_api`] opens the gateway payment intent for a checkout and records the per-seller splits.
//! * [`webhook_api`] reconciles gateway notifications against payments and orders.
//! * [`payout_api`] accrues seller payouts once a payment succeeds, and transfers them.
//! * [`onboarding_api`] connects shops to the gateway.
//!
//! # API usage
//!
//! Every API is created from a backend implementing the traits it needs, plus (where money moves) a
//! [`crate::traits::PaymentGateway`]:
//!
//! ```rust,ignore
//! use settlement_engine::{PaymentIntentApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let api = PaymentIntentApi::new(db, gateway);
//! let intent = api.create_payment_intent(order_id, "alice").await?;
//! ```

pub mod checkout_objects;
pub mod errors;
pub mod onboarding_api;
pub mod order_flow_api;
pub mod payment_intent_api;
pub mod payout_api;
pub mod webhook_api;
