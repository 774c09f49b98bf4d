//! Marketplace Settlement Engine
//!
//! The settlement engine takes a multi-vendor cart through to money in sellers' accounts: it splits the cart into one
//! sub-order per shop, opens a single payment intent for the whole checkout, reconciles the gateway's webhook
//! notifications against payments and orders, and accrues and transfers seller payouts. It is gateway-agnostic.
//!
//! The library is divided into these main sections:
//! 1. Backend contracts ([`mod@traits`]) and the SQLite backend that implements them. The data types stored by the
//!    backend are defined in [`mod@db_types`] and are public.
//! 2. Settlement rules ([`mod@settlement`]): cart partitioning, the order state machine, payment splits and webhook
//!    reconciliation planning. These are pure functions that decide what to write; the backend applies their plans
//!    atomically.
//! 3. The public API ([`mod@se_api`]), which ties the rules, the backend and the payment gateway together.
//!
//! The engine also emits events when orders are created, paid or cancelled, and when payments fail or are refunded.
//! A simple actor framework (see [`mod@events`]) lets you hook into these and perform custom actions.
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod se_api;
pub mod settlement;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use se_api::{
    checkout_objects,
    errors::{ErrorKind, SettlementError},
    onboarding_api::OnboardingApi,
    order_flow_api::OrderFlowApi,
    payment_intent_api::PaymentIntentApi,
    payout_api::PayoutApi,
    webhook_api::WebhookReconciler,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{CatalogManagement, PaymentGateway, PayoutManagement, SettlementDatabase};
