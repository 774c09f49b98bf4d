//! # Marketplace settlement server
//! This crate hosts the HTTP front end of the settlement engine. It is responsible for:
//! Taking checkouts from the storefront and opening payment intents for them.
//! Receiving the payment gateway's webhook notifications and handing them to the reconciler.
//! Exposing order management, seller onboarding and payout operations to sellers and administrators.
//! Periodically accruing seller payouts that were missed.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/payments/create-intent`: Opens the payment intent for a checkout.
//! * `/payments/webhook`: Gateway notifications. Authenticated by signature rather than access token.
//! * `/api/...`: Checkout, order, shop and payout management. Requires a bearer token.

pub mod auth;
pub mod cli;
pub mod config;
pub mod errors;
pub mod integrations;
pub mod middleware;
pub mod payout_worker;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
