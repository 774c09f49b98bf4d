//! # Backend and collaborator contracts.
//!
//! This module defines the behaviour that database backends and payment gateways must expose in order to be used by
//! the settlement engine.
//!
//! * [`SettlementDatabase`] defines the highest level of behaviour for backends: checkouts, payments and the
//!   all-or-nothing application of reconciliation and cancellation plans.
//! * [`CatalogManagement`] provides read access to shops, products and variants, the engine's view of the catalog.
//! * [`PayoutManagement`] stores seller payouts and their lifecycle.
//! * [`PaymentGateway`] is the outbound capability set of a payment provider (intents, refunds, connected accounts,
//!   transfers and webhook authentication).
mod catalog_management;
mod payment_gateway;
mod payout_management;
mod settlement_database;

pub mod data_objects;

pub use catalog_management::CatalogManagement;
pub use data_objects::{
    CancellationPlan,
    CheckoutRecord,
    FulfilmentUpdate,
    NewCheckout,
    NewSubOrder,
    OrderStatusUpdate,
    PaymentCancellation,
    PaymentStateUpdate,
    ReconciliationPlan,
    StockReservation,
};
pub use payment_gateway::{
    ConnectedAccountRequest,
    GatewayAccount,
    GatewayError,
    GatewayEvent,
    GatewayEventKind,
    GatewayIntent,
    GatewayRefund,
    GatewayTransfer,
    IntentRequest,
    PaymentGateway,
    RefundRequest,
    TransferRequest,
};
pub use payout_management::PayoutManagement;
pub use settlement_database::SettlementDatabase;
