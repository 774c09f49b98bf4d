use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::Money;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The gateway could not be reached, or failed on its side. Safe to retry.
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),
    /// The gateway understood the request and refused it.
    #[error("Gateway rejected the request: {0}")]
    Rejected(String),
    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),
    #[error("Malformed webhook event: {0}")]
    MalformedEvent(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRequest {
    pub amount: Money,
    pub currency: String,
    pub order_id: i64,
    pub order_number: String,
    pub customer_id: String,
    /// Repeating a request with the same key returns the original intent rather than creating a second one.
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayIntent {
    pub intent_id: String,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub intent_id: String,
    pub amount: Money,
    pub reason: Option<String>,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRefund {
    pub refund_id: String,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedAccountRequest {
    pub shop_id: i64,
    pub seller_id: String,
    pub email: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayAccount {
    pub account_id: String,
    pub payouts_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub amount: Money,
    pub currency: String,
    pub destination: String,
    pub transfer_group: Option<String>,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayTransfer {
    pub transfer_id: String,
}

/// A gateway notification, reduced to the facts the reconciler acts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayEvent {
    pub event_id: String,
    pub kind: GatewayEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEventKind {
    PaymentProcessing {
        payment_intent_id: String,
    },
    PaymentSucceeded {
        payment_intent_id: String,
        charge_id: Option<String>,
        payment_method: Option<String>,
    },
    PaymentFailed {
        payment_intent_id: String,
        reason: String,
    },
    RefundSucceeded {
        payment_intent_id: String,
        refund_id: String,
        amount: Money,
    },
    AccountUpdated {
        account_id: String,
        payouts_enabled: bool,
    },
    /// Any event type the reconciler does not act on. Acknowledged and ignored.
    Unhandled {
        event_type: String,
    },
}

impl GatewayEvent {
    pub fn new<S: Into<String>>(event_id: S, kind: GatewayEventKind) -> Self {
        Self { event_id: event_id.into(), kind }
    }

    pub fn event_type(&self) -> &str {
        match &self.kind {
            GatewayEventKind::PaymentProcessing { .. } => "payment_processing",
            GatewayEventKind::PaymentSucceeded { .. } => "payment_succeeded",
            GatewayEventKind::PaymentFailed { .. } => "payment_failed",
            GatewayEventKind::RefundSucceeded { .. } => "refund_succeeded",
            GatewayEventKind::AccountUpdated { .. } => "account_updated",
            GatewayEventKind::Unhandled { event_type } => event_type.as_str(),
        }
    }

    /// The payment intent the event refers to, for events that concern a payment.
    pub fn payment_intent_id(&self) -> Option<&str> {
        match &self.kind {
            GatewayEventKind::PaymentProcessing { payment_intent_id } |
            GatewayEventKind::PaymentSucceeded { payment_intent_id, .. } |
            GatewayEventKind::PaymentFailed { payment_intent_id, .. } |
            GatewayEventKind::RefundSucceeded { payment_intent_id, .. } => Some(payment_intent_id.as_str()),
            GatewayEventKind::AccountUpdated { .. } | GatewayEventKind::Unhandled { .. } => None,
        }
    }
}

/// The capabilities the settlement engine needs from a payment gateway. Any gateway offering these operations can be
/// substituted.
#[allow(async_fn_in_trait)]
pub trait PaymentGateway: Clone {
    async fn create_payment_intent(&self, request: IntentRequest) -> Result<GatewayIntent, GatewayError>;

    async fn cancel_payment_intent(&self, intent_id: &str) -> Result<(), GatewayError>;

    async fn create_refund(&self, request: RefundRequest) -> Result<GatewayRefund, GatewayError>;

    async fn create_connected_account(
        &self,
        request: ConnectedAccountRequest,
    ) -> Result<GatewayAccount, GatewayError>;

    async fn create_transfer(&self, request: TransferRequest) -> Result<GatewayTransfer, GatewayError>;

    /// Authenticates a webhook delivery. Must be called on the exact raw bytes received, before any parsing.
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<(), GatewayError>;

    /// Parses an authenticated webhook payload.
    fn parse_event(&self, payload: &[u8]) -> Result<GatewayEvent, GatewayError>;
}
