//! Stripe as the marketplace's payment gateway.
//!
//! Bridges the engine's [`PaymentGateway`] contract onto the `stripe_tools` REST client, and translates Stripe webhook
//! events into [`GatewayEvent`]s.
use std::collections::HashMap;

use chrono::Utc;
use log::*;
use settlement_engine::{
    traits::{
        ConnectedAccountRequest,
        GatewayAccount,
        GatewayError,
        GatewayEvent,
        GatewayEventKind,
        GatewayIntent,
        GatewayRefund,
        GatewayTransfer,
        IntentRequest,
        RefundRequest,
        TransferRequest,
    },
    PaymentGateway,
};
use stripe_tools::{
    webhook::verify_signature,
    ConnectedAccount,
    NewConnectedAccount,
    NewPaymentIntent,
    NewRefund,
    NewTransfer,
    StripeApi,
    StripeApiError,
    StripeConfig,
    StripeEvent,
    StripePaymentIntent,
    StripeRefund,
};

use crate::errors::ServerError;

#[derive(Clone)]
pub struct StripeGateway {
    api: StripeApi,
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> Result<Self, ServerError> {
        let api = StripeApi::new(config).map_err(|e| ServerError::InitializeError(e.to_string()))?;
        Ok(Self { api })
    }
}

fn gateway_error(e: StripeApiError) -> GatewayError {
    if e.is_transient() {
        GatewayError::Unavailable(e.to_string())
    } else {
        GatewayError::Rejected(e.to_string())
    }
}

impl PaymentGateway for StripeGateway {
    async fn create_payment_intent(&self, request: IntentRequest) -> Result<GatewayIntent, GatewayError> {
        let mut metadata = HashMap::new();
        metadata.insert("order_id".to_string(), request.order_id.to_string());
        metadata.insert("order_number".to_string(), request.order_number.clone());
        metadata.insert("customer_id".to_string(), request.customer_id.clone());
        let intent = NewPaymentIntent {
            amount: request.amount.value(),
            currency: request.currency,
            transfer_group: Some(request.order_number),
            metadata,
            idempotency_key: Some(request.idempotency_key),
        };
        let result = self.api.create_payment_intent(&intent).await.map_err(gateway_error)?;
        Ok(GatewayIntent { intent_id: result.id, client_secret: result.client_secret })
    }

    async fn cancel_payment_intent(&self, intent_id: &str) -> Result<(), GatewayError> {
        self.api.cancel_payment_intent(intent_id).await.map_err(gateway_error)?;
        Ok(())
    }

    async fn create_refund(&self, request: RefundRequest) -> Result<GatewayRefund, GatewayError> {
        let refund = NewRefund {
            payment_intent: request.intent_id,
            amount: Some(request.amount.value()),
            reason: request.reason,
            metadata: HashMap::new(),
            idempotency_key: Some(request.idempotency_key),
        };
        let result = self.api.create_refund(&refund).await.map_err(gateway_error)?;
        Ok(GatewayRefund { refund_id: result.id, amount: result.amount.into() })
    }

    async fn create_connected_account(
        &self,
        request: ConnectedAccountRequest,
    ) -> Result<GatewayAccount, GatewayError> {
        let mut metadata = HashMap::new();
        metadata.insert("shop_id".to_string(), request.shop_id.to_string());
        metadata.insert("seller_id".to_string(), request.seller_id);
        let account = NewConnectedAccount { email: request.email, country: request.country, metadata };
        let result = self.api.create_connected_account(&account).await.map_err(gateway_error)?;
        Ok(GatewayAccount { account_id: result.id, payouts_enabled: result.payouts_enabled })
    }

    async fn create_transfer(&self, request: TransferRequest) -> Result<GatewayTransfer, GatewayError> {
        let transfer = NewTransfer {
            amount: request.amount.value(),
            currency: request.currency,
            destination: request.destination,
            transfer_group: request.transfer_group,
            idempotency_key: Some(request.idempotency_key),
        };
        let result = self.api.create_transfer(&transfer).await.map_err(gateway_error)?;
        Ok(GatewayTransfer { transfer_id: result.id })
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<(), GatewayError> {
        let config = self.api.config();
        verify_signature(
            payload,
            signature,
            config.webhook_secret.reveal(),
            config.webhook_tolerance_secs,
            Utc::now().timestamp(),
        )
        .map_err(|e| GatewayError::InvalidSignature(e.to_string()))
    }

    fn parse_event(&self, payload: &[u8]) -> Result<GatewayEvent, GatewayError> {
        let event = serde_json::from_slice::<StripeEvent>(payload)
            .map_err(|e| GatewayError::MalformedEvent(e.to_string()))?;
        gateway_event_from_stripe(event)
    }
}

pub fn gateway_event_from_stripe(event: StripeEvent) -> Result<GatewayEvent, GatewayError> {
    let malformed = |e: serde_json::Error| GatewayError::MalformedEvent(format!("{}: {e}", event.event_type));
    let kind = match event.event_type.as_str() {
        "payment_intent.processing" => {
            let intent = event.object_as::<StripePaymentIntent>().map_err(malformed)?;
            GatewayEventKind::PaymentProcessing { payment_intent_id: intent.id }
        },
        "payment_intent.succeeded" => {
            let intent = event.object_as::<StripePaymentIntent>().map_err(malformed)?;
            GatewayEventKind::PaymentSucceeded {
                payment_intent_id: intent.id,
                charge_id: intent.latest_charge,
                payment_method: intent.payment_method_types.into_iter().next(),
            }
        },
        "payment_intent.payment_failed" => {
            let intent = event.object_as::<StripePaymentIntent>().map_err(malformed)?;
            let reason = intent
                .last_payment_error
                .and_then(|e| e.code.or(e.message))
                .unwrap_or_else(|| "payment_failed".to_string());
            GatewayEventKind::PaymentFailed { payment_intent_id: intent.id, reason }
        },
        "refund.created" | "refund.updated" | "charge.refund.updated" => {
            let refund = event.object_as::<StripeRefund>().map_err(malformed)?;
            match (refund.status.as_str(), refund.payment_intent) {
                ("succeeded", Some(payment_intent_id)) => GatewayEventKind::RefundSucceeded {
                    payment_intent_id,
                    refund_id: refund.id,
                    amount: refund.amount.into(),
                },
                ("succeeded", None) => {
                    return Err(GatewayError::MalformedEvent(format!("Refund {} has no payment intent", refund.id)));
                },
                (status, _) => {
                    debug!("💳️ Refund {} is {status}. Waiting for it to succeed.", refund.id);
                    GatewayEventKind::Unhandled { event_type: event.event_type.clone() }
                },
            }
        },
        "account.updated" => {
            let account = event.object_as::<ConnectedAccount>().map_err(malformed)?;
            GatewayEventKind::AccountUpdated { account_id: account.id, payouts_enabled: account.payouts_enabled }
        },
        other => GatewayEventKind::Unhandled { event_type: other.to_string() },
    };
    Ok(GatewayEvent::new(event.id, kind))
}
