use std::{fmt::Debug, time::Duration};

use chrono::Utc;
use log::*;

use crate::{
    db_types::{NewRefundRecord, OrderStatusType, Payment, PaymentStatus, RefundStatus},
    events::{EventProducers, OrderPaidEvent, PaymentFailedEvent, PaymentRefundedEvent},
    se_api::{payment_intent_api::PaymentIntentApi, payout_api::PayoutApi},
    settlement::{plan_event, ReconcileDecision, ReconcileOutcome, ReconcileStatus},
    traits::{
        GatewayEvent,
        GatewayEventKind,
        PaymentCancellation,
        PaymentGateway,
        PayoutManagement,
        RefundRequest,
        SettlementDatabase,
    },
    SettlementError,
};

/// How many times a webhook event is re-planned and re-applied after losing a race with another writer.
pub const MAX_RECONCILE_ATTEMPTS: u32 = 5;
const RETRY_BACKOFF_MS: u64 = 25;

/// `WebhookReconciler` turns authenticated gateway notifications into payment and order state.
///
/// Gateways deliver events at least once and in no particular order, so every event is handled idempotently: the
/// event id is recorded on the payment in the same transaction as the changes it causes, and a repeated id is a no-op.
/// Writes are guarded by the payment's version. Losing a race re-runs the whole handler against fresh state.
pub struct WebhookReconciler<B, G> {
    db: B,
    gateway: G,
    producers: EventProducers,
}

impl<B, G> Debug for WebhookReconciler<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WebhookReconciler")
    }
}

impl<B, G> WebhookReconciler<B, G> {
    pub fn new(db: B, gateway: G, producers: EventProducers) -> Self {
        Self { db, gateway, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B, G> WebhookReconciler<B, G>
where
    B: SettlementDatabase + PayoutManagement,
    G: PaymentGateway,
{
    /// Authenticates and handles a raw webhook delivery. The signature is checked against the exact bytes received
    /// before anything is parsed.
    pub async fn handle_webhook(&self, payload: &[u8], signature: &str) -> Result<ReconcileOutcome, SettlementError> {
        self.gateway.verify_webhook_signature(payload, signature).map_err(|e| {
            warn!("📬️ Rejected webhook with an invalid signature. {e}");
            SettlementError::from(e)
        })?;
        let event = self.gateway.parse_event(payload)?;
        debug!("📬️ Received {} event {}", event.event_type(), event.event_id);
        self.handle_event(event).await
    }

    pub async fn handle_event(&self, event: GatewayEvent) -> Result<ReconcileOutcome, SettlementError> {
        match &event.kind {
            GatewayEventKind::AccountUpdated { account_id, payouts_enabled } => {
                self.account_updated(&event, account_id, *payouts_enabled).await
            },
            GatewayEventKind::Unhandled { event_type } => {
                debug!("📬️ Ignoring event {} of type {event_type}", event.event_id);
                Ok(ReconcileOutcome::ignored(&event))
            },
            _ => self.reconcile_with_retries(&event).await,
        }
    }

    async fn account_updated(
        &self,
        event: &GatewayEvent,
        account_id: &str,
        payouts_enabled: bool,
    ) -> Result<ReconcileOutcome, SettlementError> {
        match self.db.update_payouts_enabled(account_id, payouts_enabled).await? {
            Some(shop) => info!("📬️ Payouts for shop #{} are now {}", shop.id, enabled_str(payouts_enabled)),
            None => warn!("📬️ Account update for {account_id}, which no shop uses"),
        }
        Ok(ReconcileOutcome { status: ReconcileStatus::Applied, ..ReconcileOutcome::ignored(event) })
    }

    async fn reconcile_with_retries(&self, event: &GatewayEvent) -> Result<ReconcileOutcome, SettlementError> {
        let mut attempt = 1;
        loop {
            match self.reconcile(event).await {
                Err(SettlementError::ConcurrencyConflict(reason)) if attempt < MAX_RECONCILE_ATTEMPTS => {
                    debug!(
                        "📬️ Event {} lost a race (attempt {attempt}/{MAX_RECONCILE_ATTEMPTS}). {reason}. Retrying.",
                        event.event_id
                    );
                    tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * u64::from(attempt))).await;
                    attempt += 1;
                },
                result => return result,
            }
        }
    }

    async fn reconcile(&self, event: &GatewayEvent) -> Result<ReconcileOutcome, SettlementError> {
        let intent_id = event
            .payment_intent_id()
            .ok_or_else(|| SettlementError::MalformedEvent(format!("Event {} names no payment", event.event_id)))?;
        let payment = self
            .db
            .fetch_payment_by_intent_id(intent_id)
            .await?
            .ok_or_else(|| SettlementError::PaymentNotFound(intent_id.to_string()))?;
        let checkout = self
            .db
            .fetch_checkout(payment.order_id)
            .await?
            .ok_or(SettlementError::OrderNotFound(payment.order_id))?;
        let orders = checkout.all_orders().cloned().collect::<Vec<_>>();
        let plan = match plan_event(&payment, &orders, event, Utc::now())? {
            ReconcileDecision::Duplicate => {
                info!("📬️ Event {} has already been processed", event.event_id);
                return Ok(self.outcome(event, ReconcileStatus::Duplicate, payment));
            },
            ReconcileDecision::Apply(plan) => plan,
        };
        let record_only = plan.is_record_only();
        let refund_charge = plan.refund_charge;
        let paid_ids =
            plan.orders.iter().filter(|u| u.new_status == Some(OrderStatusType::Paid)).map(|u| u.order_id).collect();
        let updated = self.db.apply_reconciliation(plan).await?;
        if record_only {
            debug!("📬️ Event {} recorded against payment #{} with no changes", event.event_id, updated.id);
            return Ok(self.outcome(event, ReconcileStatus::RecordedOnly, updated));
        }
        info!(
            "📬️ Event {} ({}) applied. Payment #{} is {}",
            event.event_id,
            event.event_type(),
            updated.id,
            updated.status
        );
        if refund_charge {
            self.refund_superseded_charge(&updated).await;
        } else {
            self.after_commit(event, &updated, paid_ids).await;
        }
        let mut outcome = self.outcome(event, ReconcileStatus::Applied, updated);
        outcome.requires_new_payment_method = matches!(event.kind, GatewayEventKind::PaymentFailed { .. });
        Ok(outcome)
    }

    /// Side effects that follow a committed change. Failures here are logged only. The state change itself stands,
    /// and missing payouts are picked up by the payout sweep.
    async fn after_commit(&self, event: &GatewayEvent, payment: &Payment, paid_ids: Vec<i64>) {
        match &event.kind {
            GatewayEventKind::PaymentSucceeded { .. } => {
                let payouts = PayoutApi::new(self.db.clone(), self.gateway.clone(), self.producers.clone());
                if let Err(e) = payouts.accrue_payouts_for_payment(payment.id).await {
                    error!("📬️ Payouts for payment #{} could not be accrued. The sweep will retry. {e}", payment.id);
                }
                self.retire_other_payments(payment).await;
                for order_id in paid_ids {
                    match self.db.fetch_order(order_id).await {
                        Ok(Some(order)) => {
                            self.producers.publish_order_paid(OrderPaidEvent::new(order, payment.id)).await
                        },
                        Ok(None) => warn!("📬️ Order {order_id} disappeared after being paid"),
                        Err(e) => error!("📬️ Could not load paid order {order_id}. {e}"),
                    }
                }
            },
            GatewayEventKind::PaymentFailed { .. } => {
                self.producers.publish_payment_failed(PaymentFailedEvent::new(payment.clone())).await;
            },
            GatewayEventKind::RefundSucceeded { refund_id, amount, .. } => {
                self.producers.publish_payment_refunded(PaymentRefundedEvent::new(payment.clone(), refund_id, *amount)).await;
            },
            _ => {},
        }
    }

    /// Cancels every other open or failed intent for the order that `payment` has just paid for.
    async fn retire_other_payments(&self, payment: &Payment) {
        let others = match self.db.fetch_payments_for_order(payment.order_id).await {
            Ok(payments) => payments,
            Err(e) => {
                error!("📬️ Could not load the other payments for order #{}. {e}", payment.order_id);
                return;
            },
        };
        let intents = PaymentIntentApi::new(self.db.clone(), self.gateway.clone());
        let stale = others
            .iter()
            .filter(|p| p.id != payment.id && (p.status.is_live() || p.status == PaymentStatus::Failed));
        for other in stale {
            if let Err(e) = intents.retire_payment(other).await {
                warn!("📬️ Could not cancel intent {} for paid order #{}. {e}", other.payment_intent_id, other.order_id);
            }
        }
    }

    /// Refunds a charge that was captured by a payment which no longer pays for its order.
    async fn refund_superseded_charge(&self, payment: &Payment) {
        let amount = payment.refundable_amount();
        if amount.value() <= 0 {
            return;
        }
        let request = RefundRequest {
            intent_id: payment.payment_intent_id.clone(),
            amount,
            reason: Some("Superseded payment".to_string()),
            idempotency_key: format!("refund-{}-superseded", payment.id),
        };
        let refund = match self.gateway.create_refund(request).await {
            Ok(refund) => refund,
            Err(e) => {
                error!(
                    "📬️ Could not refund {amount} charged by superseded payment #{}. It must be refunded manually. {e}",
                    payment.id
                );
                return;
            },
        };
        info!("📬️ Refund {} of {} requested for superseded payment #{}", refund.refund_id, refund.amount, payment.id);
        let record = NewRefundRecord {
            refund_id: refund.refund_id,
            amount: refund.amount,
            reason: Some("Superseded payment".to_string()),
            status: RefundStatus::Pending,
        };
        let change = PaymentCancellation::new(payment).with_refund(record);
        if let Err(e) = self.db.apply_payment_cancellation(change).await {
            warn!("📬️ Refund for payment #{} was requested but not recorded. {e}", payment.id);
        }
    }

    fn outcome(&self, event: &GatewayEvent, status: ReconcileStatus, payment: Payment) -> ReconcileOutcome {
        ReconcileOutcome { status, payment: Some(payment), ..ReconcileOutcome::ignored(event) }
    }
}

fn enabled_str(enabled: bool) -> &'static str {
    if enabled {
        "enabled"
    } else {
        "disabled"
    }
}
