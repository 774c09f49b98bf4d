//! Decides what a verified gateway event means for a payment and its orders.
//!
//! Planning is pure: given the current payment (with its processed event ids and refunds) and the orders of its
//! checkout, it returns the full set of writes to apply. The caller applies the plan atomically, guarded by the payment
//! version, and re-plans from fresh state if the guard fails.
use chrono::{DateTime, Utc};
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{
        NewRefundRecord,
        Order,
        OrderPaymentStatus,
        OrderStatusType,
        Payment,
        PaymentStatus,
        RefundStatus,
        SplitStatus,
    },
    traits::{GatewayEvent, GatewayEventKind, OrderStatusUpdate, PaymentStateUpdate, ReconciliationPlan},
    SettlementError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileDecision {
    /// The event id has already been applied to this payment.
    Duplicate,
    Apply(ReconciliationPlan),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconcileStatus {
    /// The event changed state.
    Applied,
    /// The event had already been processed. Nothing was written.
    Duplicate,
    /// The event was valid but stale or redundant. Only its id was recorded.
    RecordedOnly,
    /// The event type is not one the reconciler acts on.
    Ignored,
}

/// What happened when a webhook event was handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    pub event_id: String,
    pub event_type: String,
    pub status: ReconcileStatus,
    pub payment: Option<Payment>,
    /// Set after a failed payment attempt: the client should collect a new payment method and retry the same intent.
    pub requires_new_payment_method: bool,
}

impl ReconcileOutcome {
    pub fn ignored(event: &GatewayEvent) -> Self {
        Self {
            event_id: event.event_id.clone(),
            event_type: event.event_type().to_string(),
            status: ReconcileStatus::Ignored,
            payment: None,
            requires_new_payment_method: false,
        }
    }
}

/// Builds the reconciliation plan for `event` against `payment`.
///
/// `orders` are the parent order and sub-orders the payment covers.
pub fn plan_event(
    payment: &Payment,
    orders: &[Order],
    event: &GatewayEvent,
    now: DateTime<Utc>,
) -> Result<ReconcileDecision, SettlementError> {
    if payment.has_processed_event(&event.event_id) {
        debug!("🔄️ Event {} has already been applied to payment #{}", event.event_id, payment.id);
        return Ok(ReconcileDecision::Duplicate);
    }
    let mut plan = ReconciliationPlan::record_only(payment.id, payment.version, &event.event_id, event.event_type());
    match &event.kind {
        GatewayEventKind::PaymentProcessing { .. } => plan_processing(payment, &mut plan),
        GatewayEventKind::PaymentSucceeded { charge_id, payment_method, .. } => {
            plan_success(payment, orders, charge_id, payment_method, now, &mut plan)
        },
        GatewayEventKind::PaymentFailed { reason, .. } => plan_failure(payment, orders, reason, &mut plan),
        GatewayEventKind::RefundSucceeded { refund_id, amount, .. } => {
            plan_refund(payment, orders, refund_id, *amount, &mut plan)?
        },
        GatewayEventKind::AccountUpdated { .. } | GatewayEventKind::Unhandled { .. } => {},
    }
    Ok(ReconcileDecision::Apply(plan))
}

fn current_state(payment: &Payment) -> PaymentStateUpdate {
    PaymentStateUpdate {
        status: payment.status,
        paid_at: payment.paid_at,
        charge_id: payment.charge_id.clone(),
        payment_method: payment.payment_method.clone(),
        failure_reason: payment.failure_reason.clone(),
        refunded_amount: payment.refunded_amount,
    }
}

fn plan_processing(payment: &Payment, plan: &mut ReconciliationPlan) {
    if payment.status == PaymentStatus::Pending {
        plan.payment = Some(PaymentStateUpdate { status: PaymentStatus::Processing, ..current_state(payment) });
    }
}

/// Whether `payment` is the one the checkout is waiting on: linked to the parent order, which is still unpaid.
fn pays_for_checkout(payment: &Payment, orders: &[Order]) -> bool {
    orders
        .iter()
        .find(|o| !o.is_sub_order)
        .map(|parent| parent.payment_id == Some(payment.id) && parent.status == OrderStatusType::PendingPayment)
        .unwrap_or(false)
}

/// Whether the parent order still points at `payment`.
fn is_linked(payment: &Payment, orders: &[Order]) -> bool {
    orders.iter().any(|o| !o.is_sub_order && o.payment_id == Some(payment.id))
}

fn plan_success(
    payment: &Payment,
    orders: &[Order],
    charge_id: &Option<String>,
    payment_method: &Option<String>,
    now: DateTime<Utc>,
    plan: &mut ReconciliationPlan,
) {
    let charged = PaymentStateUpdate {
        status: PaymentStatus::Succeeded,
        paid_at: Some(now),
        charge_id: charge_id.clone().or(payment.charge_id.clone()),
        payment_method: payment_method.clone().or(payment.payment_method.clone()),
        failure_reason: None,
        refunded_amount: payment.refunded_amount,
    };
    match payment.status {
        PaymentStatus::Succeeded | PaymentStatus::Refunded => {
            debug!("🔄️ Payment #{} is already {}. Recording event only.", payment.id, payment.status);
        },
        PaymentStatus::Pending | PaymentStatus::Processing | PaymentStatus::Failed
            if pays_for_checkout(payment, orders) =>
        {
            plan.payment = Some(charged);
            plan.split_status = Some(SplitStatus::Paid);
            plan.orders = orders
                .iter()
                .filter(|o| o.status == OrderStatusType::PendingPayment)
                .map(|o| {
                    OrderStatusUpdate::new(o)
                        .with_status(OrderStatusType::Paid)
                        .with_payment_status(OrderPaymentStatus::Paid)
                })
                .collect();
        },
        PaymentStatus::Pending | PaymentStatus::Processing | PaymentStatus::Failed | PaymentStatus::Cancelled => {
            // The customer was charged, but this payment no longer pays for the order. Keep the charge on record so
            // that it can be refunded; splits and orders are left alone.
            error!(
                "🔄️ Payment #{} ({}) succeeded (event {}), but it does not pay for order #{}. The charge will be \
                 refunded.",
                payment.id, payment.status, plan.event_id, payment.order_id
            );
            plan.payment = Some(charged);
            plan.refund_charge = true;
        },
    }
}

fn plan_failure(payment: &Payment, orders: &[Order], reason: &str, plan: &mut ReconciliationPlan) {
    match payment.status {
        PaymentStatus::Succeeded | PaymentStatus::Refunded | PaymentStatus::Cancelled => {
            info!(
                "🔄️ Ignoring failure event {} for payment #{}, which is already {}",
                plan.event_id, payment.id, payment.status
            );
        },
        PaymentStatus::Pending | PaymentStatus::Processing | PaymentStatus::Failed => {
            plan.payment = Some(PaymentStateUpdate {
                status: PaymentStatus::Failed,
                failure_reason: Some(reason.to_string()),
                ..current_state(payment)
            });
            plan.orders = orders
                .iter()
                .filter(|o| o.status == OrderStatusType::PendingPayment)
                .map(|o| OrderStatusUpdate::new(o).with_payment_status(OrderPaymentStatus::Failed))
                .collect();
        },
    }
}

fn plan_refund(
    payment: &Payment,
    orders: &[Order],
    refund_id: &str,
    amount: crate::db_types::Money,
    plan: &mut ReconciliationPlan,
) -> Result<(), SettlementError> {
    if amount.value() <= 0 {
        return Err(SettlementError::MalformedEvent(format!("Refund {refund_id} has a non-positive amount {amount}")));
    }
    let existing = payment.refund_by_id(refund_id);
    if existing.map(|r| r.status == RefundStatus::Succeeded).unwrap_or(false) {
        debug!("🔄️ Refund {refund_id} has already been applied to payment #{}", payment.id);
        return Ok(());
    }
    if !matches!(payment.status, PaymentStatus::Succeeded | PaymentStatus::Refunded) {
        return Err(SettlementError::InvalidEventSequence(format!(
            "Refund {refund_id} arrived for payment #{} in status {}",
            payment.id, payment.status
        )));
    }
    let refunded = payment.refunded_amount + amount;
    if refunded > payment.amount {
        return Err(SettlementError::IntegrityViolation(format!(
            "Refund {refund_id} of {amount} would bring the refunded total for payment #{} to {refunded}, more than \
             the {} charged",
            payment.id, payment.amount
        )));
    }
    let full = refunded == payment.amount;
    plan.payment = Some(PaymentStateUpdate {
        status: if full { PaymentStatus::Refunded } else { PaymentStatus::Succeeded },
        refunded_amount: refunded,
        ..current_state(payment)
    });
    plan.refund = Some(NewRefundRecord {
        refund_id: refund_id.to_string(),
        amount,
        reason: existing.and_then(|r| r.reason.clone()),
        status: RefundStatus::Succeeded,
    });
    if !is_linked(payment, orders) {
        debug!("🔄️ Payment #{} does not pay for its order. Only the payment records the refund.", payment.id);
        return Ok(());
    }
    if full {
        plan.split_status = Some(SplitStatus::Refunded);
        plan.cancel_pending_payouts = Some(format!("Payment refunded ({refund_id})"));
        plan.orders = orders
            .iter()
            .map(|o| {
                let update = OrderStatusUpdate::new(o).with_payment_status(OrderPaymentStatus::Refunded);
                if o.status == OrderStatusType::Paid {
                    update.with_status(OrderStatusType::Refunded)
                } else {
                    update
                }
            })
            .collect();
    } else {
        plan.orders = orders
            .iter()
            .map(|o| OrderStatusUpdate::new(o).with_payment_status(OrderPaymentStatus::PartiallyRefunded))
            .collect();
    }
    Ok(())
}
