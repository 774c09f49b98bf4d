//! The order lifecycle.
//!
//! ```text
//!  PendingPayment ──(reconciler)──► Paid ──► Processing ──► Shipped ──► Delivered
//!        │                           │  │         │            │
//!        └──────────► Cancelled ◄────┘  │         └────────────┴──► Cancelled (admin only)
//!                                       └──(reconciler)──► Refunded
//! ```
//!
//! Only the webhook reconciler may mark an order as paid or refunded. Every other actor is limited to the fulfilment
//! and cancellation edges above. Cancelled, Refunded and Delivered are terminal.
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::{
    db_types::{OrderStatusType, OrderStatusType::*},
    traits::{
        data_objects::{aggregate_stock, CheckoutRecord, FulfilmentUpdate, OrderStatusUpdate},
        CancellationPlan,
        PaymentCancellation,
    },
    SettlementError,
};

/// Who is asking for a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionActor {
    Customer,
    Seller,
    Admin,
    /// The webhook reconciler, acting on a verified gateway event.
    Reconciler,
}

impl Display for TransitionActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionActor::Customer => write!(f, "customer"),
            TransitionActor::Seller => write!(f, "seller"),
            TransitionActor::Admin => write!(f, "admin"),
            TransitionActor::Reconciler => write!(f, "reconciler"),
        }
    }
}

/// The statuses an order in `from` may move to, regardless of who is asking.
pub fn allowed_targets(from: OrderStatusType) -> &'static [OrderStatusType] {
    match from {
        PendingPayment => &[Paid, Cancelled],
        Paid => &[Processing, Cancelled, Refunded],
        Processing => &[Shipped, Cancelled],
        Shipped => &[Delivered, Cancelled],
        Delivered | Cancelled | Refunded => &[],
    }
}

fn permitted_actors(from: OrderStatusType, to: OrderStatusType) -> &'static [TransitionActor] {
    use TransitionActor::*;
    match (from, to) {
        (PendingPayment, Paid) | (Paid, Refunded) => &[Reconciler],
        (Paid, Processing) | (Processing, Shipped) | (Shipped, Delivered) => &[Seller, Admin],
        (PendingPayment, Cancelled) | (Paid, Cancelled) => &[Customer, Admin],
        (Processing, Cancelled) | (Shipped, Cancelled) => &[Admin],
        _ => &[],
    }
}

pub fn is_terminal(status: OrderStatusType) -> bool {
    allowed_targets(status).is_empty()
}

/// Checks a single status change against the transition table.
///
/// Moving an order to its current status is reported as [`SettlementError::TransitionNoOp`] so that callers can treat
/// repeated requests as harmless.
pub fn check_transition(
    from: OrderStatusType,
    to: OrderStatusType,
    actor: TransitionActor,
) -> Result<(), SettlementError> {
    if from == to {
        return Err(SettlementError::TransitionNoOp);
    }
    if !allowed_targets(from).contains(&to) {
        return Err(SettlementError::TransitionForbidden { from, to });
    }
    if permitted_actors(from, to).contains(&actor) {
        return Ok(());
    }
    match (from, to) {
        (PendingPayment, Paid) => Err(SettlementError::PaymentTransitionForbidden),
        _ => Err(SettlementError::Forbidden(format!("A {actor} may not move an order from {from} to {to}"))),
    }
}

/// Position of a status along the fulfilment path. `None` for statuses off that path.
pub fn fulfilment_rank(status: OrderStatusType) -> Option<u8> {
    match status {
        Paid => Some(0),
        Processing => Some(1),
        Shipped => Some(2),
        Delivered => Some(3),
        PendingPayment | Cancelled | Refunded => None,
    }
}

/// A parent order reflects the least advanced of its active sub-orders. Sub-orders that are not on the fulfilment path
/// are ignored. Returns `None` if no sub-order is on the path.
pub fn rollup_parent_status<I: IntoIterator<Item = OrderStatusType>>(sub_statuses: I) -> Option<OrderStatusType> {
    sub_statuses.into_iter().filter_map(|s| fulfilment_rank(s).map(|r| (r, s))).min_by_key(|(r, _)| *r).map(|(_, s)| s)
}

/// Plans a fulfilment transition (Processing, Shipped or Delivered) on one sub-order of a checkout, along with any
/// change it causes to the parent.
pub fn plan_fulfilment(
    checkout: &CheckoutRecord,
    sub_order_id: i64,
    to: OrderStatusType,
    actor: TransitionActor,
) -> Result<FulfilmentUpdate, SettlementError> {
    let sub = checkout
        .sub_orders
        .iter()
        .find(|o| o.id == sub_order_id)
        .ok_or(SettlementError::NotASubOrder(sub_order_id))?;
    check_transition(sub.status, to, actor)?;
    if fulfilment_rank(to).is_none() || to == Paid {
        return Err(SettlementError::Forbidden(format!(
            "{to} is not a fulfilment status. Use the cancellation flow instead"
        )));
    }
    let sub_update = OrderStatusUpdate::new(sub).with_status(to);
    let statuses = checkout.sub_orders.iter().map(|o| if o.id == sub_order_id { to } else { o.status });
    let parent = &checkout.parent;
    let parent_update = match rollup_parent_status(statuses) {
        Some(rolled) if fulfilment_rank(parent.status).is_some() && rolled != parent.status => {
            Some(OrderStatusUpdate::new(parent).with_status(rolled))
        },
        _ => None,
    };
    Ok(FulfilmentUpdate { sub_order: sub_update, parent: parent_update })
}

/// Plans the cancellation of a whole checkout: the parent and every sub-order are cancelled and all reserved stock is
/// returned. The payment side is decided by the caller, since it may involve the gateway.
pub fn plan_cancellation(
    checkout: &CheckoutRecord,
    actor: TransitionActor,
    reason: &str,
    payment: Option<PaymentCancellation>,
) -> Result<CancellationPlan, SettlementError> {
    let parent = &checkout.parent;
    check_transition(parent.status, Cancelled, actor)?;
    let mut orders = vec![OrderStatusUpdate::new(parent).with_status(Cancelled)];
    for sub in &checkout.sub_orders {
        if !allowed_targets(sub.status).contains(&Cancelled) {
            return Err(SettlementError::TransitionForbidden { from: sub.status, to: Cancelled });
        }
        orders.push(OrderStatusUpdate::new(sub).with_status(Cancelled));
    }
    let restock = aggregate_stock(checkout.items.iter().map(|i| (i.product_id, i.variant_id, i.quantity)));
    Ok(CancellationPlan { parent_order_id: parent.id, reason: reason.to_string(), orders, restock, payment })
}
