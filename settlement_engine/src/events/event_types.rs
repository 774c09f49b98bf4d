use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Money, Order, Payment, Payout},
    traits::CheckoutRecord,
};

/// A checkout was written: the parent order, its sub-orders and their items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub checkout: CheckoutRecord,
}

impl OrderCreatedEvent {
    pub fn new(checkout: CheckoutRecord) -> Self {
        Self { checkout }
    }
}

/// Published once per order (parent and each sub-order) that moved to Paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub order: Order,
    pub payment_id: i64,
}

impl OrderPaidEvent {
    pub fn new(order: Order, payment_id: i64) -> Self {
        Self { order, payment_id }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelledEvent {
    pub order: Order,
    pub reason: String,
}

impl OrderCancelledEvent {
    pub fn new(order: Order, reason: &str) -> Self {
        Self { order, reason: reason.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFailedEvent {
    pub payment: Payment,
}

impl PaymentFailedEvent {
    pub fn new(payment: Payment) -> Self {
        Self { payment }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRefundedEvent {
    pub payment: Payment,
    pub refund_id: String,
    pub amount: Money,
}

impl PaymentRefundedEvent {
    pub fn new(payment: Payment, refund_id: &str, amount: Money) -> Self {
        Self { payment, refund_id: refund_id.to_string(), amount }
    }

    pub fn is_full_refund(&self) -> bool {
        self.payment.refunded_amount == self.payment.amount
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutAccruedEvent {
    pub payout: Payout,
}

impl PayoutAccruedEvent {
    pub fn new(payout: Payout) -> Self {
        Self { payout }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    OrderCreated(OrderCreatedEvent),
    OrderPaid(OrderPaidEvent),
    OrderCancelled(OrderCancelledEvent),
    PaymentFailed(PaymentFailedEvent),
    PaymentRefunded(PaymentRefundedEvent),
    PayoutAccrued(PayoutAccruedEvent),
}
