use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{
    Money,
    NewOrder,
    NewOrderItem,
    NewRefundRecord,
    Order,
    OrderItem,
    OrderPaymentStatus,
    OrderStatusType,
    Payment,
    PaymentStatus,
    SplitStatus,
};

//--------------------------------------       Checkout        ---------------------------------------------------------

/// A sub-order and its items, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubOrder {
    pub order: NewOrder,
    pub items: Vec<NewOrderItem>,
}

/// Everything that is written in the single checkout transaction: the parent order and one sub-order per shop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCheckout {
    pub parent: NewOrder,
    pub sub_orders: Vec<NewSubOrder>,
}

impl NewCheckout {
    /// The stock to take for this checkout, one entry per distinct product/variant, in first-seen order.
    pub fn stock_reservations(&self) -> Vec<StockReservation> {
        let items = self.sub_orders.iter().flat_map(|s| s.items.iter());
        aggregate_stock(items.map(|i| (i.product_id, i.variant_id, i.quantity)))
    }
}

/// A quantity of one product (or one of its variants) to take from, or return to, stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReservation {
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub quantity: i64,
}

pub fn aggregate_stock<I: IntoIterator<Item = (i64, Option<i64>, i64)>>(lines: I) -> Vec<StockReservation> {
    let mut order = Vec::new();
    let mut totals = BTreeMap::new();
    for (product_id, variant_id, quantity) in lines {
        let key = (product_id, variant_id);
        if !totals.contains_key(&key) {
            order.push(key);
        }
        *totals.entry(key).or_insert(0) += quantity;
    }
    order
        .into_iter()
        .map(|k| StockReservation { product_id: k.0, variant_id: k.1, quantity: totals.get(&k).copied().unwrap_or(0) })
        .collect()
}

/// A stored checkout: the parent order, its sub-orders (in creation order) and every sub-order item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRecord {
    pub parent: Order,
    pub sub_orders: Vec<Order>,
    pub items: Vec<OrderItem>,
}

impl CheckoutRecord {
    pub fn items_for(&self, sub_order_id: i64) -> impl Iterator<Item = &OrderItem> {
        self.items.iter().filter(move |i| i.order_id == sub_order_id)
    }

    pub fn all_orders(&self) -> impl Iterator<Item = &Order> {
        std::iter::once(&self.parent).chain(self.sub_orders.iter())
    }
}

//--------------------------------------    Status updates     ---------------------------------------------------------

/// A conditional change to one order: applied only if the order is still in `expected_status`. If the order has
/// moved on in the meantime, the whole enclosing transaction fails with a concurrency conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusUpdate {
    pub order_id: i64,
    pub expected_status: OrderStatusType,
    pub new_status: Option<OrderStatusType>,
    pub payment_status: Option<OrderPaymentStatus>,
}

impl OrderStatusUpdate {
    pub fn new(order: &Order) -> Self {
        Self { order_id: order.id, expected_status: order.status, new_status: None, payment_status: None }
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.new_status = Some(status);
        self
    }

    pub fn with_payment_status(mut self, status: OrderPaymentStatus) -> Self {
        self.payment_status = Some(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.new_status.is_none() && self.payment_status.is_none()
    }
}

/// A seller/admin fulfilment transition on one sub-order, with the resulting change (if any) to its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfilmentUpdate {
    pub sub_order: OrderStatusUpdate,
    pub parent: Option<OrderStatusUpdate>,
}

/// The full mutable state of a payment after an event has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStateUpdate {
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub charge_id: Option<String>,
    pub payment_method: Option<String>,
    pub failure_reason: Option<String>,
    pub refunded_amount: Money,
}

/// Every write that results from one gateway event. The plan is applied in a single transaction, guarded by the
/// payment's version; the event id is recorded last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationPlan {
    pub payment_id: i64,
    pub expected_version: i64,
    pub event_id: String,
    pub event_type: String,
    pub payment: Option<PaymentStateUpdate>,
    pub split_status: Option<SplitStatus>,
    pub orders: Vec<OrderStatusUpdate>,
    /// Inserted, or if a record with the same refund id exists, marked with the new status.
    pub refund: Option<NewRefundRecord>,
    /// When set, every still-pending payout funded by this payment is cancelled with this reason.
    pub cancel_pending_payouts: Option<String>,
    /// Set when the payment succeeded after it stopped paying for its order. The charge is refunded once the plan has
    /// been committed.
    pub refund_charge: bool,
}

impl ReconciliationPlan {
    /// A plan that only records the event id against the payment.
    pub fn record_only(payment_id: i64, expected_version: i64, event_id: &str, event_type: &str) -> Self {
        Self {
            payment_id,
            expected_version,
            event_id: event_id.to_string(),
            event_type: event_type.to_string(),
            payment: None,
            split_status: None,
            orders: Vec::new(),
            refund: None,
            cancel_pending_payouts: None,
            refund_charge: false,
        }
    }

    pub fn is_record_only(&self) -> bool {
        self.payment.is_none() &&
            self.split_status.is_none() &&
            self.orders.is_empty() &&
            self.refund.is_none() &&
            self.cancel_pending_payouts.is_none()
    }
}

/// Payment-side effects of a cancellation, or of retiring a payment that no longer pays for its order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCancellation {
    pub payment_id: i64,
    pub expected_version: i64,
    pub new_status: Option<PaymentStatus>,
    pub refund: Option<NewRefundRecord>,
    /// When set, every still-pending payout funded by this payment is cancelled with this reason.
    pub cancel_pending_payouts: Option<String>,
}

impl PaymentCancellation {
    pub fn new(payment: &Payment) -> Self {
        Self {
            payment_id: payment.id,
            expected_version: payment.version,
            new_status: None,
            refund: None,
            cancel_pending_payouts: None,
        }
    }

    pub fn with_status(mut self, status: PaymentStatus) -> Self {
        self.new_status = Some(status);
        self
    }

    pub fn with_refund(mut self, refund: NewRefundRecord) -> Self {
        self.refund = Some(refund);
        self
    }

    pub fn cancelling_payouts<S: Into<String>>(mut self, reason: S) -> Self {
        self.cancel_pending_payouts = Some(reason.into());
        self
    }
}

/// Every write that results from cancelling a checkout. Applied in a single transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationPlan {
    pub parent_order_id: i64,
    pub reason: String,
    pub orders: Vec<OrderStatusUpdate>,
    pub restock: Vec<StockReservation>,
    pub payment: Option<PaymentCancellation>,
}
