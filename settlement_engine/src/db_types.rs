use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
pub use mkt_common::{CommissionRate, Money};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion: {0}")]
pub struct ConversionError(String);

/// Generates `Display`, `FromStr` and a lossy `From<String>` for a fieldless status enum whose variants are stored in
/// the database by name.
macro_rules! status_enum_strings {
    ($name:ident, $fallback:ident, [$($variant:ident),+ $(,)?]) => {
        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => write!(f, stringify!($variant)),)+
                }
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(stringify!($variant) => Ok(Self::$variant),)+
                    s => Err(ConversionError(format!("Invalid {}: {s}", stringify!($name)))),
                }
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                value.parse().unwrap_or_else(|_| {
                    error!(
                        "Invalid {}: {value}. But this conversion cannot fail. Defaulting to {}",
                        stringify!($name),
                        stringify!($fallback)
                    );
                    Self::$fallback
                })
            }
        }
    };
}

//--------------------------------------      OrderNumber      ---------------------------------------------------------
/// The human-readable order reference, e.g. `ORD-2024-004211` for a checkout and `ORD-2024-004211-02` for its second
/// sub-order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderNumber(pub String);

impl OrderNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OrderNumber {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderNumber {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// Created at checkout. Waiting for the gateway to confirm payment.
    PendingPayment,
    /// The gateway confirmed payment in full.
    Paid,
    /// The seller is preparing the order.
    Processing,
    /// The seller has handed the order to a carrier.
    Shipped,
    /// The order has reached the customer.
    Delivered,
    /// The order was cancelled. Stock has been restored.
    Cancelled,
    /// The payment for the order was refunded in full.
    Refunded,
}

status_enum_strings!(OrderStatusType, PendingPayment, [
    PendingPayment,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded
]);

//--------------------------------------  OrderPaymentStatus   ---------------------------------------------------------
/// The payment state of an order, as seen from the order. It mirrors the status of the order's [`Payment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum OrderPaymentStatus {
    Pending,
    Paid,
    Failed,
    PartiallyRefunded,
    Refunded,
    Cancelled,
}

status_enum_strings!(OrderPaymentStatus, Pending, [Pending, Paid, Failed, PartiallyRefunded, Refunded, Cancelled]);

//--------------------------------------     PaymentStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// The intent has been created, and the customer has not paid yet.
    Pending,
    /// The gateway is processing the payment.
    Processing,
    /// The payment succeeded. Partial refunds leave the payment in this state.
    Succeeded,
    /// The last payment attempt failed. The customer may retry with a new payment method on the same intent.
    Failed,
    /// The intent was cancelled before any money was taken.
    Cancelled,
    /// The full amount has been refunded.
    Refunded,
}

status_enum_strings!(PaymentStatus, Pending, [Pending, Processing, Succeeded, Failed, Cancelled, Refunded]);

impl PaymentStatus {
    /// A live payment is one that can still result in (or already has) money moving for the order.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

//--------------------------------------      SplitStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum SplitStatus {
    Pending,
    Paid,
    Transferred,
    Refunded,
}

status_enum_strings!(SplitStatus, Pending, [Pending, Paid, Transferred, Refunded]);

//--------------------------------------     RefundStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum RefundStatus {
    /// Requested from the gateway; not yet confirmed.
    Pending,
    Succeeded,
}

status_enum_strings!(RefundStatus, Pending, [Pending, Succeeded]);

//--------------------------------------     PayoutStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum PayoutStatus {
    Pending,
    Processing,
    Paid,
    Failed,
    Cancelled,
}

status_enum_strings!(PayoutStatus, Pending, [Pending, Processing, Paid, Failed, Cancelled]);

//--------------------------------------        Address        ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub name: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

//--------------------------------------    Catalog entities   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ShippingPolicy {
    #[sqlx(rename = "shipping_flat_rate")]
    pub flat_rate: Money,
    pub free_shipping_threshold: Option<Money>,
    pub reimburse_shipping: bool,
}

impl Default for ShippingPolicy {
    fn default() -> Self {
        Self { flat_rate: Money::from(0), free_shipping_threshold: None, reimburse_shipping: false }
    }
}

impl ShippingPolicy {
    /// The shipping charge for a sub-order with the given subtotal. Shipping is free when a threshold is configured and
    /// the subtotal reaches it.
    pub fn shipping_for(&self, subtotal: Money) -> Money {
        match self.free_shipping_threshold {
            Some(threshold) if subtotal >= threshold => Money::from(0),
            _ => self.flat_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Shop {
    pub id: i64,
    pub seller_id: String,
    pub name: String,
    pub commission_rate: CommissionRate,
    #[sqlx(flatten)]
    pub shipping: ShippingPolicy,
    pub connected_account_id: Option<String>,
    pub payouts_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shop {
    /// A shop can receive split payments only once it has an onboarded connected account with payouts enabled.
    pub fn is_payable(&self) -> bool {
        self.payouts_enabled && self.connected_account_id.as_ref().map(|s| !s.is_empty()).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewShop {
    pub seller_id: String,
    pub name: String,
    pub commission_rate: CommissionRate,
    pub shipping: ShippingPolicy,
}

impl NewShop {
    pub fn new<S: Into<String>>(seller_id: S, name: S) -> Self {
        Self {
            seller_id: seller_id.into(),
            name: name.into(),
            commission_rate: CommissionRate::default(),
            shipping: ShippingPolicy::default(),
        }
    }

    pub fn with_commission_rate(mut self, rate: CommissionRate) -> Self {
        self.commission_rate = rate;
        self
    }

    pub fn with_shipping(mut self, shipping: ShippingPolicy) -> Self {
        self.shipping = shipping;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: i64,
    pub shop_id: i64,
    pub name: String,
    pub slug: String,
    pub image_url: Option<String>,
    pub sku: Option<String>,
    pub price: Money,
    pub stock: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub shop_id: i64,
    pub name: String,
    pub slug: String,
    pub image_url: Option<String>,
    pub sku: Option<String>,
    pub price: Money,
    pub stock: i64,
}

impl NewProduct {
    pub fn new<S: Into<String>>(shop_id: i64, name: S, price: Money, stock: i64) -> Self {
        let name = name.into();
        let slug = name.to_lowercase().split_whitespace().collect::<Vec<_>>().join("-");
        Self { shop_id, name, slug, image_url: None, sku: None, price, stock }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ProductVariant {
    pub id: i64,
    pub product_id: i64,
    pub name: String,
    pub sku: Option<String>,
    pub price: Money,
    pub stock: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProductVariant {
    pub product_id: i64,
    pub name: String,
    pub sku: Option<String>,
    pub price: Money,
    pub stock: i64,
}

//--------------------------------------   ProductSnapshot     ---------------------------------------------------------
/// The catalog details of a product at the moment it was ordered. Stored with the order item and never updated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub name: String,
    pub slug: String,
    pub image_url: Option<String>,
    pub sku: Option<String>,
    pub variant_name: Option<String>,
}

//--------------------------------------         Order         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: i64,
    pub order_number: OrderNumber,
    pub customer_id: String,
    pub status: OrderStatusType,
    pub payment_status: OrderPaymentStatus,
    pub shipping_address: Json<Address>,
    pub billing_address: Json<Address>,
    pub subtotal: Money,
    pub shipping_total: Money,
    pub discount_total: Money,
    pub total: Money,
    pub currency: String,
    pub payment_id: Option<i64>,
    pub parent_order_id: Option<i64>,
    pub is_sub_order: bool,
    pub shop_id: Option<i64>,
    pub seller_id: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The data needed to insert an order (parent or sub-order). Totals are always derived with
/// [`crate::helpers::OrderTotals::derive`] before one of these is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub customer_id: String,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub subtotal: Money,
    pub shipping_total: Money,
    pub discount_total: Money,
    pub total: Money,
    pub currency: String,
    pub shop_id: Option<i64>,
    pub seller_id: Option<String>,
}

//--------------------------------------       OrderItem       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub shop_id: i64,
    pub seller_id: String,
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub product_snapshot: Json<ProductSnapshot>,
    pub quantity: i64,
    pub unit_price: Money,
    pub total_price: Money,
    pub commission_rate: CommissionRate,
    pub commission_amount: Money,
    pub seller_payout: Money,
    pub shipping_cost: Money,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub shop_id: i64,
    pub seller_id: String,
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub product_snapshot: ProductSnapshot,
    pub quantity: i64,
    pub unit_price: Money,
    pub total_price: Money,
    pub commission_rate: CommissionRate,
    pub commission_amount: Money,
    pub seller_payout: Money,
    pub shipping_cost: Money,
}

//--------------------------------------        Payment        ---------------------------------------------------------
/// One gateway payment intent covering a whole checkout (the parent order).
///
/// `splits`, `refunds` and `webhook_events` are loaded from their own tables alongside the payment row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: i64,
    pub order_id: i64,
    pub customer_id: String,
    pub status: PaymentStatus,
    pub amount: Money,
    pub currency: String,
    pub payment_method: Option<String>,
    pub payment_intent_id: String,
    pub client_secret: Option<String>,
    pub charge_id: Option<String>,
    pub total_commission: Money,
    pub refunded_amount: Money,
    pub failure_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub splits: Vec<PaymentSplit>,
    #[sqlx(skip)]
    pub refunds: Vec<PaymentRefund>,
    #[sqlx(skip)]
    pub webhook_events: Vec<String>,
}

impl Payment {
    pub fn has_processed_event(&self, event_id: &str) -> bool {
        self.webhook_events.iter().any(|e| e == event_id)
    }

    pub fn refund_by_id(&self, refund_id: &str) -> Option<&PaymentRefund> {
        self.refunds.iter().find(|r| r.refund_id == refund_id)
    }

    /// The amount that has not been refunded yet.
    pub fn refundable_amount(&self) -> Money {
        self.amount - self.refunded_amount
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PaymentSplit {
    pub id: i64,
    pub payment_id: i64,
    pub sub_order_id: i64,
    pub seller_id: String,
    pub shop_id: i64,
    pub connected_account_id: String,
    pub amount: Money,
    pub platform_commission: Money,
    pub seller_payout: Money,
    pub shipping_reimbursement: Money,
    pub transfer_id: Option<String>,
    pub status: SplitStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PaymentRefund {
    pub id: i64,
    pub payment_id: i64,
    pub refund_id: String,
    pub amount: Money,
    pub reason: Option<String>,
    pub status: RefundStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPaymentSplit {
    pub sub_order_id: i64,
    pub seller_id: String,
    pub shop_id: i64,
    pub connected_account_id: String,
    pub amount: Money,
    pub platform_commission: Money,
    pub seller_payout: Money,
    pub shipping_reimbursement: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPayment {
    pub order_id: i64,
    pub customer_id: String,
    pub amount: Money,
    pub currency: String,
    pub payment_intent_id: String,
    pub client_secret: Option<String>,
    pub total_commission: Money,
    pub splits: Vec<NewPaymentSplit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRefundRecord {
    pub refund_id: String,
    pub amount: Money,
    pub reason: Option<String>,
    pub status: RefundStatus,
}

//--------------------------------------         Payout        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PayoutBreakdown {
    pub total_sales: Money,
    pub total_orders: i64,
    pub platform_commission: Money,
    pub shipping_reimbursement: Money,
    pub adjustments: Money,
}

impl PayoutBreakdown {
    /// The amount owed to the seller for this breakdown. A payout's amount is always derived from here.
    pub fn payout_amount(&self) -> Money {
        self.total_sales - self.platform_commission + self.shipping_reimbursement + self.adjustments
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Payout {
    pub id: i64,
    pub seller_id: String,
    pub shop_id: i64,
    pub status: PayoutStatus,
    pub amount: Money,
    pub currency: String,
    pub connected_account_id: Option<String>,
    pub transfer_id: Option<String>,
    pub gateway_payout_id: Option<String>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    #[sqlx(flatten)]
    pub breakdown: PayoutBreakdown,
    pub order_ids: Json<Vec<i64>>,
    pub payment_id: Option<i64>,
    pub processed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPayout {
    pub seller_id: String,
    pub shop_id: i64,
    pub currency: String,
    pub connected_account_id: Option<String>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub breakdown: PayoutBreakdown,
    pub order_ids: Vec<i64>,
    pub payment_id: Option<i64>,
}

impl NewPayout {
    pub fn amount(&self) -> Money {
        self.breakdown.payout_amount()
    }
}
