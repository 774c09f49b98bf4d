use thiserror::Error;

use crate::{
    db_types::{Money, OrderStatusType},
    traits::GatewayError,
};

/// Broad classes of failure. Callers (the HTTP layer in particular) decide how to react based on the kind rather
/// than on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input. Nothing was changed.
    Validation,
    /// The caller is not allowed to perform the operation.
    Forbidden,
    /// Stock, uniqueness or concurrent-write conflict. The whole operation can be retried.
    Conflict,
    /// The payment gateway could not be reached or refused the request. Nothing was persisted.
    ExternalService,
    /// An invariant was violated. The operation was aborted without committing anything.
    Integrity,
    /// A referenced record does not exist.
    NotFound,
    /// A webhook payload failed authentication.
    Authenticity,
    /// The data store failed.
    Backend,
}

#[derive(Debug, Clone, Error)]
pub enum SettlementError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Quantity must be at least 1, but was {0}")]
    InvalidQuantity(i64),
    #[error("Unit price cannot be negative, but was {0}")]
    InvalidUnitPrice(Money),
    #[error("{0}")]
    InvalidCommissionRate(String),
    #[error("Invalid order totals: {0}")]
    InvalidTotals(String),
    #[error("The cart is empty")]
    EmptyCart,
    #[error("Invalid cart: {0}")]
    InvalidCart(String),
    #[error("Product {product_id}{} is out of stock. Requested {requested}, but only {available} available",
        .variant_id.map(|v| format!(" (variant {v})")).unwrap_or_default())]
    OutOfStock { product_id: i64, variant_id: Option<i64>, requested: i64, available: i64 },
    #[error("Could not generate a unique order number after {0} attempts")]
    OrderNumberGenerationFailed(u32),
    #[error("The requested order status change would result in a no-op")]
    TransitionNoOp,
    #[error("An order cannot move from {from} to {to}")]
    TransitionForbidden { from: OrderStatusType, to: OrderStatusType },
    #[error("Orders can only be marked as paid by a confirmed gateway payment")]
    PaymentTransitionForbidden,
    #[error("Order {0} is a sub-order. This operation applies to the checkout's parent order")]
    NotAParentOrder(i64),
    #[error("Order {0} is a parent order. This operation applies to a seller's sub-order")]
    NotASubOrder(i64),
    #[error("Order {order_id} cannot be paid for in its current state ({status})")]
    OrderNotPayable { order_id: i64, status: OrderStatusType },
    #[error("Order {0} has already been paid")]
    OrderAlreadyPaid(i64),
    #[error("Shop {0} has no onboarded payment account and cannot receive payments")]
    SellerNotPayable(i64),
    #[error("Concurrent modification detected: {0}")]
    ConcurrencyConflict(String),
    #[error("Event cannot be applied yet: {0}")]
    InvalidEventSequence(String),
    #[error("Payout {0} is not pending")]
    PayoutNotPending(i64),
    #[error("Payment {0} no longer pays for its order")]
    PaymentSuperseded(i64),
    #[error("The payment gateway is unavailable: {0}")]
    GatewayUnavailable(String),
    #[error("The payment gateway rejected the request: {0}")]
    GatewayRejected(String),
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),
    #[error("Order {0} does not exist")]
    OrderNotFound(i64),
    #[error("No payment exists for {0}")]
    PaymentNotFound(String),
    #[error("Product {0} does not exist")]
    ProductNotFound(i64),
    #[error("Product variant {0} does not exist")]
    VariantNotFound(i64),
    #[error("Shop {0} does not exist")]
    ShopNotFound(i64),
    #[error("Payout {0} does not exist")]
    PayoutNotFound(i64),
    #[error("Webhook signature is invalid: {0}")]
    InvalidSignature(String),
    #[error("Webhook payload could not be read: {0}")]
    MalformedEvent(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
}

impl SettlementError {
    pub fn kind(&self) -> ErrorKind {
        use SettlementError::*;
        match self {
            DatabaseError(_) => ErrorKind::Backend,
            InvalidQuantity(_) |
            InvalidUnitPrice(_) |
            InvalidCommissionRate(_) |
            InvalidTotals(_) |
            EmptyCart |
            InvalidCart(_) |
            TransitionNoOp |
            TransitionForbidden { .. } |
            NotAParentOrder(_) |
            NotASubOrder(_) |
            OrderNotPayable { .. } |
            SellerNotPayable(_) => ErrorKind::Validation,
            PaymentTransitionForbidden | Forbidden(_) => ErrorKind::Forbidden,
            OutOfStock { .. } |
            OrderNumberGenerationFailed(_) |
            OrderAlreadyPaid(_) |
            ConcurrencyConflict(_) |
            InvalidEventSequence(_) |
            PayoutNotPending(_) |
            PaymentSuperseded(_) => ErrorKind::Conflict,
            GatewayUnavailable(_) | GatewayRejected(_) => ErrorKind::ExternalService,
            IntegrityViolation(_) => ErrorKind::Integrity,
            OrderNotFound(_) | PaymentNotFound(_) | ProductNotFound(_) | VariantNotFound(_) | ShopNotFound(_) |
            PayoutNotFound(_) => ErrorKind::NotFound,
            InvalidSignature(_) | MalformedEvent(_) => ErrorKind::Authenticity,
        }
    }

    /// Whether repeating the whole operation might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict | ErrorKind::ExternalService)
    }
}

/// SQLite result codes for SQLITE_BUSY, SQLITE_LOCKED and their extended forms (BUSY_RECOVERY, BUSY_SNAPSHOT).
const SQLITE_BUSY_CODES: [&str; 4] = ["5", "6", "261", "517"];

impl From<sqlx::Error> for SettlementError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(err) if err.code().map(|c| SQLITE_BUSY_CODES.contains(&c.as_ref())).unwrap_or(false) => {
                SettlementError::ConcurrencyConflict(err.message().to_string())
            },
            _ => SettlementError::DatabaseError(e.to_string()),
        }
    }
}

impl From<GatewayError> for SettlementError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Unavailable(s) => SettlementError::GatewayUnavailable(s),
            GatewayError::Rejected(s) => SettlementError::GatewayRejected(s),
            GatewayError::InvalidSignature(s) => SettlementError::InvalidSignature(s),
            GatewayError::MalformedEvent(s) => SettlementError::MalformedEvent(s),
        }
    }
}
