use crate::{
    db_types::{NewPayment, Order, OrderItem, OrderNumber, Payment},
    helpers::OrderNumberGenerator,
    traits::{
        data_objects::{
            CancellationPlan,
            CheckoutRecord,
            FulfilmentUpdate,
            NewCheckout,
            PaymentCancellation,
            ReconciliationPlan,
        },
        CatalogManagement,
    },
    SettlementError,
};

/// This trait defines the highest level of behaviour for backends supporting the settlement engine.
///
/// This behaviour includes:
/// * Writing checkouts atomically, including the conditional stock decrement.
/// * Storing payment intents with their splits.
/// * Applying webhook reconciliation and cancellation plans, each in a single transaction.
///
/// Implementations must not make business decisions. The plans they receive were computed by the pure functions in
/// [`crate::settlement`]; the backend's job is to apply them all-or-nothing and detect concurrent modification.
#[allow(async_fn_in_trait)]
pub trait SettlementDatabase: Clone + CatalogManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Writes the parent order, all sub-orders and their items, and takes the stock, in one transaction.
    ///
    /// Stock is taken first, with a conditional decrement per product/variant. If any decrement fails, the
    /// transaction is rolled back and [`SettlementError::OutOfStock`] is returned; nothing is written.
    ///
    /// The parent's order number is drawn from `numbers`; a uniqueness clash draws a new number, up to
    /// [`crate::helpers::MAX_ORDER_NUMBER_ATTEMPTS`] times, before failing with
    /// [`SettlementError::OrderNumberGenerationFailed`].
    async fn insert_checkout(
        &self,
        checkout: NewCheckout,
        numbers: &OrderNumberGenerator,
    ) -> Result<CheckoutRecord, SettlementError>;

    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, SettlementError>;

    async fn fetch_order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, SettlementError>;

    /// The sub-orders of a parent order, in creation order.
    async fn fetch_sub_orders(&self, parent_id: i64) -> Result<Vec<Order>, SettlementError>;

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, SettlementError>;

    /// Fetches a complete checkout given the parent order id.
    async fn fetch_checkout(&self, parent_id: i64) -> Result<Option<CheckoutRecord>, SettlementError>;

    /// Applies a fulfilment transition to a sub-order (and possibly its parent). Returns the updated sub-order.
    async fn apply_fulfilment_update(&self, update: FulfilmentUpdate) -> Result<Order, SettlementError>;

    /// Applies a cancellation: order statuses, stock restoration, and payment changes. Returns the updated orders.
    async fn apply_cancellation(&self, plan: CancellationPlan) -> Result<Vec<Order>, SettlementError>;

    /// Applies payment-side changes on their own, guarded by the payment version. Used to retire payments that no
    /// longer pay for their order. Returns the updated payment.
    async fn apply_payment_cancellation(&self, change: PaymentCancellation) -> Result<Payment, SettlementError>;

    /// Stores a new payment with its splits and links it to the parent order and every sub-order.
    ///
    /// This call is idempotent on the gateway intent id. Returns `true` in the second position if the payment was
    /// inserted, or `false` if it already existed.
    async fn insert_payment(&self, payment: NewPayment) -> Result<(Payment, bool), SettlementError>;

    async fn fetch_payment(&self, payment_id: i64) -> Result<Option<Payment>, SettlementError>;

    async fn fetch_payment_by_intent_id(&self, intent_id: &str) -> Result<Option<Payment>, SettlementError>;

    /// All payments created for the given parent order, oldest first.
    async fn fetch_payments_for_order(&self, order_id: i64) -> Result<Vec<Payment>, SettlementError>;

    /// Applies a reconciliation plan.
    ///
    /// Fails with [`SettlementError::ConcurrencyConflict`] if the payment's version no longer matches the plan, or if
    /// the event id has been recorded in the meantime. In either case nothing is written.
    async fn apply_reconciliation(&self, plan: ReconciliationPlan) -> Result<Payment, SettlementError>;
}
