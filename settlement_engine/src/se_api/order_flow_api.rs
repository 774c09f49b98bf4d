use std::fmt::Debug;

use log::*;
use mkt_common::DEFAULT_CURRENCY_CODE;

use crate::{
    db_types::{
        NewOrder,
        NewRefundRecord,
        Order,
        OrderStatusType,
        Payment,
        PaymentStatus,
        RefundStatus,
    },
    events::{EventProducers, OrderCancelledEvent, OrderCreatedEvent},
    helpers::{OrderNumberGenerator, OrderTotals},
    se_api::checkout_objects::{Cart, CartItem, CartLine, CheckoutRequest, Requester},
    settlement::{partition, plan_cancellation, plan_fulfilment, SubOrderDraft, TransitionActor},
    traits::{
        CheckoutRecord,
        NewCheckout,
        NewSubOrder,
        PaymentCancellation,
        PaymentGateway,
        RefundRequest,
        SettlementDatabase,
    },
    SettlementError,
};

/// `OrderFlowApi` handles the order side of a checkout: creating the parent order and its per-shop sub-orders from a
/// cart, seller fulfilment updates, and cancellation (including the gateway refund or intent cancellation it needs).
pub struct OrderFlowApi<B, G> {
    db: B,
    gateway: G,
    producers: EventProducers,
    currency: String,
    numbers: OrderNumberGenerator,
}

impl<B, G> Debug for OrderFlowApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi ({})", self.currency)
    }
}

impl<B, G> OrderFlowApi<B, G> {
    pub fn new(db: B, gateway: G, producers: EventProducers) -> Self {
        Self {
            db,
            gateway,
            producers,
            currency: DEFAULT_CURRENCY_CODE.to_string(),
            numbers: OrderNumberGenerator::default(),
        }
    }

    pub fn with_currency<S: Into<String>>(mut self, currency: S) -> Self {
        self.currency = currency.into();
        self
    }

    /// Replaces the source of order numbers.
    pub fn with_order_numbers(mut self, numbers: OrderNumberGenerator) -> Self {
        self.numbers = numbers;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B, G> OrderFlowApi<B, G>
where
    B: SettlementDatabase,
    G: PaymentGateway,
{
    /// Turns a cart into a parent order with one sub-order per shop.
    ///
    /// The cart is partitioned first (validating every item and computing all derived amounts), after which the parent,
    /// sub-orders, items and stock decrements are written in one transaction. If any shop's stock is insufficient at
    /// commit time, nothing is written.
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutRecord, SettlementError> {
        let drafts = partition(&request.cart, &self.db).await?;
        let checkout = self.new_checkout(&request, &drafts)?;
        let record = self.db.insert_checkout(checkout, &self.numbers).await?;
        info!(
            "🔄️📦️ Checkout {} created for {} with {} sub-orders. Total: {}",
            record.parent.order_number,
            record.parent.customer_id,
            record.sub_orders.len(),
            record.parent.total
        );
        self.producers.publish_order_created(OrderCreatedEvent::new(record.clone())).await;
        Ok(record)
    }

    fn new_checkout(&self, request: &CheckoutRequest, drafts: &[SubOrderDraft]) -> Result<NewCheckout, SettlementError> {
        let billing = request.billing_address.clone().unwrap_or_else(|| request.shipping_address.clone());
        let new_order = |totals: &OrderTotals, shop_id: Option<i64>, seller_id: Option<String>| NewOrder {
            customer_id: request.customer_id.clone(),
            shipping_address: request.shipping_address.clone(),
            billing_address: billing.clone(),
            subtotal: totals.subtotal,
            shipping_total: totals.shipping_total,
            discount_total: totals.discount_total,
            total: totals.total,
            currency: self.currency.clone(),
            shop_id,
            seller_id,
        };
        let parent_totals = OrderTotals::combine(drafts.iter().map(|d| &d.totals))?;
        let sub_orders = drafts
            .iter()
            .map(|d| NewSubOrder {
                order: new_order(&d.totals, Some(d.shop.id), Some(d.shop.seller_id.clone())),
                items: d.items.iter().map(|i| i.to_new_item(&d.shop)).collect(),
            })
            .collect::<Vec<_>>();
        let sub_total = sub_orders.iter().map(|s| s.order.total).sum();
        if parent_totals.total != sub_total {
            return Err(SettlementError::IntegrityViolation(format!(
                "Sub-order totals ({sub_total}) do not add up to the parent total ({})",
                parent_totals.total
            )));
        }
        Ok(NewCheckout { parent: new_order(&parent_totals, None, None), sub_orders })
    }

    /// Builds a cart from product references, priced at the current catalog price of each product or variant.
    pub async fn build_cart(&self, owner_id: &str, lines: &[CartLine]) -> Result<Cart, SettlementError> {
        let mut cart = Cart::new(owner_id);
        for line in lines {
            let product =
                self.db.fetch_product(line.product_id).await?.ok_or(SettlementError::ProductNotFound(line.product_id))?;
            let unit_price = match line.variant_id {
                Some(vid) => self.db.fetch_variant(vid).await?.ok_or(SettlementError::VariantNotFound(vid))?.price,
                None => product.price,
            };
            cart.items.push(CartItem {
                product_id: product.id,
                variant_id: line.variant_id,
                shop_id: product.shop_id,
                quantity: line.quantity,
                unit_price,
            });
        }
        Ok(cart)
    }

    pub async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, SettlementError> {
        self.db.fetch_order(order_id).await
    }

    /// The full checkout that `order_id` belongs to. Sub-order ids resolve to their parent's checkout.
    ///
    /// Visible to the customer who placed it, to admins, and to sellers with a sub-order in it.
    pub async fn order_details(&self, order_id: i64, requester: &Requester) -> Result<CheckoutRecord, SettlementError> {
        let order = self.db.fetch_order(order_id).await?.ok_or(SettlementError::OrderNotFound(order_id))?;
        let parent_id = order.parent_order_id.unwrap_or(order.id);
        let checkout =
            self.db.fetch_checkout(parent_id).await?.ok_or(SettlementError::OrderNotFound(parent_id))?;
        let visible = requester.is_admin() ||
            requester.owns(&checkout.parent) ||
            checkout.sub_orders.iter().any(|s| requester.sells_through(s.shop_id));
        if !visible {
            return Err(SettlementError::Forbidden(format!("Order {order_id} belongs to another customer")));
        }
        Ok(checkout)
    }

    /// Moves a seller's sub-order along the fulfilment path (Processing, Shipped, Delivered). Sellers may only update
    /// sub-orders of their own shops. The parent order follows the least advanced of its sub-orders.
    pub async fn update_fulfilment_status(
        &self,
        order_id: i64,
        status: OrderStatusType,
        requester: &Requester,
    ) -> Result<Order, SettlementError> {
        let order = self.db.fetch_order(order_id).await?.ok_or(SettlementError::OrderNotFound(order_id))?;
        let parent_id = order.parent_order_id.ok_or(SettlementError::NotASubOrder(order_id))?;
        if requester.actor == TransitionActor::Seller && !requester.sells_through(order.shop_id) {
            return Err(SettlementError::Forbidden(format!("Order {order_id} belongs to another shop")));
        }
        let checkout =
            self.db.fetch_checkout(parent_id).await?.ok_or(SettlementError::OrderNotFound(parent_id))?;
        let update = plan_fulfilment(&checkout, order_id, status, requester.actor)?;
        let updated = self.db.apply_fulfilment_update(update).await?;
        info!("🔄️🚚️ Order {} moved from {} to {} by {}", updated.order_number, order.status, updated.status, requester.actor);
        Ok(updated)
    }

    /// Cancels a checkout: the parent order and every sub-order.
    ///
    /// * If the order has been paid, the unrefunded remainder of the payment is refunded through the gateway first. The
    ///   refund is recorded as pending and settled when the gateway confirms it.
    /// * If the order is still awaiting payment, any open gateway intent is cancelled and the payment marked cancelled.
    ///
    /// A gateway failure aborts the cancellation with nothing changed. Stock for every item is restored.
    pub async fn cancel_order(
        &self,
        order_id: i64,
        requester: &Requester,
        reason: &str,
    ) -> Result<Vec<Order>, SettlementError> {
        let checkout = self.db.fetch_checkout(order_id).await?.ok_or(SettlementError::OrderNotFound(order_id))?;
        if requester.actor == TransitionActor::Customer && !requester.owns(&checkout.parent) {
            return Err(SettlementError::Forbidden(format!("Order {order_id} belongs to another customer")));
        }
        // Validate the transition before talking to the gateway
        plan_cancellation(&checkout, requester.actor, reason, None)?;
        let payments = self.db.fetch_payments_for_order(order_id).await?;
        let payment_side = match checkout.parent.status {
            OrderStatusType::PendingPayment => self.cancel_open_intent(&payments).await?,
            _ => self.refund_remainder(&checkout, &payments, reason).await?,
        };
        let plan = plan_cancellation(&checkout, requester.actor, reason, payment_side)?;
        let orders = self.db.apply_cancellation(plan).await?;
        for order in &orders {
            self.producers.publish_order_cancelled(OrderCancelledEvent::new(order.clone(), reason)).await;
        }
        info!("🔄️❌️ Order {} cancelled by {}: {reason}", checkout.parent.order_number, requester.actor);
        Ok(orders)
    }

    async fn cancel_open_intent(&self, payments: &[Payment]) -> Result<Option<PaymentCancellation>, SettlementError> {
        let Some(payment) = payments.iter().rev().find(|p| p.status.is_live() || p.status == PaymentStatus::Failed)
        else {
            return Ok(None);
        };
        self.gateway.cancel_payment_intent(&payment.payment_intent_id).await?;
        debug!("🔄️❌️ Payment intent {} cancelled", payment.payment_intent_id);
        Ok(Some(PaymentCancellation::new(payment).with_status(PaymentStatus::Cancelled)))
    }

    async fn refund_remainder(
        &self,
        checkout: &CheckoutRecord,
        payments: &[Payment],
        reason: &str,
    ) -> Result<Option<PaymentCancellation>, SettlementError> {
        let payment = payments
            .iter()
            .find(|p| {
                Some(p.id) == checkout.parent.payment_id &&
                    matches!(p.status, PaymentStatus::Succeeded | PaymentStatus::Refunded)
            })
            .ok_or_else(|| {
                SettlementError::IntegrityViolation(format!(
                    "Order {} is {}, but has no successful payment",
                    checkout.parent.order_number, checkout.parent.status
                ))
            })?;
        let remainder = payment.refundable_amount();
        if remainder.value() <= 0 {
            debug!("🔄️❌️ Payment #{} has been fully refunded already", payment.id);
            return Ok(None);
        }
        let request = RefundRequest {
            intent_id: payment.payment_intent_id.clone(),
            amount: remainder,
            reason: Some(reason.to_string()),
            idempotency_key: format!("refund-{}-cancel", payment.id),
        };
        let refund = self.gateway.create_refund(request).await?;
        info!("🔄️❌️ Refund {} of {} requested for payment #{}", refund.refund_id, refund.amount, payment.id);
        let record = NewRefundRecord {
            refund_id: refund.refund_id,
            amount: refund.amount,
            reason: Some(reason.to_string()),
            status: RefundStatus::Pending,
        };
        // Nothing is left for the sellers once the whole remainder goes back to the customer
        Ok(Some(
            PaymentCancellation::new(payment)
                .with_refund(record)
                .cancelling_payouts(format!("Order {} cancelled: {reason}", checkout.parent.order_number)),
        ))
    }
}
