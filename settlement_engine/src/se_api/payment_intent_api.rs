use std::{collections::HashMap, fmt::Debug};

use log::*;

use crate::{
    db_types::{NewPayment, OrderStatusType, Payment, PaymentStatus, Shop},
    se_api::checkout_objects::PaymentIntentResult,
    settlement::{compute_splits, total_commission},
    traits::{CheckoutRecord, IntentRequest, PaymentCancellation, PaymentGateway, SettlementDatabase},
    SettlementError,
};

/// `PaymentIntentApi` opens a gateway payment intent for a checkout and records it, with the per-seller splits, as a
/// pending payment.
pub struct PaymentIntentApi<B, G> {
    db: B,
    gateway: G,
}

impl<B, G> Debug for PaymentIntentApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentIntentApi")
    }
}

impl<B, G> PaymentIntentApi<B, G> {
    pub fn new(db: B, gateway: G) -> Self {
        Self { db, gateway }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B, G> PaymentIntentApi<B, G>
where
    B: SettlementDatabase,
    G: PaymentGateway,
{
    /// Creates (or returns the open) payment intent for the parent order `order_id`.
    ///
    /// * Only the customer who placed the order may pay for it.
    /// * An order with a successful payment fails with [`SettlementError::OrderAlreadyPaid`].
    /// * If a pending or processing payment exists, it is returned as is. No second intent is created.
    /// * Failed payments are cancelled at the gateway before a new intent replaces them, so that a late success on
    ///   an old intent can never pay for the order a second time.
    ///
    /// No new intent is created or persisted if a gateway call fails.
    pub async fn create_payment_intent(
        &self,
        order_id: i64,
        customer_id: &str,
    ) -> Result<PaymentIntentResult, SettlementError> {
        let order = self.db.fetch_order(order_id).await?.ok_or(SettlementError::OrderNotFound(order_id))?;
        if order.is_sub_order {
            return Err(SettlementError::NotAParentOrder(order_id));
        }
        if order.customer_id != customer_id {
            return Err(SettlementError::Forbidden(format!("Order {order_id} belongs to another customer")));
        }
        let payments = self.db.fetch_payments_for_order(order_id).await?;
        let paid = payments.iter().any(|p| {
            order.payment_id == Some(p.id) && matches!(p.status, PaymentStatus::Succeeded | PaymentStatus::Refunded)
        });
        if paid {
            return Err(SettlementError::OrderAlreadyPaid(order_id));
        }
        if order.status != OrderStatusType::PendingPayment {
            return Err(SettlementError::OrderNotPayable { order_id, status: order.status });
        }
        if let Some(live) = payments.iter().rev().find(|p| p.status.is_live()) {
            debug!("💳️ Reusing payment intent {} for order {}", live.payment_intent_id, order.order_number);
            return Ok(intent_result(live, true));
        }
        for failed in payments.iter().filter(|p| p.status == PaymentStatus::Failed) {
            self.retire_payment(failed).await?;
        }
        let checkout = self.db.fetch_checkout(order_id).await?.ok_or(SettlementError::OrderNotFound(order_id))?;
        let shops = self.shops_for(&checkout).await?;
        let splits = compute_splits(&checkout, &shops)?;
        let request = IntentRequest {
            amount: order.total,
            currency: order.currency.clone(),
            order_id,
            order_number: order.order_number.to_string(),
            customer_id: customer_id.to_string(),
            idempotency_key: format!("intent-{order_id}-{}", payments.len()),
        };
        let intent = self.gateway.create_payment_intent(request).await?;
        let new_payment = NewPayment {
            order_id,
            customer_id: customer_id.to_string(),
            amount: order.total,
            currency: order.currency.clone(),
            payment_intent_id: intent.intent_id,
            client_secret: intent.client_secret,
            total_commission: total_commission(&splits),
            splits,
        };
        let (payment, inserted) = self.db.insert_payment(new_payment).await?;
        if inserted {
            info!(
                "💳️ Payment #{} ({}) of {} created for order {} with {} splits",
                payment.id,
                payment.payment_intent_id,
                payment.amount,
                order.order_number,
                payment.splits.len()
            );
        } else {
            warn!("💳️ Payment intent {} was already recorded as payment #{}", payment.payment_intent_id, payment.id);
        }
        Ok(intent_result(&payment, !inserted))
    }

    /// Cancels the payment's intent at the gateway and marks the payment as cancelled. Any success reported for the
    /// intent afterwards is refunded rather than applied to the order.
    pub async fn retire_payment(&self, payment: &Payment) -> Result<Payment, SettlementError> {
        self.gateway.cancel_payment_intent(&payment.payment_intent_id).await?;
        let change = PaymentCancellation::new(payment).with_status(PaymentStatus::Cancelled);
        let retired = self.db.apply_payment_cancellation(change).await?;
        info!("💳️ Payment #{} ({}) for order #{} cancelled", retired.id, retired.payment_intent_id, retired.order_id);
        Ok(retired)
    }

    async fn shops_for(&self, checkout: &CheckoutRecord) -> Result<HashMap<i64, Shop>, SettlementError> {
        let mut shops = HashMap::with_capacity(checkout.sub_orders.len());
        for shop_id in checkout.sub_orders.iter().filter_map(|o| o.shop_id) {
            let shop = self.db.fetch_shop(shop_id).await?.ok_or(SettlementError::ShopNotFound(shop_id))?;
            shops.insert(shop_id, shop);
        }
        Ok(shops)
    }

    pub async fn fetch_payments_for_order(&self, order_id: i64) -> Result<Vec<Payment>, SettlementError> {
        self.db.fetch_payments_for_order(order_id).await
    }
}

fn intent_result(payment: &Payment, reused: bool) -> PaymentIntentResult {
    PaymentIntentResult {
        payment_id: payment.id,
        order_id: payment.order_id,
        payment_intent_id: payment.payment_intent_id.clone(),
        client_secret: payment.client_secret.clone(),
        amount: payment.amount,
        currency: payment.currency.clone(),
        reused,
    }
}
