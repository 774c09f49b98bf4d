use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    db_types::{
        Money,
        NewPayout,
        Order,
        OrderStatusType,
        Payment,
        PaymentStatus,
        Payout,
        PayoutBreakdown,
        PayoutStatus,
    },
    events::{EventProducers, PayoutAccruedEvent},
    traits::{CheckoutRecord, PaymentGateway, PayoutManagement, SettlementDatabase, TransferRequest},
    SettlementError,
};

/// `PayoutApi` accrues what each seller is owed once a payment succeeds, and moves those payouts to the sellers'
/// connected accounts.
pub struct PayoutApi<B, G> {
    db: B,
    gateway: G,
    producers: EventProducers,
}

impl<B, G> Debug for PayoutApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PayoutApi")
    }
}

impl<B, G> PayoutApi<B, G> {
    pub fn new(db: B, gateway: G, producers: EventProducers) -> Self {
        Self { db, gateway, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B, G> PayoutApi<B, G>
where
    B: SettlementDatabase + PayoutManagement,
    G: PaymentGateway,
{
    /// Creates one pending payout per seller split of a succeeded payment.
    ///
    /// This call is idempotent. Payouts that already exist for the payment are left alone, and only the newly created
    /// payouts are returned.
    pub async fn accrue_payouts_for_payment(&self, payment_id: i64) -> Result<Vec<Payout>, SettlementError> {
        let payment = self
            .db
            .fetch_payment(payment_id)
            .await?
            .ok_or_else(|| SettlementError::PaymentNotFound(format!("payment #{payment_id}")))?;
        if payment.status != PaymentStatus::Succeeded {
            debug!("🏦️ Payment #{payment_id} is {}. No payouts to accrue.", payment.status);
            return Ok(vec![]);
        }
        let checkout = self
            .db
            .fetch_checkout(payment.order_id)
            .await?
            .ok_or(SettlementError::OrderNotFound(payment.order_id))?;
        if checkout.parent.payment_id != Some(payment_id) {
            let number = &checkout.parent.order_number;
            warn!("🏦️ Payment #{payment_id} does not pay for order {number}. No payouts accrued.");
            return Err(SettlementError::PaymentSuperseded(payment_id));
        }
        if matches!(checkout.parent.status, OrderStatusType::Cancelled | OrderStatusType::Refunded) {
            debug!("🏦️ Order {} is {}. No payouts to accrue.", checkout.parent.order_number, checkout.parent.status);
            return Ok(vec![]);
        }
        let new_payouts = build_payouts(&payment, &checkout)?;
        let payouts = self.db.insert_payouts(new_payouts).await?;
        for payout in &payouts {
            info!(
                "🏦️ Payout #{} of {} accrued for shop #{} from payment #{payment_id}",
                payout.id, payout.amount, payout.shop_id
            );
            self.producers.publish_payout_accrued(PayoutAccruedEvent::new(payout.clone())).await;
        }
        Ok(payouts)
    }

    /// Accrues payouts for every succeeded payment that is missing some. Failures are logged and skipped so that one
    /// bad payment does not hold up the rest. Returns the number of payouts created.
    pub async fn sweep_missing_payouts(&self) -> Result<usize, SettlementError> {
        let payment_ids = self.db.fetch_payments_missing_payouts().await?;
        if payment_ids.is_empty() {
            trace!("🏦️ No payments are missing payouts");
            return Ok(0);
        }
        info!("🏦️ {} payments are missing payouts", payment_ids.len());
        let mut count = 0;
        for payment_id in payment_ids {
            match self.accrue_payouts_for_payment(payment_id).await {
                Ok(payouts) => count += payouts.len(),
                Err(e) => error!("🏦️ Could not accrue payouts for payment #{payment_id}. {e}"),
            }
        }
        Ok(count)
    }

    /// Transfers a pending payout to the seller's connected account.
    ///
    /// The payout is claimed first (Pending to Processing), so two workers can never pay the same payout. If the
    /// gateway refuses the transfer, the payout is marked as failed and returned, rather than an error. A payout for
    /// orders that have since been cancelled or refunded is cancelled instead of paid.
    pub async fn process_payout(&self, payout_id: i64) -> Result<Payout, SettlementError> {
        let payout = self.db.fetch_payout(payout_id).await?.ok_or(SettlementError::PayoutNotFound(payout_id))?;
        if payout.status != PayoutStatus::Pending {
            return Err(SettlementError::PayoutNotPending(payout_id));
        }
        if let Some(order) = self.withdrawn_order(&payout).await? {
            warn!("🏦️ Payout #{payout_id} covers order {}, which is {}", order.order_number, order.status);
            return self.cancel_payout(payout_id, &format!("Order {} is {}", order.order_number, order.status)).await;
        }
        // Everything that can fail before the transfer is resolved before the payout is claimed
        let transfer_group = self.transfer_group(&payout).await?;
        let Some(payout) = self.db.claim_payout(payout_id).await? else {
            return Err(SettlementError::PayoutNotPending(payout_id));
        };
        let Some(destination) = payout.connected_account_id.clone() else {
            warn!("🏦️ Payout #{payout_id} has no destination account");
            return self.db.fail_payout(payout_id, "The shop has no connected account").await;
        };
        let request = TransferRequest {
            amount: payout.amount,
            currency: payout.currency.clone(),
            destination,
            transfer_group,
            idempotency_key: format!("payout-{payout_id}"),
        };
        match self.gateway.create_transfer(request).await {
            Ok(transfer) => {
                let paid = self.db.complete_payout(payout_id, &transfer.transfer_id).await?;
                info!("🏦️ Payout #{payout_id} of {} paid with transfer {}", paid.amount, transfer.transfer_id);
                Ok(paid)
            },
            Err(e) => {
                warn!("🏦️ Transfer for payout #{payout_id} failed. {e}");
                self.db.fail_payout(payout_id, &e.to_string()).await
            },
        }
    }

    /// The first order covered by the payout that is no longer owed to the seller.
    async fn withdrawn_order(&self, payout: &Payout) -> Result<Option<Order>, SettlementError> {
        for order_id in payout.order_ids.iter() {
            let order = self.db.fetch_order(*order_id).await?.ok_or(SettlementError::OrderNotFound(*order_id))?;
            if matches!(order.status, OrderStatusType::Cancelled | OrderStatusType::Refunded) {
                return Ok(Some(order));
            }
        }
        Ok(None)
    }

    /// The checkout's order number, which groups all the transfers funded by one payment.
    async fn transfer_group(&self, payout: &Payout) -> Result<Option<String>, SettlementError> {
        let Some(payment_id) = payout.payment_id else {
            return Ok(None);
        };
        let Some(payment) = self.db.fetch_payment(payment_id).await? else {
            return Ok(None);
        };
        let order = self.db.fetch_order(payment.order_id).await?;
        Ok(order.map(|o| o.order_number.to_string()))
    }

    pub async fn cancel_payout(&self, payout_id: i64, reason: &str) -> Result<Payout, SettlementError> {
        match self.db.cancel_payout(payout_id, reason).await? {
            Some(payout) => {
                info!("🏦️ Payout #{payout_id} cancelled: {reason}");
                Ok(payout)
            },
            None => match self.db.fetch_payout(payout_id).await? {
                Some(_) => Err(SettlementError::PayoutNotPending(payout_id)),
                None => Err(SettlementError::PayoutNotFound(payout_id)),
            },
        }
    }

    pub async fn fetch_payout(&self, payout_id: i64) -> Result<Option<Payout>, SettlementError> {
        self.db.fetch_payout(payout_id).await
    }

    pub async fn fetch_payouts_for_shop(&self, shop_id: i64) -> Result<Vec<Payout>, SettlementError> {
        self.db.fetch_payouts_for_shop(shop_id).await
    }
}

/// One payout per split. The breakdown is rebuilt from the sub-order's items and must reproduce the split's seller
/// payout exactly.
pub fn build_payouts(payment: &Payment, checkout: &CheckoutRecord) -> Result<Vec<NewPayout>, SettlementError> {
    let now = Utc::now();
    let mut payouts = Vec::with_capacity(payment.splits.len());
    for split in &payment.splits {
        let sub = checkout.sub_orders.iter().find(|o| o.id == split.sub_order_id).ok_or_else(|| {
            SettlementError::IntegrityViolation(format!(
                "Split #{} refers to sub-order {}, which is not part of order {}",
                split.id, split.sub_order_id, checkout.parent.order_number
            ))
        })?;
        let platform_commission: Money = checkout.items_for(sub.id).map(|i| i.commission_amount).sum();
        let breakdown = PayoutBreakdown {
            total_sales: sub.subtotal,
            total_orders: 1,
            platform_commission,
            shipping_reimbursement: split.shipping_reimbursement,
            adjustments: Money::from(0),
        };
        if breakdown.payout_amount() != split.seller_payout {
            return Err(SettlementError::IntegrityViolation(format!(
                "Payout for shop #{} would be {}, but the split promises {}",
                split.shop_id,
                breakdown.payout_amount(),
                split.seller_payout
            )));
        }
        payouts.push(NewPayout {
            seller_id: split.seller_id.clone(),
            shop_id: split.shop_id,
            currency: payment.currency.clone(),
            connected_account_id: Some(split.connected_account_id.clone()),
            period_start: payment.paid_at.unwrap_or(now),
            period_end: now,
            breakdown,
            order_ids: vec![sub.id],
            payment_id: Some(payment.id),
        });
    }
    Ok(payouts)
}
