//! `SqliteDatabase` is a concrete implementation of a settlement engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the storage traits defined in the [`traits`]
//! module. Every multi-row write runs in a single transaction.
//!
//! [`traits`]: crate::traits
use std::fmt::Debug;

use log::*;
use sqlx::{SqliteConnection, SqlitePool};

use super::db::{catalog, db_url, new_pool, orders, payments, payouts};
use crate::{
    db_types::{
        NewPayment,
        NewPayout,
        NewProduct,
        NewProductVariant,
        NewShop,
        Order,
        OrderItem,
        OrderNumber,
        OrderStatusType,
        Payment,
        Payout,
        Product,
        ProductVariant,
        Shop,
    },
    helpers::{sub_order_number, OrderNumberGenerator},
    traits::{
        CancellationPlan,
        CatalogManagement,
        CheckoutRecord,
        FulfilmentUpdate,
        NewCheckout,
        PaymentCancellation,
        PaymentStateUpdate,
        PayoutManagement,
        ReconciliationPlan,
        SettlementDatabase,
    },
    SettlementError,
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl CatalogManagement for SqliteDatabase {
    async fn fetch_shop(&self, shop_id: i64) -> Result<Option<Shop>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        Ok(catalog::fetch_shop(shop_id, &mut conn).await?)
    }

    async fn fetch_shops_for_seller(&self, seller_id: &str) -> Result<Vec<Shop>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        Ok(catalog::fetch_shops_for_seller(seller_id, &mut conn).await?)
    }

    async fn fetch_product(&self, product_id: i64) -> Result<Option<Product>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        Ok(catalog::fetch_product(product_id, &mut conn).await?)
    }

    async fn fetch_variant(&self, variant_id: i64) -> Result<Option<ProductVariant>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        Ok(catalog::fetch_variant(variant_id, &mut conn).await?)
    }

    async fn insert_shop(&self, shop: NewShop) -> Result<Shop, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let shop = catalog::insert_shop(shop, &mut conn).await?;
        debug!("🗃️ Shop #{} ({}) created for seller {}", shop.id, shop.name, shop.seller_id);
        Ok(shop)
    }

    async fn insert_product(&self, product: NewProduct) -> Result<Product, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        Ok(catalog::insert_product(product, &mut conn).await?)
    }

    async fn insert_variant(&self, variant: NewProductVariant) -> Result<ProductVariant, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        Ok(catalog::insert_variant(variant, &mut conn).await?)
    }

    async fn update_shop_payment_account(
        &self,
        shop_id: i64,
        account_id: &str,
        payouts_enabled: bool,
    ) -> Result<Shop, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let shop = catalog::update_shop_payment_account(shop_id, account_id, payouts_enabled, &mut conn)
            .await?
            .ok_or(SettlementError::ShopNotFound(shop_id))?;
        debug!("🗃️ Shop #{shop_id} linked to account {account_id}. Payouts enabled: {payouts_enabled}");
        Ok(shop)
    }

    async fn update_payouts_enabled(&self, account_id: &str, enabled: bool) -> Result<Option<Shop>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        Ok(catalog::update_payouts_enabled(account_id, enabled, &mut conn).await?)
    }
}

impl SettlementDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_checkout(
        &self,
        checkout: NewCheckout,
        numbers: &OrderNumberGenerator,
    ) -> Result<CheckoutRecord, SettlementError> {
        let mut tx = self.pool.begin().await?;
        for reservation in checkout.stock_reservations() {
            catalog::take_stock(&reservation, &mut tx).await?;
        }
        let parent = orders::insert_order_with_new_number(&checkout.parent, numbers, &mut tx).await?;
        let mut sub_orders = Vec::with_capacity(checkout.sub_orders.len());
        let mut items = Vec::new();
        for (i, sub) in checkout.sub_orders.iter().enumerate() {
            let number = sub_order_number(&parent.order_number, i + 1);
            let order = orders::insert_order(&sub.order, &number, Some(parent.id), &mut tx).await?;
            for item in &sub.items {
                items.push(orders::insert_item(order.id, item, &mut tx).await?);
            }
            trace!("🗃️ Sub-order {} inserted with {} items", order.order_number, sub.items.len());
            sub_orders.push(order);
        }
        tx.commit().await?;
        debug!("🗃️ Checkout {} saved with {} sub-orders", parent.order_number, sub_orders.len());
        Ok(CheckoutRecord { parent, sub_orders, items })
    }

    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order(order_id, &mut conn).await?)
    }

    async fn fetch_order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_number(number, &mut conn).await?)
    }

    async fn fetch_sub_orders(&self, parent_id: i64) -> Result<Vec<Order>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_sub_orders(parent_id, &mut conn).await?)
    }

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_items(order_id, &mut conn).await?)
    }

    async fn fetch_checkout(&self, parent_id: i64) -> Result<Option<CheckoutRecord>, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let parent = match orders::fetch_order(parent_id, &mut tx).await? {
            Some(order) if !order.is_sub_order => order,
            Some(_) => return Err(SettlementError::NotAParentOrder(parent_id)),
            None => return Ok(None),
        };
        let sub_orders = orders::fetch_sub_orders(parent_id, &mut tx).await?;
        let items = orders::fetch_checkout_items(parent_id, &mut tx).await?;
        tx.commit().await?;
        Ok(Some(CheckoutRecord { parent, sub_orders, items }))
    }

    async fn apply_fulfilment_update(&self, update: FulfilmentUpdate) -> Result<Order, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let sub_order = orders::apply_status_update(&update.sub_order, None, &mut tx).await?;
        if let Some(parent) = &update.parent {
            let parent = orders::apply_status_update(parent, None, &mut tx).await?;
            trace!("🗃️ Parent order {} rolled up to {}", parent.order_number, parent.status);
        }
        tx.commit().await?;
        debug!("🗃️ Order {} is now {}", sub_order.order_number, sub_order.status);
        Ok(sub_order)
    }

    async fn apply_cancellation(&self, plan: CancellationPlan) -> Result<Vec<Order>, SettlementError> {
        let mut tx = self.pool.begin().await?;
        if let Some(pc) = &plan.payment {
            apply_payment_side(pc, &mut tx).await?;
        }
        let mut updated = Vec::with_capacity(plan.orders.len());
        for update in &plan.orders {
            let reason = (update.new_status == Some(OrderStatusType::Cancelled)).then_some(plan.reason.as_str());
            updated.push(orders::apply_status_update(update, reason, &mut tx).await?);
        }
        for reservation in &plan.restock {
            catalog::return_stock(reservation, &mut tx).await?;
        }
        tx.commit().await?;
        info!("🗃️ Order #{} cancelled: {}", plan.parent_order_id, plan.reason);
        Ok(updated)
    }

    async fn apply_payment_cancellation(&self, change: PaymentCancellation) -> Result<Payment, SettlementError> {
        let mut tx = self.pool.begin().await?;
        apply_payment_side(&change, &mut tx).await?;
        let payment = payments::fetch_payment(change.payment_id, &mut tx)
            .await?
            .ok_or_else(|| SettlementError::PaymentNotFound(change.payment_id.to_string()))?;
        tx.commit().await?;
        debug!("🗃️ Payment #{} updated. Status: {}", payment.id, payment.status);
        Ok(payment)
    }

    async fn insert_payment(&self, payment: NewPayment) -> Result<(Payment, bool), SettlementError> {
        let mut tx = self.pool.begin().await?;
        if let Some(existing) = payments::fetch_payment_by_intent_id(&payment.payment_intent_id, &mut tx).await? {
            debug!("🗃️ Payment for intent {} already exists", payment.payment_intent_id);
            tx.commit().await?;
            return Ok((existing, false));
        }
        let row = payments::insert_payment(&payment, &mut tx).await?;
        for split in &payment.splits {
            payments::insert_split(row.id, split, &mut tx).await?;
        }
        orders::set_payment_id(payment.order_id, row.id, &mut tx).await?;
        let stored = payments::fetch_payment(row.id, &mut tx)
            .await?
            .ok_or_else(|| SettlementError::PaymentNotFound(payment.payment_intent_id.clone()))?;
        tx.commit().await?;
        debug!("🗃️ Payment #{} for order #{} saved with {} splits", stored.id, stored.order_id, stored.splits.len());
        Ok((stored, true))
    }

    async fn fetch_payment(&self, payment_id: i64) -> Result<Option<Payment>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payments::fetch_payment(payment_id, &mut conn).await?)
    }

    async fn fetch_payment_by_intent_id(&self, intent_id: &str) -> Result<Option<Payment>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payments::fetch_payment_by_intent_id(intent_id, &mut conn).await?)
    }

    async fn fetch_payments_for_order(&self, order_id: i64) -> Result<Vec<Payment>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payments::fetch_payments_for_order(order_id, &mut conn).await?)
    }

    /// Applies every write in the plan in one transaction:
    /// * the payment state, guarded by the payment version (a record-only plan still increments the version),
    /// * the split statuses,
    /// * each order update, guarded by the order's expected status,
    /// * the refund record,
    /// * cancellation of pending payouts,
    /// * and finally the event id, whose uniqueness rejects a concurrent duplicate.
    async fn apply_reconciliation(&self, plan: ReconciliationPlan) -> Result<Payment, SettlementError> {
        let mut tx = self.pool.begin().await?;
        match &plan.payment {
            Some(state) => payments::update_state(plan.payment_id, plan.expected_version, state, &mut tx).await?,
            None => payments::bump_version(plan.payment_id, plan.expected_version, &mut tx).await?,
        }
        if let Some(status) = plan.split_status {
            let n = payments::update_split_status(plan.payment_id, status, &mut tx).await?;
            trace!("🗃️ {n} splits of payment #{} marked {status}", plan.payment_id);
        }
        for update in plan.orders.iter().filter(|u| !u.is_empty()) {
            orders::apply_status_update(update, None, &mut tx).await?;
        }
        if let Some(refund) = &plan.refund {
            payments::upsert_refund(plan.payment_id, refund, &mut tx).await?;
        }
        if let Some(reason) = &plan.cancel_pending_payouts {
            let n = payouts::cancel_pending_for_payment(plan.payment_id, reason, &mut tx).await?;
            if n > 0 {
                info!("🗃️ {n} pending payouts for payment #{} cancelled: {reason}", plan.payment_id);
            }
        }
        payments::record_event(plan.payment_id, &plan.event_id, &plan.event_type, &mut tx).await?;
        let payment = payments::fetch_payment(plan.payment_id, &mut tx)
            .await?
            .ok_or_else(|| SettlementError::PaymentNotFound(plan.payment_id.to_string()))?;
        tx.commit().await?;
        debug!("🗃️ Event {} applied to payment #{}. Status: {}", plan.event_id, payment.id, payment.status);
        Ok(payment)
    }
}

async fn apply_payment_side(pc: &PaymentCancellation, conn: &mut SqliteConnection) -> Result<(), SettlementError> {
    match pc.new_status {
        Some(status) => {
            let payment = payments::fetch_payment(pc.payment_id, conn)
                .await?
                .ok_or_else(|| SettlementError::PaymentNotFound(pc.payment_id.to_string()))?;
            let state = PaymentStateUpdate {
                status,
                paid_at: payment.paid_at,
                charge_id: payment.charge_id,
                payment_method: payment.payment_method,
                failure_reason: payment.failure_reason,
                refunded_amount: payment.refunded_amount,
            };
            payments::update_state(pc.payment_id, pc.expected_version, &state, conn).await?;
        },
        None => payments::bump_version(pc.payment_id, pc.expected_version, conn).await?,
    }
    if let Some(refund) = &pc.refund {
        payments::upsert_refund(pc.payment_id, refund, conn).await?;
    }
    if let Some(reason) = &pc.cancel_pending_payouts {
        let n = payouts::cancel_pending_for_payment(pc.payment_id, reason, conn).await?;
        if n > 0 {
            info!("🗃️ {n} pending payouts for payment #{} cancelled: {reason}", pc.payment_id);
        }
    }
    Ok(())
}

impl PayoutManagement for SqliteDatabase {
    async fn insert_payouts(&self, new_payouts: Vec<NewPayout>) -> Result<Vec<Payout>, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(new_payouts.len());
        for payout in &new_payouts {
            match payouts::insert_payout(payout, &mut tx).await? {
                Some(p) => created.push(p),
                None => trace!(
                    "🗃️ A payout for payment {:?} and shop #{} already exists",
                    payout.payment_id,
                    payout.shop_id
                ),
            }
        }
        tx.commit().await?;
        Ok(created)
    }

    async fn fetch_payout(&self, payout_id: i64) -> Result<Option<Payout>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payouts::fetch_payout(payout_id, &mut conn).await?)
    }

    async fn fetch_payouts_for_payment(&self, payment_id: i64) -> Result<Vec<Payout>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payouts::fetch_payouts_for_payment(payment_id, &mut conn).await?)
    }

    async fn fetch_payouts_for_shop(&self, shop_id: i64) -> Result<Vec<Payout>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payouts::fetch_payouts_for_shop(shop_id, &mut conn).await?)
    }

    async fn fetch_payments_missing_payouts(&self) -> Result<Vec<i64>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payouts::fetch_payments_missing_payouts(&mut conn).await?)
    }

    async fn claim_payout(&self, payout_id: i64) -> Result<Option<Payout>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payouts::claim_payout(payout_id, &mut conn).await?)
    }

    async fn complete_payout(&self, payout_id: i64, transfer_id: &str) -> Result<Payout, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let payout = payouts::complete_payout(payout_id, transfer_id, &mut tx).await?.ok_or_else(|| {
            SettlementError::ConcurrencyConflict(format!("Payout #{payout_id} is no longer processing"))
        })?;
        if let Some(payment_id) = payout.payment_id {
            payments::mark_split_transferred(payment_id, payout.shop_id, transfer_id, &mut tx).await?;
        }
        tx.commit().await?;
        Ok(payout)
    }

    async fn fail_payout(&self, payout_id: i64, reason: &str) -> Result<Payout, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        payouts::fail_payout(payout_id, reason, &mut conn).await?.ok_or_else(|| {
            SettlementError::ConcurrencyConflict(format!("Payout #{payout_id} is no longer processing"))
        })
    }

    async fn cancel_payout(&self, payout_id: i64, reason: &str) -> Result<Option<Payout>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payouts::cancel_payout(payout_id, reason, &mut conn).await?)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Brings the schema up to date. Migrations that have already been applied are skipped.
    pub async fn migrate(&self) -> Result<(), SettlementError> {
        sqlx::migrate!("./src/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| SettlementError::DatabaseError(format!("Migration failed. {e}")))?;
        info!("🗃️ Database migrations are up to date");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
