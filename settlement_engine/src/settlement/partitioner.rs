//! Splits a multi-shop cart into one sub-order draft per shop.
//!
//! Partitioning is read-only. Stock is checked here so that the customer gets an early, specific error, but the
//! authoritative check is the conditional decrement in the checkout transaction.
use std::collections::HashMap;

use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{CommissionRate, Money, NewOrderItem, ProductSnapshot, Shop},
    helpers::{allocate_shipping, LineFinancials, OrderTotals},
    se_api::checkout_objects::{Cart, CartItem},
    traits::{data_objects::aggregate_stock, CatalogManagement},
    SettlementError,
};

/// A cart item that has been matched against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedItem {
    pub item: CartItem,
    pub shop: Shop,
    pub snapshot: ProductSnapshot,
    /// Current stock of the product, or of the variant if one was chosen
    pub available_stock: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftItem {
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub quantity: i64,
    pub unit_price: Money,
    pub snapshot: ProductSnapshot,
    pub commission_rate: CommissionRate,
    pub financials: LineFinancials,
    pub shipping_cost: Money,
}

impl DraftItem {
    pub fn to_new_item(&self, shop: &Shop) -> NewOrderItem {
        NewOrderItem {
            shop_id: shop.id,
            seller_id: shop.seller_id.clone(),
            product_id: self.product_id,
            variant_id: self.variant_id,
            product_snapshot: self.snapshot.clone(),
            quantity: self.quantity,
            unit_price: self.unit_price,
            total_price: self.financials.total_price,
            commission_rate: self.commission_rate,
            commission_amount: self.financials.commission_amount,
            seller_payout: self.financials.seller_payout,
            shipping_cost: self.shipping_cost,
        }
    }
}

/// One shop's share of a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubOrderDraft {
    pub shop: Shop,
    pub items: Vec<DraftItem>,
    pub totals: OrderTotals,
}

impl SubOrderDraft {
    pub fn commission_total(&self) -> Money {
        self.items.iter().map(|i| i.financials.commission_amount).sum()
    }

    pub fn payout_total(&self) -> Money {
        self.items.iter().map(|i| i.financials.seller_payout).sum()
    }
}

/// Resolves the cart against the catalog and partitions it. All-or-nothing: the first failing item aborts.
pub async fn partition<C: CatalogManagement>(cart: &Cart, catalog: &C) -> Result<Vec<SubOrderDraft>, SettlementError> {
    let resolved = resolve_cart(cart, catalog).await?;
    partition_items(resolved)
}

/// Matches every cart item with its product, optional variant and shop.
pub async fn resolve_cart<C: CatalogManagement>(
    cart: &Cart,
    catalog: &C,
) -> Result<Vec<ResolvedItem>, SettlementError> {
    if cart.is_empty() {
        return Err(SettlementError::EmptyCart);
    }
    let mut shops = HashMap::<i64, Shop>::new();
    let mut resolved = Vec::with_capacity(cart.items.len());
    for item in &cart.items {
        if item.quantity < 1 {
            return Err(SettlementError::InvalidQuantity(item.quantity));
        }
        let product =
            catalog.fetch_product(item.product_id).await?.ok_or(SettlementError::ProductNotFound(item.product_id))?;
        if product.shop_id != item.shop_id {
            return Err(SettlementError::InvalidCart(format!(
                "product {} is sold by shop {}, not shop {}",
                product.id, product.shop_id, item.shop_id
            )));
        }
        let (variant_name, sku, available_stock) = match item.variant_id {
            Some(vid) => {
                let variant = catalog.fetch_variant(vid).await?.ok_or(SettlementError::VariantNotFound(vid))?;
                if variant.product_id != product.id {
                    return Err(SettlementError::InvalidCart(format!(
                        "variant {vid} does not belong to product {}",
                        product.id
                    )));
                }
                (Some(variant.name), variant.sku.or(product.sku.clone()), variant.stock)
            },
            None => (None, product.sku.clone(), product.stock),
        };
        let shop = match shops.get(&item.shop_id) {
            Some(shop) => shop.clone(),
            None => {
                let shop = catalog.fetch_shop(item.shop_id).await?.ok_or(SettlementError::ShopNotFound(item.shop_id))?;
                shops.insert(shop.id, shop.clone());
                shop
            },
        };
        let snapshot = ProductSnapshot {
            name: product.name,
            slug: product.slug,
            image_url: product.image_url,
            sku,
            variant_name,
        };
        resolved.push(ResolvedItem { item: item.clone(), shop, snapshot, available_stock });
    }
    Ok(resolved)
}

/// Groups resolved items by shop, in order of each shop's first appearance, and computes every derived amount.
///
/// Fails with [`SettlementError::OutOfStock`] if the summed quantity for any product/variant exceeds its current
/// stock.
pub fn partition_items(resolved: Vec<ResolvedItem>) -> Result<Vec<SubOrderDraft>, SettlementError> {
    if resolved.is_empty() {
        return Err(SettlementError::EmptyCart);
    }
    check_stock(&resolved)?;
    let mut shop_order = Vec::<i64>::new();
    let mut groups = HashMap::<i64, Vec<ResolvedItem>>::new();
    for r in resolved {
        let shop_id = r.shop.id;
        if !groups.contains_key(&shop_id) {
            shop_order.push(shop_id);
        }
        groups.entry(shop_id).or_default().push(r);
    }
    let mut drafts = Vec::with_capacity(shop_order.len());
    for shop_id in shop_order {
        let Some(group) = groups.remove(&shop_id) else {
            continue;
        };
        drafts.push(build_draft(group)?);
    }
    trace!("🛒️ Cart partitioned into {} sub-orders", drafts.len());
    Ok(drafts)
}

fn check_stock(resolved: &[ResolvedItem]) -> Result<(), SettlementError> {
    let available = resolved
        .iter()
        .map(|r| ((r.item.product_id, r.item.variant_id), r.available_stock))
        .collect::<HashMap<_, _>>();
    let requested = aggregate_stock(resolved.iter().map(|r| (r.item.product_id, r.item.variant_id, r.item.quantity)));
    for req in requested {
        let in_stock = available.get(&(req.product_id, req.variant_id)).copied().unwrap_or(0);
        if req.quantity > in_stock {
            debug!("🛒️ Product {} ({:?}) is out of stock. {} > {in_stock}", req.product_id, req.variant_id, req.quantity);
            return Err(SettlementError::OutOfStock {
                product_id: req.product_id,
                variant_id: req.variant_id,
                requested: req.quantity,
                available: in_stock,
            });
        }
    }
    Ok(())
}

fn build_draft(group: Vec<ResolvedItem>) -> Result<SubOrderDraft, SettlementError> {
    let shop = group.first().map(|r| r.shop.clone()).ok_or(SettlementError::EmptyCart)?;
    let rate = shop.commission_rate;
    let mut lines = Vec::with_capacity(group.len());
    for r in group {
        let financials = LineFinancials::compute(r.item.quantity, r.item.unit_price, rate)?;
        lines.push((r, financials));
    }
    let subtotal: Money = lines.iter().map(|(_, f)| f.total_price).sum();
    let shipping = shop.shipping.shipping_for(subtotal);
    let totals = OrderTotals::derive(subtotal, shipping, Money::from(0))?;
    let line_totals = lines.iter().map(|(_, f)| f.total_price).collect::<Vec<_>>();
    let shares = allocate_shipping(shipping, &line_totals);
    let items = lines
        .into_iter()
        .zip(shares)
        .map(|((r, financials), shipping_cost)| DraftItem {
            product_id: r.item.product_id,
            variant_id: r.item.variant_id,
            quantity: r.item.quantity,
            unit_price: r.item.unit_price,
            snapshot: r.snapshot,
            commission_rate: rate,
            financials,
            shipping_cost,
        })
        .collect();
    Ok(SubOrderDraft { shop, items, totals })
}
