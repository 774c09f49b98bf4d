//! Per-seller breakdown of a checkout payment.
//!
//! Each sub-order yields one split. The split amount is the sub-order total, divided between the platform commission
//! and the seller payout. Shipping goes to the seller when the shop is reimbursed for shipping, and to the platform
//! otherwise.
use std::collections::HashMap;

use crate::{
    db_types::{Money, NewPaymentSplit, Shop},
    traits::CheckoutRecord,
    SettlementError,
};

pub fn compute_splits(
    checkout: &CheckoutRecord,
    shops: &HashMap<i64, Shop>,
) -> Result<Vec<NewPaymentSplit>, SettlementError> {
    let mut splits = Vec::with_capacity(checkout.sub_orders.len());
    for sub in &checkout.sub_orders {
        let shop_id = sub.shop_id.ok_or(SettlementError::NotASubOrder(sub.id))?;
        let shop = shops.get(&shop_id).ok_or(SettlementError::ShopNotFound(shop_id))?;
        let account = match (&shop.connected_account_id, shop.is_payable()) {
            (Some(acc), true) => acc.clone(),
            _ => return Err(SettlementError::SellerNotPayable(shop_id)),
        };
        let commission: Money = checkout.items_for(sub.id).map(|i| i.commission_amount).sum();
        let payout: Money = checkout.items_for(sub.id).map(|i| i.seller_payout).sum();
        let shipping = sub.shipping_total;
        let (platform_commission, seller_payout, shipping_reimbursement) = if shop.shipping.reimburse_shipping {
            (commission, payout + shipping, shipping)
        } else {
            (commission + shipping, payout, Money::from(0))
        };
        if platform_commission + seller_payout != sub.total {
            return Err(SettlementError::IntegrityViolation(format!(
                "Sub-order {} total {} does not equal commission {platform_commission} plus payout {seller_payout}",
                sub.order_number, sub.total
            )));
        }
        splits.push(NewPaymentSplit {
            sub_order_id: sub.id,
            seller_id: shop.seller_id.clone(),
            shop_id,
            connected_account_id: account,
            amount: sub.total,
            platform_commission,
            seller_payout,
            shipping_reimbursement,
        });
    }
    verify_splits(checkout.parent.total, &splits)?;
    Ok(splits)
}

/// Split amounts must add up to exactly the amount charged.
pub fn verify_splits(amount: Money, splits: &[NewPaymentSplit]) -> Result<(), SettlementError> {
    let sum: Money = splits.iter().map(|s| s.amount).sum();
    if sum != amount {
        return Err(SettlementError::IntegrityViolation(format!(
            "Payment splits sum to {sum}, but the payment amount is {amount}"
        )));
    }
    Ok(())
}

pub fn total_commission(splits: &[NewPaymentSplit]) -> Money {
    splits.iter().map(|s| s.platform_commission).sum()
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use sqlx::types::Json;

    use super::*;
    use crate::db_types::{
        CommissionRate,
        Order,
        OrderItem,
        OrderNumber,
        OrderPaymentStatus,
        OrderStatusType,
        ProductSnapshot,
        ShippingPolicy,
    };

    fn order(id: i64, shop_id: Option<i64>, subtotal: i64, shipping: i64) -> Order {
        Order {
            id,
            order_number: OrderNumber::from(format!("ORD-2024-000001-{id:02}")),
            customer_id: "alice".into(),
            status: OrderStatusType::PendingPayment,
            payment_status: OrderPaymentStatus::Pending,
            shipping_address: Json(Default::default()),
            billing_address: Json(Default::default()),
            subtotal: Money::from(subtotal),
            shipping_total: Money::from(shipping),
            discount_total: Money::from(0),
            total: Money::from(subtotal + shipping),
            currency: "EUR".into(),
            payment_id: None,
            parent_order_id: shop_id.map(|_| 1),
            is_sub_order: shop_id.is_some(),
            shop_id,
            seller_id: shop_id.map(|s| format!("seller-{s}")),
            cancellation_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn item(order_id: i64, shop_id: i64, total: i64, commission: i64) -> OrderItem {
        OrderItem {
            id: order_id * 10,
            order_id,
            shop_id,
            seller_id: format!("seller-{shop_id}"),
            product_id: 1,
            variant_id: None,
            product_snapshot: Json(ProductSnapshot::default()),
            quantity: 1,
            unit_price: Money::from(total),
            total_price: Money::from(total),
            commission_rate: CommissionRate::default(),
            commission_amount: Money::from(commission),
            seller_payout: Money::from(total - commission),
            shipping_cost: Money::from(0),
            created_at: Utc::now(),
        }
    }

    fn shop(id: i64, reimburse: bool, payable: bool) -> Shop {
        Shop {
            id,
            seller_id: format!("seller-{id}"),
            name: format!("Shop {id}"),
            commission_rate: CommissionRate::default(),
            shipping: ShippingPolicy { flat_rate: Money::from(500), reimburse_shipping: reimburse, ..Default::default() },
            connected_account_id: Some(format!("acct_{id}")),
            payouts_enabled: payable,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn checkout() -> CheckoutRecord {
        CheckoutRecord {
            parent: order(1, None, 13_000, 500),
            sub_orders: vec![order(2, Some(1), 11_000, 500), order(3, Some(2), 2_000, 0)],
            items: vec![item(2, 1, 11_000, 2_200), item(3, 2, 2_000, 200)],
        }
    }

    #[test]
    fn shipping_goes_to_the_platform_by_default() {
        let shops = HashMap::from([(1, shop(1, false, true)), (2, shop(2, false, true))]);
        let splits = compute_splits(&checkout(), &shops).unwrap();
        assert_eq!(splits.len(), 2);
        assert_eq!(splits[0].amount, Money::from(11_500));
        assert_eq!(splits[0].platform_commission, Money::from(2_700));
        assert_eq!(splits[0].seller_payout, Money::from(8_800));
        assert_eq!(splits[0].shipping_reimbursement, Money::from(0));
        assert_eq!(splits[1].seller_payout, Money::from(1_800));
        assert_eq!(total_commission(&splits), Money::from(2_900));
    }

    #[test]
    fn reimbursed_shipping_goes_to_the_seller() {
        let shops = HashMap::from([(1, shop(1, true, true)), (2, shop(2, false, true))]);
        let splits = compute_splits(&checkout(), &shops).unwrap();
        assert_eq!(splits[0].platform_commission, Money::from(2_200));
        assert_eq!(splits[0].seller_payout, Money::from(9_300));
        assert_eq!(splits[0].shipping_reimbursement, Money::from(500));
    }

    #[test]
    fn unpayable_sellers_block_the_payment() {
        let shops = HashMap::from([(1, shop(1, false, true)), (2, shop(2, false, false))]);
        assert!(matches!(compute_splits(&checkout(), &shops), Err(SettlementError::SellerNotPayable(2))));
    }

    #[test]
    fn splits_must_cover_the_parent_total() {
        let shops = HashMap::from([(1, shop(1, false, true)), (2, shop(2, false, true))]);
        let mut record = checkout();
        record.parent.total = Money::from(13_600);
        assert!(matches!(compute_splits(&record, &shops), Err(SettlementError::IntegrityViolation(_))));
    }
}
