//! Pure money arithmetic for order lines and orders.
//!
//! Every derived amount stored with an order or item comes from one of these functions, and they are called before
//! each write. All amounts are integer minor units, so the only rounding step is applying the commission percentage.
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{CommissionRate, Money},
    SettlementError,
};

/// The derived amounts of a single order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineFinancials {
    pub total_price: Money,
    pub commission_amount: Money,
    pub seller_payout: Money,
}

impl LineFinancials {
    /// `total_price = quantity * unit_price`, `commission_amount = round_half_up(total_price * rate)`, and
    /// `seller_payout = total_price - commission_amount`. The payout is always obtained by subtraction so that
    /// commission and payout add up to the line total exactly.
    pub fn compute(quantity: i64, unit_price: Money, rate: CommissionRate) -> Result<Self, SettlementError> {
        if quantity < 1 {
            return Err(SettlementError::InvalidQuantity(quantity));
        }
        if unit_price.is_negative() {
            return Err(SettlementError::InvalidUnitPrice(unit_price));
        }
        let total_price = unit_price
            .value()
            .checked_mul(quantity)
            .map(Money::from)
            .ok_or_else(|| SettlementError::InvalidTotals(format!("{quantity} x {unit_price} overflows")))?;
        let commission_amount = rate.apply(total_price);
        let seller_payout = total_price - commission_amount;
        Ok(Self { total_price, commission_amount, seller_payout })
    }

    /// As [`Self::compute`], for a rate given in basis points (2000 = 20%).
    pub fn compute_with_bps(quantity: i64, unit_price: Money, rate_bps: i64) -> Result<Self, SettlementError> {
        let rate =
            CommissionRate::from_bps(rate_bps).map_err(|e| SettlementError::InvalidCommissionRate(e.to_string()))?;
        Self::compute(quantity, unit_price, rate)
    }
}

/// Splits `shipping` across lines in proportion to their totals, using the largest-remainder method so that the
/// shares always add up to `shipping` exactly. Ties go to the earlier line. If every line total is zero, the shipping
/// is shared equally.
pub fn allocate_shipping(shipping: Money, line_totals: &[Money]) -> Vec<Money> {
    let n = line_totals.len();
    if n == 0 {
        return Vec::new();
    }
    let shipping_cents = i128::from(shipping.value());
    let total: i128 = line_totals.iter().map(|m| i128::from(m.value())).sum();
    if total <= 0 {
        let n128 = n as i128;
        let base = shipping_cents / n128;
        let extra = shipping_cents % n128;
        #[allow(clippy::cast_possible_truncation)]
        return (0..n).map(|i| Money::from((base + i128::from((i as i128) < extra)) as i64)).collect();
    }
    let mut shares = Vec::with_capacity(n);
    let mut remainders = Vec::with_capacity(n);
    for (i, line) in line_totals.iter().enumerate() {
        let scaled = shipping_cents * i128::from(line.value());
        shares.push(scaled / total);
        remainders.push((scaled % total, i));
    }
    let leftover = shipping_cents - shares.iter().sum::<i128>();
    // largest remainder first; stable on index for ties
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for (_, i) in remainders.into_iter().take(usize::try_from(leftover).unwrap_or(0)) {
        shares[i] += 1;
    }
    #[allow(clippy::cast_possible_truncation)]
    shares.into_iter().map(|s| Money::from(s as i64)).collect()
}

/// The derived totals of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub shipping_total: Money,
    pub discount_total: Money,
    pub total: Money,
}

impl OrderTotals {
    /// `total = subtotal + shipping_total - discount_total`. No component, nor the total, may be negative.
    pub fn derive(subtotal: Money, shipping_total: Money, discount_total: Money) -> Result<Self, SettlementError> {
        if subtotal.is_negative() || shipping_total.is_negative() || discount_total.is_negative() {
            return Err(SettlementError::InvalidTotals(format!(
                "negative component (subtotal {subtotal}, shipping {shipping_total}, discount {discount_total})"
            )));
        }
        let total = subtotal + shipping_total - discount_total;
        if total.is_negative() {
            return Err(SettlementError::InvalidTotals(format!("discount {discount_total} exceeds the order value")));
        }
        Ok(Self { subtotal, shipping_total, discount_total, total })
    }

    /// Sums the totals of several orders, e.g. sub-orders into their parent.
    pub fn combine<'a, I: IntoIterator<Item = &'a OrderTotals>>(parts: I) -> Result<Self, SettlementError> {
        let (subtotal, shipping, discount) = parts.into_iter().fold(
            (Money::default(), Money::default(), Money::default()),
            |(s, sh, d), t| (s + t.subtotal, sh + t.shipping_total, d + t.discount_total),
        );
        Self::derive(subtotal, shipping, discount)
    }
}
